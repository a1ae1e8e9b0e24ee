// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::process;

mod blockdev;
mod cmd;
mod efe;
mod efs;
mod floppy;
mod giebler;
mod gkh;
mod result;
mod sel;
mod split;

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    )
    .init();
    if let Err(e) = cmd::run() {
        eprintln!("ensdisk: {e}");
        process::exit(1);
    }
}
