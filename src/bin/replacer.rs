// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal CLI wrapper so the library can run as a stand-alone gateway.
//!
//!  Build it with `cargo build --release --bin replacer`
//!  The binary honours REPLACER_CONFIG_FILE or falls back to /etc/replacer/config.toml.

use replacer::{Replacer, info_fmt};
use std::env;
use std::error::Error;
use std::path::Path;

const FALLBACK_CONFIG: &str = "/etc/replacer/config.toml";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("Starting Replacer");

    let mut loader = Replacer::loader().with_env_vars();
    match env::var("REPLACER_CONFIG_FILE") {
        Ok(path) => {
            println!("Using configuration from {path}");
            loader = loader.with_config_file(path);
        }
        Err(_) if Path::new(FALLBACK_CONFIG).exists() => {
            println!("No REPLACER_CONFIG_FILE set; using {FALLBACK_CONFIG}");
            loader = loader.with_config_file(FALLBACK_CONFIG);
        }
        // environment variables alone are enough if they name a rules file
        Err(_) => println!("No configuration file found; using environment only"),
    }

    let replacer = match loader.build().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to build proxy: {e}");
            return Err(e.into());
        }
    };

    if let Err(e) = replacer.start().await {
        info_fmt!("Replacer", "Proxy server failed: {}", e);
        return Err(e.into());
    }

    info_fmt!("Replacer", "Proxy server stopped gracefully");
    Ok(())
}
