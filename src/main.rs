// Copyright 2016 Mozilla Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

extern crate byteorder;
#[macro_use]
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate error_chain;
extern crate fern;
extern crate filetime;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate number_prefix;
extern crate regex;
extern crate ring;
#[cfg(test)]
extern crate tempdir;
extern crate time;

// To get macros in scope, this has to be first.
#[cfg(test)]
#[macro_use]
mod test;

#[macro_use]
mod errors;

mod args;
mod cache;
mod cleanup;
mod cmdline;
mod commands;
mod compiler;
mod config;
mod hash;
mod stats;
mod util;

use config::Config;
use std::env;
use std::io::Write;

fn main() {
    let config = Config::from_env();
    init_logging(&config);
    std::process::exit(match cmdline::parse() {
        Ok(cmd) => {
            match commands::run_command(&config, cmd) {
                Ok(s) => s,
                Err(e) => {
                    let stderr = &mut std::io::stderr();
                    writeln!(stderr, "ccache: error: {}", e).unwrap();
                    for e in e.iter().skip(1) {
                        writeln!(stderr, "caused by: {}", e).unwrap();
                    }
                    2
                }
            }
        }
        Err(e) => {
            println!("ccache: {}", e);
            cmdline::get_app().print_help().unwrap();
            println!("");
            1
        }
    });
}

fn init_logging(config: &Config) {
    let result = if env::var("RUST_LOG").is_ok() {
        env_logger::init().map_err(|e| format!("{:?}", e))
    } else {
        match config.log_file {
            Some(ref log_file) => {
                let logger_config = fern::DispatchConfig {
                    format: Box::new(|msg: &str, level: &log::LogLevel, _location: &log::LogLocation| {
                        format!("[{}][{}] {}", time::now().strftime("%Y-%m-%d][%H:%M:%S").unwrap(), level, msg)
                    }),
                    output: vec![fern::OutputConfig::file(log_file)],
                    level: log::LogLevelFilter::Trace,
                };
                fern::init_global_logger(logger_config, log::LogLevelFilter::Debug)
                    .map_err(|e| format!("{:?}", e))
            }
            None => Ok(()),
        }
    };
    if let Err(e) = result {
        // A broken log sink must not break the build.
        let _ = writeln!(std::io::stderr(), "ccache: failed to initialize logging: {}", e);
    }
}
