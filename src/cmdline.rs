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

use clap::{App, Arg};
use config;
use std::env;
use std::ffi::OsString;
use std::path::Path;

use errors::*;

/// A specific command to run.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// Show cache statistics and exit.
    ShowStats,
    /// Zero cache statistics and exit.
    ZeroStats,
    /// Clean the cache to within the configured limits.
    Cleanup,
    /// Store a new limit on the number of files in the cache.
    SetMaxFiles(u64),
    /// Store a new limit on the total cache size, in bytes.
    SetMaxSize(u64),
    /// Run a compiler command through the cache.
    Compile {
        /// The full argument vector, invocation name included.
        argv: Vec<OsString>,
    },
}

/// Get the `App` used for administrative argument parsing.
pub fn get_app<'a, 'b>() -> App<'a, 'b> {
    App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about("a compiler cache")
        .after_help(concat!(
                "ccache is also invoked as `ccache compiler [args]`, or as\n",
                "`compiler [args]` via a symbolic link named after the compiler.\n"))
        .args_from_usage(
            "-s --show-stats 'show summary of cache statistics'
             -z --zero-stats 'zero statistics counters'
             -c --cleanup 'clean the cache to within the stored limits'")
        .arg(Arg::from_usage("-F --max-files=[COUNT] 'set maximum number of files in the cache'"))
        .arg(Arg::from_usage("-M --max-size=[SIZE] 'set maximum cache size (use K, M, G or T)'"))
}

/// Work out what to do from the process arguments. What the wrapper does
/// depends on the name it is invoked under: under its own name with a
/// leading option it is an administrative command, under its own name
/// otherwise the rest is a compiler invocation, and under any other name
/// (a compiler-named symlink) the whole argv is the compiler invocation.
pub fn parse() -> Result<Command> {
    parse_from(env::args_os().collect())
}

pub fn parse_from(args: Vec<OsString>) -> Result<Command> {
    trace!("parse");
    if args.is_empty() {
        bail!("no arguments");
    }
    let self_named = Path::new(&args[0])
        .file_stem()
        .map(|s| s == env!("CARGO_PKG_NAME"))
        .unwrap_or(false);
    if !self_named {
        return Ok(Command::Compile { argv: args });
    }
    if args.len() < 2 {
        bail!("no compile command");
    }
    if !args[1].to_string_lossy().starts_with('-') {
        return Ok(Command::Compile { argv: args });
    }

    // An administrative invocation.
    let matches = get_app().get_matches_from(args);
    if matches.is_present("show-stats") {
        Ok(Command::ShowStats)
    } else if matches.is_present("zero-stats") {
        Ok(Command::ZeroStats)
    } else if matches.is_present("cleanup") {
        Ok(Command::Cleanup)
    } else if matches.is_present("max-files") {
        let count = value_t!(matches.value_of("max-files"), u64).unwrap_or_else(|e| e.exit());
        Ok(Command::SetMaxFiles(count))
    } else if matches.is_present("max-size") {
        let size = matches.value_of("max-size").unwrap();
        match config::parse_size(size) {
            Some(size) => Ok(Command::SetMaxSize(size)),
            None => bail!(format!("invalid size: {}", size)),
        }
    } else {
        bail!("no command specified")
    }
}
