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

use args::{self, CompilerArguments};
use cache::{Cache, CompileResult, DiskCache};
use cleanup;
use cmdline::Command;
use compiler;
use config::Config;
use stats::{self, StatsField};
use std::ffi::OsString;
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process;

use errors::*;

/// Run a single ccache command, returning the process exit code.
pub fn run_command(config: &Config, cmd: Command) -> Result<i32> {
    match cmd {
        Command::ShowStats => {
            stats::summary(&config.cache_dir);
            Ok(0)
        }
        Command::ZeroStats => {
            stats::zero(&config.cache_dir)?;
            println!("Statistics cleared");
            Ok(0)
        }
        Command::Cleanup => {
            cleanup::cleanup_all(&config.cache_dir)?;
            println!("Cleaned cache");
            Ok(0)
        }
        Command::SetMaxFiles(count) => {
            stats::set_limits(&config.cache_dir, Some(count), None)?;
            println!("Set cache file limit to {}", count);
            Ok(0)
        }
        Command::SetMaxSize(size) => {
            stats::set_limits(&config.cache_dir, None, Some(size))?;
            println!("Set cache size limit to {}k", size / 1024);
            Ok(0)
        }
        Command::Compile { argv } => compile(config, argv),
    }
}

/// Give up and become the real compiler.
///
/// This is the only legitimate way to bail out of the pipeline: the exit
/// status, signal behavior and file tree all end up exactly as if ccache
/// had never been invoked. Callers must have removed their temp files
/// already; nothing runs after a successful exec.
pub fn fall_through(argv: &[OsString]) -> ! {
    trace!("falling through to {:?}", argv);
    let err = process::Command::new(&argv[0])
        .args(&argv[1..])
        .exec();
    // exec only returns on failure.
    debug!("execv returned ({})", err);
    process::exit(1);
}

/// Record the stats reason attached to a fall-through error.
fn record_failure(stats_file: &Path, err: &Error) {
    debug!("{}", err);
    match *err.kind() {
        ErrorKind::CannotCache(_, stat) => stats::update(stats_file, stat),
        _ => stats::update(stats_file, StatsField::Error),
    }
}

/// The compile pipeline: resolve the real compiler, classify the argument
/// list, fingerprint via the preprocessor, then lookup / insert / lookup.
/// Every failure that leaves the build compilable records its reason and
/// hands off to the real compiler; a failing build must come out exactly
/// as it would have without us.
pub fn compile(config: &Config, argv: Vec<OsString>) -> Result<i32> {
    fs::create_dir_all(&config.cache_dir)
        .chain_err(|| format!("failed to create {:?}", config.cache_dir))?;

    let cache = DiskCache::new(&config.cache_dir);
    let root_stats = config.cache_dir.join("stats");

    let mut orig_args = compiler::strip_self(argv)?;

    if let Err(e) = compiler::find_compiler(config, &mut orig_args) {
        record_failure(&root_stats, &e);
        fall_through(&orig_args);
    }

    if config.disabled {
        debug!("ccache is disabled");
        fall_through(&orig_args);
    }

    let parsed = match args::parse_arguments(&orig_args) {
        CompilerArguments::Ok(parsed) => parsed,
        CompilerArguments::NotCompilation => {
            debug!("not a compilation");
            stats::update(&root_stats, StatsField::Link);
            fall_through(&orig_args);
        }
        CompilerArguments::CannotCache(reason, stat) => {
            debug!("cannot cache: {}", reason);
            stats::update(&root_stats, stat);
            fall_through(&orig_args);
        }
    };

    let digest = match ::hash::find_hash(&cache, &parsed) {
        Ok(digest) => digest,
        Err(e) => {
            record_failure(&root_stats, &e);
            fall_through(&orig_args);
        }
    };
    let stats_file = cache.stats_path(&digest);

    match cache.lookup(&digest, &parsed.output, &stats_file) {
        Ok(Cache::Hit) => {
            debug!("got cached result for {:?}", parsed.output);
            stats::update(&stats_file, StatsField::Cached);
            return Ok(0);
        }
        Ok(Cache::Miss) => {}
        Err(e) => {
            record_failure(&stats_file, &e);
            fall_through(&orig_args);
        }
    }

    match cache.insert(&parsed.stripped_args, &parsed.output, &digest, &stats_file) {
        Ok(CompileResult::Stored) => {}
        Ok(CompileResult::CompileFailed(status)) => return Ok(status),
        Err(e) => {
            record_failure(&stats_file, &e);
            fall_through(&orig_args);
        }
    }

    // What was just inserted must be retrievable. Not finding it now is a
    // bug in the cache itself, not in the build.
    match cache.lookup(&digest, &parsed.output, &stats_file) {
        Ok(Cache::Hit) => Ok(0),
        _ => {
            debug!("secondary cache lookup failed after insert!");
            stats::update(&stats_file, StatsField::Error);
            fall_through(&orig_args);
        }
    }
}
