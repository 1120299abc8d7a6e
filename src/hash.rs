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

//! Fingerprint derivation. The cache key covers the argument list, a
//! coarse identity of the compiler binary, and the preprocessed source;
//! two invocations that agree on all three would produce the same object.

use args::{self, ParsedArguments};
use cache::DiskCache;
use filetime::FileTime;
use stats::StatsField;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use util::{self, Digest};

use errors::*;

/// Hash the arguments that feed the fingerprint. Include paths, library
/// paths and macro definitions are omitted: if they matter at all, they
/// change the preprocessor output, and hashing their text would defeat
/// cache hits across cosmetically different build trees.
fn hash_arguments(digest: &mut Digest, arguments: &[OsString]) {
    let mut it = arguments.iter().peekable();
    while let Some(arg) = it.next() {
        if let Some(s) = arg.to_str() {
            if args::argument_takes_value(s) && it.peek().is_some() {
                it.next();
                continue;
            }
            if s.starts_with("-I") || s.starts_with("-L") || s.starts_with("-D") ||
               s.starts_with("-isystem") {
                continue;
            }
        }
        digest.string(arg);
    }
}

/// A preprocessor line-number directive starts with `# ` followed by a
/// decimal digit. The check is strictly lexical: other `#`-led output
/// (`#pragma` and friends) must stay in the hash.
fn is_line_directive(line: &[u8]) -> bool {
    line.len() > 2 && line[0] == b'#' && line[1] == b' ' && (line[2] as char).is_digit(10)
}

/// Hash a file of preprocessor output, eliding line-number directives.
/// Single lines of over 100KB have been seen in the wild, so lines are
/// streamed one at a time rather than loading the file whole.
pub fn hash_stripped_file(digest: &mut Digest, path: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        if is_line_directive(&line) {
            continue;
        }
        digest.update(&line);
    }
}

/// Compute the fingerprint for `parsed`, running the preprocessor to
/// capture the effective source. Returns the hex digest with its shard
/// directory already created.
pub fn find_hash(cache: &DiskCache, parsed: &ParsedArguments) -> Result<String> {
    let mut digest = Digest::new();

    hash_arguments(&mut digest, &parsed.stripped_args);

    // The compiler driver's size and mtime stand in for its version.
    // Simple minded, and known not to be 100% reliable, but a content
    // digest would cost a full read of the binary per invocation.
    let compiler = Path::new(&parsed.stripped_args[0]);
    let meta = match fs::metadata(compiler) {
        Ok(m) => m,
        Err(_) => {
            debug!("couldn't stat the compiler {:?}", compiler);
            bail!(ErrorKind::CannotCache("couldn't stat the compiler", StatsField::Compiler));
        }
    };
    digest.int(meta.len());
    digest.int(FileTime::from_last_modification_time(&meta).seconds_relative_to_1970());

    // Now the preprocessor run.
    let path_stdout = cache.tmp_path("stdout");
    let path_stderr = cache.tmp_path("stderr");
    let mut preprocess_args = parsed.stripped_args.to_vec();
    preprocess_args.push(OsString::from("-E"));

    let hashed = (|| -> Result<()> {
        let status = util::execute(&preprocess_args, &path_stdout, &path_stderr)?;
        if status != 0 {
            debug!("the preprocessor gave {}", status);
            bail!(ErrorKind::CannotCache("the preprocessor failed", StatsField::Preprocessor));
        }

        // With -g the whole of the preprocessor output is identity, line
        // numbers included. Otherwise line directives are elided, making
        // the cache insensitive to reformatting-only changes.
        if parsed.found_debug {
            digest.file(&path_stdout)?;
        } else {
            hash_stripped_file(&mut digest, &path_stdout)?;
        }
        // Warnings that would be replayed on a hit are part of the
        // identity too.
        digest.file(&path_stderr)?;
        Ok(())
    })();
    let _ = fs::remove_file(&path_stdout);
    let _ = fs::remove_file(&path_stderr);
    hashed?;

    let result = digest.finish();
    cache.ensure_shard(&result)?;
    Ok(result)
}
