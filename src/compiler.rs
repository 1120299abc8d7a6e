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

use config::Config;
use stats::StatsField;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use errors::*;

/// The name this wrapper is installed under. Resolution must never pick a
/// binary that is just a link back to this name, or we'd recurse into
/// ourselves.
pub const MYNAME: &'static str = env!("CARGO_PKG_NAME");

fn basename(arg: &OsStr) -> OsString {
    Path::new(arg)
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_else(|| arg.to_os_string())
}

/// Remove a leading self-name argument, leaving the compiler invocation.
/// We might be invoked either as `ccache gcc -c foo.c` or, via a symlink
/// named after the compiler, as `gcc -c foo.c`.
pub fn strip_self(argv: Vec<OsString>) -> Result<Vec<OsString>> {
    let mut args = argv;
    if !args.is_empty() && basename(&args[0]) == *MYNAME {
        args.remove(0);
    }
    if args.is_empty() {
        bail!(ErrorKind::CannotCache("no compiler given", StatsField::Args));
    }
    Ok(args)
}

fn is_executable(meta: &fs::Metadata) -> bool {
    meta.permissions().mode() & 0o111 != 0
}

/// Search the directories of `path` for the first executable named `base`
/// that isn't a symlink back at this wrapper.
pub fn search_path(base: &OsStr, path: &OsStr) -> Option<PathBuf> {
    for dir in env::split_paths(path) {
        let candidate = dir.join(base);
        let meta = match fs::metadata(&candidate) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !meta.is_file() || !is_executable(&meta) {
            continue;
        }
        if let Ok(link_meta) = fs::symlink_metadata(&candidate) {
            if link_meta.file_type().is_symlink() {
                if let Ok(target) = fs::read_link(&candidate) {
                    if basename(target.as_os_str()) == *MYNAME {
                        // It's a link to us!
                        continue;
                    }
                }
            }
        }
        return Some(candidate);
    }
    None
}

/// Resolve the real compiler for `args` and substitute its path into
/// slot 0, leaving the vector ready for both preprocessing and fallback
/// execution.
pub fn find_compiler(config: &Config, args: &mut Vec<OsString>) -> Result<()> {
    let base = basename(&args[0]);
    let path = match config.compiler_path {
        Some(ref p) => p,
        None => {
            debug!("no PATH variable!?");
            bail!(ErrorKind::CannotCache("no PATH variable", StatsField::Compiler));
        }
    };
    match search_path(&base, path) {
        Some(compiler) => {
            trace!("resolved compiler {:?}", compiler);
            args[0] = compiler.into_os_string();
            Ok(())
        }
        None => {
            debug!("no {:?} on the search path that isn't us", base);
            bail!(ErrorKind::CannotCache("couldn't find the real compiler",
                                         StatsField::Compiler))
        }
    }
}
