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

//! Shared test fixtures: a fake compiler search path with stub compiler
//! binaries, and counters over a cache root for asserting what a run did
//! (or didn't) leave behind.

use cache::CACHE_SHARDS;
use stats::{self, StatsField};
use std::env;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempdir::TempDir;

/// Return a `Vec` with each listed entry converted to an owned `OsString`.
macro_rules! ovec {
    ( $( $x:expr ),* ) => {
        vec!($( ::std::ffi::OsString::from($x), )*)
    };
}

pub fn find_ccache_binary() -> PathBuf {
    // Older versions of cargo put the test binary next to the ccache
    // binary. Newer versions put it in the deps/ subdirectory.
    let exe = env::current_exe().unwrap();
    let this_dir = exe.parent().unwrap();
    let dirs = &[&this_dir, &this_dir.parent().unwrap()];
    dirs
        .iter()
        .map(|d| d.join("ccache").with_extension(env::consts::EXE_EXTENSION))
        .filter_map(|d| fs::metadata(&d).ok().map(|_| d))
        .next()
        .expect(&format!("Error: ccache binary not found, looked in `{:?}`. Do you need to run `cargo build`?", dirs))
}

/// Directories making up the fixture's compiler search path.
pub const SUBDIRS: &'static [&'static str] = &["a", "b", "c"];
/// The placeholder executable seeded into every search directory.
pub const BIN_NAME: &'static str = "bin";

/// Write `contents` to `path` under `dir`, creating parent directories,
/// and return the canonical path. Used for source files and headers;
/// the result is a plain non-executable file.
pub fn write_file(dir: &Path, path: &str, contents: &str) -> io::Result<PathBuf> {
    let file = dir.join(path);
    fs::create_dir_all(file.parent().unwrap())?;
    File::create(&file)?.write_all(contents.as_bytes())?;
    file.canonicalize()
}

/// Create an executable at `dir/name` holding `script`. An empty script
/// makes a bare placeholder binary, good enough for resolver tests; a
/// shell script makes a runnable stub compiler.
pub fn stub_bin(dir: &Path, name: &str, script: &str) -> io::Result<PathBuf> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::create_dir_all(dir)?;
    let bin = dir.join(name);
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o755)
        .open(&bin)?;
    f.write_all(script.as_bytes())?;
    bin.canonicalize()
}

/// A compiler search path for resolver and pipeline tests: one temp
/// directory per `SUBDIRS` entry, each seeded with a placeholder
/// executable, joined into a PATH-style string. Tests install stub
/// compilers and source files on top as needed.
pub struct PathFixture {
    /// Temp directory holding the whole fixture.
    pub tempdir: TempDir,
    /// The search directories joined PATH-style.
    pub paths: OsString,
    /// The placeholder executables, first directory first.
    pub bins: Vec<PathBuf>,
}

impl PathFixture {
    pub fn new() -> PathFixture {
        let tempdir = TempDir::new("ccache_test").unwrap();
        let mut paths = vec!();
        let mut bins = vec!();
        for d in SUBDIRS.iter() {
            let p = tempdir.path().join(d);
            bins.push(stub_bin(&p, BIN_NAME, "").unwrap());
            paths.push(p);
        }
        PathFixture {
            tempdir: tempdir,
            paths: env::join_paths(paths).unwrap(),
            bins: bins,
        }
    }

    /// Create an empty file under the fixture root, for use as an input
    /// source file (the classifier only accepts inputs that exist).
    pub fn touch(&self, path: &str) -> io::Result<PathBuf> {
        write_file(self.tempdir.path(), path, "")
    }

    /// Install a stub compiler in the first search directory, where
    /// resolution finds it ahead of everything else on the path.
    pub fn stub_compiler(&self, name: &str, script: &str) -> io::Result<PathBuf> {
        stub_bin(&self.tempdir.path().join(SUBDIRS[0]), name, script)
    }
}

/// Count `tmp.*` files left in a cache root. Every exit path is supposed
/// to leave zero behind.
pub fn tmp_file_count(cache_dir: &Path) -> usize {
    match fs::read_dir(cache_dir) {
        Ok(entries) => {
            entries.filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with("tmp."))
                .count()
        }
        Err(_) => 0,
    }
}

/// Count entry files (objects and stored stderrs) across all shards.
pub fn entry_file_count(cache_dir: &Path) -> usize {
    let mut count = 0;
    for shard in CACHE_SHARDS.chars() {
        let dir = cache_dir.join(shard.to_string());
        if let Ok(entries) = fs::read_dir(&dir) {
            count += entries.filter_map(|e| e.ok())
                .filter(|e| e.file_name() != OsString::from("stats"))
                .count();
        }
    }
    count
}

/// Sum one stats counter over the cache root and every shard.
pub fn stat_count(cache_dir: &Path, field: StatsField) -> u64 {
    let mut total = stats::read(&cache_dir.join("stats"))[field as usize];
    for shard in CACHE_SHARDS.chars() {
        let file = cache_dir.join(shard.to_string()).join("stats");
        total += stats::read(&file)[field as usize];
    }
    total
}
