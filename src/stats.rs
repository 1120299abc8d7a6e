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

//! Per-directory counter files. Each shard carries a `stats` file holding
//! one line of space-separated counters; failures before a fingerprint
//! (and hence a shard) exists are recorded in the cache root's file.
//! Updates are best-effort: a lost increment must never fail a build.

use cache::CACHE_SHARDS;
use number_prefix::{binary_prefix, Prefixed, Standalone};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use errors::*;

/// Counter slots in a stats file. The discriminants are file positions;
/// changing them invalidates existing stats files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatsField {
    /// Compiler unexpectedly wrote to stdout.
    Stdout = 0,
    /// Compiler exited nonzero.
    Status = 1,
    /// Internal error in the cache itself.
    Error = 2,
    /// Results stored in the cache (misses).
    ToCache = 3,
    /// Preprocessor failed.
    Preprocessor = 4,
    /// Couldn't locate or stat the real compiler.
    Compiler = 5,
    /// Cache object vanished between lookup and link.
    Missing = 6,
    /// Results delivered from the cache (hits).
    Cached = 7,
    /// Unusable argument list.
    Args = 8,
    /// Not a compile (linking, or multiple inputs).
    Link = 9,
    NumFiles = 10,
    TotalSize = 11,
    MaxFiles = 12,
    MaxSize = 13,
}

pub const NFIELDS: usize = 14;

/// Event counters, cleared by `-z`; the remaining slots carry cache
/// bookkeeping and limits and survive a zeroing.
const NEVENTS: usize = 10;

const DISPLAY: &'static [(StatsField, &'static str)] = &[
    (StatsField::Cached, "cache hit"),
    (StatsField::ToCache, "cache miss"),
    (StatsField::Link, "called for link"),
    (StatsField::Status, "compile failed"),
    (StatsField::Preprocessor, "preprocessor error"),
    (StatsField::Compiler, "couldn't find the compiler"),
    (StatsField::Missing, "cache file missing"),
    (StatsField::Args, "bad compiler arguments"),
    (StatsField::Stdout, "compiler produced stdout"),
    (StatsField::Error, "internal error"),
    (StatsField::NumFiles, "files in cache"),
    (StatsField::TotalSize, "cache size"),
    (StatsField::MaxFiles, "max files"),
    (StatsField::MaxSize, "max cache size"),
];

impl StatsField {
    fn always_shown(&self) -> bool {
        match *self {
            StatsField::Cached |
            StatsField::ToCache |
            StatsField::NumFiles |
            StatsField::TotalSize => true,
            _ => false,
        }
    }

    fn is_size(&self) -> bool {
        match *self {
            StatsField::TotalSize | StatsField::MaxSize => true,
            _ => false,
        }
    }
}

/// Read a stats file. A missing, short or garbled file reads as zeros.
pub fn read(path: &Path) -> Vec<u64> {
    let mut counters = vec![0u64; NFIELDS];
    let mut data = String::new();
    if let Ok(mut f) = File::open(path) {
        if f.read_to_string(&mut data).is_ok() {
            for (slot, field) in counters.iter_mut().zip(data.split_whitespace()) {
                if let Ok(n) = field.parse() {
                    *slot = n;
                }
            }
        }
    }
    counters
}

fn write(path: &Path, counters: &[u64]) -> io::Result<()> {
    let line = counters.iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ");
    let mut f = File::create(path)?;
    writeln!(f, "{}", line)
}

/// Bump a single counter.
pub fn update(path: &Path, field: StatsField) {
    let mut counters = read(path);
    counters[field as usize] += 1;
    if let Err(e) = write(path, &counters) {
        debug!("failed to update stats file {:?}: {}", path, e);
    }
}

/// Record a successful insert: one miss, two new files, `bytes` stored.
pub fn update_size(path: &Path, bytes: u64) {
    let mut counters = read(path);
    counters[StatsField::ToCache as usize] += 1;
    counters[StatsField::NumFiles as usize] += 2;
    counters[StatsField::TotalSize as usize] += bytes;
    if let Err(e) = write(path, &counters) {
        debug!("failed to update stats file {:?}: {}", path, e);
    }
}

/// Overwrite a shard's file count and total size after a cleanup pass.
pub fn set_cache_counts(path: &Path, numfiles: u64, totalsize: u64) {
    let mut counters = read(path);
    counters[StatsField::NumFiles as usize] = numfiles;
    counters[StatsField::TotalSize as usize] = totalsize;
    if let Err(e) = write(path, &counters) {
        debug!("failed to update stats file {:?}: {}", path, e);
    }
}

/// All the stats files under a cache root: the root's own plus one per
/// shard. Callers tolerate any of them being absent.
fn stats_files(cache_dir: &Path) -> Vec<PathBuf> {
    let mut files = vec![cache_dir.join("stats")];
    for shard in CACHE_SHARDS.chars() {
        files.push(cache_dir.join(shard.to_string()).join("stats"));
    }
    files
}

fn fmt_size(bytes: u64) -> String {
    match binary_prefix(bytes as f64) {
        Standalone(b) => format!("{} bytes", b),
        Prefixed(prefix, n) => format!("{:.1} {}B", n, prefix),
    }
}

/// Print the summary the `-s` flag shows: counters aggregated over the
/// root and every shard.
pub fn summary(cache_dir: &Path) {
    let mut totals = vec![0u64; NFIELDS];
    for file in stats_files(cache_dir) {
        for (total, value) in totals.iter_mut().zip(read(&file)) {
            *total += value;
        }
    }
    // The limits aren't additive: the root carries the authoritative
    // values, the shards only their per-directory spread.
    let root = read(&cache_dir.join("stats"));
    totals[StatsField::MaxFiles as usize] = root[StatsField::MaxFiles as usize];
    totals[StatsField::MaxSize as usize] = root[StatsField::MaxSize as usize];
    for &(field, label) in DISPLAY {
        let value = totals[field as usize];
        if value == 0 && !field.always_shown() {
            continue;
        }
        if field.is_size() {
            println!("{:<32} {:>12}", label, fmt_size(value));
        } else {
            println!("{:<32} {:>12}", label, value);
        }
    }
}

/// Zero the event counters everywhere, preserving the cache bookkeeping
/// and the configured limits.
pub fn zero(cache_dir: &Path) -> Result<()> {
    for file in stats_files(cache_dir) {
        if !file.exists() {
            continue;
        }
        let mut counters = read(&file);
        for counter in counters.iter_mut().take(NEVENTS) {
            *counter = 0;
        }
        write(&file, &counters)?;
    }
    Ok(())
}

/// Store new limits into the root stats file and every shard's, creating
/// directories as needed. The root keeps the undivided values; each shard
/// gets an even share for cleanup to enforce. `None` leaves a limit
/// unchanged.
pub fn set_limits(cache_dir: &Path, maxfiles: Option<u64>, maxsize: Option<u64>) -> Result<()> {
    fs::create_dir_all(cache_dir)?;
    let root = cache_dir.join("stats");
    let mut counters = read(&root);
    if let Some(maxfiles) = maxfiles {
        counters[StatsField::MaxFiles as usize] = maxfiles;
    }
    if let Some(maxsize) = maxsize {
        counters[StatsField::MaxSize as usize] = maxsize;
    }
    write(&root, &counters)?;

    let nshards = CACHE_SHARDS.len() as u64;
    for shard in CACHE_SHARDS.chars() {
        let dir = cache_dir.join(shard.to_string());
        fs::create_dir_all(&dir)?;
        let file = dir.join("stats");
        let mut counters = read(&file);
        if let Some(maxfiles) = maxfiles {
            counters[StatsField::MaxFiles as usize] = maxfiles / nshards;
        }
        if let Some(maxsize) = maxsize {
            counters[StatsField::MaxSize as usize] = maxsize / nshards;
        }
        write(&file, &counters)?;
    }
    Ok(())
}
