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

//! Cache eviction. Runs independently of the per-compile flow: entries may
//! vanish under a concurrent lookup at any time, and lookups are written
//! to tolerate that.

use cache::CACHE_SHARDS;
use filetime::FileTime;
use stats::{self, StatsField};
use std::fs;
use std::path::Path;
use time;

use errors::*;

/// Fraction of the configured limits that survives a cleanup pass, so
/// each pass buys some headroom before the next one is needed.
const LIMIT_MULTIPLE: f64 = 0.8;

/// Leaked `tmp.*` files (from killed invocations) older than this many
/// seconds are swept.
const TMP_MAX_AGE: u64 = 3600;

/// Reduce one shard directory to within `maxfiles`/`maxsize`, deleting
/// the least recently used entries first. A limit of 0 means unlimited.
pub fn cleanup_dir(dir: &Path, maxfiles: u64, maxsize: u64) -> Result<()> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.file_name().map(|n| n == "stats").unwrap_or(false) {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        if !meta.is_file() {
            continue;
        }
        let mtime = FileTime::from_last_modification_time(&meta);
        files.push((path, meta.len(), (mtime.seconds_relative_to_1970(), mtime.nanoseconds())));
    }
    files.sort_by_key(|&(_, _, mtime)| mtime);

    let mut numfiles = files.len() as u64;
    let mut totalsize: u64 = files.iter().map(|&(_, size, _)| size).sum();
    let keep_files = if maxfiles == 0 {
        ::std::u64::MAX
    } else {
        (maxfiles as f64 * LIMIT_MULTIPLE) as u64
    };
    let keep_size = if maxsize == 0 {
        ::std::u64::MAX
    } else {
        (maxsize as f64 * LIMIT_MULTIPLE) as u64
    };

    for (path, size, _) in files {
        if numfiles <= keep_files && totalsize <= keep_size {
            break;
        }
        trace!("evicting {:?}", path);
        if fs::remove_file(&path).is_ok() {
            numfiles -= 1;
            totalsize -= size;
        }
    }

    stats::set_cache_counts(&dir.join("stats"), numfiles, totalsize);
    Ok(())
}

/// Clean every shard to within its recorded limits, then sweep stale
/// temporary files out of the cache root.
pub fn cleanup_all(cache_dir: &Path) -> Result<()> {
    if !cache_dir.is_dir() {
        return Ok(());
    }
    for shard in CACHE_SHARDS.chars() {
        let dir = cache_dir.join(shard.to_string());
        if !dir.is_dir() {
            continue;
        }
        let counters = stats::read(&dir.join("stats"));
        cleanup_dir(&dir,
                    counters[StatsField::MaxFiles as usize],
                    counters[StatsField::MaxSize as usize])?;
    }

    let now = time::get_time().sec as u64;
    for entry in fs::read_dir(cache_dir)? {
        let entry = entry?;
        let path = entry.path();
        let stale = path.file_name()
            .map(|n| n.to_string_lossy().starts_with("tmp."))
            .unwrap_or(false);
        if !stale {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let mtime = FileTime::from_last_modification_time(&meta).seconds_relative_to_1970();
        if now.saturating_sub(mtime) > TMP_MAX_AGE {
            trace!("sweeping stale temp file {:?}", path);
            let _ = fs::remove_file(&path);
        }
    }
    Ok(())
}
