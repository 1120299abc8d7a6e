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

//! Content-addressed on-disk storage. An entry is a pair of files named
//! by the fingerprint, sharded one level deep by its first character:
//! the artifact at `<root>/<s0>/<s1...>` and the compiler's stderr next
//! to it with a `.stderr` suffix.
//!
//! The cache directory is shared between concurrent invocations with no
//! lock. Temp files are pid-scoped, inserts become visible atomically via
//! rename, and lookups tolerate entries vanishing at any step (a parallel
//! cleanup may evict at will). A crash between an insert's two renames
//! can leave an artifact without its stderr; lookups treat any such
//! orphan as a miss and remove what's left.

use cache::Cache;
use stats::{self, StatsField};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use util;

use errors::*;

/// Shard directory names under the cache root; the first character of a
/// fingerprint selects one.
pub const CACHE_SHARDS: &'static str = "0123456789abcdef";

/// Outcome of `DiskCache::insert`.
#[derive(Debug, PartialEq)]
pub enum CompileResult {
    /// The compiler succeeded and the result is now in the cache.
    Stored,
    /// The compiler failed. Its stderr has been replayed and its partial
    /// output (if any) delivered; the status should become our exit code.
    CompileFailed(i32),
}

/// One process's view of the shared cache directory.
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new<P: AsRef<Path>>(root: P) -> DiskCache {
        DiskCache { root: root.as_ref().to_path_buf() }
    }

    pub fn object_path(&self, digest: &str) -> PathBuf {
        self.root.join(&digest[..1]).join(&digest[1..])
    }

    pub fn stderr_path(&self, digest: &str) -> PathBuf {
        self.root.join(&digest[..1]).join(format!("{}.stderr", &digest[1..]))
    }

    /// The stats file of the shard holding `digest`.
    pub fn stats_path(&self, digest: &str) -> PathBuf {
        self.root.join(&digest[..1]).join("stats")
    }

    pub fn ensure_shard(&self, digest: &str) -> Result<()> {
        Ok(fs::create_dir_all(self.root.join(&digest[..1]))?)
    }

    /// Pid-scoped temp name, so concurrent invocations never collide.
    pub fn tmp_path(&self, kind: &str) -> PathBuf {
        self.root.join(format!("tmp.{}.{}", kind, process::id()))
    }

    /// The temp artifact keeps an `.o` suffix; some compilers infer the
    /// output format from the extension.
    fn tmp_object_path(&self) -> PathBuf {
        self.root.join(format!("tmp.hash.{}.o", process::id()))
    }

    fn remove_tmp(&self, paths: &[&Path]) {
        for p in paths {
            let _ = fs::remove_file(p);
        }
    }

    /// Try to deliver `output_file` from the entry keyed by `digest`,
    /// replaying the stored stderr on success.
    ///
    /// The `.stderr` file is probed first: an insert renames it last, so
    /// its presence implies the entry was completely written at some
    /// point. The artifact may still vanish concurrently; that's a miss,
    /// never an error.
    pub fn lookup(&self, digest: &str, output_file: &Path, stats_file: &Path) -> Result<Cache> {
        let object = self.object_path(digest);
        let stored_stderr = self.stderr_path(digest);

        let mut stderr_file = match File::open(&stored_stderr) {
            Ok(f) => f,
            // It isn't in cache.
            Err(_) => return Ok(Cache::Miss),
        };

        // Make sure the object is there too; remove the orphan otherwise.
        if fs::metadata(&object).is_err() {
            let _ = fs::remove_file(&stored_stderr);
            return Ok(Cache::Miss);
        }

        // Freshen the entry so cleanup sees it as recently used.
        let _ = util::touch(&stored_stderr);

        let _ = fs::remove_file(output_file);
        match fs::hard_link(&object, output_file) {
            Ok(()) => {}
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                // The object was evicted between the stat and the link.
                debug!("cache object vanished for {:?}", output_file);
                stats::update(stats_file, StatsField::Missing);
                let _ = fs::remove_file(&stored_stderr);
                return Ok(Cache::Miss);
            }
            Err(e) => {
                // Links can fail legitimately (EXDEV, EMLINK); fall back
                // to a full copy. If that fails too, give up.
                debug!("hard link failed ({}), copying", e);
                fs::copy(&object, output_file)
                    .chain_err(|| format!("failed to copy {:?} -> {:?}", object, output_file))?;
            }
        }

        // Update the mtime on the output so make doesn't get confused.
        let _ = util::touch(output_file);

        // Send the stored stderr.
        io::copy(&mut stderr_file, &mut io::stderr().lock())?;

        Ok(Cache::Hit)
    }

    /// Run the real compiler and store the result under `digest`.
    ///
    /// The compiler writes to a pid-scoped temp artifact which is renamed
    /// into place only after every invariant holds: no stdout, exit 0,
    /// both temp files present. On a compile error the partial output is
    /// delivered as the compiler would have left it.
    pub fn insert(&self,
                  stripped_args: &[OsString],
                  output_file: &Path,
                  digest: &str,
                  stats_file: &Path)
                  -> Result<CompileResult> {
        let tmp_stdout = self.tmp_path("stdout");
        let tmp_stderr = self.tmp_path("stderr");
        let tmp_object = self.tmp_object_path();

        let mut compile_args = stripped_args.to_vec();
        compile_args.push(OsString::from("-o"));
        compile_args.push(tmp_object.clone().into_os_string());
        let status = match util::execute(&compile_args, &tmp_stdout, &tmp_stderr) {
            Ok(status) => status,
            Err(e) => {
                self.remove_tmp(&[&tmp_stdout, &tmp_stderr, &tmp_object]);
                return Err(e);
            }
        };

        // A compile with -c shouldn't write to stdout; caching it would
        // mean swallowing that output on every later hit.
        let wrote_stdout = fs::metadata(&tmp_stdout).map(|m| m.len() != 0).unwrap_or(true);
        if wrote_stdout {
            debug!("compiler produced stdout for {:?}", output_file);
            self.remove_tmp(&[&tmp_stdout, &tmp_stderr, &tmp_object]);
            bail!(ErrorKind::CannotCache("compiler produced stdout", StatsField::Stdout));
        }
        let _ = fs::remove_file(&tmp_stdout);

        if status != 0 {
            debug!("compile of {:?} gave status = {}", output_file, status);
            stats::update(stats_file, StatsField::Status);

            // Deliver whatever partial result exists so the user sees the
            // same failure state they'd have gotten without the cache.
            // ENOENT just means the compiler produced no output at all.
            let delivered = match fs::rename(&tmp_object, output_file) {
                Ok(()) => true,
                Err(ref e) if e.kind() == io::ErrorKind::NotFound => true,
                Err(_) => false,
            };
            if delivered && util::copy_to_stderr(&tmp_stderr).is_ok() {
                let _ = fs::remove_file(&tmp_stderr);
                return Ok(CompileResult::CompileFailed(status));
            }
            self.remove_tmp(&[&tmp_stderr, &tmp_object]);
            bail!(ErrorKind::CannotCache("failed to deliver compile failure",
                                         StatsField::Error));
        }

        let object = self.object_path(digest);
        let stored_stderr = self.stderr_path(digest);

        let sizes = fs::metadata(&tmp_stderr).and_then(|st1| {
            fs::metadata(&tmp_object).map(|st2| st1.len() + st2.len())
        });
        let stored = match sizes {
            Ok(bytes) => {
                fs::rename(&tmp_object, &object)
                    .and_then(|_| fs::rename(&tmp_stderr, &stored_stderr))
                    .map(|_| bytes)
            }
            Err(e) => Err(e),
        };
        match stored {
            Ok(bytes) => {
                debug!("placed {:?} into cache", output_file);
                stats::update_size(stats_file, bytes);
                Ok(CompileResult::Stored)
            }
            Err(e) => {
                debug!("failed to rename tmp files: {}", e);
                self.remove_tmp(&[&tmp_stderr, &tmp_object]);
                bail!(ErrorKind::CannotCache("failed to rename tmp files", StatsField::Error))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cache::Cache;
    use std::io::{Read, Write};
    use tempdir::TempDir;
    use test::utils::*;

    const DIGEST: &'static str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn setup() -> (TempDir, DiskCache) {
        let td = TempDir::new("ccache_disk_test").unwrap();
        let cache = DiskCache::new(td.path());
        cache.ensure_shard(DIGEST).unwrap();
        (td, cache)
    }

    /// An argv whose trailing `-o <path>` lands in `$1 $2` of the script.
    fn sh_args(script: &str) -> Vec<::std::ffi::OsString> {
        ovec!["/bin/sh", "-c", script, "cc"]
    }

    fn read_file(path: &::std::path::Path) -> String {
        let mut s = String::new();
        ::std::fs::File::open(path).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn test_entry_paths() {
        let cache = DiskCache::new("/cache");
        assert_eq!(PathBuf::from(format!("/cache/0/{}", &DIGEST[1..])),
                   cache.object_path(DIGEST));
        assert_eq!(PathBuf::from(format!("/cache/0/{}.stderr", &DIGEST[1..])),
                   cache.stderr_path(DIGEST));
        assert_eq!(PathBuf::from("/cache/0/stats"), cache.stats_path(DIGEST));
    }

    #[test]
    fn test_lookup_empty_cache() {
        let (td, cache) = setup();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);
        assert_eq!(Cache::Miss,
                   cache.lookup(DIGEST, &output, &stats_file).unwrap());
        assert!(!output.exists());
    }

    #[test]
    fn test_lookup_removes_orphan_stderr() {
        let (td, cache) = setup();
        let stored_stderr = cache.stderr_path(DIGEST);
        File::create(&stored_stderr).unwrap().write_all(b"orphan").unwrap();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);
        assert_eq!(Cache::Miss,
                   cache.lookup(DIGEST, &output, &stats_file).unwrap());
        assert!(!stored_stderr.exists());
    }

    #[test]
    fn test_insert_then_lookup() {
        let (td, cache) = setup();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);

        let args = sh_args("printf built > \"$2\"; echo oops >&2");
        assert_eq!(CompileResult::Stored,
                   cache.insert(&args, &output, DIGEST, &stats_file).unwrap());
        // The insert populates the cache but doesn't touch the output.
        assert!(cache.object_path(DIGEST).exists());
        assert_eq!("oops\n", read_file(&cache.stderr_path(DIGEST)));
        assert!(!output.exists());
        assert_eq!(0, tmp_file_count(td.path()));

        let counters = ::stats::read(&stats_file);
        assert_eq!(1, counters[StatsField::ToCache as usize]);
        assert_eq!(2, counters[StatsField::NumFiles as usize]);

        assert_eq!(Cache::Hit,
                   cache.lookup(DIGEST, &output, &stats_file).unwrap());
        assert_eq!("built", read_file(&output));
        assert_eq!(0, tmp_file_count(td.path()));
    }

    #[test]
    fn test_lookup_replaces_existing_output() {
        let (td, cache) = setup();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);
        let args = sh_args("printf fresh > \"$2\"");
        cache.insert(&args, &output, DIGEST, &stats_file).unwrap();

        File::create(&output).unwrap().write_all(b"stale").unwrap();
        assert_eq!(Cache::Hit,
                   cache.lookup(DIGEST, &output, &stats_file).unwrap());
        assert_eq!("fresh", read_file(&output));
    }

    #[test]
    fn test_insert_compile_failure_delivers_stderr() {
        let (td, cache) = setup();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);

        let args = sh_args("echo 'syntax error' >&2; exit 2");
        assert_eq!(CompileResult::CompileFailed(2),
                   cache.insert(&args, &output, DIGEST, &stats_file).unwrap());
        // Nothing cached, nothing delivered (the compiler wrote no output),
        // no temps left behind.
        assert!(!cache.object_path(DIGEST).exists());
        assert!(!cache.stderr_path(DIGEST).exists());
        assert!(!output.exists());
        assert_eq!(0, tmp_file_count(td.path()));

        let counters = ::stats::read(&stats_file);
        assert_eq!(1, counters[StatsField::Status as usize]);
        assert_eq!(0, counters[StatsField::ToCache as usize]);
    }

    #[test]
    fn test_insert_compile_failure_delivers_partial_output() {
        let (td, cache) = setup();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);

        // The compiler wrote a partial object before failing; the user
        // should see the same file a direct invocation would have left.
        let args = sh_args("printf partial > \"$2\"; exit 1");
        assert_eq!(CompileResult::CompileFailed(1),
                   cache.insert(&args, &output, DIGEST, &stats_file).unwrap());
        assert_eq!("partial", read_file(&output));
        assert!(!cache.object_path(DIGEST).exists());
        assert_eq!(0, tmp_file_count(td.path()));
    }

    #[test]
    fn test_insert_stdout_uncacheable() {
        let (td, cache) = setup();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);

        let args = sh_args("echo chatty; printf built > \"$2\"");
        let err = cache.insert(&args, &output, DIGEST, &stats_file).unwrap_err();
        match *err.kind() {
            ErrorKind::CannotCache(_, StatsField::Stdout) => {}
            ref e @ _ => panic!("Got unexpected error: {:?}", e),
        }
        assert!(!cache.object_path(DIGEST).exists());
        assert_eq!(0, tmp_file_count(td.path()));
    }

    #[test]
    fn test_lookup_after_insert_touches_output_mtime() {
        use filetime::FileTime;
        let (td, cache) = setup();
        let output = td.path().join("out.o");
        let stats_file = cache.stats_path(DIGEST);
        let args = sh_args("printf built > \"$2\"");
        cache.insert(&args, &output, DIGEST, &stats_file).unwrap();

        // Backdate the cached object; delivery must still yield a fresh
        // mtime or make would consider the output stale.
        let old = FileTime::from_seconds_since_1970(1000, 0);
        ::filetime::set_file_times(&cache.object_path(DIGEST), old, old).unwrap();
        cache.lookup(DIGEST, &output, &stats_file).unwrap();
        let meta = output.metadata().unwrap();
        assert!(FileTime::from_last_modification_time(&meta).seconds_relative_to_1970() > 1000);
    }
}
