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

use regex::Regex;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;

lazy_static! {
    static ref SIZE_RE: Regex = Regex::new(r"^(\d+)([KMGT])$").unwrap();
}

pub fn default_cache_dir() -> PathBuf {
    env::home_dir()
        .map(|d| d.join(".ccache"))
        // Fall back to something, even if it's not very good.
        .unwrap_or_else(|| env::temp_dir().join("ccache"))
}

/// Parse a size string with a `K`, `M`, `G` or `T` suffix into bytes.
pub fn parse_size(val: &str) -> Option<u64> {
    SIZE_RE.captures(val)
        .and_then(|caps| {
            caps.get(1)
                .and_then(|size| u64::from_str(size.as_str()).ok())
                .and_then(|size| Some((size, caps.get(2))))
        })
        .and_then(|(size, suffix)| {
            match suffix.map(|s| s.as_str()) {
                Some("K") => Some(1024 * size),
                Some("M") => Some(1024 * 1024 * size),
                Some("G") => Some(1024 * 1024 * 1024 * size),
                Some("T") => Some(1024 * 1024 * 1024 * 1024 * size),
                _ => None,
            }
        })
}

/// Everything read from the environment, captured once at startup and
/// passed down explicitly.
#[derive(Debug)]
pub struct Config {
    /// The cache root, from `CCACHE_DIR`.
    pub cache_dir: PathBuf,
    /// Colon-separated search path for the real compiler, from
    /// `CCACHE_PATH` with `PATH` as the fallback.
    pub compiler_path: Option<OsString>,
    /// Log sink, from `CCACHE_LOGFILE`.
    pub log_file: Option<PathBuf>,
    /// `CCACHE_DISABLE` with any value skips the cache entirely.
    pub disabled: bool,
}

impl Config {
    pub fn from_env() -> Config {
        Config {
            cache_dir: env::var_os("CCACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_cache_dir),
            compiler_path: env::var_os("CCACHE_PATH").or_else(|| env::var_os("PATH")),
            log_file: env::var_os("CCACHE_LOGFILE").map(PathBuf::from),
            disabled: env::var_os("CCACHE_DISABLE").is_some(),
        }
    }
}

#[test]
fn test_parse_size() {
    assert_eq!(None, parse_size(""));
    assert_eq!(None, parse_size("100"));
    assert_eq!(None, parse_size("1X"));
    assert_eq!(Some(2048), parse_size("2K"));
    assert_eq!(Some(10 * 1024 * 1024), parse_size("10M"));
    assert_eq!(Some(10 * 1024 * 1024 * 1024), parse_size("10G"));
    assert_eq!(Some(1024 * 1024 * 1024 * 1024), parse_size("1T"));
}
