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

use byteorder::{ByteOrder, LittleEndian};
use filetime::{self, FileTime};
use ring::digest;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Read};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::{Command, Stdio};
use time;

use errors::*;

/// Accumulates the inputs to a cache fingerprint.
///
/// The digest is deterministic and fixed-width (64 lowercase hex
/// characters); the first character doubles as the shard key.
pub struct Digest {
    inner: digest::Context,
}

impl Digest {
    pub fn new() -> Digest {
        Digest { inner: digest::Context::new(&digest::SHA256) }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Hash the bytes of an argument string.
    pub fn string<S: AsRef<OsStr>>(&mut self, s: S) {
        self.update(s.as_ref().as_bytes());
    }

    /// Hash an integer with a fixed width and byte order.
    pub fn int(&mut self, n: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, n);
        self.update(&buf);
    }

    /// Hash the entire contents of `path`, streaming.
    pub fn file(&mut self, path: &Path) -> io::Result<()> {
        let mut f = File::open(path)?;
        let mut buf = [0u8; 16384];
        loop {
            let count = f.read(&mut buf)?;
            if count == 0 {
                return Ok(());
            }
            self.update(&buf[..count]);
        }
    }

    pub fn finish(self) -> String {
        hex(self.inner.finish().as_ref())
    }
}

pub fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        s.push_str(&format!("{:02x}", byte));
    }
    s
}

/// Run `argv`, redirecting the child's stdout and stderr to the named
/// files, and return its exit code. A signal death maps to a nonzero code.
pub fn execute(argv: &[OsString], stdout: &Path, stderr: &Path) -> Result<i32> {
    let out = File::create(stdout)?;
    let err = File::create(stderr)?;
    trace!("execute: {:?}", argv);
    let status = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::from(err))
        .status()?;
    Ok(status.code().unwrap_or(-1))
}

/// Stream the contents of `path` to this process's stderr.
pub fn copy_to_stderr(path: &Path) -> io::Result<()> {
    let mut f = File::open(path)?;
    let stderr = io::stderr();
    io::copy(&mut f, &mut stderr.lock())?;
    Ok(())
}

/// utime()-style refresh of a file's timestamps to the current time.
pub fn touch(path: &Path) -> io::Result<()> {
    let now = time::get_time();
    let t = FileTime::from_seconds_since_1970(now.sec as u64, now.nsec as u32);
    filetime::set_file_times(path, t, t)
}
