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

mod disk;

pub use self::disk::{CompileResult, DiskCache, CACHE_SHARDS};

/// Result of a cache lookup.
#[derive(Debug, PartialEq)]
pub enum Cache {
    /// Result was found in cache and the output delivered.
    Hit,
    /// Result was not found in cache.
    Miss,
}
