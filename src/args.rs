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

use stats::StatsField;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// The results of parsing a compiler commandline.
#[derive(Debug, PartialEq)]
pub struct ParsedArguments {
    /// The input source file.
    pub input: PathBuf,
    /// Where the object (or assembly, under `-S`) output should land.
    pub output: PathBuf,
    /// The reconstructed argument vector, compiler path at slot 0, used
    /// both for preprocessing and for the final compile. `-o` is omitted;
    /// the cache re-adds it pointing at a temporary path.
    pub stripped_args: Vec<OsString>,
    /// Whether debug info was requested. Line directives must then stay
    /// in the fingerprint.
    pub found_debug: bool,
}

/// Result of parsing a compiler commandline.
#[derive(Debug, PartialEq)]
pub enum CompilerArguments {
    /// The commandline can be handled.
    Ok(ParsedArguments),
    /// The commandline described by `arguments` is not compilation.
    NotCompilation,
    /// This commandline can not be cached.
    CannotCache(&'static str, StatsField),
}

/// Options that consume the following argument. Both the option and its
/// value are forwarded, but neither feeds the fingerprint; see
/// `hash::hash_arguments`.
pub const ARGS_WITH_VALUE: &'static [&'static str] = &["-I", "-include", "-L", "-D", "-isystem"];

/// Return true if `arg` is a commandline argument that takes a value.
pub fn argument_takes_value(arg: &str) -> bool {
    ARGS_WITH_VALUE.contains(&arg)
}

fn is_regular_file(arg: &OsString) -> bool {
    fs::metadata(Path::new(arg)).map(|m| m.is_file()).unwrap_or(false)
}

/// Derive the output path from the input's file name, replacing the
/// extension with `o` (or `s` under `-S`). The result is relative, landing
/// in the working directory just as the compiler itself would.
fn derive_output_file(input: &Path, assembly: bool) -> Option<PathBuf> {
    match input.extension() {
        Some(e) if !e.is_empty() => {
            input.file_name()
                .map(|f| Path::new(f).with_extension(if assembly { "s" } else { "o" }))
        }
        _ => None,
    }
}

/// Parse `arguments` (the resolved compiler at slot 0), determining
/// whether the invocation can be cached.
///
/// Arguments are processed positionally, never reordered. Anything that
/// doesn't name an existing regular file is assumed to be some compiler
/// option we don't know about and forwarded untouched; this copes with
/// unusual flags at the cost of strictness.
pub fn parse_arguments(arguments: &[OsString]) -> CompilerArguments {
    if arguments.is_empty() {
        return CompilerArguments::NotCompilation;
    }
    let mut output_arg = None;
    let mut input_arg: Option<OsString> = None;
    let mut found_c_opt = false;
    let mut found_s_opt = false;
    let mut found_debug = false;
    let mut stripped_args = vec![arguments[0].clone()];

    let mut it = arguments[1..].iter();
    while let Some(arg) = it.next() {
        if let Some(s) = arg.to_str() {
            let mut handled = true;
            match s {
                // Preprocess-only and dependency-generation modes will
                // never work; their output goes places we don't manage.
                "-E" => return CompilerArguments::CannotCache("-E", StatsField::Preprocessor),
                m if m.starts_with("-M") => {
                    return CompilerArguments::CannotCache("dependency generation",
                                                          StatsField::Preprocessor)
                }
                "-c" => {
                    stripped_args.push(arg.clone());
                    found_c_opt = true;
                }
                // -S changes the default output extension.
                "-S" => {
                    stripped_args.push(arg.clone());
                    found_s_opt = true;
                }
                // Capture where the output was meant to go; not forwarded.
                "-o" => {
                    match it.next() {
                        Some(o) => output_arg = Some(o.clone()),
                        None => {
                            return CompilerArguments::CannotCache("missing argument to -o",
                                                                  StatsField::Args)
                        }
                    }
                }
                // Debugging is handled specially so we know whether line
                // number information can be stripped from the hash.
                g if g.starts_with("-g") => {
                    stripped_args.push(arg.clone());
                    if g != "-g0" {
                        found_debug = true;
                    }
                }
                a if argument_takes_value(a) => {
                    stripped_args.push(arg.clone());
                    match it.next() {
                        Some(v) => stripped_args.push(v.clone()),
                        None => {
                            return CompilerArguments::CannotCache("missing argument",
                                                                  StatsField::Args)
                        }
                    }
                }
                o if o.starts_with("-") && o.len() > 1 => stripped_args.push(arg.clone()),
                _ => handled = false,
            }
            if handled {
                continue;
            }
        }

        if !is_regular_file(arg) {
            // Not a plain file, so assume it's an option.
            stripped_args.push(arg.clone());
            continue;
        }

        if let Some(ref existing) = input_arg {
            trace!("multiple input files ({:?} and {:?})", existing, arg);
            return CompilerArguments::CannotCache("multiple input files", StatsField::Link);
        }
        input_arg = Some(arg.clone());
        stripped_args.push(arg.clone());
    }

    let input = match input_arg {
        Some(i) => PathBuf::from(i),
        None => {
            trace!("no input file found");
            return CompilerArguments::CannotCache("no input file", StatsField::Args);
        }
    };

    // We only support compilation.
    if !found_c_opt {
        trace!("no -c option found for {:?}", input);
        return CompilerArguments::NotCompilation;
    }

    let output = match output_arg {
        Some(o) => PathBuf::from(o),
        None => {
            match derive_output_file(&input, found_s_opt) {
                Some(o) => o,
                None => {
                    trace!("badly formed output file for {:?}", input);
                    return CompilerArguments::CannotCache("badly formed output file",
                                                          StatsField::Args);
                }
            }
        }
    };

    CompilerArguments::Ok(ParsedArguments {
        input: input,
        output: output,
        stripped_args: stripped_args,
        found_debug: found_debug,
    })
}
