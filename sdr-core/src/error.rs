// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The error type shared by every crate in the workspace.
//!
//! Mirrors the taxonomy used throughout the DSP and protocol-decoder stages: most failures here
//! are not exceptional in the usual sense (a full queue, a dropped buffer) but are still routed
//! through `Result` so callers can't accidentally ignore them.

use std::fmt;

/// The error type returned by fallible operations across the pipeline.
#[derive(Debug)]
pub enum Error {
    /// A caller-supplied argument was out of range or otherwise invalid.
    BadArgs(&'static str),
    /// An allocation could not be satisfied (frame allocator exhausted, etc).
    NoMem,
    /// A slot, queue, or other single-owner resource was already occupied.
    Busy,
    /// Input did not parse or did not pass a structural check.
    Invalid(&'static str),
    /// A resource that was looked up by key or id does not exist.
    NotFound,
    /// A counter, buffer, or index would have exceeded its capacity.
    Overflow,
    /// A blocking operation did not complete within its deadline.
    Timeout,
    /// An error-correcting code could not correct the input within its guaranteed radius.
    Uncorrectable,
    /// The input stream ended.
    EndOfFile,
    /// Wraps an underlying I/O error.
    Io(std::io::Error),
    /// A condition the caller did not expect, carrying a human-readable explanation.
    Other(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadArgs(msg) => write!(f, "bad argument: {}", msg),
            Error::NoMem => write!(f, "allocation failed"),
            Error::Busy => write!(f, "resource busy"),
            Error::Invalid(msg) => write!(f, "invalid input: {}", msg),
            Error::NotFound => write!(f, "not found"),
            Error::Overflow => write!(f, "overflow"),
            Error::Timeout => write!(f, "operation timed out"),
            Error::Uncorrectable => write!(f, "uncorrectable error"),
            Error::EndOfFile => write!(f, "end of file"),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

/// A convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

pub fn bad_args<T>(msg: &'static str) -> Result<T> {
    Err(Error::BadArgs(msg))
}

pub fn invalid<T>(msg: &'static str) -> Result<T> {
    Err(Error::Invalid(msg))
}

pub fn not_found<T>() -> Result<T> {
    Err(Error::NotFound)
}

pub fn overflow<T>() -> Result<T> {
    Err(Error::Overflow)
}

pub fn timeout<T>() -> Result<T> {
    Err(Error::Timeout)
}

pub fn uncorrectable<T>() -> Result<T> {
    Err(Error::Uncorrectable)
}

pub fn end_of_file<T>() -> Result<T> {
    Err(Error::EndOfFile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_contains_taxonomy_name() {
        assert!(Error::BadArgs("x").to_string().contains("bad argument"));
        assert!(Error::Busy.to_string().contains("busy"));
        assert!(Error::Uncorrectable.to_string().contains("uncorrectable"));
        assert!(Error::EndOfFile.to_string().contains("end of file"));
    }

    #[test]
    fn io_error_roundtrips_as_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io_err.into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
