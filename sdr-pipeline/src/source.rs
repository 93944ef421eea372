// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sample sources feeding the acquisition thread.
//!
//! [`SampleSource`] abstracts over wherever the raw samples come from; a real device driver sits
//! behind the same trait as [`FileReplaySource`], which plays back a previously captured dump
//! (the role `sdrTestMode`/`iqDumpFile` plays for the acquisition stage). A source always hands
//! back interleaved bytes at whatever sample width its `SampleKind` implies; widening `Cs8` to
//! `Cs16` happens one layer up, in the acquisition loop.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sdr_core::buffer::SampleKind;
use sdr_core::error::{Error, Result};

/// A source of raw, interleaved samples at a fixed [`SampleKind`].
pub trait SampleSource: Send {
    /// The wire format of the samples this source produces.
    fn kind(&self) -> SampleKind;

    /// Fill `buf` with raw sample bytes, returning the number of bytes actually written.
    /// A short (but nonzero) read is not an error; `Ok(0)` means the source is exhausted.
    fn read_samples(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Replays raw interleaved samples from a file, looping back to the start once `loop_playback`
/// is set. Stands in for any real device driver in test mode (`sdrTestMode`/`iqDumpFile`).
pub struct FileReplaySource {
    file: File,
    kind: SampleKind,
    loop_playback: bool,
}

impl FileReplaySource {
    pub fn open<P: AsRef<Path>>(path: P, kind: SampleKind, loop_playback: bool) -> Result<FileReplaySource> {
        let file = File::open(path)?;
        Ok(FileReplaySource { file, kind, loop_playback })
    }
}

impl SampleSource for FileReplaySource {
    fn kind(&self) -> SampleKind {
        self.kind
    }

    fn read_samples(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.file.read(&mut buf[total..])?;
            if n == 0 {
                if !self.loop_playback || total > 0 {
                    break;
                }
                self.file.seek(SeekFrom::Start(0))?;
                continue;
            }
            total += n;
        }
        if total == 0 {
            return Err(Error::EndOfFile);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn replays_raw_bytes_verbatim() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut src = FileReplaySource::open(tmp.path(), SampleKind::Cs16, false).unwrap();
        let mut buf = [0u8; 8];
        let n = src.read_samples(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn exhausted_nonlooping_source_reports_end_of_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[9, 9]).unwrap();
        let mut src = FileReplaySource::open(tmp.path(), SampleKind::S16, false).unwrap();
        let mut buf = [0u8; 2];
        assert_eq!(src.read_samples(&mut buf).unwrap(), 2);
        assert!(matches!(src.read_samples(&mut buf), Err(Error::EndOfFile)));
    }

    #[test]
    fn looping_source_wraps_back_to_the_start() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1, 2, 3]).unwrap();
        let mut src = FileReplaySource::open(tmp.path(), SampleKind::Cs8, true).unwrap();
        let mut buf = [0u8; 6];
        let n = src.read_samples(&mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(buf, [1, 2, 3, 1, 2, 3]);
    }
}
