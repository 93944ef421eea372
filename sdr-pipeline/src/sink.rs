// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Output sinks: a line-delimited JSON writer for decoded protocol messages, and a raw PCM writer
//! for channels with no protocol decoder configured.
//!
//! Both sinks treat a disconnected reader (`BrokenPipe`/`EPIPE`) as a transient condition: the
//! write is dropped, a counter is bumped, and the worker keeps running so it can resume once a
//! reader reconnects. Any other I/O error is fatal to the channel.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use sdr_core::error::{Error, Result};

/// Escapes a message body for embedding in a JSON string value.
///
/// Mirrors the sink contract: `"`, `\`, and newline get the usual JSON escapes; `0x03`, `0x04`,
/// and `0x17` (ETX/EOT/ETB, the pager end-of-message/control bytes that show up embedded in
/// alphanumeric text) collapse to a plain space; backspace and form-feed are spelled out as
/// `<BKSP>`/`<FF>` rather than escaped, so they're visible in a terminal pager; every other
/// non-printable byte becomes a `\u00XX` escape.
pub fn escape_json_message(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            0x03 | 0x04 | 0x17 => out.push(' '),
            0x08 => out.push_str("<BKSP>"),
            0x0c => out.push_str("<FF>"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\u{:04x}", b)),
        }
    }
    out
}

/// A sink that is tolerant of a reader going away: writes are counted as dropped rather than
/// propagated as a fatal error when the underlying writer reports `BrokenPipe`.
pub struct ResilientWriter<W> {
    inner: W,
    dropped: AtomicU64,
    was_broken: std::sync::atomic::AtomicBool,
}

impl<W: Write> ResilientWriter<W> {
    pub fn new(inner: W) -> ResilientWriter<W> {
        ResilientWriter { inner, dropped: AtomicU64::new(0), was_broken: std::sync::atomic::AtomicBool::new(false) }
    }

    /// Number of writes dropped so far because the reader was gone.
    pub fn nr_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Consumes the sink, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Writes `buf`, treating `BrokenPipe` as a transient, counted drop rather than a fatal error.
    pub fn write_resilient(&mut self, buf: &[u8]) -> Result<()> {
        match self.inner.write_all(buf) {
            Ok(()) => {
                if self.was_broken.swap(false, Ordering::Relaxed) {
                    log::info!("sink: reader reconnected, resuming delivery");
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if !self.was_broken.swap(true, Ordering::Relaxed) {
                    log::warn!("sink: reader gone, dropping writes until it reconnects");
                }
                Ok(())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// A line-delimited JSON sink: each call to [`JsonLineSink::write_line`] writes one already
/// JSON-encoded object, newline-terminated.
pub struct JsonLineSink<W> {
    writer: ResilientWriter<W>,
}

impl<W: Write> JsonLineSink<W> {
    pub fn new(inner: W) -> JsonLineSink<W> {
        JsonLineSink { writer: ResilientWriter::new(inner) }
    }

    pub fn write_value(&mut self, value: &serde_json::Value) -> Result<()> {
        let mut line = serde_json::to_string(value).map_err(|_| Error::Invalid("message did not serialize to JSON"))?;
        line.push('\n');
        self.writer.write_resilient(line.as_bytes())
    }

    pub fn nr_dropped(&self) -> u64 {
        self.writer.nr_dropped()
    }

    /// Consumes the sink, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// A raw PCM sink for channels with no protocol decoder: writes demodulated samples verbatim.
pub struct PcmSink<W> {
    writer: ResilientWriter<W>,
}

impl<W: Write> PcmSink<W> {
    pub fn new(inner: W) -> PcmSink<W> {
        PcmSink { writer: ResilientWriter::new(inner) }
    }

    pub fn write_samples(&mut self, samples: &[i16]) -> Result<()> {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.writer.write_resilient(&bytes)
    }

    pub fn nr_dropped(&self) -> u64 {
        self.writer.nr_dropped()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    #[test]
    fn escapes_quote_backslash_and_newline() {
        let escaped = escape_json_message("a\"b\\c\nd");
        assert_eq!(escaped, "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn control_bytes_collapse_to_space() {
        let s = String::from_utf8(vec![b'a', 0x03, b'b', 0x04, b'c', 0x17, b'd']).unwrap();
        assert_eq!(escape_json_message(&s), "a b c d");
    }

    #[test]
    fn backspace_and_form_feed_are_spelled_out() {
        let s = String::from_utf8(vec![b'x', 0x08, b'y', 0x0c, b'z']).unwrap();
        assert_eq!(escape_json_message(&s), "x<BKSP>y<FF>z");
    }

    #[test]
    fn other_nonprintable_bytes_become_unicode_escapes() {
        let s = String::from_utf8(vec![0x01]).unwrap();
        assert_eq!(escape_json_message(&s), "\\u0001");
    }

    struct FlakyWriter {
        fail_next: bool,
        written: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail_next {
                return Err(io::Error::new(ErrorKind::BrokenPipe, "reader gone"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn broken_pipe_is_counted_not_fatal() {
        let mut sink = PcmSink::new(FlakyWriter { fail_next: true, written: Vec::new() });
        sink.write_samples(&[1, 2, 3]).unwrap();
        assert_eq!(sink.nr_dropped(), 1);
    }

    #[test]
    fn json_line_sink_terminates_each_object_with_a_newline() {
        let mut sink = JsonLineSink::new(FlakyWriter { fail_next: false, written: Vec::new() });
        sink.write_value(&serde_json::json!({"proto": "pocsag"})).unwrap();
        assert_eq!(sink.writer.inner.written, b"{\"proto\":\"pocsag\"}\n");
    }
}
