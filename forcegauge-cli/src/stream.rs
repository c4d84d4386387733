//! Reader for the firmware's sample stream (`123,124,-5,...`).
//!
//! Read straight from the debug HID node, every 32-byte report is zero-padded
//! after the last character, so NUL bytes are treated like whitespace.

use std::fmt;
use std::io::{self, BufRead};

use thiserror::Error;

use forcegauge_core::SAMPLE_SEPARATOR;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("reading sample stream")]
    Io(#[from] io::Error),
    #[error("invalid sample {token:?} at byte {offset}")]
    InvalidSample { token: String, offset: u64 },
}

/// Iterates over the samples in a comma-separated stream.
///
/// Whitespace and NUL padding around a value and empty fields are ignored. A final value with
/// no trailing separator is treated as cut off mid-transmission and dropped.
pub struct SampleStream<R> {
    reader: R,
    buf: Vec<u8>,
    offset: u64,
}

impl<R: BufRead> SampleStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(8),
            offset: 0,
        }
    }
}

impl<R: BufRead> Iterator for SampleStream<R> {
    type Item = Result<i16, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        let separator = SAMPLE_SEPARATOR.as_bytes()[0];

        loop {
            self.buf.clear();
            let start = self.offset;
            let read = match self.reader.read_until(separator, &mut self.buf) {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e.into())),
            };
            self.offset += read as u64;

            let Some((&last, field)) = self.buf.split_last() else {
                return None;
            };
            if last != separator {
                tracing::debug!(bytes = field.len() + 1, "dropping unterminated trailing sample");
                return None;
            }

            let text = String::from_utf8_lossy(field);
            let token = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            if token.is_empty() {
                continue;
            }

            return Some(token.parse::<i16>().map_err(|_| StreamError::InvalidSample {
                token: token.to_string(),
                offset: start,
            }));
        }
    }
}

/// Running statistics over the samples seen so far.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Summary {
    pub count: u64,
    pub min: Option<i16>,
    pub max: Option<i16>,
    sum: i64,
}

impl Summary {
    pub fn record(&mut self, sample: i16) {
        self.count += 1;
        self.sum += i64::from(sample);
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max, self.mean()) {
            (Some(min), Some(max), Some(mean)) => write!(
                f,
                "{} samples, min {}, max {}, mean {:.2}",
                self.count, min, max, mean
            ),
            _ => write!(f, "no samples"),
        }
    }
}
