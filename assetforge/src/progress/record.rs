//! The progress record and its stable text encoding.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for progress operations.
pub type ProgressResult<T> = Result<T, ProgressError>;

/// Errors raised by progress records and the store.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Writing would move `position` past the known `length`.
    #[error("{name}: writing {chunk} bytes at {position} overruns length {length}")]
    Overrun {
        name: String,
        position: u64,
        chunk: u64,
        length: u64,
    },

    /// Encoded record could not be parsed.
    #[error("malformed progress record: {0}")]
    Malformed(String),

    /// Failed to persist a record.
    #[error("failed to write progress record {path}: {source}")]
    WriteFailed { path: PathBuf, source: io::Error },
}

/// Resumable state of one downloadable item.
///
/// Invariants:
/// - `position <= length` whenever `length > 0`
/// - `done` implies `position == length`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressRecord {
    /// Item name; also the record's file name.
    pub name: String,
    /// Bytes written to the sink so far.
    pub position: u64,
    /// Expected total size, 0 while unknown.
    pub length: u64,
    /// Transfer finished.
    pub done: bool,
    /// Archive contents extracted.
    pub unpacked: bool,
}

impl ProgressRecord {
    /// A zeroed record for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Account for `chunk` more bytes written.
    pub fn advance(&mut self, chunk: u64) -> ProgressResult<()> {
        let next = self.position + chunk;
        if self.length > 0 && next > self.length {
            return Err(ProgressError::Overrun {
                name: self.name.clone(),
                position: self.position,
                chunk,
                length: self.length,
            });
        }
        self.position = next;
        Ok(())
    }

    /// Whether the expected length has been reached.
    pub fn is_transfer_complete(&self) -> bool {
        self.length > 0 && self.position == self.length
    }

    /// Mark the transfer finished.
    ///
    /// An unknown length is fixed to the final position.
    pub fn finish(&mut self) {
        if self.length == 0 {
            self.length = self.position;
        }
        self.done = self.position == self.length;
    }

    /// Forget transfer progress, e.g. when the server ignored a range request.
    pub fn restart(&mut self) {
        self.position = 0;
        self.done = false;
        self.unpacked = false;
    }

    /// Check the record invariants.
    pub fn is_consistent(&self) -> bool {
        let bounded = self.length == 0 || self.position <= self.length;
        let done_ok = !self.done || self.position == self.length;
        let unpacked_ok = !self.unpacked || self.done;
        bounded && done_ok && unpacked_ok
    }

    /// Encode as `unpacked|done|position|length`.
    ///
    /// This format is shared with records written by earlier releases and
    /// must not change.
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            flag(self.unpacked),
            flag(self.done),
            self.position,
            self.length
        )
    }

    /// Decode a record previously produced by [`encode`](Self::encode).
    pub fn decode(name: impl Into<String>, raw: &str) -> ProgressResult<Self> {
        let tokens: Vec<&str> = raw.trim_end().split('|').collect();
        if tokens.len() != 4 {
            return Err(ProgressError::Malformed(format!(
                "expected 4 fields, got {}",
                tokens.len()
            )));
        }

        let record = Self {
            name: name.into(),
            unpacked: parse_flag(tokens[0])?,
            done: parse_flag(tokens[1])?,
            position: parse_u64(tokens[2])?,
            length: parse_u64(tokens[3])?,
        };

        if !record.is_consistent() {
            return Err(ProgressError::Malformed(format!(
                "inconsistent fields: {}",
                raw.trim_end()
            )));
        }
        Ok(record)
    }
}

fn flag(value: bool) -> u8 {
    u8::from(value)
}

fn parse_flag(token: &str) -> ProgressResult<bool> {
    match token {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(ProgressError::Malformed(format!("bad flag '{}'", other))),
    }
}

fn parse_u64(token: &str) -> ProgressResult<u64> {
    token
        .parse::<u64>()
        .map_err(|e| ProgressError::Malformed(format!("bad number '{}': {}", token, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_format_is_stable() {
        let record = ProgressRecord {
            name: "lpack_ui".to_string(),
            position: 512,
            length: 1024,
            done: false,
            unpacked: false,
        };
        assert_eq!(record.encode(), "0|0|512|1024");

        let done = ProgressRecord {
            position: 1024,
            done: true,
            unpacked: true,
            ..record
        };
        assert_eq!(done.encode(), "1|1|1024|1024");
    }

    #[test]
    fn test_decode_previous_run() {
        let record = ProgressRecord::decode("x", "0|1|50|50").unwrap();
        assert!(record.done);
        assert!(!record.unpacked);
        assert_eq!(record.position, 50);
        assert_eq!(record.length, 50);
        assert_eq!(record.name, "x");
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(ProgressRecord::decode("x", "0|1|5").is_err());
        assert!(ProgressRecord::decode("x", "").is_err());
        assert!(ProgressRecord::decode("x", "0|0|12a|100").is_err());
        assert!(ProgressRecord::decode("x", "2|0|1|1").is_err());
    }

    #[test]
    fn test_decode_rejects_inconsistent() {
        // position past length
        assert!(ProgressRecord::decode("x", "0|0|200|100").is_err());
        // done but short
        assert!(ProgressRecord::decode("x", "0|1|10|100").is_err());
        // unpacked without done
        assert!(ProgressRecord::decode("x", "1|0|10|100").is_err());
    }

    #[test]
    fn test_advance_rejects_overrun() {
        let mut record = ProgressRecord::new("x");
        record.length = 10;
        record.advance(6).unwrap();
        let err = record.advance(6).unwrap_err();
        assert!(matches!(err, ProgressError::Overrun { .. }));
        assert_eq!(record.position, 6);
    }

    #[test]
    fn test_advance_unknown_length() {
        let mut record = ProgressRecord::new("x");
        record.advance(1_000_000).unwrap();
        assert_eq!(record.position, 1_000_000);
    }

    #[test]
    fn test_finish_fixes_unknown_length() {
        let mut record = ProgressRecord::new("x");
        record.advance(42).unwrap();
        record.finish();
        assert!(record.done);
        assert_eq!(record.length, 42);
    }

    #[test]
    fn test_finish_short_transfer_not_done() {
        let mut record = ProgressRecord::new("x");
        record.length = 100;
        record.advance(40).unwrap();
        record.finish();
        assert!(!record.done);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_position_never_exceeds_length(
                length in 1u64..10_000,
                chunks in proptest::collection::vec(0u64..2_000, 0..64)
            ) {
                let mut record = ProgressRecord::new("p");
                record.length = length;
                for chunk in chunks {
                    let _ = record.advance(chunk);
                    prop_assert!(
                        record.position <= record.length,
                        "position {} exceeded length {}",
                        record.position, record.length
                    );
                    let decoded = ProgressRecord::decode("p", &record.encode());
                    prop_assert!(decoded.is_ok());
                }
            }
        }
    }
}
