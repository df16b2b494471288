//! Parsing of file names found in `_delta_log/`.
use snafu::prelude::*;

use crate::storage::layout::{CHECKPOINT_PART_DIGITS, VERSION_DIGITS};
use crate::transaction_log::{CorruptLogSnafu, LogError, Version};

/// What kind of log file a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFileKind {
    /// `<v>.json`
    Commit,
    /// `<v>.checkpoint.parquet`
    SinglePartCheckpoint,
    /// `<v>.checkpoint.<part>.<parts>.parquet`
    MultiPartCheckpoint {
        /// 1-based part number.
        part: u32,
        /// Total number of parts.
        num_parts: u32,
    },
    /// `<v>.crc` and any other versioned name the reader does not use.
    Other,
}

/// A versioned file name from the log directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLogPath {
    /// Bare file name.
    pub file_name: String,
    /// Version encoded in the name's prefix.
    pub version: Version,
    /// Kind of the file.
    pub kind: LogFileKind,
}

impl ParsedLogPath {
    /// Parse a file name from the log directory.
    ///
    /// Names without a numeric prefix (`_last_checkpoint`, temp files,
    /// subdirectories) are not log files and yield `Ok(None)`. A numeric
    /// prefix of the wrong width, or a checkpoint part specifier that does
    /// not parse, means the directory holds something a writer should never
    /// have produced and is reported as corrupt.
    pub fn parse(log_dir: &str, file_name: &str) -> Result<Option<Self>, LogError> {
        let mut split = file_name.split('.');
        let prefix = split.next().unwrap_or_default();

        let version: Version = match prefix.parse() {
            Ok(v) if prefix.len() == VERSION_DIGITS => v,
            Ok(v) => {
                return CorruptLogSnafu {
                    version: v,
                    path: format!("{log_dir}/{file_name}"),
                    msg: format!("version prefix must have {VERSION_DIGITS} digits"),
                }
                .fail();
            }
            Err(_) => return Ok(None),
        };

        let rest: Vec<&str> = split.collect();
        let kind = match rest.as_slice() {
            ["json"] => LogFileKind::Commit,
            ["checkpoint", "parquet"] => LogFileKind::SinglePartCheckpoint,
            ["checkpoint", part, num_parts, "parquet"] => {
                let part = parse_part(part);
                let num_parts = parse_part(num_parts);
                match (part, num_parts) {
                    (Some(part), Some(num_parts)) if 0 < part && part <= num_parts => {
                        LogFileKind::MultiPartCheckpoint { part, num_parts }
                    }
                    _ => {
                        return CorruptLogSnafu {
                            version,
                            path: format!("{log_dir}/{file_name}"),
                            msg: "invalid multi-part checkpoint part specifier".to_string(),
                        }
                        .fail();
                    }
                }
            }
            [] => return Ok(None),
            _ => LogFileKind::Other,
        };

        Ok(Some(ParsedLogPath {
            file_name: file_name.to_string(),
            version,
            kind,
        }))
    }

    /// True for single- and multi-part checkpoint files.
    pub fn is_checkpoint(&self) -> bool {
        matches!(
            self.kind,
            LogFileKind::SinglePartCheckpoint | LogFileKind::MultiPartCheckpoint { .. }
        )
    }
}

fn parse_part(s: &str) -> Option<u32> {
    if s.len() != CHECKPOINT_PART_DIGITS {
        return None;
    }
    s.parse().ok()
}
