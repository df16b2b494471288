//! On-disk naming conventions under a table root.
//!
//! - transaction log directory (`_delta_log/`)
//! - commit files: `<version:020>.json`
//! - single-part checkpoints: `<version:020>.checkpoint.parquet`
//! - multi-part checkpoints: `<version:020>.checkpoint.<part:010>.<parts:010>.parquet`
//! - the `_last_checkpoint` hint file
//!
//! These names are fixed by the table format; readers of existing tables
//! depend on them bit for bit.
use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use url::Url;

/// Name of the subdirectory containing the transaction log.
pub const LOG_DIR_NAME: &str = "_delta_log";

/// Name of the hint file recording the most recent checkpoint.
pub const LAST_CHECKPOINT_FILE_NAME: &str = "_last_checkpoint";

/// Number of digits used in zero-padded version prefixes.
pub const VERSION_DIGITS: usize = 20;

/// Number of digits used for part numbers of multi-part checkpoints.
pub const CHECKPOINT_PART_DIGITS: usize = 10;

/// `<version:020>.json`
pub fn commit_file_name(version: u64) -> String {
    format!("{:0width$}.json", version, width = VERSION_DIGITS)
}

/// `<version:020>.checkpoint.parquet`
pub fn checkpoint_file_name(version: u64) -> String {
    format!("{:0width$}.checkpoint.parquet", version, width = VERSION_DIGITS)
}

/// `<version:020>.checkpoint.<part:010>.<parts:010>.parquet`, with `part`
/// counted from 1.
pub fn multipart_checkpoint_file_name(version: u64, part: u32, num_parts: u32) -> String {
    format!(
        "{:0vw$}.checkpoint.{:0pw$}.{:0pw$}.parquet",
        version,
        part,
        num_parts,
        vw = VERSION_DIGITS,
        pw = CHECKPOINT_PART_DIGITS
    )
}

/// Decode `%XX` escapes in a relative file path as written by the log.
///
/// Malformed escapes are kept literally. If the decoded bytes are not valid
/// UTF-8 the input is returned unchanged.
pub fn decode_uri_path(path: &str) -> String {
    percent_decode_str(path)
        .decode_utf8()
        .map_or_else(|_| path.to_string(), Cow::into_owned)
}

/// Local path named by a `file://` URI.
///
/// `None` when `uri` does not parse, has another scheme, or names a remote
/// host.
pub fn file_uri_path(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    let path = url.to_file_path().ok()?;
    Some(path.to_string_lossy().into_owned())
}
