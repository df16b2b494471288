//! Reader protocol checks.
//!
//! Reader version 1 tables are always readable. Version 2 adds column
//! mapping, which this reader does not implement, so it is accepted only when
//! the table does not use it. Version 3 lists reader features explicitly; all
//! of them must be in [`SUPPORTED_READER_FEATURES`].
use snafu::prelude::*;

use crate::table::error::{TableError, UnsupportedProtocolSnafu};
use crate::transaction_log::{Metadata, Protocol, Version};

/// Reader features that do not change how data files are read (or whose
/// effect is already handled by the scan, like type widening).
pub const SUPPORTED_READER_FEATURES: &[&str] = &[
    "timestampNtz",
    "typeWidening",
    "typeWidening-preview",
    "vacuumProtocolCheck",
    "appendOnly",
    "invariants",
    "checkConstraints",
    "generatedColumns",
    "changeDataFeed",
    "identityColumns",
];

const COLUMN_MAPPING_MODE_KEY: &str = "delta.columnMapping.mode";

/// Check that a table with `protocol` (and `metadata`, when known) can be read.
pub fn validate_protocol(
    protocol: &Protocol,
    metadata: Option<&Metadata>,
    version: Version,
) -> Result<(), TableError> {
    match protocol.min_reader_version {
        1 | 2 => {}
        3 => {
            let features = protocol.reader_features.as_deref().unwrap_or_default();
            if let Some(unsupported) = features
                .iter()
                .find(|f| !SUPPORTED_READER_FEATURES.contains(&f.as_str()))
            {
                return UnsupportedProtocolSnafu {
                    version,
                    msg: format!("reader feature {unsupported:?} is not supported"),
                }
                .fail();
            }
        }
        other => {
            return UnsupportedProtocolSnafu {
                version,
                msg: format!("reader version {other} is not supported"),
            }
            .fail();
        }
    }

    if let Some(mode) = metadata.and_then(|m| m.config_value(COLUMN_MAPPING_MODE_KEY)) {
        ensure!(
            mode.eq_ignore_ascii_case("none"),
            UnsupportedProtocolSnafu {
                version,
                msg: format!("column mapping mode {mode:?} is not supported"),
            }
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn protocol(reader: i32, features: Option<&[&str]>) -> Protocol {
        Protocol {
            min_reader_version: reader,
            min_writer_version: 7,
            reader_features: features.map(|f| f.iter().map(|s| s.to_string()).collect()),
            writer_features: None,
        }
    }

    fn metadata_with_mapping(mode: &str) -> Metadata {
        let mut configuration = HashMap::new();
        configuration.insert(COLUMN_MAPPING_MODE_KEY.to_string(), Some(mode.to_string()));
        Metadata {
            id: "t".to_string(),
            name: None,
            description: None,
            format: Default::default(),
            schema_string: r#"{"type":"struct","fields":[]}"#.to_string(),
            partition_columns: vec![],
            configuration,
            created_time: None,
        }
    }

    #[test]
    fn reader_versions_one_and_two_are_accepted() {
        validate_protocol(&protocol(1, None), None, 0).expect("v1");
        validate_protocol(&protocol(2, None), Some(&metadata_with_mapping("none")), 0)
            .expect("v2 without mapping");
    }

    #[test]
    fn column_mapping_is_rejected() {
        let err = validate_protocol(&protocol(2, None), Some(&metadata_with_mapping("name")), 4)
            .expect_err("mapping");
        assert!(matches!(err, TableError::UnsupportedProtocol { version: 4, .. }));
    }

    #[test]
    fn reader_features_must_be_supported() {
        validate_protocol(&protocol(3, Some(&["timestampNtz", "appendOnly"])), None, 0)
            .expect("supported");
        let err = validate_protocol(&protocol(3, Some(&["deletionVectors"])), None, 2)
            .expect_err("deletion vectors");
        match err {
            TableError::UnsupportedProtocol { version, msg } => {
                assert_eq!(version, 2);
                assert!(msg.contains("deletionVectors"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn future_reader_version_is_rejected() {
        let err = validate_protocol(&protocol(4, None), None, 1).expect_err("v4");
        assert!(matches!(err, TableError::UnsupportedProtocol { .. }));
    }
}
