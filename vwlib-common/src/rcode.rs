//! Catalog code codec
//!
//! Converts between numeric work ids and display codes ("RJ123456").
//! The low 12 decimal digits of an id hold the numeric portion of the code;
//! digits above that encode the code series (0 = RJ, 1 = VJ). Single-series
//! catalogs written before the series digit existed decode unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Known code prefixes, indexed by series number
pub const SERIES_PREFIXES: [&str; 2] = ["RJ", "VJ"];

/// One series occupies this span of ids
const NUMERIC_SPAN: u64 = 1_000_000_000_000;

/// Codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodeError {
    /// Code does not match any known prefix + digits pattern
    #[error("Invalid catalog code format: {0}")]
    InvalidFormat(String),

    /// Raw id encodes a series with no known prefix
    #[error("Id {0} encodes an unknown code series")]
    UnknownSeries(u64),
}

/// Numeric work identifier, convertible to and from a catalog code.
///
/// Construction always validates the series digits, so `code()` is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(u64);

impl WorkId {
    /// Validate a raw numeric id (e.g. read back from storage)
    pub fn from_raw(raw: u64) -> Result<Self, CodeError> {
        let series = raw / NUMERIC_SPAN;
        if (series as usize) < SERIES_PREFIXES.len() {
            Ok(Self(raw))
        } else {
            Err(CodeError::UnknownSeries(raw))
        }
    }

    /// Raw numeric value (storage representation)
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Parse a complete catalog code ("RJ123456", "VJ01000001")
    ///
    /// The numeric part must be exactly 6 or 8 digits.
    pub fn parse(code: &str) -> Result<Self, CodeError> {
        let invalid = || CodeError::InvalidFormat(code.to_string());

        let (series, digits) = SERIES_PREFIXES
            .iter()
            .enumerate()
            .find_map(|(series, prefix)| {
                code.strip_prefix(prefix).map(|rest| (series as u64, rest))
            })
            .ok_or_else(invalid)?;

        if !(digits.len() == 6 || digits.len() == 8) || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let numeric: u64 = digits.parse().map_err(|_| invalid())?;
        Ok(Self(series * NUMERIC_SPAN + numeric))
    }

    /// Find a catalog code embedded in a folder name
    ///
    /// Prefers the 8-digit form when 8 or more digits follow the prefix,
    /// otherwise takes the 6-digit form.
    pub fn find_in(name: &str) -> Option<Self> {
        for (start, _) in name.char_indices() {
            let rest = &name[start..];
            for prefix in SERIES_PREFIXES {
                let Some(tail) = rest.strip_prefix(prefix) else {
                    continue;
                };
                let digits = tail.bytes().take_while(|b| b.is_ascii_digit()).count();
                let take = match digits {
                    8.. => 8,
                    6..=7 => 6,
                    _ => continue,
                };
                if let Ok(id) = Self::parse(&rest[..prefix.len() + take]) {
                    return Some(id);
                }
            }
        }
        None
    }

    /// Display code: prefix + numeric part zero-padded to 6 digits,
    /// or to 8 digits when it has 7 or more.
    pub fn code(self) -> String {
        let series = (self.0 / NUMERIC_SPAN) as usize;
        let numeric = self.0 % NUMERIC_SPAN;
        let prefix = SERIES_PREFIXES[series];
        if numeric >= 1_000_000 {
            format!("{prefix}{numeric:08}")
        } else {
            format!("{prefix}{numeric:06}")
        }
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        for code in ["RJ000001", "RJ123456", "RJ01000001", "VJ123456", "VJ99999999"] {
            let id = WorkId::parse(code).expect("parse");
            assert_eq!(id.code(), code);
            assert_eq!(WorkId::parse(&id.code()).unwrap(), id);
        }
    }

    #[test]
    fn format_is_idempotent() {
        let id = WorkId::parse("RJ123456").unwrap();
        let code = id.code();
        assert_eq!(WorkId::parse(&code).unwrap().code(), code);
    }

    #[test]
    fn series_maps_to_prefix() {
        assert_eq!(WorkId::from_raw(123456).unwrap().code(), "RJ123456");
        assert_eq!(
            WorkId::from_raw(1_000_000_123_456).unwrap().code(),
            "VJ123456"
        );
    }

    #[test]
    fn seven_digit_numeric_pads_to_eight() {
        assert_eq!(WorkId::from_raw(1_000_001).unwrap().code(), "RJ01000001");
    }

    #[test]
    fn rejects_unknown_prefix_and_bad_digits() {
        assert!(matches!(
            WorkId::parse("BJ123456"),
            Err(CodeError::InvalidFormat(_))
        ));
        assert!(WorkId::parse("RJ12345").is_err());
        assert!(WorkId::parse("RJ1234567").is_err());
        assert!(WorkId::parse("RJ12E456").is_err());
        assert!(WorkId::parse("rj123456").is_err());
    }

    #[test]
    fn rejects_unknown_series() {
        assert_eq!(
            WorkId::from_raw(5 * 1_000_000_000_000),
            Err(CodeError::UnknownSeries(5_000_000_000_000))
        );
    }

    #[test]
    fn finds_code_embedded_in_folder_name() {
        assert_eq!(
            WorkId::find_in("RJ123456 some circle - some title"),
            Some(WorkId::parse("RJ123456").unwrap())
        );
        assert_eq!(
            WorkId::find_in("[circle] title (VJ01000001)"),
            Some(WorkId::parse("VJ01000001").unwrap())
        );
        assert_eq!(
            WorkId::find_in("【耳かき】RJ234567 癒やしの音"),
            Some(WorkId::parse("RJ234567").unwrap())
        );
        assert_eq!(WorkId::find_in("loose files"), None);
        assert_eq!(WorkId::find_in("RJ12345"), None);
    }
}
