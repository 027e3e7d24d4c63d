//! Keyset cursors and their opaque token form.
//!
//! A [`KeysetCursor`] holds the last observed value of every sort property, in
//! sort order. It converts to a flat, typed value list for transport and to a
//! hex token that is signed with the [`SortSpec`] it was issued for, so a token
//! replayed against a different ordering is rejected instead of silently
//! seeking to the wrong place.

use crate::error::QueryError;
use crate::query::path::PropertyPath;
use crate::query::sort::SortSpec;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default decode bound for untrusted cursor tokens (hex characters).
pub const DEFAULT_MAX_TOKEN_LEN: usize = 8 * 1024;

/// Anything that can report the value of a sort property.
///
/// Rows handed back by an executor implement this so the engine can derive
/// cursors from the first and last item of a page.
pub trait SortKeySource {
    fn sort_value(&self, path: &PropertyPath) -> Option<Value>;
}

/// Last observed sort-key values, one per sort criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeysetCursor {
    entries: Vec<(PropertyPath, Value)>,
}

#[derive(Serialize, Deserialize)]
struct Token {
    #[serde(rename = "s")]
    signature: String,
    #[serde(rename = "v")]
    values: Vec<Value>,
}

impl KeysetCursor {
    /// Pair `values` with the paths of `sort`; the counts must match.
    pub fn from_values(sort: &SortSpec, values: Vec<Value>) -> Result<Self, QueryError> {
        if values.len() != sort.len() {
            return Err(QueryError::InvalidCursor(format!(
                "cursor has {} value(s), sort has {} criteria",
                values.len(),
                sort.len()
            )));
        }
        Ok(Self {
            entries: sort.paths().cloned().zip(values).collect(),
        })
    }

    /// Read the cursor off an item. Every sort property must be present.
    pub fn from_item<T: SortKeySource>(sort: &SortSpec, item: &T) -> Result<Self, QueryError> {
        let entries = sort
            .paths()
            .map(|path| {
                item.sort_value(path)
                    .map(|value| (path.clone(), value))
                    .ok_or_else(|| {
                        QueryError::Execution(format!("row has no value for sort property `{path}`"))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Flat value list in sort order.
    pub fn to_values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn entries(&self) -> &[(PropertyPath, Value)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether this cursor lines up with `sort`, path for path.
    pub fn matches(&self, sort: &SortSpec) -> bool {
        self.entries.len() == sort.len()
            && self.entries.iter().map(|(p, _)| p).eq(sort.paths())
    }

    /// Encode as an opaque hex token signed for `sort`.
    pub fn encode(&self, sort: &SortSpec) -> Result<String, QueryError> {
        if !self.matches(sort) {
            return Err(QueryError::CursorMismatch);
        }
        let token = Token {
            signature: sort_signature(sort),
            values: self.to_values(),
        };
        let json = serde_json::to_vec(&token)
            .map_err(|e| QueryError::InvalidCursor(format!("encode failed: {e}")))?;
        Ok(hex::encode(json))
    }

    /// Decode a token issued for `sort`, rejecting tokens longer than `max_len`.
    pub fn decode(token: &str, sort: &SortSpec, max_len: usize) -> Result<Self, QueryError> {
        let bytes = decode_hex(token, max_len)?;
        let token: Token = serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::InvalidCursor(format!("malformed payload: {e}")))?;
        if token.signature != sort_signature(sort) {
            return Err(QueryError::CursorMismatch);
        }
        Self::from_values(sort, token.values)
    }
}

/// SHA-256 over the canonical text of a sort spec, hex-encoded.
fn sort_signature(sort: &SortSpec) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sort.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn decode_hex(token: &str, max_len: usize) -> Result<Vec<u8>, QueryError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(QueryError::InvalidCursor("token is empty".to_string()));
    }
    if token.len() > max_len {
        return Err(QueryError::InvalidCursor(format!(
            "token exceeds max length: {} hex chars (max {max_len})",
            token.len()
        )));
    }
    hex::decode(token).map_err(|e| QueryError::InvalidCursor(format!("not a hex token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::sort::SortCriterion;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn sort() -> SortSpec {
        SortSpec::new()
            .then(SortCriterion::asc(PropertyPath::single("lastName")))
            .then(SortCriterion::desc(PropertyPath::single("price")))
            .then(SortCriterion::asc(PropertyPath::single("id")))
    }

    fn cursor() -> KeysetCursor {
        KeysetCursor::from_values(
            &sort(),
            vec![
                Value::from("A"),
                Value::Decimal(Decimal::from_str("9.99").unwrap()),
                Value::Int(2),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_value_list_round_trip() {
        let cursor = cursor();
        let back = KeysetCursor::from_values(&sort(), cursor.to_values()).unwrap();
        assert_eq!(back, cursor);
    }

    #[test]
    fn test_arity_must_match_sort() {
        let err = KeysetCursor::from_values(&sort(), vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, QueryError::InvalidCursor(_)));
    }

    #[test]
    fn test_token_round_trip_keeps_types() {
        let sort = SortSpec::new()
            .then(SortCriterion::asc(PropertyPath::single("born")))
            .then(SortCriterion::asc(PropertyPath::single("id")));
        let cursor = KeysetCursor::from_values(
            &sort,
            vec![
                Value::Date(NaiveDate::from_ymd_opt(1990, 4, 1).unwrap()),
                Value::Null,
            ],
        )
        .unwrap();
        let token = cursor.encode(&sort).unwrap();
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        let back = KeysetCursor::decode(&token, &sort, DEFAULT_MAX_TOKEN_LEN).unwrap();
        assert_eq!(back, cursor);
    }

    #[test]
    fn test_token_rejected_for_other_sort() {
        let token = cursor().encode(&sort()).unwrap();
        let reversed = sort().reversed();
        let err = KeysetCursor::decode(&token, &reversed, DEFAULT_MAX_TOKEN_LEN).unwrap_err();
        assert_eq!(err, QueryError::CursorMismatch);
    }

    #[test]
    fn test_garbled_tokens() {
        for token in ["", "   ", "abc", "zz", "7b7d"] {
            let err = KeysetCursor::decode(token, &sort(), DEFAULT_MAX_TOKEN_LEN).unwrap_err();
            assert!(matches!(err, QueryError::InvalidCursor(_)), "{token}: {err:?}");
        }
        let token = cursor().encode(&sort()).unwrap();
        let err = KeysetCursor::decode(&token, &sort(), 16).unwrap_err();
        assert!(matches!(err, QueryError::InvalidCursor(_)));
    }

    #[test]
    fn test_encode_requires_matching_sort() {
        let other = SortSpec::new().then(SortCriterion::asc(PropertyPath::single("id")));
        assert_eq!(cursor().encode(&other).unwrap_err(), QueryError::CursorMismatch);
    }
}
