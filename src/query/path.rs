//! Property paths and method-name token resolution.
//!
//! A token taken from a method name (`AddressZipCode`, `Address_ZipCode`) is resolved
//! against [`EntityMetadata`] in three steps:
//!
//! 1. the whole token as one property (case-insensitive);
//! 2. if it contains `_`, each segment in turn, descending into embedded types;
//! 3. otherwise every prefix split that reaches a full resolution through embedded
//!    types. More than one such split is an [`QueryError::AmbiguousProperty`].
//!
//! `Id` falls back to the declared identifier when no literal `id` exists.

use crate::error::QueryError;
use crate::metadata::{EntityMetadata, PropertyType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered property-name segments, e.g. `address.zipCode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PropertyPath(Vec<String>);

impl PropertyPath {
    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    /// Split a dotted path; `None` if any segment is empty.
    pub fn parse(dotted: &str) -> Option<Self> {
        let segments: Vec<String> = dotted.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn child(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        Self(segments)
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<PropertyPath> for String {
    fn from(path: PropertyPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for PropertyPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PropertyPath::parse(&value).ok_or_else(|| format!("invalid property path `{value}`"))
    }
}

/// Resolve a method-name token to a property path.
pub fn resolve_token(token: &str, metadata: &dyn EntityMetadata) -> Result<PropertyPath, QueryError> {
    let root = metadata.root_type();
    let invalid = || QueryError::InvalidProperty {
        entity: metadata.entity_name().to_string(),
        token: token.to_string(),
    };

    if token.is_empty() {
        return Err(invalid());
    }

    if let Some(resolved) = metadata.resolve_property(root, token) {
        return Ok(PropertyPath::single(resolved.name));
    }

    if token.contains('_') {
        return resolve_delimited(token, metadata).ok_or_else(invalid);
    }

    if token.eq_ignore_ascii_case("id") {
        return Ok(metadata.identifier_property());
    }

    let mut found = Vec::new();
    collect_splits(metadata, root, token, &PropertyPath::default(), &mut found);

    match found.len() {
        0 => Err(invalid()),
        1 => Ok(found.remove(0)),
        _ => Err(QueryError::AmbiguousProperty {
            token: token.to_string(),
            candidates: found.iter().map(ToString::to_string).collect(),
        }),
    }
}

fn resolve_delimited(token: &str, metadata: &dyn EntityMetadata) -> Option<PropertyPath> {
    let mut owner = metadata.root_type().to_string();
    let mut path = PropertyPath::default();
    let parts: Vec<&str> = token.split('_').collect();
    let last = parts.len() - 1;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            return None;
        }
        let resolved = metadata.resolve_property(&owner, part)?;
        match resolved.ty {
            PropertyType::Embedded(next) => owner = next,
            PropertyType::Scalar(_) if i != last => return None,
            PropertyType::Scalar(_) => {}
        }
        path = path.child(&resolved.name);
    }

    Some(path)
}

fn collect_splits(
    metadata: &dyn EntityMetadata,
    owner: &str,
    rest: &str,
    prefix: &PropertyPath,
    found: &mut Vec<PropertyPath>,
) {
    for name in metadata.property_names(owner) {
        let Some(head) = rest.get(..name.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(&name) {
            continue;
        }
        let Some(resolved) = metadata.resolve_property(owner, &name) else {
            continue;
        };
        let remainder = &rest[name.len()..];
        let path = prefix.child(&resolved.name);

        if remainder.is_empty() {
            found.push(path);
        } else if let PropertyType::Embedded(next) = resolved.ty {
            if remainder.starts_with(|c: char| c.is_ascii_uppercase()) {
                collect_splits(metadata, &next, remainder, &path, found);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{EmbeddableDefinition, EntityModel};
    use crate::value::ValueKind;

    fn order() -> EntityModel {
        EntityModel::new("Order")
            .id("orderNumber", ValueKind::Int)
            .property("addressZipCode", ValueKind::Int)
            .embedded(
                "address",
                EmbeddableDefinition::new("Address").property("zipCode", ValueKind::Int),
            )
    }

    #[test]
    fn test_whole_token_wins() {
        let path = resolve_token("AddressZipCode", &order()).unwrap();
        assert_eq!(path.to_string(), "addressZipCode");
    }

    #[test]
    fn test_underscore_path_targets_embedded() {
        let path = resolve_token("Address_ZipCode", &order()).unwrap();
        assert_eq!(path.to_string(), "address.zipCode");
    }

    #[test]
    fn test_underscore_segment_must_resolve() {
        let err = resolve_token("Address_Street", &order()).unwrap_err();
        assert!(matches!(err, QueryError::InvalidProperty { .. }));
        assert!(resolve_token("Address__ZipCode", &order()).is_err());
    }

    #[test]
    fn test_longest_prefix_descends_into_embedded() {
        let model = EntityModel::new("Person")
            .id("id", ValueKind::Int)
            .embedded(
                "address",
                EmbeddableDefinition::new("Address").property("zipCode", ValueKind::Int),
            );
        let path = resolve_token("AddressZipCode", &model).unwrap();
        assert_eq!(path.segments(), ["address", "zipCode"]);
    }

    #[test]
    fn test_ambiguous_split_is_rejected() {
        let model = EntityModel::new("Person")
            .id("id", ValueKind::Int)
            .embedded(
                "address",
                EmbeddableDefinition::new("Address").property("zipCode", ValueKind::Int),
            )
            .embedded(
                "addressZip",
                EmbeddableDefinition::new("Zip").property("code", ValueKind::Int),
            );
        let err = resolve_token("AddressZipCode", &model).unwrap_err();
        match err {
            QueryError::AmbiguousProperty { candidates, .. } => {
                assert_eq!(candidates, vec!["address.zipCode", "addressZip.code"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
        // An explicit delimiter settles it
        let path = resolve_token("AddressZip_Code", &model).unwrap();
        assert_eq!(path.to_string(), "addressZip.code");
    }

    #[test]
    fn test_id_alias() {
        let path = resolve_token("Id", &order()).unwrap();
        assert_eq!(path.to_string(), "orderNumber");

        let literal = EntityModel::new("Thing")
            .id("key", ValueKind::Int)
            .property("id", ValueKind::Text);
        assert_eq!(resolve_token("Id", &literal).unwrap().to_string(), "id");
    }

    #[test]
    fn test_path_serde_is_dotted() {
        let path = PropertyPath::parse("address.zipCode").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"address.zipCode\"");
        let back: PropertyPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(PropertyPath::parse("a..b").is_none());
    }
}
