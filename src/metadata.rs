//! Entity metadata consumed by the method-name parser and the keyset engine.
//!
//! [`EntityMetadata`] is the collaborator contract: the parser asks it which
//! properties exist on a type, the pagination engine asks it which paths are unique.
//! [`EntityModel`] is a declarative implementation that can be built in code or
//! deserialized from TOML/JSON.
//!
//! # Example
//!
//! ```rust
//! use seawall::metadata::{EmbeddableDefinition, EntityMetadata, EntityModel};
//! use seawall::ValueKind;
//!
//! let order = EntityModel::new("Order")
//!     .id("id", ValueKind::Int)
//!     .embedded("address", EmbeddableDefinition::new("Address").property("zipCode", ValueKind::Int));
//!
//! assert!(order.resolve_property("Address", "ZIPCODE").is_some());
//! ```

use crate::error::QueryError;
use crate::query::path::PropertyPath;
use crate::value::ValueKind;
use serde::{Deserialize, Serialize};

/// Type reached by a property: a scalar, or an embedded type traversed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyType {
    Scalar(ValueKind),
    Embedded(String),
}

/// A property found on a type, with its canonical (declared) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProperty {
    pub name: String,
    pub ty: PropertyType,
}

/// Metadata lookups the engine needs about an entity.
///
/// Types are addressed by name; the entity itself is [`root_type`](Self::root_type).
/// Property lookups are case-insensitive and return the declared spelling.
pub trait EntityMetadata: Send + Sync {
    fn entity_name(&self) -> &str;

    fn root_type(&self) -> &str {
        self.entity_name()
    }

    fn resolve_property(&self, owner: &str, name: &str) -> Option<ResolvedProperty>;

    /// Declared property names of `owner`, in declaration order.
    fn property_names(&self, owner: &str) -> Vec<String>;

    fn identifier_property(&self) -> PropertyPath;

    fn is_unique(&self, path: &PropertyPath) -> bool;

    /// Composite unique keys; a sort that covers every path of one key is unique.
    fn unique_keys(&self) -> Vec<Vec<PropertyPath>> {
        Vec::new()
    }

    /// Type of the property a resolved path ends at.
    fn property_type(&self, path: &PropertyPath) -> Option<PropertyType> {
        let (first, rest) = path.segments().split_first()?;
        let mut ty = self.resolve_property(self.root_type(), first)?.ty;
        for segment in rest {
            let PropertyType::Embedded(owner) = ty else {
                return None;
            };
            ty = self.resolve_property(&owner, segment)?.ty;
        }
        Some(ty)
    }

    /// Resolve a dotted path (`address.zipCode`) segment by segment.
    fn resolve_path(&self, dotted: &str) -> Result<PropertyPath, QueryError> {
        let invalid = || QueryError::InvalidProperty {
            entity: self.entity_name().to_string(),
            token: dotted.to_string(),
        };

        let raw = PropertyPath::parse(dotted).ok_or_else(invalid)?;
        let mut owner = self.root_type().to_string();
        let mut segments = Vec::with_capacity(raw.len());
        let last = raw.len() - 1;

        for (i, segment) in raw.segments().iter().enumerate() {
            let resolved = self.resolve_property(&owner, segment).ok_or_else(invalid)?;
            match resolved.ty {
                PropertyType::Embedded(next) => owner = next,
                PropertyType::Scalar(_) if i != last => return Err(invalid()),
                PropertyType::Scalar(_) => {}
            }
            segments.push(resolved.name);
        }

        Ok(PropertyPath::new(segments))
    }
}

/// A declared property of an entity or embeddable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ValueKind>,
    /// Name of the embeddable this property holds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

impl PropertyDefinition {
    fn property_type(&self) -> Option<PropertyType> {
        match (&self.kind, &self.embedded) {
            (Some(kind), None) => Some(PropertyType::Scalar(*kind)),
            (None, Some(name)) => Some(PropertyType::Embedded(name.clone())),
            _ => None,
        }
    }
}

/// An embeddable type: a named group of properties traversed with `_` or dotted paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddableDefinition {
    pub name: String,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
}

impl EmbeddableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    pub fn property(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.properties.push(PropertyDefinition {
            name: name.into(),
            kind: Some(kind),
            embedded: None,
            unique: false,
        });
        self
    }
}

/// Declarative entity metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityModel {
    pub name: String,
    /// Name of the identifier property
    pub id: String,
    #[serde(default)]
    pub properties: Vec<PropertyDefinition>,
    #[serde(default)]
    pub embeddables: Vec<EmbeddableDefinition>,
    /// Composite unique constraints, each a list of dotted paths
    #[serde(default)]
    pub unique_keys: Vec<Vec<String>>,
}

impl EntityModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: String::new(),
            properties: Vec::new(),
            embeddables: Vec::new(),
            unique_keys: Vec::new(),
        }
    }

    /// Declare the identifier property.
    pub fn id(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        let name = name.into();
        self.id = name.clone();
        self.push_property(name, Some(kind), None, true)
    }

    pub fn property(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.push_property(name.into(), Some(kind), None, false)
    }

    pub fn unique_property(self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.push_property(name.into(), Some(kind), None, true)
    }

    /// Declare an embedded property and register its embeddable type.
    pub fn embedded(mut self, name: impl Into<String>, embeddable: EmbeddableDefinition) -> Self {
        let type_name = embeddable.name.clone();
        if !self.embeddables.iter().any(|e| e.name == type_name) {
            self.embeddables.push(embeddable);
        }
        self.push_property(name.into(), None, Some(type_name), false)
    }

    pub fn unique_key<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_keys
            .push(paths.into_iter().map(Into::into).collect());
        self
    }

    fn push_property(
        mut self,
        name: String,
        kind: Option<ValueKind>,
        embedded: Option<String>,
        unique: bool,
    ) -> Self {
        self.properties.push(PropertyDefinition {
            name,
            kind,
            embedded,
            unique,
        });
        self
    }

    /// Check the model is self-consistent: the id exists, every property has
    /// exactly one of `type`/`embedded`, and every embeddable is declared.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err(format!("entity `{}` declares no id property", self.name));
        }
        if !self.properties.iter().any(|p| p.name == self.id) {
            return Err(format!(
                "entity `{}` id `{}` is not a declared property",
                self.name, self.id
            ));
        }
        let owners = std::iter::once((self.name.as_str(), &self.properties))
            .chain(self.embeddables.iter().map(|e| (e.name.as_str(), &e.properties)));
        for (owner, properties) in owners {
            for property in properties {
                match property.property_type() {
                    None => {
                        return Err(format!(
                            "property `{owner}.{}` must declare exactly one of `type` or `embedded`",
                            property.name
                        ))
                    }
                    Some(PropertyType::Embedded(ty)) if self.properties_of(&ty).is_none() => {
                        return Err(format!(
                            "property `{owner}.{}` references unknown embeddable `{ty}`",
                            property.name
                        ))
                    }
                    Some(_) => {}
                }
            }
        }
        for key in &self.unique_keys {
            for path in key {
                self.resolve_path(path).map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }

    fn properties_of(&self, owner: &str) -> Option<&[PropertyDefinition]> {
        if owner == self.name {
            return Some(&self.properties);
        }
        self.embeddables
            .iter()
            .find(|e| e.name == owner)
            .map(|e| e.properties.as_slice())
    }

    fn definition_at(&self, path: &PropertyPath) -> Option<&PropertyDefinition> {
        let mut owner = self.name.clone();
        let mut found = None;
        for segment in path.segments() {
            let definition = self
                .properties_of(&owner)?
                .iter()
                .find(|p| p.name == *segment)?;
            if let Some(next) = &definition.embedded {
                owner = next.clone();
            }
            found = Some(definition);
        }
        found
    }
}

impl EntityMetadata for EntityModel {
    fn entity_name(&self) -> &str {
        &self.name
    }

    fn resolve_property(&self, owner: &str, name: &str) -> Option<ResolvedProperty> {
        self.properties_of(owner)?
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .and_then(|p| {
                Some(ResolvedProperty {
                    name: p.name.clone(),
                    ty: p.property_type()?,
                })
            })
    }

    fn property_names(&self, owner: &str) -> Vec<String> {
        self.properties_of(owner)
            .map(|props| props.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    fn identifier_property(&self) -> PropertyPath {
        PropertyPath::single(self.id.clone())
    }

    fn is_unique(&self, path: &PropertyPath) -> bool {
        if *path == self.identifier_property() {
            return true;
        }
        self.definition_at(path).is_some_and(|d| d.unique)
    }

    fn unique_keys(&self) -> Vec<Vec<PropertyPath>> {
        self.unique_keys
            .iter()
            .filter_map(|key| key.iter().map(|p| PropertyPath::parse(p)).collect())
            .collect()
    }
}
