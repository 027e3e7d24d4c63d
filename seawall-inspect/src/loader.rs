//! Input loading for entity metadata and method declarations
//!
//! Two input forms are accepted:
//!
//! - a manifest (`.toml` / `.json`) with an `entity` (inline model or a path to
//!   one) and a `methods` list of declarations;
//! - Rust source (`.rs`) holding the entity struct, any embeddable structs, and a
//!   repository trait whose methods are the declarations.
//!
//! In Rust source, fields are renamed to lowerCamelCase (`zip_code` becomes
//! `zipCode`) unless `#[property = "..."]` says otherwise. `#[id]` (or
//! `#[primary_key]`) marks the identifier and `#[unique]` a unique property;
//! `#[unique_key = "a, b"]` on the struct adds a composite key. Repository
//! methods take `#[query = "..."]` and `#[order_by = "price desc, name"]`.

use seawall::metadata::{EmbeddableDefinition, PropertyDefinition};
use seawall::query::{ParameterKind, PropertyPath, ReturnShape, SortCriterion, SortSpec};
use seawall::{EntityModel, MethodDeclaration, ValueKind};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use syn::{Attribute, FnArg, GenericArgument, ItemStruct, Lit, PathArguments, ReturnType, Type};

/// An entity and the repository methods declared for it
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub entity: EntityModel,
    pub methods: Vec<MethodDeclaration>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    entity: EntityRef,
    #[serde(default)]
    methods: Vec<MethodDeclaration>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EntityRef {
    /// Path to a model file, relative to the manifest
    Path(PathBuf),
    Inline(EntityModel),
}

pub fn load_file(path: &Path) -> anyhow::Result<Inspection> {
    let content = fs::read_to_string(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    match ext {
        "rs" => parse_rust_source(&content),
        "toml" => load_manifest(toml::from_str(&content)?, base),
        "json" => load_manifest(serde_json::from_str(&content)?, base),
        _ => {
            // Try to detect format from content
            let trimmed = content.trim_start();
            if content.contains("struct ") || content.contains("trait ") {
                parse_rust_source(&content)
            } else if trimmed.starts_with('{') {
                load_manifest(serde_json::from_str(&content)?, base)
            } else if trimmed.starts_with('[') || content.contains('=') {
                load_manifest(toml::from_str(&content)?, base)
            } else {
                anyhow::bail!("Unknown file format. Supported: .rs (Rust source), .toml, .json")
            }
        }
    }
}

/// Load every supported file in `dir`, keeping per-file failures.
pub fn load_dir(dir: &Path) -> anyhow::Result<Vec<(PathBuf, anyhow::Result<Inspection>)>> {
    let mut loaded = Vec::new();
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|s| s.to_str()),
                    Some("rs" | "toml" | "json")
                )
        })
        .collect();
    paths.sort();

    for path in paths {
        let result = load_file(&path);
        if let Err(e) = &result {
            log::warn!("failed to load {}: {e}", path.display());
        }
        loaded.push((path, result));
    }
    Ok(loaded)
}

/// Load the entity model only, from a model file or Rust source.
pub fn load_entity(path: &Path) -> anyhow::Result<EntityModel> {
    let content = fs::read_to_string(path)?;
    match path.extension().and_then(|s| s.to_str()) {
        Some("rs") => Ok(parse_rust_source(&content)?.entity),
        Some("json") => Ok(serde_json::from_str(&content)?),
        _ => Ok(toml::from_str(&content)?),
    }
}

fn load_manifest(manifest: Manifest, base: &Path) -> anyhow::Result<Inspection> {
    let entity = match manifest.entity {
        EntityRef::Inline(model) => model,
        EntityRef::Path(relative) => load_entity(&base.join(relative))?,
    };
    Ok(Inspection {
        entity,
        methods: manifest.methods,
    })
}

/// Parse an entity struct, its embeddables and a repository trait from source.
pub fn parse_rust_source(content: &str) -> anyhow::Result<Inspection> {
    let file = syn::parse_file(content)?;

    let structs: Vec<&ItemStruct> = file
        .items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Struct(s) => Some(s),
            _ => None,
        })
        .collect();
    let by_name: HashMap<String, &ItemStruct> =
        structs.iter().map(|s| (s.ident.to_string(), *s)).collect();

    // `#[entity]` wins, then the first struct with an id field, then the first struct
    let root = structs
        .iter()
        .find(|s| has_attribute(&s.attrs, "entity"))
        .or_else(|| structs.iter().find(|s| id_field(s).is_some()))
        .or_else(|| structs.first())
        .ok_or_else(|| anyhow::anyhow!("No struct found in source"))?;

    let entity = struct_to_model(root, &by_name)?;

    let methods = match file.items.iter().find_map(|item| match item {
        syn::Item::Trait(t) => Some(t),
        _ => None,
    }) {
        Some(repository) => repository
            .items
            .iter()
            .filter_map(|item| match item {
                syn::TraitItem::Fn(f) => Some(f),
                _ => None,
            })
            .map(parse_method)
            .collect::<anyhow::Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    Ok(Inspection { entity, methods })
}

fn struct_to_model(
    root: &ItemStruct,
    structs: &HashMap<String, &ItemStruct>,
) -> anyhow::Result<EntityModel> {
    let name = extract_string(&root.attrs, "entity_name").unwrap_or_else(|| root.ident.to_string());
    let id = id_field(root)
        .map(property_name)
        .transpose()?
        .ok_or_else(|| anyhow::anyhow!("Struct `{}` has no #[id] field", root.ident))?;

    let mut embeddables = Vec::new();
    let properties = struct_properties(root, structs, &mut embeddables)?;
    let unique_keys = root
        .attrs
        .iter()
        .filter(|attr| attr.path().is_ident("unique_key"))
        .filter_map(|attr| attr_string(attr))
        .map(|key| {
            key.split(',')
                .map(|p| {
                    p.trim()
                        .split('.')
                        .map(to_lower_camel_case)
                        .collect::<Vec<_>>()
                        .join(".")
                })
                .collect()
        })
        .collect();

    Ok(EntityModel {
        name,
        id,
        properties,
        embeddables,
        unique_keys,
    })
}

/// Properties of `item`, registering each embeddable it reaches (once).
fn struct_properties(
    item: &ItemStruct,
    structs: &HashMap<String, &ItemStruct>,
    embeddables: &mut Vec<EmbeddableDefinition>,
) -> anyhow::Result<Vec<PropertyDefinition>> {
    let named = match &item.fields {
        syn::Fields::Named(named) => named,
        syn::Fields::Unnamed(_) => anyhow::bail!("Tuple structs are not supported"),
        syn::Fields::Unit => anyhow::bail!("Unit structs are not supported"),
    };

    let mut properties = Vec::with_capacity(named.named.len());
    for field in &named.named {
        let name = property_name(field)?;
        let ty = unwrap_option(&field.ty);
        let unique = has_attribute(&field.attrs, "unique")
            || has_attribute(&field.attrs, "id")
            || has_attribute(&field.attrs, "primary_key");

        let (kind, embedded) = match scalar_kind(ty) {
            Some(kind) => (Some(kind), None),
            None => {
                let type_name = last_ident(ty)
                    .ok_or_else(|| anyhow::anyhow!("Unsupported type for field `{name}`"))?;
                let nested = structs.get(&type_name).ok_or_else(|| {
                    anyhow::anyhow!("Unsupported type `{type_name}` for field `{name}`")
                })?;
                if !embeddables.iter().any(|e: &EmbeddableDefinition| e.name == type_name) {
                    // Reserve the slot first so self-references terminate
                    embeddables.push(EmbeddableDefinition::new(type_name.clone()));
                    let nested_properties = struct_properties(nested, structs, embeddables)?;
                    if let Some(slot) = embeddables.iter_mut().find(|e| e.name == type_name) {
                        slot.properties = nested_properties;
                    }
                }
                (None, Some(type_name))
            }
        };

        properties.push(PropertyDefinition {
            name,
            kind,
            embedded,
            unique,
        });
    }
    Ok(properties)
}

fn parse_method(method: &syn::TraitItemFn) -> anyhow::Result<MethodDeclaration> {
    let name = method.sig.ident.to_string();
    let parameters = method
        .sig
        .inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Receiver(_) => None,
            FnArg::Typed(typed) => Some(parameter_kind(&typed.ty)),
        })
        .collect();
    let returns = match &method.sig.output {
        ReturnType::Default => ReturnShape::Unit,
        ReturnType::Type(_, ty) => return_shape(ty),
    };

    let mut declaration = MethodDeclaration {
        parameters,
        ..MethodDeclaration::new(name, returns)
    };
    if let Some(text) = extract_string(&method.attrs, "query") {
        declaration = declaration.query(text);
    }
    if let Some(order) = extract_string(&method.attrs, "order_by") {
        declaration = declaration.sorted(parse_order_by(&order)?);
    }
    Ok(declaration)
}

/// `"price desc, name asc ignore_case"` into sort criteria. Paths may use field names.
pub fn parse_order_by(text: &str) -> anyhow::Result<SortSpec> {
    let mut sort = SortSpec::new();
    for item in text.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut words = item.split_whitespace();
        let path = words
            .next()
            .and_then(|raw| {
                let segments: Vec<String> = raw.split('.').map(to_lower_camel_case).collect();
                PropertyPath::parse(&segments.join("."))
            })
            .ok_or_else(|| anyhow::anyhow!("Invalid sort property in `{item}`"))?;
        let (mut descending, mut ignore_case) = (false, false);
        for word in words {
            match word.to_ascii_lowercase().as_str() {
                "asc" => descending = false,
                "desc" => descending = true,
                "ignore_case" | "ignorecase" => ignore_case = true,
                other => anyhow::bail!("Unknown sort modifier `{other}` in `{item}`"),
            }
        }
        let mut criterion = if descending {
            SortCriterion::desc(path.clone())
        } else {
            SortCriterion::asc(path.clone())
        };
        if ignore_case {
            criterion = criterion.ignore_case();
        }
        if !sort.push(criterion) {
            log::warn!("duplicate sort property `{path}` in `{text}` ignored");
        }
    }
    Ok(sort)
}

fn parameter_kind(ty: &Type) -> ParameterKind {
    match last_ident(ty).as_deref() {
        Some("Limit") => ParameterKind::Limit,
        Some("Sort" | "SortSpec") => ParameterKind::Sort,
        Some("PageRequest" | "Pageable") => ParameterKind::PageRequest,
        _ => ParameterKind::Value,
    }
}

fn return_shape(ty: &Type) -> ReturnShape {
    if let Type::Tuple(tuple) = ty {
        if tuple.elems.is_empty() {
            return ReturnShape::Unit;
        }
    }
    match last_ident(ty).as_deref() {
        // Unwrap `Result<T, E>` and judge by `T`
        Some("Result") => first_generic(ty).map(return_shape).unwrap_or(ReturnShape::Unit),
        Some("Vec" | "List" | "Stream") => ReturnShape::Collection,
        Some("Page" | "PageResult" | "CursoredPage") => ReturnShape::Page,
        Some("bool") => ReturnShape::Boolean,
        Some("u8" | "u16" | "u32" | "u64" | "usize" | "i32" | "i64" | "isize") => ReturnShape::Number,
        _ => ReturnShape::Entity,
    }
}

fn scalar_kind(ty: &Type) -> Option<ValueKind> {
    if let Type::Reference(reference) = ty {
        return scalar_kind(&reference.elem);
    }
    let kind = match last_ident(ty)?.as_str() {
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" => ValueKind::Int,
        "f32" | "f64" => ValueKind::Float,
        "String" | "str" => ValueKind::Text,
        "bool" => ValueKind::Bool,
        "Decimal" => ValueKind::Decimal,
        "Uuid" => ValueKind::Uuid,
        "DateTime" | "NaiveDateTime" => ValueKind::Timestamp,
        "NaiveDate" => ValueKind::Date,
        _ => return None,
    };
    Some(kind)
}

/// Check if a type is Option<T> and return T
fn unwrap_option(ty: &Type) -> &Type {
    match last_ident(ty).as_deref() {
        Some("Option") => first_generic(ty).unwrap_or(ty),
        _ => ty,
    }
}

fn last_ident(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string()),
        _ => None,
    }
}

fn first_generic(ty: &Type) -> Option<&Type> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    })
}

fn id_field(item: &ItemStruct) -> Option<&syn::Field> {
    item.fields
        .iter()
        .find(|f| has_attribute(&f.attrs, "id") || has_attribute(&f.attrs, "primary_key"))
}

fn property_name(field: &syn::Field) -> anyhow::Result<String> {
    if let Some(name) = extract_string(&field.attrs, "property") {
        return Ok(name);
    }
    let ident = field
        .ident
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("Unnamed fields not supported"))?;
    let raw = ident.to_string();
    Ok(to_lower_camel_case(raw.trim_start_matches("r#")))
}

/// Extract a string value from `#[name = "..."]` or `#[name("...")]`
fn extract_string(attrs: &[Attribute], name: &str) -> Option<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident(name))
        .find_map(attr_string)
}

fn attr_string(attr: &Attribute) -> Option<String> {
    if let Ok(meta) = attr.meta.require_name_value() {
        if let syn::Expr::Lit(syn::ExprLit {
            lit: Lit::Str(s), ..
        }) = &meta.value
        {
            return Some(s.value());
        }
    }
    attr.parse_args::<syn::LitStr>().ok().map(|s| s.value())
}

/// Check if an item has a specific attribute
fn has_attribute(attrs: &[Attribute], attr_name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(attr_name))
}

fn to_lower_camel_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut upper_next = false;
    for c in s.chars() {
        if c == '_' {
            upper_next = !result.is_empty();
        } else if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}
