//! Compile declarations and describe the outcome

use crate::loader::Inspection;
use colored::Colorize;
use seawall::registry::{DeclarationRegistry, MethodSignature};
use seawall::QueryError;
use serde::Serialize;
use std::fmt::Write as _;

/// Outcome of one declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodReport {
    pub signature: String,
    /// Compiled plan, rendered as text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
}

impl From<&QueryError> for ErrorReport {
    fn from(e: &QueryError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Every declaration of one entity, in input order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub entity: String,
    pub methods: Vec<MethodReport>,
}

impl Report {
    /// Validate the entity model, then compile each declaration independently.
    pub fn build(inspection: &Inspection) -> anyhow::Result<Report> {
        let entity = &inspection.entity;
        entity
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid entity model: {e}"))?;

        let registry = DeclarationRegistry::new();
        let methods = inspection
            .methods
            .iter()
            .map(|declaration| {
                let signature = MethodSignature::of(&entity.name, declaration).to_string();
                match registry.declare(declaration, entity) {
                    Ok(plan) => MethodReport {
                        signature,
                        plan: Some(plan.to_string()),
                        error: None,
                    },
                    Err(e) => MethodReport {
                        signature,
                        plan: None,
                        error: Some(ErrorReport::from(&e)),
                    },
                }
            })
            .collect();

        log::debug!("compiled {} plan(s) for {}", registry.len(), entity.name);
        Ok(Report {
            entity: entity.name.clone(),
            methods,
        })
    }

    pub fn error_count(&self) -> usize {
        self.methods.iter().filter(|m| m.error.is_some()).count()
    }

    pub fn is_clean(&self) -> bool {
        self.error_count() == 0
    }

    /// Human-readable listing, one block per method.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.entity.bold());
        for method in &self.methods {
            match (&method.plan, &method.error) {
                (_, Some(error)) => {
                    let _ = writeln!(out, "  {} {}", "✗".red(), method.signature);
                    let _ = writeln!(out, "      {} {}", error.kind.red(), error.message);
                }
                (Some(plan), None) => {
                    let _ = writeln!(out, "  {} {}", "✓".green(), method.signature);
                    let _ = writeln!(out, "      {plan}");
                }
                (None, None) => {}
            }
        }
        let _ = writeln!(
            out,
            "  {} method(s), {} error(s)",
            self.methods.len(),
            self.error_count()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seawall::query::{ParameterKind, ReturnShape};
    use seawall::{EntityModel, MethodDeclaration, ValueKind};

    fn inspection(methods: Vec<MethodDeclaration>) -> Inspection {
        Inspection {
            entity: EntityModel::new("Product")
                .id("id", ValueKind::Int)
                .property("name", ValueKind::Text)
                .property("price", ValueKind::Float),
            methods,
        }
    }

    #[test]
    fn test_mixed_outcomes() {
        let report = Report::build(&inspection(vec![
            MethodDeclaration::new("findByNameLike", ReturnShape::Collection).values(1),
            MethodDeclaration::new("findByWeight", ReturnShape::Collection).values(1),
            MethodDeclaration::new("findByPrice", ReturnShape::Page)
                .values(1)
                .param(ParameterKind::PageRequest),
        ]))
        .unwrap();

        assert_eq!(report.methods.len(), 3);
        assert_eq!(report.error_count(), 1);
        assert!(report.methods[0].plan.is_some());
        assert_eq!(
            report.methods[1].error.as_ref().map(|e| e.kind),
            Some("invalid_property")
        );
        assert!(report.to_text().contains("3 method(s), 1 error(s)"));
    }

    #[test]
    fn test_json_shape() {
        let report = Report::build(&inspection(vec![
            MethodDeclaration::new("countByPriceLessThan", ReturnShape::Number).values(1),
        ]))
        .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entity"], "Product");
        assert_eq!(json["methods"][0]["signature"], "Product::countByPriceLessThan(Value)");
        assert!(json["methods"][0].get("error").is_none());
    }

    #[test]
    fn test_invalid_model_is_rejected() {
        let bad = Inspection {
            entity: EntityModel::new("Nothing"),
            methods: Vec::new(),
        };
        assert!(Report::build(&bad).is_err());
    }
}
