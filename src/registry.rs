//! Declaration registry
//!
//! Compiles each declared repository method once and hands out the shared,
//! immutable plan afterwards. Plans are keyed by [`MethodSignature`]; declaring the
//! same signature again, from any thread, returns the plan that was stored first.

use crate::error::QueryError;
use crate::metadata::EntityMetadata;
use crate::metrics::{self, tracing_helpers};
use crate::query::plan::{MethodDeclaration, ParameterKind, QueryPlan};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Identity of a declared method: entity, name and parameter kinds
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSignature {
    pub entity: String,
    pub method: String,
    pub parameters: Vec<ParameterKind>,
}

impl MethodSignature {
    pub fn of(entity: &str, declaration: &MethodDeclaration) -> Self {
        Self {
            entity: entity.to_string(),
            method: declaration.name.clone(),
            parameters: declaration.parameters.clone(),
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}(", self.entity, self.method)?;
        for (i, p) in self.parameters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{p:?}")?;
        }
        write!(f, ")")
    }
}

/// Signature-keyed table of compiled plans
#[derive(Debug, Default)]
pub struct DeclarationRegistry {
    plans: RwLock<HashMap<MethodSignature, Arc<QueryPlan>>>,
}

impl DeclarationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a declaration.
    ///
    /// # Returns
    ///
    /// The stored plan. If the signature is already registered, the existing
    /// plan is returned and the declaration is not compiled again.
    ///
    /// # Errors
    ///
    /// Any declaration error from [`QueryPlan::compile`]. Nothing is stored for
    /// a rejected declaration.
    pub fn declare(
        &self,
        declaration: &MethodDeclaration,
        metadata: &dyn EntityMetadata,
    ) -> Result<Arc<QueryPlan>, QueryError> {
        let signature = MethodSignature::of(metadata.entity_name(), declaration);
        if let Some(plan) = self.get(&signature)? {
            return Ok(plan);
        }

        let _span =
            tracing_helpers::compile_declaration_span(&signature.entity, &signature.method).entered();
        let plan = match QueryPlan::compile(declaration, metadata) {
            Ok(plan) => Arc::new(plan),
            Err(e) => {
                log::warn!("rejected declaration {signature}: {e}");
                metrics::record_declaration_error(e.kind());
                return Err(e);
            }
        };

        let mut plans = self.plans.write().map_err(|e| {
            QueryError::Execution(format!("failed to lock declaration registry: {e}"))
        })?;
        // Another thread may have compiled the same signature meanwhile; keep the first
        let stored = plans.entry(signature).or_insert_with(|| {
            log::debug!("compiled {plan}");
            metrics::record_declaration();
            Arc::clone(&plan)
        });
        Ok(Arc::clone(stored))
    }

    /// Compile every declaration of one entity, stopping at the first error.
    pub fn declare_all(
        &self,
        declarations: &[MethodDeclaration],
        metadata: &dyn EntityMetadata,
    ) -> Result<Vec<Arc<QueryPlan>>, QueryError> {
        declarations
            .iter()
            .map(|d| self.declare(d, metadata))
            .collect()
    }

    pub fn get(&self, signature: &MethodSignature) -> Result<Option<Arc<QueryPlan>>, QueryError> {
        let plans = self.plans.read().map_err(|e| {
            QueryError::Execution(format!("failed to lock declaration registry: {e}"))
        })?;
        Ok(plans.get(signature).cloned())
    }

    /// Look a plan up by entity and method name when the name is not overloaded.
    pub fn find(&self, entity: &str, method: &str) -> Result<Option<Arc<QueryPlan>>, QueryError> {
        let plans = self.plans.read().map_err(|e| {
            QueryError::Execution(format!("failed to lock declaration registry: {e}"))
        })?;
        let mut matches = plans
            .iter()
            .filter(|(sig, _)| sig.entity == entity && sig.method == method);
        match (matches.next(), matches.next()) {
            (Some((_, plan)), None) => Ok(Some(Arc::clone(plan))),
            (None, _) => Ok(None),
            (Some(_), Some(_)) => Err(QueryError::InvalidArgument(format!(
                "`{entity}::{method}` is overloaded; look it up by signature"
            ))),
        }
    }

    /// Registered signatures, sorted.
    pub fn signatures(&self) -> Vec<MethodSignature> {
        let mut signatures: Vec<MethodSignature> = match self.plans.read() {
            Ok(plans) => plans.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        signatures.sort();
        signatures
    }

    pub fn len(&self) -> usize {
        self.signatures().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EntityModel;
    use crate::query::plan::ReturnShape;
    use crate::value::ValueKind;
    use std::thread;

    fn person() -> EntityModel {
        EntityModel::new("Person")
            .id("id", ValueKind::Int)
            .property("lastName", ValueKind::Text)
            .property("age", ValueKind::Int)
    }

    #[test]
    fn test_same_signature_returns_same_plan() {
        let registry = DeclarationRegistry::new();
        let declaration = MethodDeclaration::new("findByLastName", ReturnShape::Collection).values(1);
        let first = registry.declare(&declaration, &person()).unwrap();
        let second = registry.declare(&declaration, &person()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rejected_declaration_is_not_stored() {
        let registry = DeclarationRegistry::new();
        let declaration = MethodDeclaration::new("findByShoeSize", ReturnShape::Collection).values(1);
        assert!(registry.declare(&declaration, &person()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_declaration_is_idempotent() {
        let registry = Arc::new(DeclarationRegistry::new());
        let model = Arc::new(person());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let model = Arc::clone(&model);
                thread::spawn(move || {
                    let declaration =
                        MethodDeclaration::new("findByAgeGreaterThan", ReturnShape::Collection).values(1);
                    registry.declare(&declaration, model.as_ref()).unwrap()
                })
            })
            .collect();
        let plans: Vec<Arc<QueryPlan>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(plans.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_find_by_name() {
        let registry = DeclarationRegistry::new();
        let model = person();
        registry
            .declare(&MethodDeclaration::new("findByAge", ReturnShape::Collection).values(1), &model)
            .unwrap();
        assert!(registry.find("Person", "findByAge").unwrap().is_some());
        assert!(registry.find("Person", "findByLastName").unwrap().is_none());

        registry
            .declare(
                &MethodDeclaration::new("findByAge", ReturnShape::Collection)
                    .values(1)
                    .param(ParameterKind::Limit),
                &model,
            )
            .unwrap();
        assert!(registry.find("Person", "findByAge").is_err());
        assert_eq!(
            registry.signatures()[0].to_string(),
            "Person::findByAge(Value)"
        );
    }
}
