//! Value type system for Seawall
//!
//! Operands bound to predicate clauses and the last-observed sort keys held in a
//! [`KeysetCursor`](crate::pagination::KeysetCursor) are all [`Value`]s. Every value
//! carries its own type tag, so a cursor flattened to a list of values and read
//! back never loses type information.
//!
//! ## Modules
//!
//! - **`types`** - The `Value` enum, its `ValueKind` tags and conversions
//! - **`compare`** - Total ordering used by in-memory evaluation and keyset checks

pub mod compare;
pub mod types;

pub use compare::compare_values;
pub use types::{Value, ValueKind};
