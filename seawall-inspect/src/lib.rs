//! Seawall Inspect Library
//!
//! Loads entity metadata and repository method declarations, compiles them with
//! seawall and reports each compiled plan or declaration error. The binary in
//! `main.rs` is a thin clap front end over [`loader`] and [`report`].

pub mod loader;
pub mod report;

pub use loader::{load_dir, load_entity, load_file, parse_rust_source, Inspection};
pub use report::{ErrorReport, MethodReport, Report};
