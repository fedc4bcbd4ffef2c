//! SeldonLab Core — datasets, constraint parse trees, confidence bounds,
//! base models, and the constrained training engine.
//!
//! This crate contains the statistical heart of the framework:
//! - Datasets with sensitive-group indicator columns, CSV loading, synthetic data
//! - Student-t confidence bounds with forward-mode gradients
//! - Constraint parse trees compiled from strings like
//!   `min((ACC | [a])/(ACC | [b]), (ACC | [b])/(ACC | [a])) >= 0.8`
//! - Base models with analytic Jacobians and primary objectives
//! - The `Specification` bundle and its deterministic candidate/safety split
//! - Lagrangian candidate search plus a safety test that returns either a
//!   high-confidence solution or No Solution Found

pub mod data;
pub mod models;
pub mod parse_tree;
pub mod rng;
pub mod seldonian;
pub mod spec;
pub mod stats;

pub use data::Dataset;
pub use parse_tree::{make_parse_trees, ParseError, ParseTree};
pub use seldonian::{run_seldonian, EngineError, EngineFailure, Outcome, SeldonianResult};
pub use spec::{SpecError, SpecOptions, Specification};
