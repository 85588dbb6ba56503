//! Policy loading and evaluation for fetchgate.
//!
//! This module provides the JSON policy store ([`store`]), the URL pattern
//! language ([`pattern`]), the declarative request handlers ([`handler`]),
//! and the first-match evaluation engine ([`engine`]) that decides whether
//! each outbound request is allowed to run.

pub mod engine;
pub mod handler;
pub mod pattern;
pub mod store;

pub use engine::{EvaluationResult, PolicyEngine, RequestContext};
pub use store::{PolicySet, PolicyStore, PolicySummary};
