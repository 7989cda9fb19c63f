//! amend: apply natural-language change requests to generated multi-file projects.
//!
//! A request is classified into one of five scopes, executed by the matching
//! strategy, and backed by a fallback plan that ends in a placeholder write,
//! so every request leaves some valid change behind.

pub mod cache;
pub mod classifier;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executors;
pub mod grammar;
pub mod hasher;
pub mod history;
pub mod mapper;
pub mod orchestrator;
pub mod project_history;
pub mod session;
pub mod store;
pub mod synthesis;
pub mod syntax;
pub mod types;
pub mod workspace;

pub use error::Error;
pub use orchestrator::{Orchestrator, Services};
pub use types::{CancelFlag, ModificationOutcome, ModificationRequest, ModificationScope, ScopeKind};
