//! Specmerge Core - Spec Fragment Merger
//!
//! # Ground Rules
//! 1. File Order Is Precedence
//! 2. Mappings Merge, Everything Else Overwrites
//! 3. Conflicts Abort the Run
//! 4. Validation Reports, Never Blocks
//! 5. Scope Is Injected, Never Ambient

pub mod config;
pub mod fragments;
pub mod hashing;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod scope;
pub mod templates;
pub mod tree;
pub mod validation;

pub use config::PipelineConfig;
pub use fragments::{FileOrder, FragmentSet};
pub use hashing::content_digest;
pub use merge::{merge, merge_documents, MergeError, MergeEvent, MergeObserver, MergeStats, Merger};
pub use output::{OutputFormat, WrittenOutput};
pub use pipeline::{MergeOutcome, MergePipeline, PipelineError};
pub use scope::MergeScope;
pub use templates::{EscapeMode, TemplateConfig, UnresolvedPolicy};
pub use tree::{Mapping, Node, NodeKind};
pub use validation::{OpenApiValidator, SpecValidator, ValidationResult, ValidationViolation, ViolationSeverity};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
