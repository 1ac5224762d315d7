//! Merge Pipeline - Single Entry Point
//!
//! fragments -> template substitution -> parse -> merge -> write -> validate
//!
//! Merge and I/O failures abort the run. Validation failures are recorded in
//! the outcome and never abort it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::fragments::FragmentSet;
use crate::hashing::content_digest;
use crate::merge::{MergeError, MergeStats, Merger};
use crate::output::{write_document, OutputError, OutputFormat, WrittenOutput};
use crate::scope::MergeScope;
use crate::templates::{self, TemplateError};
use crate::tree::{yaml_documents, Node, NodeKind};
use crate::validation::{OpenApiValidator, SpecValidator, ValidationResult};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Template error in {file}: {source}")]
    Template {
        file: PathBuf,
        #[source]
        source: TemplateError,
    },

    #[error("YAML parse error in {file}: {source}")]
    Parse {
        file: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Fragment {file} must contain a mapping at its root, found {kind}")]
    NotAMapping { file: PathBuf, kind: NodeKind },

    #[error("Merge failed in {file}: {source}")]
    Merge {
        file: PathBuf,
        #[source]
        source: MergeError,
    },

    #[error(transparent)]
    Output(#[from] OutputError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// The merge error behind this failure, if any.
    pub fn merge_error(&self) -> Option<&MergeError> {
        match self {
            PipelineError::Merge { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub engine_version: String,
    pub finished_at: DateTime<Utc>,
    pub fragments: Vec<PathBuf>,
    pub stats: MergeStats,
    /// Key-order independent SHA-256 of `merged`.
    pub digest: String,
    pub outputs: Vec<WrittenOutput>,
    pub validations: Vec<ValidationResult>,
    #[serde(skip)]
    pub merged: Node,
}

impl MergeOutcome {
    /// True when every written output passed validation.
    pub fn valid(&self) -> bool {
        self.validations.iter().all(|v| v.valid)
    }
}

/// The merge pipeline - one configured run over a fragment folder
pub struct MergePipeline {
    config: PipelineConfig,
    scope: MergeScope,
    validator: Box<dyn SpecValidator>,
}

impl MergePipeline {
    pub fn new(config: PipelineConfig, scope: MergeScope) -> Self {
        Self {
            config,
            scope,
            validator: Box::new(OpenApiValidator::new()),
        }
    }

    /// Replace the OpenAPI validator.
    pub fn with_validator(mut self, validator: Box<dyn SpecValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scope(&self) -> &MergeScope {
        &self.scope
    }

    /// Fragment files in the order they will be merged.
    pub fn fragments(&self) -> Result<Vec<PathBuf>, PipelineError> {
        let mut set = FragmentSet::new(&self.config.folder, self.config.extensions.clone());
        set.order = self.config.order;
        set.root = self.config.fragment_file.clone();
        if same_dir(&self.config.folder, &self.config.output_dir) {
            // Earlier outputs must not be merged back in.
            set.skip = [OutputFormat::Yaml, OutputFormat::Json]
                .iter()
                .map(|f| format!("{}.{}", self.config.output_file, f.extension()))
                .collect();
        }

        set.discover().map_err(|source| PipelineError::Io {
            path: self.config.folder.clone(),
            source,
        })
    }

    /// Merge all fragments without writing anything.
    pub fn merge(&self) -> Result<(Vec<PathBuf>, Merger), PipelineError> {
        self.config.check()?;
        let fragments = self.fragments()?;

        let mut merger = Merger::new();
        for file in &fragments {
            self.fold_fragment(file, &mut merger)?;
        }

        info!(
            fragments = fragments.len(),
            documents = merger.documents_merged(),
            keys = merger.result().len(),
            "merged fragments"
        );
        Ok((fragments, merger))
    }

    /// Merge, write the configured outputs and validate each of them.
    pub fn run(&self) -> Result<MergeOutcome, PipelineError> {
        let (fragments, merger) = self.merge()?;
        let stats = merger.stats();
        let merged = Node::Mapping(merger.into_result());

        let outputs = self.write_outputs(&merged)?;
        let validations = if self.config.validate {
            outputs.iter().map(|o| self.validator.validate_file(&o.path)).collect()
        } else {
            vec![]
        };

        let digest = content_digest(&merged);

        Ok(MergeOutcome {
            engine_version: ENGINE_VERSION.to_string(),
            finished_at: Utc::now(),
            fragments,
            stats,
            digest,
            outputs,
            validations,
            merged,
        })
    }

    pub fn write_outputs(&self, merged: &Node) -> Result<Vec<WrittenOutput>, PipelineError> {
        let formats = [
            (self.config.emit_yaml, OutputFormat::Yaml),
            (self.config.emit_json, OutputFormat::Json),
        ];

        let mut outputs = vec![];
        for (_, format) in formats.into_iter().filter(|(enabled, _)| *enabled) {
            outputs.push(write_document(merged, &self.config.output_dir, &self.config.output_file, format)?);
        }
        Ok(outputs)
    }

    fn fold_fragment(&self, file: &Path, merger: &mut Merger) -> Result<(), PipelineError> {
        let text = fs::read_to_string(file).map_err(|source| PipelineError::Io {
            path: file.to_path_buf(),
            source,
        })?;

        let text = templates::render(&text, &self.scope, &self.config.template).map_err(|source| {
            PipelineError::Template {
                file: file.to_path_buf(),
                source,
            }
        })?;

        let documents = yaml_documents(&text).map_err(|source| PipelineError::Parse {
            file: file.to_path_buf(),
            source,
        })?;

        let merge_err = |source| PipelineError::Merge {
            file: file.to_path_buf(),
            source,
        };

        for value in documents {
            match Node::from_yaml(value, "").map_err(merge_err)? {
                Node::Mapping(document) => {
                    debug!(file = %file.display(), keys = document.len(), "folding document");
                    merger.fold(document).map_err(merge_err)?;
                }
                // Empty documents contribute nothing.
                Node::Null => {}
                other => {
                    return Err(PipelineError::NotAMapping {
                        file: file.to_path_buf(),
                        kind: other.kind(),
                    })
                }
            }
        }

        info!(file = %file.display(), "loaded YAML fragment");
        Ok(())
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
