//! Output Writers - YAML and JSON Emission

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::hashing::sha256_hex;
use crate::tree::Node;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrittenOutput {
    pub path: PathBuf,
    pub format: OutputFormat,
    pub bytes: usize,
    pub sha256: String,
}

/// Serialize a document in the given format.
pub fn render(document: &Node, format: OutputFormat) -> Result<String, OutputError> {
    let text = match format {
        OutputFormat::Yaml => serde_yaml::to_string(document)?,
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(document)?;
            json.push('\n');
            json
        }
    };
    Ok(text)
}

/// Path of the output file `stem.<ext>` inside `dir`.
pub fn output_path(dir: &Path, stem: &str, format: OutputFormat) -> PathBuf {
    dir.join(format!("{}.{}", stem, format.extension()))
}

/// Write `document` to `dir/stem.<ext>`, creating `dir` when missing.
pub fn write_document(
    document: &Node,
    dir: &Path,
    stem: &str,
    format: OutputFormat,
) -> Result<WrittenOutput, OutputError> {
    let text = render(document, format)?;

    fs::create_dir_all(dir).map_err(|source| OutputError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = output_path(dir, stem, format);
    fs::write(&path, &text).map_err(|source| OutputError::Io {
        path: path.clone(),
        source,
    })?;

    info!(path = %path.display(), bytes = text.len(), "wrote merged specification");

    Ok(WrittenOutput {
        path,
        format,
        bytes: text.len(),
        sha256: sha256_hex(text.as_bytes()),
    })
}
