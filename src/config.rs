//! Pipeline Configuration
//!
//! Loadable from a YAML or JSON file; every field except `folder` has a
//! default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fragments::FileOrder;
use crate::pipeline::PipelineError;
use crate::templates::TemplateConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Folder holding the fragment files.
    pub folder: PathBuf,
    /// Fragment merged before all others, by file name.
    #[serde(default)]
    pub fragment_file: Option<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub order: FileOrder,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Output file name without extension.
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_true")]
    pub emit_yaml: bool,
    #[serde(default)]
    pub emit_json: bool,
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default)]
    pub template: TemplateConfig,
}

fn default_true() -> bool { true }

fn default_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

fn default_output_dir() -> PathBuf { PathBuf::from("output") }

fn default_output_file() -> String { "openapi".to_string() }

impl PipelineConfig {
    /// Configuration for the four location settings; the rest is defaulted.
    pub fn new(
        folder: impl Into<PathBuf>,
        fragment_file: Option<String>,
        output_dir: impl Into<PathBuf>,
        output_file: impl Into<String>,
    ) -> Self {
        Self {
            folder: folder.into(),
            fragment_file,
            output_dir: output_dir.into(),
            output_file: output_file.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // serde_yaml also accepts JSON input.
        let config: PipelineConfig = serde_yaml::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), PipelineError> {
        if self.extensions.is_empty() {
            return Err(PipelineError::Config("at least one fragment extension is required".into()));
        }
        if self.output_file.is_empty() || self.output_file.contains(['/', '\\']) {
            return Err(PipelineError::Config(format!(
                "output file `{}` must be a plain file name",
                self.output_file
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            fragment_file: None,
            extensions: default_extensions(),
            order: FileOrder::default(),
            output_dir: default_output_dir(),
            output_file: default_output_file(),
            emit_yaml: true,
            emit_json: false,
            validate: true,
            template: TemplateConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::UnresolvedPolicy;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_applied() {
        let config: PipelineConfig = serde_yaml::from_str("folder: specs\n").unwrap();
        assert_eq!(config.folder, PathBuf::from("specs"));
        assert_eq!(config.extensions, vec!["yaml", "yml"]);
        assert_eq!(config.output_file, "openapi");
        assert!(config.emit_yaml && !config.emit_json && config.validate);
        assert_eq!(config.order, FileOrder::Name);
    }

    #[test]
    fn test_load_json_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("merge.json");
        fs::write(
            &path,
            r#"{"folder": "in", "outputDir": "out", "emitJson": true, "order": "listing",
                "template": {"unresolved": "error"}}"#,
        )
        .unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert!(config.emit_json);
        assert_eq!(config.order, FileOrder::Listing);
        assert_eq!(config.template.unresolved, UnresolvedPolicy::Error);
    }

    #[test]
    fn test_rejects_bad_output_file() {
        let config = PipelineConfig::new("in", None, "out", "nested/name");
        assert!(matches!(config.check(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PipelineConfig::load(Path::new("/nonexistent/merge.yaml")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
