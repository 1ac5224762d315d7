//! Validation System - OpenAPI Structural Checks
//!
//! Rules produce structured violations.
//! A failed validation is reported, it never undoes a merge.

use std::fs;
use std::path::{Path, PathBuf};

use openapiv3::OpenAPI;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::tree::{yaml_documents, Node};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    /// JSON pointer of the offending node.
    pub pointer: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl ValidationViolation {
    fn error(rule: &str, pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.to_string(),
            severity: ViolationSeverity::Error,
            pointer: pointer.into(),
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    fn expected(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub file: Option<PathBuf>,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn from_violations(file: Option<PathBuf>, violations: Vec<ValidationViolation>) -> Self {
        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        Self { valid, file, violations }
    }

    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    /// One line per violation, for log output.
    pub fn diagnostic(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{} {}: {}", v.rule, display_pointer(&v.pointer), v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates a written specification file.
pub trait SpecValidator {
    fn validate_file(&self, path: &Path) -> ValidationResult;
}

/// Validation rule trait - produces violations
pub trait SpecRule {
    fn name(&self) -> &'static str;
    fn check(&self, document: &Node) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

pub struct OpenApiVersionRule;

impl SpecRule for OpenApiVersionRule {
    fn name(&self) -> &'static str {
        "openapi_version"
    }

    fn check(&self, document: &Node) -> Vec<ValidationViolation> {
        if document.get("swagger").is_some() {
            return vec![ValidationViolation::error(
                self.name(),
                "/swagger",
                "Swagger 2.0 documents are not supported",
            )];
        }

        match document.get("openapi") {
            None => vec![ValidationViolation::error(self.name(), "/openapi", "missing openapi version field")],
            Some(Node::String(raw)) => match parse_version(raw) {
                Some(version) if version.major == 3 => vec![],
                Some(_) => vec![ValidationViolation::error(self.name(), "/openapi", "unsupported OpenAPI version")
                    .expected("3.x.y", raw.clone())],
                None => vec![ValidationViolation::error(self.name(), "/openapi", "openapi version is not a semantic version")
                    .expected("3.x.y", raw.clone())],
            },
            Some(other) => vec![ValidationViolation::error(self.name(), "/openapi", "openapi version must be a string")
                .expected("string", other.kind().to_string())],
        }
    }
}

pub struct InfoRule;

impl SpecRule for InfoRule {
    fn name(&self) -> &'static str {
        "info"
    }

    fn check(&self, document: &Node) -> Vec<ValidationViolation> {
        let Some(info) = document.get("info") else {
            return vec![ValidationViolation::error(self.name(), "/info", "missing info object")];
        };
        if info.as_mapping().is_none() {
            return vec![ValidationViolation::error(self.name(), "/info", "info must be a mapping")
                .expected("mapping", info.kind().to_string())];
        }

        let mut violations = vec![];
        for field in ["title", "version"] {
            match info.get(field) {
                Some(Node::String(_)) => {}
                Some(other) => violations.push(
                    ValidationViolation::error(self.name(), format!("/info/{}", field), format!("info.{} must be a string", field))
                        .expected("string", other.kind().to_string()),
                ),
                None => violations.push(ValidationViolation::error(
                    self.name(),
                    format!("/info/{}", field),
                    format!("missing info.{}", field),
                )),
            }
        }
        violations
    }
}

const OPERATIONS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

pub struct PathsRule;

impl SpecRule for PathsRule {
    fn name(&self) -> &'static str {
        "paths"
    }

    fn check(&self, document: &Node) -> Vec<ValidationViolation> {
        let Some(paths) = document.get("paths") else {
            return self.check_required(document);
        };
        let Some(paths) = paths.as_mapping() else {
            return vec![ValidationViolation::error(self.name(), "/paths", "paths must be a mapping")
                .expected("mapping", paths.kind().to_string())];
        };

        let mut violations = vec![];
        for (path, item) in paths {
            let item_pointer = format!("/paths/{}", escape_pointer(path));
            if !path.starts_with('/') {
                violations.push(ValidationViolation::error(
                    self.name(),
                    item_pointer.clone(),
                    format!("path `{}` must start with `/`", path),
                ));
            }
            let Some(item) = item.as_mapping() else {
                violations.push(
                    ValidationViolation::error(self.name(), item_pointer, "path item must be a mapping")
                        .expected("mapping", item.kind().to_string()),
                );
                continue;
            };

            for (method, operation) in item.iter().filter(|(k, _)| OPERATIONS.contains(&k.as_str())) {
                let pointer = format!("{}/{}", item_pointer, method);
                match operation.get("responses").and_then(Node::as_mapping) {
                    Some(responses) if !responses.is_empty() => {}
                    _ if operation.as_mapping().is_none() => violations.push(
                        ValidationViolation::error(self.name(), pointer, "operation must be a mapping")
                            .expected("mapping", operation.kind().to_string()),
                    ),
                    _ => violations.push(ValidationViolation::error(
                        self.name(),
                        format!("{}/responses", pointer),
                        format!("{} {} has no responses", method.to_uppercase(), path),
                    )),
                }
            }
        }
        violations
    }
}

impl PathsRule {
    fn check_required(&self, document: &Node) -> Vec<ValidationViolation> {
        let version = document.get("openapi").and_then(Node::as_str).and_then(parse_version);
        let is_31 = version.map_or(false, |v| v.major == 3 && v.minor >= 1);
        if is_31 {
            if ["components", "webhooks"].iter().any(|k| document.get(k).is_some()) {
                return vec![];
            }
            return vec![ValidationViolation::error(
                self.name(),
                "/paths",
                "one of paths, components or webhooks is required",
            )];
        }
        vec![ValidationViolation::error(self.name(), "/paths", "missing paths object")]
    }
}

pub struct LocalRefsRule;

impl SpecRule for LocalRefsRule {
    fn name(&self) -> &'static str {
        "local_refs"
    }

    fn check(&self, document: &Node) -> Vec<ValidationViolation> {
        let mut violations = vec![];
        self.walk(document, document, &mut String::new(), &mut violations);
        violations
    }
}

impl LocalRefsRule {
    fn walk(&self, root: &Node, node: &Node, pointer: &mut String, violations: &mut Vec<ValidationViolation>) {
        match node {
            Node::Mapping(map) => {
                for (key, child) in map {
                    let len = pointer.len();
                    pointer.push('/');
                    pointer.push_str(&escape_pointer(key));
                    if key == "$ref" {
                        if let Node::String(target) = child {
                            if let Some(local) = target.strip_prefix('#') {
                                if resolve_pointer(root, local).is_none() {
                                    violations.push(
                                        ValidationViolation::error(self.name(), pointer.clone(), "unresolved reference")
                                            .expected("existing target", target.clone()),
                                    );
                                }
                            }
                        }
                    } else {
                        self.walk(root, child, pointer, violations);
                    }
                    pointer.truncate(len);
                }
            }
            Node::Sequence(items) => {
                for (index, child) in items.iter().enumerate() {
                    let len = pointer.len();
                    pointer.push_str(&format!("/{}", index));
                    self.walk(root, child, pointer, violations);
                    pointer.truncate(len);
                }
            }
            _ => {}
        }
    }
}

/// Validator orchestrates the OpenAPI rules
pub struct OpenApiValidator {
    rules: Vec<Box<dyn SpecRule>>,
}

impl OpenApiValidator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(OpenApiVersionRule),
                Box::new(InfoRule),
                Box::new(PathsRule),
                Box::new(LocalRefsRule),
            ],
        }
    }

    pub fn validate(&self, document: &Node) -> ValidationResult {
        let violations = self.rules.iter().flat_map(|rule| rule.check(document)).collect();
        ValidationResult::from_violations(None, violations)
    }
}

impl SpecValidator for OpenApiValidator {
    fn validate_file(&self, path: &Path) -> ValidationResult {
        let result = match load_document(path) {
            Ok((text, document)) => {
                let mut violations = model_violations(&text, &document);
                violations.extend(self.validate(&document).violations);
                ValidationResult::from_violations(Some(path.to_path_buf()), violations)
            }
            Err(message) => ValidationResult::from_violations(
                Some(path.to_path_buf()),
                vec![ValidationViolation::error("parse", "", message)],
            ),
        };

        if result.valid {
            info!(path = %path.display(), "OpenAPI validation: definition file is valid");
        } else {
            warn!(path = %path.display(), diagnostic = %result.diagnostic(), "OpenAPI validation failed");
        }
        result
    }
}

impl Default for OpenApiValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn load_document(path: &Path) -> Result<(String, Node), String> {
    let text = fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    // JSON output parses as YAML as well.
    let mut documents = yaml_documents(&text).map_err(|e| e.to_string())?;
    if documents.len() != 1 {
        return Err(format!("expected one document, found {}", documents.len()));
    }
    let document = Node::from_yaml(documents.remove(0), "").map_err(|e| e.to_string())?;
    Ok((text, document))
}

/// Full object-model parse of a 3.0.x document. Other versions are left to
/// the structural rules, the model only covers 3.0.
fn model_violations(text: &str, document: &Node) -> Vec<ValidationViolation> {
    let version = document.get("openapi").and_then(Node::as_str).and_then(parse_version);
    if !version.map_or(false, |v| v.major == 3 && v.minor == 0) {
        return vec![];
    }

    match serde_yaml::from_str::<OpenAPI>(text) {
        Ok(_) => vec![],
        Err(e) => vec![ValidationViolation::error("openapi_model", "", format!("Failed to parse OpenAPI spec: {}", e))],
    }
}

/// Accepts `3.1` as shorthand for `3.1.0`.
fn parse_version(raw: &str) -> Option<semver::Version> {
    let raw = raw.trim();
    let padded = match raw.matches('.').count() {
        1 => format!("{}.0", raw),
        _ => raw.to_string(),
    };
    semver::Version::parse(&padded).ok()
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_pointer(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Resolve a JSON pointer (`/a/b/0`) inside `root`. The empty pointer is the root.
pub fn resolve_pointer<'a>(root: &'a Node, pointer: &str) -> Option<&'a Node> {
    if pointer.is_empty() {
        return Some(root);
    }
    let pointer = pointer.strip_prefix('/')?;
    pointer.split('/').try_fold(root, |node, segment| {
        let segment = unescape_pointer(segment);
        match node {
            Node::Mapping(map) => map.get(&segment),
            Node::Sequence(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

fn display_pointer(pointer: &str) -> &str {
    if pointer.is_empty() {
        "/"
    } else {
        pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(text: &str) -> Node {
        Node::from_yaml(serde_yaml::from_str(text).unwrap(), "").unwrap()
    }

    const VALID: &str = r##"
openapi: 3.0.3
info:
  title: Pets
  version: "1.0"
paths:
  /pets/{id}:
    get:
      responses:
        200:
          description: ok
          content:
            application/json:
              schema:
                $ref: "#/components/schemas/Pet"
components:
  schemas:
    Pet:
      type: object
"##;

    fn rules_violated(text: &str) -> Vec<String> {
        let result = OpenApiValidator::new().validate(&parse(text));
        result.violations.into_iter().map(|v| v.rule).collect()
    }

    #[test]
    fn test_valid_document() {
        let result = OpenApiValidator::new().validate(&parse(VALID));
        assert!(result.valid, "{}", result.diagnostic());
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_version_checks() {
        assert!(rules_violated("openapi: 2.0.0\ninfo: {title: t, version: v}\npaths: {}").contains(&"openapi_version".to_string()));
        assert!(rules_violated("openapi: 3.1\ninfo: {title: t, version: v}\npaths: {}").contains(&"openapi_version".to_string()));
        assert!(rules_violated("openapi: '3.1'\ninfo: {title: t, version: v}\npaths: {}").is_empty());
        assert!(rules_violated("swagger: '2.0'\ninfo: {title: t, version: v}\npaths: {}").contains(&"openapi_version".to_string()));
    }

    #[test]
    fn test_info_fields() {
        let result = OpenApiValidator::new().validate(&parse("openapi: 3.0.0\ninfo: {title: t}\npaths: {}"));
        assert!(!result.valid);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].pointer, "/info/version");
    }

    #[test]
    fn test_paths_required_by_version() {
        assert!(rules_violated("openapi: 3.0.0\ninfo: {title: t, version: v}").contains(&"paths".to_string()));
        assert!(rules_violated("openapi: 3.1.0\ninfo: {title: t, version: v}\ncomponents: {}").is_empty());
    }

    #[test]
    fn test_operation_without_responses() {
        let result = OpenApiValidator::new()
            .validate(&parse("openapi: 3.0.0\ninfo: {title: t, version: v}\npaths:\n  /a/b:\n    post: {}\n  c: {}\n"));
        let pointers: Vec<_> = result.violations.iter().map(|v| v.pointer.as_str()).collect();
        assert_eq!(pointers, vec!["/paths/~1a~1b/post/responses", "/paths/c"]);
    }

    #[test]
    fn test_unresolved_local_ref() {
        let text = VALID.replace("#/components/schemas/Pet", "#/components/schemas/Dog");
        let result = OpenApiValidator::new().validate(&parse(&text));
        assert!(!result.valid);
        assert_eq!(result.violations[0].rule, "local_refs");
        assert_eq!(
            result.violations[0].pointer,
            "/paths/~1pets~1{id}/get/responses/200/content/application~1json/schema/$ref"
        );
    }

    #[test]
    fn test_external_refs_ignored() {
        let text = VALID.replace("#/components/schemas/Pet", "common.yaml#/Pet");
        assert!(OpenApiValidator::new().validate(&parse(&text)).valid);
    }

    #[test]
    fn test_resolve_pointer_escapes() {
        let doc = parse("a:\n  b/c: [x, {d~e: 1}]\n");
        assert_eq!(resolve_pointer(&doc, "/a/b~1c/1/d~0e"), Some(&Node::Int(1)));
        assert_eq!(resolve_pointer(&doc, "/a/missing"), None);
        assert_eq!(resolve_pointer(&doc, ""), Some(&doc));
    }

    fn write_spec(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("openapi.yaml");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(&dir, &VALID.replace("        200:", "        '200':"));
        let result = OpenApiValidator::new().validate_file(&path);
        assert!(result.valid, "{}", result.diagnostic());
        assert_eq!(result.file, Some(path));
    }

    #[test]
    fn test_model_errors_reported_for_file() {
        let text = r#"
openapi: 3.0.3
info:
  title: Pets
  version: "1.0"
  contact: 5
servers: not-a-list
paths:
  /pets:
    get:
      parameters:
        - name: limit
      responses:
        '200':
          description: 7
components:
  schemas: [1, 2]
"#;
        let dir = TempDir::new().unwrap();
        let path = write_spec(&dir, text);

        // The structural rules alone accept this document.
        assert!(OpenApiValidator::new().validate(&parse(text)).valid);

        let result = OpenApiValidator::new().validate_file(&path);
        assert!(!result.valid);
        let model = result.violations.iter().find(|v| v.rule == "openapi_model").unwrap();
        assert!(model.message.contains("info.contact"), "{}", model.message);
    }

    #[test]
    fn test_model_skipped_for_31() {
        let dir = TempDir::new().unwrap();
        let path = write_spec(&dir, "openapi: 3.1.0\ninfo: {title: t, version: v}\nwebhooks: {}\n");
        assert!(OpenApiValidator::new().validate_file(&path).valid);
    }

    #[test]
    fn test_unreadable_file_is_invalid() {
        let result = OpenApiValidator::new().validate_file(Path::new("/nonexistent/spec.yaml"));
        assert!(!result.valid);
        assert_eq!(result.violations[0].rule, "parse");
    }
}
