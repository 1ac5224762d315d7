//! Template Substitution - Mustache-Style Tags
//!
//! Applied to raw fragment text before it is parsed. Supported tags:
//! `{{name}}`, `{{{name}}}`, `{{&name}}`, `{{!comment}}` and the
//! `{{#name}}..{{/name}}` / `{{^name}}..{{/name}}` sections, which render
//! when the variable is set to a non-empty value (or, inverted, when not).

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scope::MergeScope;

/// What to emit for a variable missing from the scope.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    #[default]
    Empty,
    Keep,
    Error,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscapeMode {
    #[default]
    None,
    Html,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    #[serde(default)]
    pub unresolved: UnresolvedPolicy,
    #[serde(default)]
    pub escape: EscapeMode,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated tag at line {line}")]
    Unterminated { line: usize },

    #[error("invalid tag `{tag}` at line {line}")]
    InvalidTag { tag: String, line: usize },

    #[error("section `{name}` opened at line {line} is never closed")]
    UnclosedSection { name: String, line: usize },

    #[error("closing tag `{name}` at line {line} does not match an open section")]
    UnexpectedClose { name: String, line: usize },

    #[error("unresolved variable `{name}` at line {line}")]
    Unresolved { name: String, line: usize },
}

#[derive(Debug)]
enum Part<'a> {
    Text(&'a str),
    Variable {
        name: &'a str,
        raw: bool,
        line: usize,
        tag: &'a str,
    },
    Section {
        name: &'a str,
        inverted: bool,
        body: Vec<Part<'a>>,
    },
}

enum Tag<'a> {
    Comment,
    Variable { name: &'a str, raw: bool },
    Open { name: &'a str, inverted: bool },
    Close { name: &'a str },
}

struct Frame<'a> {
    name: &'a str,
    inverted: bool,
    line: usize,
    body: Vec<Part<'a>>,
}

/// A parsed template borrowing from the source text.
#[derive(Debug)]
pub struct Template<'a> {
    parts: Vec<Part<'a>>,
}

impl<'a> Template<'a> {
    pub fn parse(text: &'a str) -> Result<Self, TemplateError> {
        let mut parts = vec![];
        let mut stack: Vec<Frame<'a>> = vec![];
        let mut pos = 0;
        let mut line = 1;
        let mut counted = 0;

        while let Some(found) = text[pos..].find("{{") {
            let start = pos + found;
            line += text[counted..start].matches('\n').count();
            counted = start;
            if start > pos {
                current(&mut parts, &mut stack).push(Part::Text(&text[pos..start]));
            }

            let end = tag_end(text, start).ok_or(TemplateError::Unterminated { line })?;
            let tag = &text[start..end];
            pos = end;

            match classify(tag, line)? {
                Tag::Comment => {}
                Tag::Variable { name, raw } => {
                    current(&mut parts, &mut stack).push(Part::Variable { name, raw, line, tag });
                }
                Tag::Open { name, inverted } => stack.push(Frame {
                    name,
                    inverted,
                    line,
                    body: vec![],
                }),
                Tag::Close { name } => {
                    let frame = match stack.pop() {
                        Some(frame) if frame.name == name => frame,
                        _ => {
                            return Err(TemplateError::UnexpectedClose {
                                name: name.to_string(),
                                line,
                            })
                        }
                    };
                    current(&mut parts, &mut stack).push(Part::Section {
                        name: frame.name,
                        inverted: frame.inverted,
                        body: frame.body,
                    });
                }
            }
        }

        if pos < text.len() {
            current(&mut parts, &mut stack).push(Part::Text(&text[pos..]));
        }

        if let Some(frame) = stack.pop() {
            return Err(TemplateError::UnclosedSection {
                name: frame.name.to_string(),
                line: frame.line,
            });
        }

        Ok(Template { parts })
    }

    pub fn render(&self, scope: &MergeScope, config: &TemplateConfig) -> Result<String, TemplateError> {
        let mut out = String::new();
        render_parts(&self.parts, scope, config, &mut out)?;
        Ok(out)
    }

    /// Names of all variables and sections referenced, in order of appearance.
    pub fn variables(&self) -> Vec<&'a str> {
        let mut names = vec![];
        collect_names(&self.parts, &mut names);
        names
    }
}

/// Parse and render `text` in one step.
pub fn render(text: &str, scope: &MergeScope, config: &TemplateConfig) -> Result<String, TemplateError> {
    Template::parse(text)?.render(scope, config)
}

fn current<'p, 'a>(parts: &'p mut Vec<Part<'a>>, stack: &'p mut [Frame<'a>]) -> &'p mut Vec<Part<'a>> {
    match stack.last_mut() {
        Some(frame) => &mut frame.body,
        None => parts,
    }
}

fn tag_end(text: &str, start: usize) -> Option<usize> {
    if text[start..].starts_with("{{{") {
        text[start + 3..].find("}}}").map(|i| start + 3 + i + 3)
    } else {
        text[start + 2..].find("}}").map(|i| start + 2 + i + 2)
    }
}

fn classify(tag: &str, line: usize) -> Result<Tag<'_>, TemplateError> {
    let invalid = || TemplateError::InvalidTag {
        tag: tag.to_string(),
        line,
    };

    if tag.starts_with("{{{") {
        let name = checked_name(&tag[3..tag.len() - 3]).ok_or_else(invalid)?;
        return Ok(Tag::Variable { name, raw: true });
    }

    let inner = tag[2..tag.len() - 2].trim();
    let mut chars = inner.chars();
    let classified = match chars.next() {
        Some('!') => Tag::Comment,
        Some('&') => Tag::Variable {
            name: checked_name(chars.as_str()).ok_or_else(invalid)?,
            raw: true,
        },
        Some('#') => Tag::Open {
            name: checked_name(chars.as_str()).ok_or_else(invalid)?,
            inverted: false,
        },
        Some('^') => Tag::Open {
            name: checked_name(chars.as_str()).ok_or_else(invalid)?,
            inverted: true,
        },
        Some('/') => Tag::Close {
            name: checked_name(chars.as_str()).ok_or_else(invalid)?,
        },
        _ => Tag::Variable {
            name: checked_name(inner).ok_or_else(invalid)?,
            raw: false,
        },
    };
    Ok(classified)
}

fn checked_name(name: &str) -> Option<&str> {
    static NAME: OnceLock<Regex> = OnceLock::new();
    let pattern = NAME.get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").expect("valid name pattern"));
    let name = name.trim();
    pattern.is_match(name).then_some(name)
}

fn render_parts(
    parts: &[Part<'_>],
    scope: &MergeScope,
    config: &TemplateConfig,
    out: &mut String,
) -> Result<(), TemplateError> {
    for part in parts {
        match part {
            Part::Text(text) => out.push_str(text),
            Part::Variable { name, raw, line, tag } => match scope.get(name) {
                Some(value) if *raw || config.escape == EscapeMode::None => out.push_str(value),
                Some(value) => escape_html(value, out),
                None => match config.unresolved {
                    UnresolvedPolicy::Empty => {}
                    UnresolvedPolicy::Keep => out.push_str(tag),
                    UnresolvedPolicy::Error => {
                        return Err(TemplateError::Unresolved {
                            name: name.to_string(),
                            line: *line,
                        })
                    }
                },
            },
            Part::Section { name, inverted, body } => {
                let set = scope.get(name).is_some_and(|value| !value.is_empty());
                if set != *inverted {
                    render_parts(body, scope, config, out)?;
                }
            }
        }
    }
    Ok(())
}

fn collect_names<'a>(parts: &[Part<'a>], names: &mut Vec<&'a str>) {
    for part in parts {
        match part {
            Part::Text(_) => {}
            Part::Variable { name, .. } => names.push(*name),
            Part::Section { name, body, .. } => {
                names.push(*name);
                collect_names(body, names);
            }
        }
    }
}

fn escape_html(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
