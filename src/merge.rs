//! Merge Engine - Recursive Deep Merge
//!
//! Policy, per key of the incoming mapping:
//! - null always overwrites
//! - unset (or null) keys are inserted as-is
//! - mapping into mapping recurses
//! - mapping into a scalar is a type conflict, into a sequence is unsupported
//! - everything else overwrites, last document wins
//!
//! Sequences are never combined element-wise.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::tree::{key_path, Mapping, Node, NodeKind};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MergeError {
    #[error("cannot merge a structured value into a simple value for key `{key}` (existing {existing}, incoming {incoming})")]
    TypeConflict {
        key: String,
        existing: NodeKind,
        incoming: NodeKind,
    },

    #[error("cannot merge element of unsupported type for key `{key}`: {kind}")]
    UnsupportedValueType { key: String, kind: String },
}

/// A single decision taken by the merge engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeEvent<'a> {
    Inserted { key: &'a str, kind: NodeKind },
    Overwritten { key: &'a str, previous: NodeKind, incoming: NodeKind },
    Nulled { key: &'a str },
    Recursed { key: &'a str },
}

/// Observes merge decisions. Observers cannot influence the merge.
pub trait MergeObserver {
    fn on_event(&mut self, event: &MergeEvent<'_>);
}

struct NoopObserver;

impl MergeObserver for NoopObserver {
    fn on_event(&mut self, _event: &MergeEvent<'_>) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub inserted: usize,
    pub overwritten: usize,
    pub nulled: usize,
    pub recursed: usize,
}

impl MergeObserver for MergeStats {
    fn on_event(&mut self, event: &MergeEvent<'_>) {
        match event {
            MergeEvent::Inserted { .. } => self.inserted += 1,
            MergeEvent::Overwritten { .. } => self.overwritten += 1,
            MergeEvent::Nulled { .. } => self.nulled += 1,
            MergeEvent::Recursed { .. } => self.recursed += 1,
        }
    }
}

/// Merge `incoming` into `accumulator` in place.
pub fn merge(accumulator: &mut Mapping, incoming: Mapping) -> Result<(), MergeError> {
    merge_observed(accumulator, incoming, &mut NoopObserver)
}

/// Same as [`merge`], reporting every decision to `observer`.
pub fn merge_observed(
    accumulator: &mut Mapping,
    incoming: Mapping,
    observer: &mut dyn MergeObserver,
) -> Result<(), MergeError> {
    merge_at("", accumulator, incoming, observer)
}

/// Fold documents, in order, into a fresh accumulator.
pub fn merge_documents<I>(documents: I) -> Result<Mapping, MergeError>
where
    I: IntoIterator<Item = Mapping>,
{
    let mut merger = Merger::new();
    for document in documents {
        merger.fold(document)?;
    }
    Ok(merger.into_result())
}

fn merge_at(
    prefix: &str,
    accumulator: &mut Mapping,
    incoming: Mapping,
    observer: &mut dyn MergeObserver,
) -> Result<(), MergeError> {
    for (key, value) in incoming {
        let path = key_path(prefix, &key);

        if value.is_null() {
            debug!(key = %path, "setting key to null");
            observer.on_event(&MergeEvent::Nulled { key: &path });
            accumulator.insert(key, Node::Null);
            continue;
        }

        match accumulator.get_mut(&key) {
            Some(existing) => merge_into(&path, existing, value, observer)?,
            None => {
                debug!(key = %path, kind = %value.kind(), "adding new key");
                observer.on_event(&MergeEvent::Inserted { key: &path, kind: value.kind() });
                accumulator.insert(key, value);
            }
        }
    }
    Ok(())
}

fn merge_into(
    path: &str,
    existing: &mut Node,
    incoming: Node,
    observer: &mut dyn MergeObserver,
) -> Result<(), MergeError> {
    // An existing null counts as unset.
    if existing.is_null() {
        debug!(key = %path, kind = %incoming.kind(), "adding new key");
        observer.on_event(&MergeEvent::Inserted { key: path, kind: incoming.kind() });
        *existing = incoming;
        return Ok(());
    }

    match incoming {
        Node::Mapping(child) => match existing {
            Node::Mapping(target) => {
                observer.on_event(&MergeEvent::Recursed { key: path });
                merge_at(path, target, child, observer)
            }
            Node::String(_) | Node::Bool(_) | Node::Int(_) | Node::Float(_) => {
                error!(key = %path, existing = %existing.kind(), "cannot merge complex element into a simple element");
                Err(MergeError::TypeConflict {
                    key: path.to_string(),
                    existing: existing.kind(),
                    incoming: NodeKind::Mapping,
                })
            }
            Node::Sequence(_) | Node::Null => {
                error!(key = %path, existing = %existing.kind(), "cannot merge mapping into existing value");
                Err(MergeError::UnsupportedValueType {
                    key: path.to_string(),
                    kind: format!("mapping merged into existing {}", existing.kind()),
                })
            }
        },
        other @ (Node::Sequence(_) | Node::String(_) | Node::Bool(_) | Node::Int(_) | Node::Float(_) | Node::Null) => {
            let previous = existing.kind();
            info!(key = %path, %previous, incoming = %other.kind(), "overriding value");
            observer.on_event(&MergeEvent::Overwritten {
                key: path,
                previous,
                incoming: other.kind(),
            });
            *existing = other;
            Ok(())
        }
    }
}

/// Owns the accumulating result of one merge run.
#[derive(Debug, Default)]
pub struct Merger {
    accumulator: Mapping,
    stats: MergeStats,
    documents: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one document into the accumulated result.
    ///
    /// On error the run must be abandoned; the accumulator may hold a
    /// partially applied document.
    pub fn fold(&mut self, document: Mapping) -> Result<(), MergeError> {
        merge_observed(&mut self.accumulator, document, &mut self.stats)?;
        self.documents += 1;
        Ok(())
    }

    pub fn result(&self) -> &Mapping {
        &self.accumulator
    }

    pub fn into_result(self) -> Mapping {
        self.accumulator
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn documents_merged(&self) -> usize {
        self.documents
    }
}
