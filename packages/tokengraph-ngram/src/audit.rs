//! Index Audit
//!
//! Recomputes what the index of a content should hold at a revision and
//! compares it with what is stored:
//!
//! - **fidelity**: each order's sequence matches the n-grams of the content
//!   tokens at that revision
//! - **completeness**: each n-gram's recorded positions are exactly the
//!   offsets at which it appears in its order's sequence, and every n-gram
//!   that appeared in an earlier processed revision but has since left the
//!   sequence records no positions
//!
//! Nothing is created or repaired; unknown n-grams are reported.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tokengraph_storage::{Entity, EntityId, EntityKind, NgramId, Revision, VersionedStore};
use tracing::warn;

use crate::error::{IndexError, Result};
use crate::materializer::{NgramRegistry, NgramWindows};
use crate::reader::IndexReader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditFinding {
    /// The stored sequence has the wrong length
    SequenceLength {
        order: usize,
        expected: usize,
        found: usize,
    },
    /// The stored n-gram at `position` is not the one the tokens produce
    SequenceMismatch {
        order: usize,
        position: usize,
        expected: Option<NgramId>,
        found: NgramId,
    },
    /// Recorded positions differ from the sequence offsets
    Positions {
        order: usize,
        ngram: NgramId,
        expected: Vec<u32>,
        found: Vec<u32>,
    },
}

impl fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditFinding::SequenceLength {
                order,
                expected,
                found,
            } => write!(
                f,
                "order {}: sequence holds {} n-grams, expected {}",
                order, found, expected
            ),
            AuditFinding::SequenceMismatch {
                order,
                position,
                expected,
                found,
            } => match expected {
                Some(expected) => write!(
                    f,
                    "order {}: n-gram {} at {}, expected {}",
                    order, found, position, expected
                ),
                None => write!(
                    f,
                    "order {}: n-gram {} at {}, tokens there have no n-gram",
                    order, found, position
                ),
            },
            AuditFinding::Positions {
                order,
                ngram,
                expected,
                found,
            } => write!(
                f,
                "order {}: n-gram {} recorded at {:?}, expected {:?}",
                order, ngram, found, expected
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub content: EntityId,
    pub revision: Revision,
    pub orders: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub struct IndexAudit<S: ?Sized> {
    store: Arc<S>,
    reader: IndexReader<S>,
}

impl<S: VersionedStore + ?Sized + 'static> IndexAudit<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            reader: IndexReader::new(store.clone()),
            store,
        }
    }

    /// Audit of an index built with a caller-supplied registry
    pub fn with_registry(store: Arc<S>, registry: Arc<dyn NgramRegistry>) -> Self {
        Self {
            reader: IndexReader::with_registry(store.clone(), registry),
            store,
        }
    }

    /// Check orders `1..=max_order` of `content` as of `at`
    pub async fn verify(
        &self,
        content: EntityId,
        at: Revision,
        max_order: usize,
    ) -> Result<AuditReport> {
        let tokens = match self.store.read(content, at).await? {
            Some(Entity::Content(c)) => c.tokens,
            Some(other) => {
                return Err(IndexError::WrongEntityType {
                    id: content,
                    expected: EntityKind::Content,
                    found: other.kind(),
                })
            }
            None => Vec::new(),
        };
        let index = self.reader.index_at(content, at).await?;
        let seen = self.seen_ngrams(content, at, max_order).await?;

        let mut findings = Vec::new();
        for order in 1..=max_order {
            let sequence = index.sequence(order);

            // Fidelity
            let windows = NgramWindows::new(&tokens, order);
            if windows.len() != sequence.len() {
                findings.push(AuditFinding::SequenceLength {
                    order,
                    expected: windows.len(),
                    found: sequence.len(),
                });
            }
            for (position, (window, found)) in windows.zip(sequence.iter()).enumerate() {
                let expected = self.reader.lookup_ngram(window).await?;
                if expected != Some(*found) {
                    findings.push(AuditFinding::SequenceMismatch {
                        order,
                        position,
                        expected,
                        found: *found,
                    });
                }
            }

            // Completeness
            let mut offsets: BTreeMap<NgramId, Vec<u32>> = BTreeMap::new();
            for (i, ngram) in sequence.iter().enumerate() {
                let position = u32::try_from(i).unwrap_or(u32::MAX);
                offsets.entry(*ngram).or_default().push(position);
            }
            let departed: Vec<NgramId> = seen[order - 1]
                .iter()
                .filter(|ngram| !offsets.contains_key(*ngram))
                .copied()
                .collect();
            let expectations = offsets
                .into_iter()
                .chain(departed.into_iter().map(|ngram| (ngram, Vec::new())));
            for (ngram, expected) in expectations {
                let found = self.reader.positions_at(content, ngram, at).await?;
                if found != expected {
                    findings.push(AuditFinding::Positions {
                        order,
                        ngram,
                        expected,
                        found,
                    });
                }
            }
        }

        for finding in &findings {
            warn!("Audit of content {} at {}: {}", content, at, finding);
        }

        Ok(AuditReport {
            content,
            revision: at,
            orders: max_order,
            findings,
        })
    }

    /// Per order, every n-gram any processed revision up to `at` sequenced
    async fn seen_ngrams(
        &self,
        content: EntityId,
        at: Revision,
        max_order: usize,
    ) -> Result<Vec<BTreeSet<NgramId>>> {
        let mut seen = vec![BTreeSet::new(); max_order];
        for revision in self.reader.processed_revisions(content).await? {
            if revision > at {
                break;
            }
            let index = self.reader.index_at(content, revision).await?;
            for (order, ngrams) in seen.iter_mut().enumerate() {
                ngrams.extend(index.sequence(order + 1).iter().copied());
            }
        }
        Ok(seen)
    }
}
