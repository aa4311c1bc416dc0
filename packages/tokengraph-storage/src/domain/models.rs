//! Versioned Entity Models
//!
//! Every entity kind the n-gram indexer reads or writes is an explicit
//! tagged struct. Entities are stored as version chains: one state per
//! revision at which the entity was written.

use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════

/// Store-assigned entity identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// N-gram identities are the ids of their deduplicated n-gram entities
pub type NgramId = EntityId;

/// Token identity produced by the tokenization collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub u64);

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discrete point on an entity timeline
///
/// # Examples
///
/// ```rust
/// use tokengraph_storage::domain::Revision;
///
/// assert!(Revision::REFERENCE < Revision(0));
/// assert!(Revision(10) < Revision::END);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub i64);

impl Revision {
    /// Fixed anchor revision at which index entities are created
    pub const REFERENCE: Revision = Revision(i64::MIN);

    /// Exclusive upper bound of every timeline
    pub const END: Revision = Revision(i64::MAX);

    pub fn is_reference(&self) -> bool {
        *self == Self::REFERENCE
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_reference() {
            write!(f, "reference")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Entity Kinds
// ═══════════════════════════════════════════════════════════════════════════

/// Tokenized content (owned by the tokenization collaborator)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    /// Free-form type tag, propagated to inverted index entries
    pub content_type: String,
    /// Token sequence as of the revision this state belongs to
    pub tokens: Vec<TokenId>,
}

impl Content {
    pub fn new(content_type: impl Into<String>, tokens: Vec<TokenId>) -> Self {
        Self {
            content_type: content_type.into(),
            tokens,
        }
    }
}

/// Per-content index holding one n-gram sequence per order
///
/// `sequences[k - 1]` is the order-`k` sequence. An order beyond
/// `sequences.len()` reads as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentIndex {
    /// Indexed content entity
    pub content: EntityId,
    #[serde(default)]
    pub sequences: Vec<Vec<NgramId>>,
}

impl ContentIndex {
    pub fn new(content: EntityId) -> Self {
        Self {
            content,
            sequences: Vec::new(),
        }
    }

    /// Sequence of the given order (1-based)
    pub fn sequence(&self, order: usize) -> &[NgramId] {
        order
            .checked_sub(1)
            .and_then(|slot| self.sequences.get(slot))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace the sequence of the given order, growing the slot list if needed
    pub fn set_sequence(&mut self, order: usize, sequence: Vec<NgramId>) {
        debug_assert!(order >= 1, "n-gram orders start at 1");
        let slot = order.saturating_sub(1);
        if self.sequences.len() <= slot {
            self.sequences.resize_with(slot + 1, Vec::new);
        }
        self.sequences[slot] = sequence;
    }
}

/// Deduplicated n-gram identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ngram {
    pub tokens: Vec<TokenId>,
}

impl Ngram {
    /// Order of the n-gram (a tuple of `k + 1` tokens has order `k`)
    pub fn order(&self) -> usize {
        self.tokens.len().saturating_sub(1)
    }
}

/// Positions of one n-gram within one content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedEntry {
    pub content: EntityId,
    pub ngram: NgramId,
    /// Copied from the content at creation
    pub content_type: String,
    /// Multiset of offsets in the current sequence
    #[serde(default)]
    pub positions: Vec<u32>,
}

impl InvertedEntry {
    pub fn new(content: EntityId, ngram: NgramId, content_type: impl Into<String>) -> Self {
        Self {
            content,
            ngram,
            content_type: content_type.into(),
            positions: Vec::new(),
        }
    }

    /// Remove one occurrence of `position`, returning whether it was present
    pub fn remove_position(&mut self, position: u32) -> bool {
        match self.positions.iter().position(|p| *p == position) {
            Some(slot) => {
                self.positions.swap_remove(slot);
                true
            }
            None => false,
        }
    }

    pub fn add_position(&mut self, position: u32) {
        self.positions.push(position);
    }

    /// Positions in ascending order
    pub fn sorted_positions(&self) -> Vec<u32> {
        let mut positions = self.positions.clone();
        positions.sort_unstable();
        positions
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Tagged Entity
// ═══════════════════════════════════════════════════════════════════════════

/// Entity kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Content,
    ContentIndex,
    Ngram,
    InvertedEntry,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Content => "content",
            EntityKind::ContentIndex => "content_index",
            EntityKind::Ngram => "ngram",
            EntityKind::InvertedEntry => "inverted_entry",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(EntityKind::Content),
            "content_index" => Some(EntityKind::ContentIndex),
            "ngram" => Some(EntityKind::Ngram),
            "inverted_entry" => Some(EntityKind::InvertedEntry),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State of an entity at one revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Content(Content),
    ContentIndex(ContentIndex),
    Ngram(Ngram),
    InvertedEntry(InvertedEntry),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Content(_) => EntityKind::Content,
            Entity::ContentIndex(_) => EntityKind::ContentIndex,
            Entity::Ngram(_) => EntityKind::Ngram,
            Entity::InvertedEntry(_) => EntityKind::InvertedEntry,
        }
    }

    pub fn into_content(self) -> Option<Content> {
        match self {
            Entity::Content(content) => Some(content),
            _ => None,
        }
    }

    pub fn into_content_index(self) -> Option<ContentIndex> {
        match self {
            Entity::ContentIndex(index) => Some(index),
            _ => None,
        }
    }

    pub fn into_ngram(self) -> Option<Ngram> {
        match self {
            Entity::Ngram(ngram) => Some(ngram),
            _ => None,
        }
    }

    pub fn into_inverted_entry(self) -> Option<InvertedEntry> {
        match self {
            Entity::InvertedEntry(entry) => Some(entry),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Anchor Keys
// ═══════════════════════════════════════════════════════════════════════════

/// Create-if-absent key of an entity anchored at [`Revision::REFERENCE`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnchorKey {
    /// The single index of a content
    ContentIndex { content: EntityId },
    /// The inverted entry of one n-gram within one content
    InvertedEntry { content: EntityId, ngram: NgramId },
    /// The dedup identity of a token tuple
    Ngram { tokens: Vec<TokenId> },
}

impl AnchorKey {
    /// Stable textual form used as the persistent key
    ///
    /// ```rust
    /// use tokengraph_storage::domain::{AnchorKey, EntityId, TokenId};
    ///
    /// let key = AnchorKey::Ngram { tokens: vec![TokenId(3), TokenId(9)] };
    /// assert_eq!(key.storage_key(), "ngram:3,9");
    ///
    /// let key = AnchorKey::InvertedEntry { content: EntityId(1), ngram: EntityId(2) };
    /// assert_eq!(key.storage_key(), "inverted:1:2");
    /// ```
    pub fn storage_key(&self) -> String {
        match self {
            AnchorKey::ContentIndex { content } => format!("index:{}", content),
            AnchorKey::InvertedEntry { content, ngram } => {
                format!("inverted:{}:{}", content, ngram)
            }
            AnchorKey::Ngram { tokens } => {
                let joined: Vec<String> = tokens.iter().map(|t| t.0.to_string()).collect();
                format!("ngram:{}", joined.join(","))
            }
        }
    }

    /// Entity kind this key anchors
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            AnchorKey::ContentIndex { .. } => EntityKind::ContentIndex,
            AnchorKey::InvertedEntry { .. } => EntityKind::InvertedEntry,
            AnchorKey::Ngram { .. } => EntityKind::Ngram,
        }
    }
}
