//! Sequence Diff Engine
//!
//! Minimum-edit-distance alignment of two n-gram sequences using only
//! keeps, insertions and deletions (no substitution). Ties prefer `Keep`;
//! between equally cheap non-keep moves `Deletion` is emitted first.
//!
//! The script is produced by a single forward walk over a suffix-LCS
//! table, so both sequence cursors only ever advance. The reconciler
//! depends on that ordering.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use tokengraph_storage::NgramId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditKind {
    Keep,
    Insertion,
    Deletion,
}

/// One step of an edit script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOp {
    pub kind: EditKind,
    pub ngram: NgramId,
}

impl EditOp {
    pub fn keep(ngram: NgramId) -> Self {
        Self {
            kind: EditKind::Keep,
            ngram,
        }
    }

    pub fn insertion(ngram: NgramId) -> Self {
        Self {
            kind: EditKind::Insertion,
            ngram,
        }
    }

    pub fn deletion(ngram: NgramId) -> Self {
        Self {
            kind: EditKind::Deletion,
            ngram,
        }
    }
}

/// Operation counts of one or more edit scripts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditStats {
    pub keeps: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl EditStats {
    /// Number of non-keep operations
    pub fn changes(&self) -> usize {
        self.insertions + self.deletions
    }
}

impl AddAssign for EditStats {
    fn add_assign(&mut self, other: Self) {
        self.keeps += other.keeps;
        self.insertions += other.insertions;
        self.deletions += other.deletions;
    }
}

/// Ordered edit script, applied left to right
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    ops: Vec<EditOp>,
}

impl EditScript {
    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn stats(&self) -> EditStats {
        let mut stats = EditStats::default();
        for op in &self.ops {
            match op.kind {
                EditKind::Keep => stats.keeps += 1,
                EditKind::Insertion => stats.insertions += 1,
                EditKind::Deletion => stats.deletions += 1,
            }
        }
        stats
    }

    /// Edit distance: insertions plus deletions
    pub fn distance(&self) -> usize {
        self.stats().changes()
    }

    /// Replay the script on `prev`, returning `None` when it does not fit
    ///
    /// ```rust
    /// use tokengraph_ngram::diff::edit_script;
    /// use tokengraph_storage::EntityId;
    ///
    /// let prev = vec![EntityId(1), EntityId(2)];
    /// let new = vec![EntityId(1), EntityId(3)];
    /// assert_eq!(edit_script(&prev, &new).apply_to(&prev), Some(new));
    /// ```
    pub fn apply_to(&self, prev: &[NgramId]) -> Option<Vec<NgramId>> {
        let mut out = Vec::with_capacity(prev.len());
        let mut former = 0;
        for op in &self.ops {
            match op.kind {
                EditKind::Keep => {
                    if prev.get(former) != Some(&op.ngram) {
                        return None;
                    }
                    out.push(op.ngram);
                    former += 1;
                }
                EditKind::Deletion => {
                    if prev.get(former) != Some(&op.ngram) {
                        return None;
                    }
                    former += 1;
                }
                EditKind::Insertion => out.push(op.ngram),
            }
        }
        (former == prev.len()).then_some(out)
    }
}

impl IntoIterator for EditScript {
    type Item = EditOp;
    type IntoIter = std::vec::IntoIter<EditOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a EditScript {
    type Item = &'a EditOp;
    type IntoIter = std::slice::Iter<'a, EditOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Compute the minimum edit script turning `prev` into `new`
///
/// O(len(prev) × len(new)) time and space.
pub fn edit_script(prev: &[NgramId], new: &[NgramId]) -> EditScript {
    // Common prefix and suffix never need the table
    let prefix = prev
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = prev[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let mid_prev = &prev[prefix..prev.len() - suffix];
    let mid_new = &new[prefix..new.len() - suffix];

    let mut ops = Vec::with_capacity(prev.len().max(new.len()));
    ops.extend(prev[..prefix].iter().copied().map(EditOp::keep));
    align(mid_prev, mid_new, &mut ops);
    ops.extend(prev[prev.len() - suffix..].iter().copied().map(EditOp::keep));

    EditScript { ops }
}

fn align(prev: &[NgramId], new: &[NgramId], ops: &mut Vec<EditOp>) {
    let (n, m) = (prev.len(), new.len());
    let width = m + 1;

    // lcs[i * width + j] = LCS(prev[i..], new[j..])
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if prev[i] == new[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if prev[i] == new[j] {
            ops.push(EditOp::keep(prev[i]));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            ops.push(EditOp::deletion(prev[i]));
            i += 1;
        } else {
            ops.push(EditOp::insertion(new[j]));
            j += 1;
        }
    }
    ops.extend(prev[i..].iter().copied().map(EditOp::deletion));
    ops.extend(new[j..].iter().copied().map(EditOp::insertion));
}
