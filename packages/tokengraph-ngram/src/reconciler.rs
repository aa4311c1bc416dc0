//! Index Reconciler
//!
//! Applies an edit script to one order's n-gram sequence and to the
//! inverted entries of the n-grams it mentions. Two cursors walk the
//! script strictly left to right:
//!
//! - `former_index`: position in the previous sequence
//! - `new_index`: position in the sequence being rebuilt
//!
//! Positions are a multiset. A kept n-gram that occurs at two adjacent
//! positions briefly holds the same offset twice while the cursors pass it.

use std::collections::{HashMap, HashSet};

use tokengraph_storage::{EntityId, InvertedEntry, NgramId, Revision};

use crate::diff::{EditKind, EditOp, EditScript, EditStats};
use crate::error::{IndexError, Result};

/// Reconciliation state of one (content, order, revision)
#[derive(Debug)]
pub struct ReconcileContext {
    content: EntityId,
    revision: Revision,
    order: usize,
    sequence: Vec<NgramId>,
    prev_len: usize,
    entries: HashMap<NgramId, InvertedEntry>,
    former_index: usize,
    new_index: usize,
    touched: HashSet<NgramId>,
    stats: EditStats,
}

/// Result of a completed reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub order: usize,
    /// Rebuilt order-`k` sequence
    pub sequence: Vec<NgramId>,
    /// Entries whose positions changed, positions sorted
    pub entries: Vec<InvertedEntry>,
    pub stats: EditStats,
}

impl ReconcileContext {
    /// Start from the previous sequence and the current state of every entry
    /// the script will mention
    pub fn new(
        content: EntityId,
        revision: Revision,
        order: usize,
        prev: Vec<NgramId>,
        entries: HashMap<NgramId, InvertedEntry>,
    ) -> Self {
        Self {
            content,
            revision,
            order,
            prev_len: prev.len(),
            sequence: prev,
            entries,
            former_index: 0,
            new_index: 0,
            touched: HashSet::new(),
            stats: EditStats::default(),
        }
    }

    pub fn former_index(&self) -> usize {
        self.former_index
    }

    pub fn new_index(&self) -> usize {
        self.new_index
    }

    pub fn sequence(&self) -> &[NgramId] {
        &self.sequence
    }

    pub fn entry(&self, ngram: NgramId) -> Option<&InvertedEntry> {
        self.entries.get(&ngram)
    }

    /// Apply one operation at the current cursors
    pub fn apply(&mut self, op: &EditOp) -> Result<()> {
        match op.kind {
            EditKind::Deletion => {
                match self.sequence.get(self.new_index) {
                    Some(found) if *found == op.ngram => {}
                    found => {
                        let detail = format!(
                            "deletion of n-gram {} at sequence index {} found {:?}",
                            op.ngram, self.new_index, found
                        );
                        return Err(self.corruption(detail));
                    }
                }
                self.sequence.remove(self.new_index);
                self.take_position(op.ngram, self.former_index)?;
                self.former_index += 1;
                self.stats.deletions += 1;
            }
            EditKind::Insertion => {
                if self.new_index > self.sequence.len() {
                    let detail = format!(
                        "insertion at index {} past sequence end {}",
                        self.new_index,
                        self.sequence.len()
                    );
                    return Err(self.corruption(detail));
                }
                self.sequence.insert(self.new_index, op.ngram);
                self.put_position(op.ngram, self.new_index)?;
                self.new_index += 1;
                self.stats.insertions += 1;
            }
            EditKind::Keep => {
                if self.former_index != self.new_index {
                    self.take_position(op.ngram, self.former_index)?;
                    self.put_position(op.ngram, self.new_index)?;
                } else if !self.has_position(op.ngram, self.former_index)? {
                    let detail = format!(
                        "n-gram {} kept at {} but not recorded there",
                        op.ngram, self.former_index
                    );
                    return Err(self.corruption(detail));
                }
                self.former_index += 1;
                self.new_index += 1;
                self.stats.keeps += 1;
            }
        }
        Ok(())
    }

    /// Apply a whole script in order
    pub fn apply_script(&mut self, script: &EditScript) -> Result<()> {
        for op in script {
            self.apply(op)?;
        }
        Ok(())
    }

    /// Check the cursor end state and hand back the rebuilt order
    pub fn finish(self) -> Result<Reconciled> {
        if self.former_index != self.prev_len {
            let detail = format!(
                "script consumed {} of {} previous n-grams",
                self.former_index, self.prev_len
            );
            return Err(self.corruption(detail));
        }
        if self.new_index != self.sequence.len() {
            let detail = format!(
                "script produced {} n-grams but sequence holds {}",
                self.new_index,
                self.sequence.len()
            );
            return Err(self.corruption(detail));
        }

        let Self {
            order,
            sequence,
            mut entries,
            touched,
            stats,
            ..
        } = self;

        let mut changed: Vec<InvertedEntry> = touched
            .into_iter()
            .filter_map(|ngram| entries.remove(&ngram))
            .map(|mut entry| {
                entry.positions.sort_unstable();
                entry
            })
            .collect();
        changed.sort_by_key(|entry| entry.ngram);

        Ok(Reconciled {
            order,
            sequence,
            entries: changed,
            stats,
        })
    }

    fn corruption(&self, detail: String) -> IndexError {
        IndexError::Consistency {
            content: self.content,
            order: self.order,
            revision: self.revision,
            detail,
        }
    }

    fn entry_mut(&mut self, ngram: NgramId) -> Result<&mut InvertedEntry> {
        let (content, order, revision) = (self.content, self.order, self.revision);
        self.entries
            .get_mut(&ngram)
            .ok_or_else(|| IndexError::Consistency {
                content,
                order,
                revision,
                detail: format!("no inverted entry for n-gram {}", ngram),
            })
    }

    fn has_position(&mut self, ngram: NgramId, index: usize) -> Result<bool> {
        let position = self.position(index)?;
        Ok(self.entry_mut(ngram)?.positions.contains(&position))
    }

    fn take_position(&mut self, ngram: NgramId, index: usize) -> Result<()> {
        let position = self.position(index)?;
        if !self.entry_mut(ngram)?.remove_position(position) {
            let detail = format!("n-gram {} has no position {}", ngram, position);
            return Err(self.corruption(detail));
        }
        self.touched.insert(ngram);
        Ok(())
    }

    fn put_position(&mut self, ngram: NgramId, index: usize) -> Result<()> {
        let position = self.position(index)?;
        self.entry_mut(ngram)?.add_position(position);
        self.touched.insert(ngram);
        Ok(())
    }

    fn position(&self, index: usize) -> Result<u32> {
        u32::try_from(index)
            .map_err(|_| self.corruption(format!("position {} exceeds u32", index)))
    }
}

/// Diff and reconcile one order in a single call
pub fn reconcile(
    content: EntityId,
    revision: Revision,
    order: usize,
    prev: Vec<NgramId>,
    new: &[NgramId],
    entries: HashMap<NgramId, InvertedEntry>,
) -> Result<Reconciled> {
    let script = crate::diff::edit_script(&prev, new);
    let mut ctx = ReconcileContext::new(content, revision, order, prev, entries);
    ctx.apply_script(&script)?;
    let reconciled = ctx.finish()?;

    if reconciled.sequence != new {
        return Err(IndexError::Consistency {
            content,
            order,
            revision,
            detail: "rebuilt sequence differs from materialized sequence".to_string(),
        });
    }
    Ok(reconciled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::edit_script;
    use pretty_assertions::assert_eq;

    const CONTENT: EntityId = EntityId(100);
    const AB: EntityId = EntityId(1);
    const BC: EntityId = EntityId(2);
    const BD: EntityId = EntityId(3);
    const AX: EntityId = EntityId(4);
    const XB: EntityId = EntityId(5);

    fn entry(ngram: NgramId, positions: &[u32]) -> (NgramId, InvertedEntry) {
        let mut entry = InvertedEntry::new(CONTENT, ngram, "text");
        entry.positions = positions.to_vec();
        (ngram, entry)
    }

    fn positions(reconciled: &Reconciled, ngram: NgramId) -> Vec<u32> {
        reconciled
            .entries
            .iter()
            .find(|e| e.ngram == ngram)
            .map(|e| e.positions.clone())
            .unwrap()
    }

    #[test]
    fn test_substitution_moves_positions() {
        let entries = HashMap::from([entry(AB, &[0]), entry(BC, &[1]), entry(BD, &[])]);
        let reconciled = reconcile(CONTENT, Revision(2), 1, vec![AB, BC], &[AB, BD], entries)
            .unwrap();

        assert_eq!(reconciled.sequence, vec![AB, BD]);
        assert_eq!(positions(&reconciled, BC), Vec::<u32>::new());
        assert_eq!(positions(&reconciled, BD), vec![1]);
        // ab stayed at 0, so it is not rewritten
        assert!(reconciled.entries.iter().all(|e| e.ngram != AB));
    }

    #[test]
    fn test_insertion_shifts_kept_ngram() {
        let entries = HashMap::from([
            entry(AB, &[0]),
            entry(BC, &[1]),
            entry(AX, &[]),
            entry(XB, &[]),
        ]);
        let reconciled = reconcile(
            CONTENT,
            Revision(2),
            1,
            vec![AB, BC],
            &[AX, XB, BC],
            entries,
        )
        .unwrap();

        assert_eq!(reconciled.sequence, vec![AX, XB, BC]);
        assert_eq!(positions(&reconciled, AB), Vec::<u32>::new());
        assert_eq!(positions(&reconciled, AX), vec![0]);
        assert_eq!(positions(&reconciled, XB), vec![1]);
        assert_eq!(positions(&reconciled, BC), vec![2]);
        assert_eq!(reconciled.stats.keeps, 1);
    }

    #[test]
    fn test_repeated_ngram_keeps_all_positions() {
        // [g, g] -> [x, g, g]: both kept g's shift right by one
        let g = EntityId(9);
        let entries = HashMap::from([entry(g, &[0, 1]), entry(AX, &[])]);
        let reconciled = reconcile(CONTENT, Revision(3), 1, vec![g, g], &[AX, g, g], entries)
            .unwrap();

        assert_eq!(positions(&reconciled, g), vec![1, 2]);
        assert_eq!(positions(&reconciled, AX), vec![0]);
    }

    #[test]
    fn test_missing_position_is_consistency_error() {
        let entries = HashMap::from([entry(AB, &[0]), entry(BC, &[5]), entry(BD, &[])]);
        let err = reconcile(CONTENT, Revision(2), 1, vec![AB, BC], &[AB, BD], entries)
            .unwrap_err();

        match err {
            IndexError::Consistency {
                content,
                order,
                revision,
                ..
            } => {
                assert_eq!(content, CONTENT);
                assert_eq!(order, 1);
                assert_eq!(revision, Revision(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_entry_is_consistency_error() {
        let entries = HashMap::from([entry(AB, &[0])]);
        let err = reconcile(CONTENT, Revision(2), 1, vec![AB], &[AB, BD], entries).unwrap_err();
        assert!(matches!(err, IndexError::Consistency { .. }));
    }

    #[test]
    fn test_kept_ngram_must_be_recorded() {
        let entries = HashMap::from([entry(AB, &[])]);
        let err = reconcile(CONTENT, Revision(2), 1, vec![AB], &[AB], entries).unwrap_err();
        assert!(matches!(err, IndexError::Consistency { .. }));
    }

    #[test]
    fn test_truncated_script_fails_verification() {
        let entries = HashMap::from([entry(AB, &[0]), entry(BC, &[1])]);
        let mut ctx = ReconcileContext::new(CONTENT, Revision(2), 1, vec![AB, BC], entries);
        ctx.apply(&EditOp::keep(AB)).unwrap();

        assert_eq!(ctx.former_index(), 1);
        assert!(matches!(
            ctx.finish(),
            Err(IndexError::Consistency { .. })
        ));
    }

    #[test]
    fn test_same_script_same_result() {
        let prev = vec![AB, BC, AB];
        let new = vec![BC, AB, BD];
        let start = HashMap::from([entry(AB, &[0, 2]), entry(BC, &[1]), entry(BD, &[])]);
        let script = edit_script(&prev, &new);

        let run = |entries: HashMap<NgramId, InvertedEntry>| {
            let mut ctx = ReconcileContext::new(CONTENT, Revision(4), 1, prev.clone(), entries);
            ctx.apply_script(&script).unwrap();
            ctx.finish().unwrap()
        };

        let first = run(start.clone());
        let second = run(start);
        assert_eq!(first, second);
        assert_eq!(first.sequence, new);
    }
}
