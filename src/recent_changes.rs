/// Recent Change Tracking
///
/// Short-lived "recently changed" markers used to highlight rows and cells
/// after an update. Every marker carries the time it was created; once its
/// category's decay duration has passed, `take_expired` removes it and hands
/// it back so the caller can repaint what it highlighted.
///
/// Markers are keyed by row index, so every structural change to the row
/// array must be forwarded here to keep them aligned.
///
/// # Time
///
/// The tracker never reads a clock. Every call that creates or expires
/// markers takes `now` in milliseconds, and `next_expiry` tells the host
/// when the next call to `take_expired` is worth making.

use crate::config::RecentChangeDurations;
use crate::index_shift::IndexAdjuster;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::mem;

/// Category of a recent change; selects its decay duration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecentChangeKind {
    AllChanged,
    Inserted,
    Updated,
    ValueChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentChange {
    pub kind: RecentChangeKind,
    pub timestamp: u64,
}

/// A cell, ordered row first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row_index: usize,
    pub field_index: usize,
}

impl CellPosition {
    pub fn new(row_index: usize, field_index: usize) -> Self {
        CellPosition {
            row_index,
            field_index,
        }
    }
}

/// Markers removed by one expiry pass. Rows and cells are in ascending
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpiredChanges {
    pub all_changed: bool,
    pub rows: Vec<usize>,
    pub cells: Vec<CellPosition>,
}

impl ExpiredChanges {
    pub fn is_empty(&self) -> bool {
        !self.all_changed && self.rows.is_empty() && self.cells.is_empty()
    }
}

/// Markers taken out by `process_pre_reindex`, keyed by record index
#[derive(Debug, Default)]
struct ReindexStash {
    rows: Vec<(usize, RecentChange)>,
    cells: Vec<(usize, usize, u64)>,
}

#[derive(Debug)]
pub struct RecentChangeTracker {
    durations: RecentChangeDurations,
    all_changed: Option<u64>,
    rows: BTreeMap<usize, RecentChange>,
    cells: BTreeMap<CellPosition, u64>,
    next_expiry: Option<u64>,
    depth: usize,
    schedule_pending: bool,
    stash: Option<ReindexStash>,
}

impl RecentChangeTracker {
    pub fn new(durations: RecentChangeDurations) -> Self {
        RecentChangeTracker {
            durations,
            all_changed: None,
            rows: BTreeMap::new(),
            cells: BTreeMap::new(),
            next_expiry: None,
            depth: 0,
            schedule_pending: false,
            stash: None,
        }
    }

    pub fn durations(&self) -> &RecentChangeDurations {
        &self.durations
    }

    pub fn is_empty(&self) -> bool {
        self.all_changed.is_none() && self.rows.is_empty() && self.cells.is_empty()
    }

    /// When the earliest tracked marker expires; None when nothing is tracked
    pub fn next_expiry(&self) -> Option<u64> {
        self.next_expiry
    }

    pub fn add_record_inserted_change(&mut self, row_index: usize, now: u64) {
        self.add_row_change(row_index, RecentChangeKind::Inserted, now);
    }

    pub fn add_record_updated_change(&mut self, row_index: usize, now: u64) {
        self.add_row_change(row_index, RecentChangeKind::Updated, now);
    }

    pub fn add_value_change(&mut self, field_index: usize, row_index: usize, now: u64) {
        if self.durations.value_changed_ms == 0 {
            return;
        }
        let replaced = self
            .cells
            .insert(CellPosition::new(row_index, field_index), now)
            .is_some();
        self.note_expiry(now + self.durations.value_changed_ms, replaced);
    }

    pub fn add_record_values_changes(&mut self, row_index: usize, field_indexes: &[usize], now: u64) {
        for &field_index in field_indexes {
            self.add_value_change(field_index, row_index, now);
        }
    }

    pub fn add_all_changed(&mut self, now: u64) {
        if self.durations.all_changed_ms == 0 {
            return;
        }
        let replaced = self.all_changed.replace(now).is_some();
        self.note_expiry(now + self.durations.all_changed_ms, replaced);
    }

    /// Most recent change to a whole row; falls back to the all-changed marker
    pub fn row_change(&self, row_index: usize) -> Option<RecentChangeKind> {
        self.rows
            .get(&row_index)
            .map(|change| change.kind)
            .or_else(|| self.all_changed.map(|_| RecentChangeKind::AllChanged))
    }

    /// True when the cell, its row, or everything was changed recently
    pub fn is_cell_changed(&self, field_index: usize, row_index: usize) -> bool {
        self.all_changed.is_some()
            || self.rows.contains_key(&row_index)
            || self
                .cells
                .contains_key(&CellPosition::new(row_index, field_index))
    }

    pub fn process_row_deleted(&mut self, row_index: usize) {
        self.process_rows_deleted(row_index, 1);
    }

    pub fn process_rows_deleted(&mut self, row_index: usize, count: usize) {
        if count == 0 || (self.rows.is_empty() && self.cells.is_empty()) {
            return;
        }

        let before = self.rows.len() + self.cells.len();
        self.rows = mem::take(&mut self.rows)
            .into_iter()
            .filter_map(|(row, change)| {
                IndexAdjuster::adjust_for_delete(row, row_index, count).map(|row| (row, change))
            })
            .collect();
        self.cells = mem::take(&mut self.cells)
            .into_iter()
            .filter_map(|(cell, timestamp)| {
                IndexAdjuster::adjust_for_delete(cell.row_index, row_index, count)
                    .map(|row| (CellPosition::new(row, cell.field_index), timestamp))
            })
            .collect();

        if self.rows.len() + self.cells.len() != before {
            self.schedule();
        }
    }

    pub fn process_row_inserted(&mut self, row_index: usize) {
        self.process_rows_inserted(row_index, 1);
    }

    pub fn process_rows_inserted(&mut self, row_index: usize, count: usize) {
        if count == 0 || (self.rows.is_empty() && self.cells.is_empty()) {
            return;
        }

        self.rows = mem::take(&mut self.rows)
            .into_iter()
            .map(|(row, change)| (IndexAdjuster::adjust_for_insert(row, row_index, count), change))
            .collect();
        self.cells = mem::take(&mut self.cells)
            .into_iter()
            .map(|(cell, timestamp)| {
                let row = IndexAdjuster::adjust_for_insert(cell.row_index, row_index, count);
                (CellPosition::new(row, cell.field_index), timestamp)
            })
            .collect();
    }

    pub fn process_row_moved(&mut self, old_index: usize, new_index: usize) {
        if old_index == new_index || (self.rows.is_empty() && self.cells.is_empty()) {
            return;
        }

        self.rows = mem::take(&mut self.rows)
            .into_iter()
            .map(|(row, change)| (IndexAdjuster::adjust_for_move(row, old_index, new_index), change))
            .collect();
        self.cells = mem::take(&mut self.cells)
            .into_iter()
            .map(|(cell, timestamp)| {
                let row = IndexAdjuster::adjust_for_move(cell.row_index, old_index, new_index);
                (CellPosition::new(row, cell.field_index), timestamp)
            })
            .collect();
    }

    /// Detach every row-keyed marker from its row before the rows are
    /// reordered wholesale. `row_to_record` maps each current row to its
    /// record index.
    pub fn process_pre_reindex(&mut self, row_to_record: &[usize]) {
        let mut stash = ReindexStash::default();

        for (row, change) in mem::take(&mut self.rows) {
            if let Some(&record_index) = row_to_record.get(row) {
                stash.rows.push((record_index, change));
            }
        }
        for (cell, timestamp) in mem::take(&mut self.cells) {
            if let Some(&record_index) = row_to_record.get(cell.row_index) {
                stash.cells.push((record_index, cell.field_index, timestamp));
            }
        }

        self.stash = Some(stash);
    }

    /// Re-attach the markers taken by `process_pre_reindex`.
    ///
    /// When rows were only reordered the markers follow their records
    /// through `record_to_row`; otherwise they are dropped.
    pub fn process_post_reindex<F>(&mut self, all_rows_kept: bool, record_to_row: F)
    where
        F: Fn(usize) -> Option<usize>,
    {
        let stash = self.stash.take().unwrap_or_default();

        if all_rows_kept {
            for (record_index, change) in stash.rows {
                if let Some(row) = record_to_row(record_index) {
                    self.rows.insert(row, change);
                }
            }
            for (record_index, field_index, timestamp) in stash.cells {
                if let Some(row) = record_to_row(record_index) {
                    self.cells.insert(CellPosition::new(row, field_index), timestamp);
                }
            }
        } else if !stash.rows.is_empty() || !stash.cells.is_empty() {
            log::trace!(
                "dropping {} row and {} cell markers after reindex",
                stash.rows.len(),
                stash.cells.len()
            );
        }

        self.schedule();
    }

    pub fn begin_multiple_changes(&mut self) {
        self.depth += 1;
    }

    pub fn end_multiple_changes(&mut self) {
        structure_assert!(self.depth > 0, "end_multiple_changes without a matching begin");
        self.depth -= 1;
        if self.depth == 0 && self.schedule_pending {
            self.schedule_pending = false;
            self.reschedule();
        }
    }

    /// Remove every marker whose duration has elapsed at `now` and return them.
    pub fn take_expired(&mut self, now: u64) -> ExpiredChanges {
        let durations = self.durations;
        let mut expired = ExpiredChanges::default();

        if let Some(timestamp) = self.all_changed {
            if now.saturating_sub(timestamp) >= durations.all_changed_ms {
                self.all_changed = None;
                expired.all_changed = true;
            }
        }

        self.rows.retain(|&row, change| {
            let alive = now.saturating_sub(change.timestamp) < duration_of(&durations, change.kind);
            if !alive {
                expired.rows.push(row);
            }
            alive
        });

        self.cells.retain(|&cell, timestamp| {
            let alive = now.saturating_sub(*timestamp) < durations.value_changed_ms;
            if !alive {
                expired.cells.push(cell);
            }
            alive
        });

        if !expired.is_empty() {
            log::trace!(
                "expired {} rows, {} cells{} at {}",
                expired.rows.len(),
                expired.cells.len(),
                if expired.all_changed { " and the all-changed marker" } else { "" },
                now
            );
        }
        self.schedule();
        expired
    }

    /// Drop every marker.
    pub fn clear(&mut self) {
        self.all_changed = None;
        self.rows.clear();
        self.cells.clear();
        self.stash = None;
        self.schedule();
    }

    /// No marker may point past the row array, and outside a bracket an
    /// expiry is scheduled exactly when something is tracked.
    pub fn check_consistency(&self, row_count: usize) {
        if let Some((&row, _)) = self.rows.iter().next_back() {
            structure_assert!(
                row < row_count,
                "Recent change at row {} beyond row count {}",
                row,
                row_count
            );
        }
        if let Some((cell, _)) = self.cells.iter().next_back() {
            structure_assert!(
                cell.row_index < row_count,
                "Recent cell change at row {} beyond row count {}",
                cell.row_index,
                row_count
            );
        }
        if self.depth == 0 {
            structure_assert!(
                self.next_expiry.is_some() != self.is_empty(),
                "Expiry scheduled at {:?} with {} markers tracked",
                self.next_expiry,
                self.rows.len() + self.cells.len() + self.all_changed.map_or(0, |_| 1)
            );
        }
    }

    fn add_row_change(&mut self, row_index: usize, kind: RecentChangeKind, now: u64) {
        let duration = duration_of(&self.durations, kind);
        if duration == 0 {
            return;
        }
        let replaced = self
            .rows
            .insert(row_index, RecentChange { kind, timestamp: now })
            .is_some();
        self.note_expiry(now + duration, replaced);
    }

    /// A replaced marker may have held the earliest deadline, so only a
    /// fresh one can be folded in with `min`.
    fn note_expiry(&mut self, at: u64, replaced: bool) {
        if replaced {
            self.schedule();
        } else {
            self.next_expiry = Some(self.next_expiry.map_or(at, |current| current.min(at)));
        }
    }

    /// Recompute the expiry now, or at the outermost end of a bracket.
    fn schedule(&mut self) {
        if self.depth > 0 {
            self.schedule_pending = true;
        } else {
            self.reschedule();
        }
    }

    fn reschedule(&mut self) {
        let durations = &self.durations;
        let all_changed = self
            .all_changed
            .map(|timestamp| timestamp + durations.all_changed_ms);
        let rows = self
            .rows
            .values()
            .map(|change| change.timestamp + duration_of(durations, change.kind));
        let cells = self
            .cells
            .values()
            .map(|timestamp| timestamp + durations.value_changed_ms);

        self.next_expiry = all_changed.into_iter().chain(rows).chain(cells).min();
    }
}

fn duration_of(durations: &RecentChangeDurations, kind: RecentChangeKind) -> u64 {
    match kind {
        RecentChangeKind::AllChanged => durations.all_changed_ms,
        RecentChangeKind::Inserted => durations.inserted_ms,
        RecentChangeKind::Updated => durations.updated_ms,
        RecentChangeKind::ValueChanged => durations.value_changed_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> RecentChangeTracker {
        RecentChangeTracker::new(RecentChangeDurations {
            all_changed_ms: 500,
            inserted_ms: 2000,
            updated_ms: 1500,
            value_changed_ms: 1000,
        })
    }

    #[test]
    fn test_value_change_expires_at_duration() {
        let mut tracker = tracker();
        tracker.add_value_change(2, 5, 0);
        assert_eq!(tracker.next_expiry(), Some(1000));

        assert!(tracker.take_expired(999).is_empty());
        assert!(tracker.is_cell_changed(2, 5));

        let expired = tracker.take_expired(1000);
        assert_eq!(expired.cells, vec![CellPosition::new(5, 2)]);
        assert!(!tracker.is_cell_changed(2, 5));
        assert_eq!(tracker.next_expiry(), None);
        tracker.check_consistency(10);
    }

    #[test]
    fn test_zero_duration_disables_category() {
        let mut tracker = RecentChangeTracker::new(RecentChangeDurations::disabled());
        tracker.add_value_change(0, 0, 0);
        tracker.add_record_inserted_change(1, 0);
        tracker.add_all_changed(0);
        assert!(tracker.is_empty());
        assert_eq!(tracker.next_expiry(), None);
    }

    #[test]
    fn test_expiry_follows_earliest_marker() {
        let mut tracker = tracker();
        tracker.add_record_inserted_change(0, 100);
        tracker.add_record_updated_change(1, 100);
        tracker.add_all_changed(100);
        assert_eq!(tracker.next_expiry(), Some(600));

        let expired = tracker.take_expired(600);
        assert!(expired.all_changed);
        assert!(expired.rows.is_empty());
        assert_eq!(tracker.next_expiry(), Some(1600));

        let expired = tracker.take_expired(1600);
        assert_eq!(expired.rows, vec![1]);
        assert_eq!(tracker.row_change(0), Some(RecentChangeKind::Inserted));
        assert_eq!(tracker.next_expiry(), Some(2100));
    }

    #[test]
    fn test_rewritten_cell_moves_expiry_later() {
        let mut tracker = tracker();
        tracker.add_value_change(0, 1, 0);
        tracker.add_value_change(0, 1, 500);
        assert_eq!(tracker.next_expiry(), Some(1500));

        assert!(tracker.take_expired(1000).is_empty());
        assert!(tracker.is_cell_changed(0, 1));
        assert_eq!(tracker.next_expiry(), Some(1500));

        let expired = tracker.take_expired(1500);
        assert_eq!(expired.cells, vec![CellPosition::new(1, 0)]);
        assert_eq!(tracker.next_expiry(), None);
        tracker.check_consistency(2);
    }

    #[test]
    fn test_rewritten_row_and_all_changed_move_expiry_later() {
        let mut tracker = tracker();
        tracker.add_record_updated_change(3, 0);
        tracker.add_record_updated_change(3, 500);
        assert_eq!(tracker.next_expiry(), Some(2000));
        assert!(tracker.take_expired(1500).is_empty());
        assert_eq!(tracker.next_expiry(), Some(2000));

        tracker.add_all_changed(1600);
        assert_eq!(tracker.next_expiry(), Some(2000));
        tracker.add_all_changed(1800);
        assert_eq!(tracker.next_expiry(), Some(2000));
        assert_eq!(tracker.take_expired(2000).rows, vec![3]);
        assert_eq!(tracker.next_expiry(), Some(2300));

        tracker.add_all_changed(2200);
        assert_eq!(tracker.next_expiry(), Some(2700));
        assert!(!tracker.take_expired(2300).all_changed);
        assert_eq!(tracker.next_expiry(), Some(2700));
        tracker.check_consistency(4);
    }

    #[test]
    fn test_rewrite_inside_bracket_reschedules_at_end() {
        let mut tracker = tracker();
        tracker.add_value_change(2, 0, 0);

        tracker.begin_multiple_changes();
        tracker.add_value_change(2, 0, 700);
        tracker.end_multiple_changes();

        assert_eq!(tracker.next_expiry(), Some(1700));
        tracker.check_consistency(1);
    }

    #[test]
    fn test_rows_deleted_drops_and_shifts() {
        let mut tracker = tracker();
        for row in [1, 3, 4, 8] {
            tracker.add_record_updated_change(row, 0);
        }
        tracker.add_value_change(0, 9, 50);

        tracker.process_rows_deleted(3, 2);
        assert_eq!(tracker.row_change(1), Some(RecentChangeKind::Updated));
        assert_eq!(tracker.row_change(3), None);
        assert_eq!(tracker.row_change(6), Some(RecentChangeKind::Updated));
        assert!(tracker.is_cell_changed(0, 7));
        tracker.check_consistency(8);
    }

    #[test]
    fn test_rows_inserted_and_moved_shift_keys() {
        let mut tracker = tracker();
        tracker.add_value_change(1, 2, 0);
        tracker.add_record_inserted_change(5, 0);

        tracker.process_rows_inserted(2, 3);
        assert!(tracker.is_cell_changed(1, 5));
        assert_eq!(tracker.row_change(8), Some(RecentChangeKind::Inserted));

        tracker.process_row_moved(8, 0);
        assert_eq!(tracker.row_change(0), Some(RecentChangeKind::Inserted));
        assert!(tracker.is_cell_changed(1, 6));
    }

    #[test]
    fn test_reindex_follows_records() {
        let mut tracker = tracker();
        // rows project records [10, 11, 12]
        tracker.add_value_change(4, 0, 0);
        tracker.add_record_updated_change(2, 0);

        tracker.process_pre_reindex(&[10, 11, 12]);
        // reversed: record 10 now at row 2, record 12 at row 0
        tracker.process_post_reindex(true, |record| Some(12 - record));

        assert!(tracker.is_cell_changed(4, 2));
        assert_eq!(tracker.row_change(0), Some(RecentChangeKind::Updated));
        assert_eq!(tracker.row_change(2), None);
    }

    #[test]
    fn test_reindex_with_changed_rows_clears() {
        let mut tracker = tracker();
        tracker.add_value_change(0, 1, 0);
        tracker.process_pre_reindex(&[0, 1]);
        tracker.process_post_reindex(false, Some);

        assert!(tracker.is_empty());
        assert_eq!(tracker.next_expiry(), None);
    }

    #[test]
    fn test_schedule_deferred_inside_bracket() {
        let mut tracker = tracker();
        tracker.add_value_change(0, 0, 0);
        tracker.add_value_change(0, 1, 400);

        tracker.begin_multiple_changes();
        tracker.process_row_deleted(0);
        // Stale until the outermost end
        assert_eq!(tracker.next_expiry(), Some(1000));
        tracker.begin_multiple_changes();
        tracker.end_multiple_changes();
        assert_eq!(tracker.next_expiry(), Some(1000));
        tracker.end_multiple_changes();

        assert_eq!(tracker.next_expiry(), Some(1400));
        tracker.check_consistency(1);
    }

    #[test]
    #[should_panic(expected = "beyond row count")]
    fn test_check_consistency_catches_stale_row() {
        let mut tracker = tracker();
        tracker.add_record_inserted_change(4, 0);
        tracker.check_consistency(4);
    }
}
