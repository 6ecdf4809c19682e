/// LiveGrid Record/Row Map
///
/// Two parallel index arrays:
///
/// - `records` mirrors the external store: one slot per record, in store
///   order, each holding the record handle and a back-reference to the row
///   currently projecting it (`None` while the record is filtered out).
/// - `rows` is the visible projection in display order; `rows[i]` is the
///   store index of the record shown at row `i`.
///
/// The back-reference is only a lookup aid. The store owns the records and
/// this map never frees anything through it.
///
/// # Invariants
///
/// - `records.len()` equals the store's record count between operations
/// - `records[i]` is the store's record `i` (pointer identity)
/// - `records[rows[i]].row == Some(i)` for every row `i`
/// - a record no row points at has `row == None`
///
/// All of them are verified by `check_consistency`.

use crate::index_shift::{IndexAdjuster, DETACHED};
use crate::store::RecordStore;
use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::rc::Rc;

struct RecordSlot<R> {
    record: Rc<R>,
    row: Option<usize>,
}

pub struct RecordRowMap<R> {
    records: Vec<RecordSlot<R>>,
    rows: Vec<usize>,
}

impl<R> RecordRowMap<R> {
    pub fn new() -> Self {
        RecordRowMap {
            records: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn record(&self, record_index: usize) -> &Rc<R> {
        self.check_record_index(record_index);
        &self.records[record_index].record
    }

    /// Row currently projecting a record, None while it is filtered out
    pub fn record_row(&self, record_index: usize) -> Option<usize> {
        self.check_record_index(record_index);
        self.records[record_index].row
    }

    /// Store index of the record shown at a row
    pub fn row_record_index(&self, row_index: usize) -> usize {
        self.check_row_index(row_index);
        self.rows[row_index]
    }

    pub fn row_record(&self, row_index: usize) -> &Rc<R> {
        let record_index = self.row_record_index(row_index);
        &self.records[record_index].record
    }

    /// Store indexes of the visible records, in row order
    pub fn row_record_indexes(&self) -> &[usize] {
        &self.rows
    }

    pub fn records(&self) -> impl Iterator<Item = &Rc<R>> {
        self.records.iter().map(|slot| &slot.record)
    }

    /// True when `records` holds exactly these handles, in this order
    pub fn same_records(&self, records: &[Rc<R>]) -> bool {
        self.records.len() == records.len()
            && self
                .records
                .iter()
                .zip(records)
                .all(|(slot, record)| Rc::ptr_eq(&slot.record, record))
    }

    /// Replace every record and drop every row.
    pub fn set_records(&mut self, records: Vec<Rc<R>>) {
        self.rows.clear();
        self.records = records
            .into_iter()
            .map(|record| RecordSlot { record, row: None })
            .collect();
    }

    /// Clear both arrays.
    pub fn clear(&mut self) {
        self.rows.clear();
        self.records.clear();
    }

    /// Make every record visible, in store order.
    ///
    /// Returns true when the visible set did not change.
    pub fn identity_rows(&mut self) -> bool {
        let all_rows_kept = self.rows.len() == self.records.len();
        self.rows = (0..self.records.len()).collect();
        self.reindex_rows_from(0);
        all_rows_kept
    }

    /// Replace every record, then build rows for the ones passing `visible`,
    /// ordered by `comparer` or by store order when there is none.
    pub fn populate(
        &mut self,
        records: Vec<Rc<R>>,
        visible: &dyn Fn(&R) -> bool,
        comparer: Option<&dyn Fn(&R, &R) -> Ordering>,
    ) {
        self.set_records(records);
        self.rebuild_rows(visible, comparer);
    }

    /// Rebuild `rows` from the records passing `visible`, ordered by
    /// `comparer` or by store order when there is none.
    ///
    /// Returns true when exactly the previously visible records are visible
    /// again (order aside).
    pub fn rebuild_rows(
        &mut self,
        visible: &dyn Fn(&R) -> bool,
        comparer: Option<&dyn Fn(&R, &R) -> Ordering>,
    ) -> bool {
        let mut all_rows_kept = true;
        let mut rows = Vec::with_capacity(self.rows.len());

        for (record_index, slot) in self.records.iter_mut().enumerate() {
            let was_visible = slot.row.is_some();
            slot.row = None;
            if visible(&slot.record) {
                all_rows_kept &= was_visible;
                rows.push(record_index);
            }
        }

        all_rows_kept &= rows.len() == self.rows.len();
        self.rows = rows;
        match comparer {
            Some(comparer) => self.sort_rows(comparer),
            None => self.reindex_rows_from(0),
        }
        all_rows_kept
    }

    /// Insert a record at `record_index`; when `row_index` is given the
    /// record also gets a row there. The caller decides visibility and
    /// position.
    pub fn insert_record(&mut self, record_index: usize, record: Rc<R>, row_index: Option<usize>) {
        self.insert_records_but_not_rows(record_index, vec![record]);
        if let Some(row_index) = row_index {
            self.insert_rows(row_index, &[record_index]);
        }
    }

    /// Remove the record at `record_index` together with its row.
    ///
    /// Returns the row the record occupied, or None if it was filtered out.
    pub fn remove_record(&mut self, record_index: usize) -> Option<usize> {
        self.check_record_index(record_index);

        let row = self.records[record_index].row;
        if let Some(row_index) = row {
            self.rows.remove(row_index);
            self.reindex_rows_from(row_index);
        }

        self.records.remove(record_index);
        IndexAdjuster::adjust_mapping_for_delete(&mut self.rows, record_index, 1);
        row
    }

    /// Splice records into `records` without giving them rows. Existing rows
    /// keep pointing at the same records.
    pub fn insert_records_but_not_rows(&mut self, record_index: usize, records: Vec<Rc<R>>) {
        structure_assert!(
            record_index <= self.records.len(),
            "Record index {} out of range [0, {}]",
            record_index,
            self.records.len()
        );

        IndexAdjuster::adjust_mapping_for_insert(&mut self.rows, record_index, records.len());
        self.records.splice(
            record_index..record_index,
            records.into_iter().map(|record| RecordSlot { record, row: None }),
        );
    }

    /// Remove `count` records starting at `record_index` but leave their rows.
    ///
    /// Returns the rows that projected removed records. Those rows are
    /// detached and the caller must delete them with
    /// `delete_rows_but_ignore_records` before the map is consistent again.
    pub fn remove_records_but_not_rows(&mut self, record_index: usize, count: usize) -> Vec<usize> {
        structure_assert!(
            record_index + count <= self.records.len(),
            "Record range {}..{} out of range [0, {})",
            record_index,
            record_index + count,
            self.records.len()
        );

        let mut orphaned_rows = Vec::new();
        for slot in self.records.drain(record_index..record_index + count) {
            if let Some(row_index) = slot.row {
                self.rows[row_index] = DETACHED;
                orphaned_rows.push(row_index);
            }
        }

        IndexAdjuster::adjust_mapping_for_delete(&mut self.rows, record_index, count);
        orphaned_rows
    }

    /// Remove a contiguous block of rows without touching `records`.
    /// Records that still exist lose their back-reference.
    pub fn delete_rows_but_ignore_records(&mut self, row_index: usize, count: usize) {
        structure_assert!(
            row_index + count <= self.rows.len(),
            "Row range {}..{} out of range [0, {})",
            row_index,
            row_index + count,
            self.rows.len()
        );

        for record_index in self.rows.drain(row_index..row_index + count) {
            if record_index != DETACHED {
                self.records[record_index].row = None;
            }
        }
        self.reindex_rows_from(row_index);
    }

    /// Hide a record: its row goes away, the record stays.
    pub fn remove_row(&mut self, row_index: usize) {
        self.delete_rows_but_ignore_records(row_index, 1);
    }

    /// Give rows to records that have none, as one contiguous block.
    pub fn insert_rows(&mut self, row_index: usize, record_indexes: &[usize]) {
        structure_assert!(
            row_index <= self.rows.len(),
            "Row index {} out of range [0, {}]",
            row_index,
            self.rows.len()
        );
        for &record_index in record_indexes {
            self.check_record_index(record_index);
            structure_assert!(
                self.records[record_index].row.is_none(),
                "Record {} already has row {:?}",
                record_index,
                self.records[record_index].row
            );
        }

        self.rows
            .splice(row_index..row_index, record_indexes.iter().copied());
        self.reindex_rows_from(row_index);
    }

    /// Give rows to records that have none, each at its sorted position.
    ///
    /// `rows` must already be ordered by `comparer`. Returns the final row
    /// index of every inserted record, ascending.
    pub fn merge_rows<C>(&mut self, mut record_indexes: Vec<usize>, comparer: C) -> Vec<usize>
    where
        C: Fn(&R, &R) -> Ordering,
    {
        if record_indexes.is_empty() {
            return Vec::new();
        }

        record_indexes.sort_by(|&a, &b| self.compare_records(a, b, &comparer));
        let insertion_points: Vec<usize> = record_indexes
            .iter()
            .map(|&record_index| match self.binary_search_rows(record_index, &comparer) {
                Ok(row_index) => structure_fail!(
                    "Record {} being merged already sits at row {}",
                    record_index,
                    row_index
                ),
                Err(insertion_point) => insertion_point,
            })
            .collect();

        let old_rows = mem::take(&mut self.rows);
        let mut merged = Vec::with_capacity(old_rows.len() + record_indexes.len());
        let mut positions = Vec::with_capacity(record_indexes.len());
        let mut next = 0;

        for (&record_index, &insertion_point) in record_indexes.iter().zip(&insertion_points) {
            merged.extend_from_slice(&old_rows[next..insertion_point]);
            next = insertion_point;
            positions.push(merged.len());
            merged.push(record_index);
        }
        merged.extend_from_slice(&old_rows[next..]);

        self.rows = merged;
        self.reindex_rows_from(positions[0]);
        positions
    }

    /// Move one row, reindexing every row in between.
    pub fn move_row(&mut self, old_index: usize, new_index: usize) {
        self.check_row_index(old_index);
        self.check_row_index(new_index);
        if old_index == new_index {
            return;
        }

        let record_index = self.rows.remove(old_index);
        self.rows.insert(new_index, record_index);

        for row_index in old_index.min(new_index)..=old_index.max(new_index) {
            self.records[self.rows[row_index]].row = Some(row_index);
        }
    }

    /// Binary search for a record in `rows`, which must be ordered by
    /// `comparer`. Ties are broken by store order, so the order is total.
    ///
    /// `Ok(row)` if the record is visible at `row`, `Err(point)` with the
    /// insertion point otherwise.
    pub fn binary_search_rows<C>(&self, record_index: usize, comparer: C) -> Result<usize, usize>
    where
        C: Fn(&R, &R) -> Ordering,
    {
        self.check_record_index(record_index);
        self.rows
            .binary_search_by(|&probe| self.compare_records(probe, record_index, &comparer))
    }

    /// Where a record belongs in `rows` while they are in store order.
    pub fn store_order_insertion_point(&self, record_index: usize) -> usize {
        self.rows.partition_point(|&probe| probe < record_index)
    }

    /// Target index for a row whose sort key changed, searched in the
    /// current array with the row's own slot treated as absent.
    ///
    /// The result is the index the row must end up at once it has been
    /// taken out of its old slot, so it can be handed to `move_row` as is.
    pub fn find_moved_row_position<C>(&self, row_index: usize, comparer: C) -> usize
    where
        C: Fn(&R, &R) -> Ordering,
    {
        self.check_row_index(row_index);
        let record_index = self.rows[row_index];

        let mut lo = 0;
        let mut hi = self.rows.len();
        while lo < hi {
            let mut mid = lo + (hi - lo) / 2;
            if mid == row_index {
                // Probe a neighbour instead of ourselves
                if mid + 1 < hi {
                    mid += 1;
                } else if mid > lo {
                    mid -= 1;
                } else {
                    break;
                }
            }

            match self.compare_records(self.rows[mid], record_index, &comparer) {
                Ordering::Less => lo = mid + 1,
                _ => hi = mid,
            }
        }

        if lo > row_index {
            lo - 1
        } else {
            lo
        }
    }

    /// Sort every row by `comparer` (store order breaks ties), then reindex.
    pub fn sort_rows<C>(&mut self, comparer: C)
    where
        C: Fn(&R, &R) -> Ordering,
    {
        let records = &self.records;
        self.rows.sort_by(|&a, &b| {
            comparer(&records[a].record, &records[b].record).then(a.cmp(&b))
        });
        self.reindex_rows_from(0);
    }

    /// Put rows back in store order.
    pub fn sort_rows_by_record_index(&mut self) {
        self.rows.sort_unstable();
        self.reindex_rows_from(0);
    }

    /// Re-validate every invariant against the store. Panics on violation.
    pub fn check_consistency<S>(&self, store: &S)
    where
        S: RecordStore<Record = R>,
    {
        structure_assert!(
            self.records.len() == store.record_count(),
            "Map holds {} records, store reports {}",
            self.records.len(),
            store.record_count()
        );

        let mut visible = 0;
        for (record_index, slot) in self.records.iter().enumerate() {
            match store.record(record_index) {
                Some(record) if Rc::ptr_eq(&record, &slot.record) => {}
                _ => structure_fail!("Record {} does not match the store", record_index),
            }

            if let Some(row_index) = slot.row {
                visible += 1;
                structure_assert!(
                    row_index < self.rows.len() && self.rows[row_index] == record_index,
                    "Record {} points at row {} which does not point back",
                    record_index,
                    row_index
                );
            }
        }

        for (row_index, &record_index) in self.rows.iter().enumerate() {
            structure_assert!(record_index != DETACHED, "Row {} is detached", row_index);
            structure_assert!(
                record_index < self.records.len(),
                "Row {} points at record {} of {}",
                row_index,
                record_index,
                self.records.len()
            );
            structure_assert!(
                self.records[record_index].row == Some(row_index),
                "Row {} points at record {} whose row is {:?}",
                row_index,
                record_index,
                self.records[record_index].row
            );
        }

        structure_assert!(
            visible == self.rows.len(),
            "{} records have rows but there are {} rows",
            visible,
            self.rows.len()
        );
    }

    fn compare_records<C>(&self, a: usize, b: usize, comparer: &C) -> Ordering
    where
        C: Fn(&R, &R) -> Ordering,
    {
        comparer(&self.records[a].record, &self.records[b].record).then(a.cmp(&b))
    }

    fn reindex_rows_from(&mut self, row_index: usize) {
        for (offset, &record_index) in self.rows[row_index..].iter().enumerate() {
            if record_index != DETACHED {
                self.records[record_index].row = Some(row_index + offset);
            }
        }
    }

    fn check_record_index(&self, record_index: usize) {
        structure_assert!(
            record_index < self.records.len(),
            "Record index {} out of range [0, {})",
            record_index,
            self.records.len()
        );
    }

    fn check_row_index(&self, row_index: usize) {
        structure_assert!(
            row_index < self.rows.len(),
            "Row index {} out of range [0, {})",
            row_index,
            self.rows.len()
        );
    }
}

impl<R> Default for RecordRowMap<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for RecordRowMap<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordRowMap")
            .field("records", &self.records.len())
            .field("rows", &self.rows)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VecRecordStore;

    fn by_value(a: &i32, b: &i32) -> Ordering {
        a.cmp(b)
    }

    fn map_for(store: &VecRecordStore<i32>) -> RecordRowMap<i32> {
        let mut map = RecordRowMap::new();
        map.set_records(store.records());
        map.identity_rows();
        map
    }

    fn row_values(map: &RecordRowMap<i32>) -> Vec<i32> {
        (0..map.row_count()).map(|row| **map.row_record(row)).collect()
    }

    #[test]
    fn test_identity_rows() {
        let store = VecRecordStore::from_records(vec![5, 3, 8]);
        let map = map_for(&store);

        assert_eq!(map.row_count(), 3);
        assert_eq!(map.row_record_indexes(), &[0, 1, 2]);
        assert_eq!(map.record_row(2), Some(2));
        map.check_consistency(&store);
    }

    #[test]
    fn test_rebuild_rows_with_filter() {
        let store = VecRecordStore::from_records(vec![5, 3, 8, 1]);
        let mut map = map_for(&store);

        let kept = map.rebuild_rows(&|v: &i32| *v > 2, None);
        assert!(!kept);
        assert_eq!(row_values(&map), vec![5, 3, 8]);
        assert_eq!(map.record_row(3), None);
        map.check_consistency(&store);

        // Same filter again keeps every row
        assert!(map.rebuild_rows(&|v: &i32| *v > 2, None));
    }

    #[test]
    fn test_populate_sorted_and_filtered() {
        let store = VecRecordStore::from_records(vec![5, 3, 8, 1, 9]);
        let mut map = RecordRowMap::new();
        map.populate(store.records(), &|v: &i32| *v != 8, Some(&by_value));

        assert_eq!(row_values(&map), vec![1, 3, 5, 9]);
        assert_eq!(map.record_row(2), None);
        map.check_consistency(&store);
    }

    #[test]
    fn test_insert_and_remove_record() {
        let mut store = VecRecordStore::from_records(vec![10, 20, 30]);
        let mut map = map_for(&store);

        store.insert(1, 15).unwrap();
        map.insert_record(1, store.record(1).unwrap(), Some(1));
        assert_eq!(row_values(&map), vec![10, 15, 20, 30]);
        assert_eq!(map.row_record_indexes(), &[0, 1, 2, 3]);
        map.check_consistency(&store);

        store.remove(2).unwrap();
        assert_eq!(map.remove_record(2), Some(2));
        assert_eq!(row_values(&map), vec![10, 15, 30]);
        map.check_consistency(&store);
    }

    #[test]
    fn test_remove_filtered_out_record() {
        let mut store = VecRecordStore::from_records(vec![1, 50, 2]);
        let mut map = map_for(&store);
        map.rebuild_rows(&|v: &i32| *v < 10, None);

        store.remove(1).unwrap();
        assert_eq!(map.remove_record(1), None);
        assert_eq!(map.row_record_indexes(), &[0, 1]);
        map.check_consistency(&store);
    }

    #[test]
    fn test_insert_record_without_row() {
        let mut store = VecRecordStore::from_records(vec![1, 2]);
        let mut map = map_for(&store);

        store.insert(0, 99).unwrap();
        map.insert_record(0, store.record(0).unwrap(), None);
        // Existing rows now point one record further
        assert_eq!(map.row_record_indexes(), &[1, 2]);
        assert_eq!(map.record_row(0), None);
        map.check_consistency(&store);
    }

    #[test]
    fn test_bulk_remove_then_delete_rows() {
        let mut store = VecRecordStore::from_records(0..8);
        let mut map = map_for(&store);

        store.remove_many(&[2, 3]).unwrap();
        let mut orphaned = map.remove_records_but_not_rows(2, 2);
        orphaned.sort_unstable();
        assert_eq!(orphaned, vec![2, 3]);

        map.delete_rows_but_ignore_records(2, 2);
        assert_eq!(row_values(&map), vec![0, 1, 4, 5, 6, 7]);
        map.check_consistency(&store);
    }

    #[test]
    fn test_merge_rows_into_sorted() {
        let mut store = VecRecordStore::from_records(vec![40, 10, 30]);
        let mut map = map_for(&store);
        map.sort_rows(by_value);
        assert_eq!(row_values(&map), vec![10, 30, 40]);

        store.push(35);
        store.push(5);
        store.push(50);
        let count = map.record_count();
        map.insert_records_but_not_rows(count, store.records()[count..].to_vec());

        let positions = map.merge_rows(vec![3, 4, 5], by_value);
        assert_eq!(positions, vec![0, 3, 5]);
        assert_eq!(row_values(&map), vec![5, 10, 30, 35, 40, 50]);
        map.check_consistency(&store);
    }

    #[test]
    fn test_move_row() {
        let store = VecRecordStore::from_records(vec![0, 1, 2, 3, 4]);
        let mut map = map_for(&store);

        map.move_row(1, 3);
        assert_eq!(row_values(&map), vec![0, 2, 3, 1, 4]);
        map.check_consistency(&store);

        map.move_row(3, 0);
        assert_eq!(row_values(&map), vec![1, 0, 2, 3, 4]);
        map.check_consistency(&store);
    }

    #[test]
    fn test_binary_search_rows() {
        let mut store = VecRecordStore::from_records(vec![10, 30, 20]);
        let mut map = map_for(&store);
        map.sort_rows(by_value);

        assert_eq!(map.binary_search_rows(2, by_value), Ok(1));

        store.push(25);
        map.insert_records_but_not_rows(3, vec![store.record(3).unwrap()]);
        assert_eq!(map.binary_search_rows(3, by_value), Err(2));
    }

    #[test]
    fn test_equal_keys_fall_back_to_store_order() {
        let store = VecRecordStore::from_records(vec![7, 7, 7]);
        let mut map = map_for(&store);
        map.sort_rows(|a: &i32, b: &i32| b.cmp(a));
        assert_eq!(map.row_record_indexes(), &[0, 1, 2]);
    }

    /// Mutate one key, then check the self-skip search agrees with a full sort.
    fn assert_moved_position(values: Vec<i64>, moved_record: usize, new_value: i64) {
        use std::cell::Cell;

        let store = VecRecordStore::from_records(values.into_iter().map(Cell::new));
        let cmp = |a: &Cell<i64>, b: &Cell<i64>| a.get().cmp(&b.get());
        let mut map = RecordRowMap::new();
        map.set_records(store.records());
        map.identity_rows();
        map.sort_rows(cmp);

        let old_row = map.record_row(moved_record).unwrap();
        store.get(moved_record).unwrap().set(new_value);
        let target = map.find_moved_row_position(old_row, cmp);
        map.move_row(old_row, target);

        let mut expected = RecordRowMap::new();
        expected.set_records(store.records());
        expected.identity_rows();
        expected.sort_rows(cmp);

        assert_eq!(map.row_record_indexes(), expected.row_record_indexes());
        map.check_consistency(&store);
    }

    #[test]
    fn test_find_moved_row_position_matches_full_sort() {
        assert_moved_position(vec![10, 20, 30, 40, 50], 0, 45);
        assert_moved_position(vec![10, 20, 30, 40, 50], 4, 5);
        assert_moved_position(vec![10, 20, 30, 40, 50], 2, 31);
        assert_moved_position(vec![10, 20, 30, 40, 50], 2, 20);
        assert_moved_position(vec![10, 20, 30, 40, 50], 1, 100);
        assert_moved_position(vec![10, 20, 30, 40, 50], 3, -1);
        assert_moved_position(vec![5, 5, 5, 5], 1, 5);
        assert_moved_position(vec![42], 0, 7);
        assert_moved_position(vec![1, 2], 0, 3);
        assert_moved_position(vec![1, 2], 1, 0);
    }

    #[test]
    fn test_find_moved_row_position_unchanged() {
        let store = VecRecordStore::from_records(vec![1, 2, 3]);
        let mut map = map_for(&store);
        map.sort_rows(by_value);
        for row in 0..3 {
            assert_eq!(map.find_moved_row_position(row, by_value), row);
        }
    }

    #[test]
    #[should_panic(expected = "structural assertion failed")]
    fn test_check_consistency_detects_store_drift() {
        let mut store = VecRecordStore::from_records(vec![1, 2, 3]);
        let map = map_for(&store);
        store.push(4);
        map.check_consistency(&store);
    }

    #[test]
    #[should_panic(expected = "Row index 5 out of range")]
    fn test_out_of_range_row_panics() {
        let store = VecRecordStore::from_records(vec![1, 2, 3]);
        let map = map_for(&store);
        map.row_record_index(5);
    }
}
