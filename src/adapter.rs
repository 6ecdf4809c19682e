/// LiveGrid View Adapter
///
/// The adapter keeps a filtered, sorted projection of an external record
/// store in sync with that store. The host mutates the store and then tells
/// the adapter what happened (`record_inserted`, `records_deleted`,
/// `invalidate_value`, ...); the adapter updates its rows incrementally and
/// reports the minimal set of row and cell changes to its `ViewListener`.
///
/// Every externally visible row index goes through the row-order reversal
/// transform; internally rows are always kept in forward order.
///
/// # Examples
///
/// ```
/// use livegrid::{Field, FieldValue, VecRecordStore, ViewAdapter, ViewConfig};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// struct Quote {
///     symbol: &'static str,
///     bid: i64,
/// }
///
/// let store = Rc::new(RefCell::new(VecRecordStore::from_records(vec![
///     Quote { symbol: "AAA", bid: 30 },
///     Quote { symbol: "BBB", bid: 10 },
///     Quote { symbol: "CCC", bid: 20 },
/// ])));
/// let fields = vec![
///     Field::new("symbol")
///         .with_value(|q: &Quote| FieldValue::String(q.symbol.to_string()))
///         .ordered_by_value(),
///     Field::new("bid")
///         .with_value(|q: &Quote| FieldValue::Int64(q.bid))
///         .ordered_by_value(),
/// ];
///
/// let mut view = ViewAdapter::new(store.clone(), fields, ViewConfig::default()).unwrap();
/// assert!(view.sort_by(1, None));
/// assert_eq!(view.get_value(0, 0), FieldValue::String("BBB".to_string()));
///
/// store.borrow_mut().push(Quote { symbol: "DDD", bid: 15 });
/// view.record_inserted(3, true);
/// assert_eq!(view.get_value(0, 1), FieldValue::String("DDD".to_string()));
/// ```

use crate::clock::{Clock, SystemClock};
use crate::config::ViewConfig;
use crate::field::{Field, FieldValue};
use crate::index_shift::contiguous_blocks;
use crate::listener::ViewListener;
use crate::recent_changes::{RecentChangeKind, RecentChangeTracker};
use crate::row_map::RecordRowMap;
use crate::sort::{resolve_sort_chain, SortChain, SortFieldSpecifier};
use crate::store::RecordStore;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

/// Row filter predicate; a record is shown iff it returns true
pub type RecordFilter<R> = Box<dyn Fn(&R) -> bool>;

/// What a single-record invalidation touched
#[derive(Debug, Clone, Copy)]
enum RecordChange<'a> {
    Record,
    Value(usize),
    Values(&'a [usize]),
    Fields { field_index: usize, count: usize },
    RecordAndValues(&'a [usize]),
}

/// Structural effect of re-evaluating one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    /// Filtered out before and after
    Hidden,
    Removed(usize),
    Inserted(usize),
    Moved { old_index: usize, new_index: usize },
    Unchanged(usize),
}

pub struct ViewAdapter<S: RecordStore> {
    store: Rc<RefCell<S>>,
    fields: Vec<Field<S::Record>>,
    config: ViewConfig,
    row_map: RecordRowMap<S::Record>,
    recent_changes: RecentChangeTracker,
    listener: Option<Box<dyn ViewListener>>,
    clock: Rc<dyn Clock>,
    filter: Option<RecordFilter<S::Record>>,
    sort_specifiers: Vec<SortFieldSpecifier>,
    sort_chain: Option<SortChain<S::Record>>,
    change_depth: usize,
    consistency_check_pending: bool,
}

impl<S: RecordStore> ViewAdapter<S> {
    /// Create an adapter showing every record of `store` in store order.
    pub fn new(
        store: Rc<RefCell<S>>,
        fields: Vec<Field<S::Record>>,
        config: ViewConfig,
    ) -> Result<Self, String> {
        config.validate()?;

        let records = store.borrow().records();
        let mut row_map = RecordRowMap::new();
        row_map.set_records(records);
        row_map.identity_rows();

        log::debug!(
            "view created with {} records and {} fields",
            row_map.record_count(),
            fields.len()
        );

        Ok(ViewAdapter {
            store,
            fields,
            recent_changes: RecentChangeTracker::new(config.recent_changes),
            config,
            row_map,
            listener: None,
            clock: Rc::new(SystemClock::new()),
            filter: None,
            sort_specifiers: Vec::new(),
            sort_chain: None,
            change_depth: 0,
            consistency_check_pending: false,
        })
    }

    /// Replace the clock used to timestamp recent changes.
    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn set_listener(&mut self, listener: Box<dyn ViewListener>) {
        self.listener = Some(listener);
    }

    pub fn take_listener(&mut self) -> Option<Box<dyn ViewListener>> {
        self.listener.take()
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn fields(&self) -> &[Field<S::Record>] {
        &self.fields
    }

    pub fn store(&self) -> &Rc<RefCell<S>> {
        &self.store
    }

    pub fn row_count(&self) -> usize {
        self.row_map.row_count()
    }

    pub fn record_count(&self) -> usize {
        self.row_map.record_count()
    }

    pub fn is_sorted(&self) -> bool {
        self.sort_chain.is_some()
    }

    pub fn is_filtered(&self) -> bool {
        self.filter.is_some()
    }

    pub fn is_row_order_reversed(&self) -> bool {
        self.config.row_order_reversed
    }

    /// Active sort, highest priority first, with the directions actually
    /// applied
    pub fn sort_specifiers(&self) -> &[SortFieldSpecifier] {
        &self.sort_specifiers
    }

    /// Value of a field at a row. Fields without a value accessor yield the
    /// row ordinal.
    pub fn get_value(&self, field_index: usize, row_index: usize) -> FieldValue {
        self.check_field_index(field_index);
        let record = self.record_at_row(row_index);
        self.fields[field_index]
            .value(&record)
            .unwrap_or(FieldValue::RowOrdinal(row_index))
    }

    pub fn record_at_row(&self, row_index: usize) -> Rc<S::Record> {
        let internal = self.internal_row(row_index);
        self.row_map.row_record(internal).clone()
    }

    pub fn record_index_from_row_index(&self, row_index: usize) -> usize {
        let internal = self.internal_row(row_index);
        self.row_map.row_record_index(internal)
    }

    /// Row showing a record, None while it is filtered out
    pub fn row_index_from_record_index(&self, record_index: usize) -> Option<usize> {
        self.row_map
            .record_row(record_index)
            .map(|row| self.external_row(row))
    }

    /// Mirror a row index for reversed display.
    pub fn reverse_row_index(&self, row_index: usize) -> usize {
        let row_count = self.row_map.row_count();
        structure_assert!(
            row_index < row_count,
            "Row index {} out of range [0, {})",
            row_index,
            row_count
        );
        row_count - row_index - 1
    }

    pub fn row_recent_change(&self, row_index: usize) -> Option<RecentChangeKind> {
        let internal = self.internal_row(row_index);
        self.recent_changes.row_change(internal)
    }

    pub fn is_cell_recently_changed(&self, field_index: usize, row_index: usize) -> bool {
        let internal = self.internal_row(row_index);
        self.recent_changes.is_cell_changed(field_index, internal)
    }

    pub fn begin_change(&mut self) {
        self.change_depth += 1;
        if self.change_depth == 1 {
            self.recent_changes.begin_multiple_changes();
            self.notify(|l| l.begin_change());
        }
    }

    pub fn end_change(&mut self) {
        structure_assert!(self.change_depth > 0, "end_change without a matching begin_change");
        self.change_depth -= 1;
        if self.change_depth == 0 {
            self.recent_changes.end_multiple_changes();
            if self.consistency_check_pending {
                self.consistency_check_pending = false;
                self.check_consistency();
            }
            self.notify(|l| l.end_change());
        }
    }

    /// Verify every structural invariant against the store. Panics on
    /// violation.
    pub fn check_consistency(&self) {
        let store = self.store.borrow();
        self.row_map.check_consistency(&*store);
        self.recent_changes.check_consistency(self.row_map.row_count());
    }

    /// The whole record changed.
    pub fn invalidate_record(&mut self, record_index: usize, recent: bool) {
        self.invalidate_record_change(record_index, RecordChange::Record, recent);
    }

    /// One value of a record changed.
    pub fn invalidate_value(&mut self, record_index: usize, field_index: usize, recent: bool) {
        self.check_field_index(field_index);
        self.invalidate_record_change(record_index, RecordChange::Value(field_index), recent);
    }

    /// Several values of a record changed.
    pub fn invalidate_record_values(&mut self, record_index: usize, field_indexes: &[usize], recent: bool) {
        for &field_index in field_indexes {
            self.check_field_index(field_index);
        }
        self.invalidate_record_change(record_index, RecordChange::Values(field_indexes), recent);
    }

    /// `count` consecutive fields of a record changed, starting at
    /// `field_index`.
    pub fn invalidate_record_fields(&mut self, record_index: usize, field_index: usize, count: usize, recent: bool) {
        if count == 0 {
            return;
        }
        self.check_field_index(field_index + count - 1);
        self.invalidate_record_change(
            record_index,
            RecordChange::Fields { field_index, count },
            recent,
        );
    }

    /// The record changed as a whole and these values are worth
    /// highlighting individually.
    pub fn invalidate_record_and_values(&mut self, record_index: usize, field_indexes: &[usize], recent: bool) {
        for &field_index in field_indexes {
            self.check_field_index(field_index);
        }
        self.invalidate_record_change(record_index, RecordChange::RecordAndValues(field_indexes), recent);
    }

    /// The store gained a record at `record_index`.
    pub fn record_inserted(&mut self, record_index: usize, recent: bool) {
        self.begin_change();

        let record = self.store_record(record_index);
        let visible = self.passes_filter(&record);
        self.row_map.insert_record(record_index, record, None);

        if visible {
            let row = self.insertion_row(record_index);
            self.row_map.insert_rows(row, &[record_index]);
            self.recent_changes.process_row_inserted(row);

            let external = self.external_row(row);
            let row_count = self.row_map.row_count();
            self.notify(|l| {
                l.rows_inserted(external, 1);
                l.row_count_changed(row_count);
            });

            if recent {
                let now = self.clock.now_ms();
                self.recent_changes.add_record_inserted_change(row, now);
            }
            log::trace!("record {} inserted at row {}", record_index, row);
        } else {
            log::trace!("record {} inserted, filtered out", record_index);
        }

        self.request_consistency_check();
        self.end_change();
    }

    /// The store gained records; `record_indexes` are their positions after
    /// the insertion, in any order.
    pub fn records_inserted(&mut self, record_indexes: &[usize], recent: bool) {
        let mut record_indexes = record_indexes.to_vec();
        record_indexes.sort_unstable();
        record_indexes.dedup();
        if record_indexes.is_empty() {
            return;
        }

        self.begin_change();

        let mut revealed = Vec::new();
        for (start, count) in contiguous_blocks(&record_indexes) {
            let records: Vec<Rc<S::Record>> =
                (start..start + count).map(|index| self.store_record(index)).collect();
            for (offset, record) in records.iter().enumerate() {
                if self.passes_filter(record) {
                    revealed.push(start + offset);
                }
            }
            self.row_map.insert_records_but_not_rows(start, records);
        }

        let positions = match &self.sort_chain {
            Some(chain) => self.row_map.merge_rows(revealed, |a, b| chain.compare(a, b)),
            None => self.row_map.merge_rows(revealed, |_, _| Ordering::Equal),
        };

        let blocks = contiguous_blocks(&positions);
        let mut row_count = self.row_map.row_count() - positions.len();
        for &(start, count) in &blocks {
            row_count += count;
            self.recent_changes.process_rows_inserted(start, count);
            let external = self.external_block(start, count, row_count);
            self.notify(|l| l.rows_inserted(external, count));
        }

        if !positions.is_empty() {
            let row_count = self.row_map.row_count();
            self.notify(|l| l.row_count_changed(row_count));
        }

        if recent {
            let now = self.clock.now_ms();
            for &row in &positions {
                self.recent_changes.add_record_inserted_change(row, now);
            }
        }

        log::debug!(
            "{} records inserted, {} rows in {} blocks",
            record_indexes.len(),
            positions.len(),
            blocks.len()
        );

        self.request_consistency_check();
        self.end_change();
    }

    /// The store lost the record that was at `record_index`.
    pub fn record_deleted(&mut self, record_index: usize) {
        self.begin_change();

        let row_count = self.row_map.row_count();
        if let Some(row) = self.row_map.remove_record(record_index) {
            self.recent_changes.process_row_deleted(row);

            let external = self.external_block(row, 1, row_count);
            let row_count = self.row_map.row_count();
            self.notify(|l| {
                l.rows_deleted(external, 1);
                l.row_count_changed(row_count);
            });
            log::trace!("record {} deleted from row {}", record_index, row);
        }

        self.request_consistency_check();
        self.end_change();
    }

    /// The store lost records; `record_indexes` are their positions before
    /// the removal, in any order.
    pub fn records_deleted(&mut self, record_indexes: &[usize]) {
        let mut record_indexes = record_indexes.to_vec();
        record_indexes.sort_unstable();
        record_indexes.dedup();
        if record_indexes.is_empty() {
            return;
        }

        self.begin_change();

        let mut orphaned_rows = Vec::new();
        for &(start, count) in contiguous_blocks(&record_indexes).iter().rev() {
            orphaned_rows.extend(self.row_map.remove_records_but_not_rows(start, count));
        }
        orphaned_rows.sort_unstable();

        let blocks = contiguous_blocks(&orphaned_rows);
        for &(start, count) in blocks.iter().rev() {
            let row_count = self.row_map.row_count();
            self.row_map.delete_rows_but_ignore_records(start, count);
            self.recent_changes.process_rows_deleted(start, count);

            let external = self.external_block(start, count, row_count);
            self.notify(|l| l.rows_deleted(external, count));
        }

        if !orphaned_rows.is_empty() {
            let row_count = self.row_map.row_count();
            self.notify(|l| l.row_count_changed(row_count));
        }

        log::debug!(
            "{} records deleted, {} rows in {} blocks",
            record_indexes.len(),
            orphaned_rows.len(),
            blocks.len()
        );

        self.request_consistency_check();
        self.end_change();
    }

    /// Re-apply the active sort to every row.
    pub fn sort(&mut self) {
        if self.sort_chain.is_none() {
            return;
        }

        self.begin_change();
        self.reindex(|view| {
            if let Some(chain) = &view.sort_chain {
                view.row_map.sort_rows(|a, b| chain.compare(a, b));
            }
            true
        });
        self.request_consistency_check();
        self.end_change();
    }

    /// Make `field_index` the primary sort key, keeping the previous keys
    /// behind it. Without a direction the current primary key is toggled and
    /// any other field sorts ascending.
    ///
    /// Returns false, leaving the sort untouched, when the field cannot be
    /// sorted.
    pub fn sort_by(&mut self, field_index: usize, ascending: Option<bool>) -> bool {
        let comparable = self
            .fields
            .get(field_index)
            .map_or(false, |field| field.comparer().is_comparable());
        if !comparable {
            log::warn!("sort by field {} rejected, field is not sortable", field_index);
            return false;
        }

        let ascending = ascending.unwrap_or_else(|| match self.sort_specifiers.first() {
            Some(primary) if primary.field_index == field_index => !primary.ascending,
            _ => true,
        });

        let mut specifiers = vec![SortFieldSpecifier::new(field_index, ascending)];
        specifiers.extend(
            self.sort_specifiers
                .iter()
                .filter(|specifier| specifier.field_index != field_index)
                .copied(),
        );
        specifiers.truncate(self.config.max_sorting_field_count);

        self.sort_by_many(&specifiers)
    }

    /// Replace the whole sort. An empty list clears it.
    ///
    /// Returns false, leaving the sort untouched, when none of the
    /// specifiers can be sorted by.
    pub fn sort_by_many(&mut self, specifiers: &[SortFieldSpecifier]) -> bool {
        if specifiers.is_empty() {
            self.clear_sort();
            return true;
        }

        let (applied, chain) = match resolve_sort_chain(
            &self.fields,
            specifiers,
            self.config.max_sorting_field_count,
        ) {
            Some(resolved) => resolved,
            None => {
                log::warn!("sort request {:?} rejected, no sortable field", specifiers);
                return false;
            }
        };

        log::debug!("sorting by {:?}", applied);
        self.sort_specifiers = applied;
        self.sort_chain = Some(chain);
        self.sort();
        true
    }

    /// Drop the sort and go back to store order.
    pub fn clear_sort(&mut self) {
        if self.sort_chain.is_none() {
            return;
        }

        log::debug!("sort cleared");
        self.sort_specifiers.clear();
        self.sort_chain = None;

        self.begin_change();
        self.reindex(|view| {
            view.row_map.sort_rows_by_record_index();
            true
        });
        self.request_consistency_check();
        self.end_change();
    }

    /// Install or clear the filter and re-filter every record.
    pub fn set_filter(&mut self, filter: Option<RecordFilter<S::Record>>) {
        self.filter = filter;
        self.invalidate_filtering();
    }

    /// Re-run the filter over every record.
    pub fn invalidate_filtering(&mut self) {
        self.begin_change();
        self.reindex(|view| view.rebuild_rows());
        self.request_consistency_check();
        self.end_change();
    }

    /// Anything may have changed: re-read the store and rebuild every row.
    pub fn invalidate_all(&mut self, recent: bool) {
        self.begin_change();

        let records = self.store.borrow().records();
        self.reindex(move |view| {
            if view.row_map.same_records(&records) {
                view.rebuild_rows()
            } else {
                view.row_map.set_records(records);
                view.rebuild_rows();
                false
            }
        });
        self.finish_invalidate_all(recent);

        self.request_consistency_check();
        self.end_change();
    }

    /// Every record's values may have changed but the store itself did not.
    pub fn invalidate_existing(&mut self, recent: bool) {
        self.begin_change();
        self.reindex(|view| view.rebuild_rows());
        self.finish_invalidate_all(recent);
        self.request_consistency_check();
        self.end_change();
    }

    /// Drop every row and rebuild from the store with the current filter and
    /// sort. Recent changes are forgotten.
    pub fn reset(&mut self) {
        self.begin_change();

        self.notify(|l| l.all_rows_deleted());
        self.recent_changes.clear();

        let records = self.store.borrow().records();
        let filter = &self.filter;
        let visible = |record: &S::Record| filter.as_ref().map_or(true, |f| f(record));
        match &self.sort_chain {
            Some(chain) => {
                let by_chain = |a: &S::Record, b: &S::Record| chain.compare(a, b);
                self.row_map.populate(records, &visible, Some(&by_chain));
            }
            None => self.row_map.populate(records, &visible, None),
        }

        let row_count = self.row_map.row_count();
        self.notify(|l| {
            if row_count > 0 {
                l.rows_inserted(0, row_count);
            }
            l.row_count_changed(row_count);
        });
        log::debug!("view reset, {} rows", row_count);

        self.request_consistency_check();
        self.end_change();
    }

    /// Show rows bottom to top. Every row index the adapter hands out or
    /// reports is mirrored while this is on.
    pub fn set_row_order_reversed(&mut self, reversed: bool) {
        if self.config.row_order_reversed == reversed {
            return;
        }

        self.begin_change();
        self.notify(|l| l.pre_reindex());
        self.config.row_order_reversed = reversed;
        self.notify(|l| {
            l.post_reindex();
            l.invalidate_all();
        });
        self.end_change();
    }

    /// When `tick` next has work to do; None when nothing is tracked
    pub fn next_tick_due(&self) -> Option<u64> {
        self.recent_changes.next_expiry()
    }

    /// Expire recent changes that have run their course and repaint what they
    /// highlighted. Returns true if anything expired.
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now_ms();
        match self.recent_changes.next_expiry() {
            Some(due) if due <= now => {}
            _ => return false,
        }

        self.begin_change();
        let expired = self.recent_changes.take_expired(now);

        if expired.all_changed {
            self.notify(|l| l.invalidate_all());
        } else {
            for &row in &expired.rows {
                let external = self.external_row(row);
                self.notify(|l| l.invalidate_row(external));
            }

            let mut cells = expired.cells.iter().peekable();
            while let Some(first) = cells.next() {
                let row = first.row_index;
                let mut field_indexes = vec![first.field_index];
                while let Some(cell) = cells.next_if(|cell| cell.row_index == row) {
                    field_indexes.push(cell.field_index);
                }
                if expired.rows.binary_search(&row).is_ok() {
                    continue;
                }

                let external = self.external_row(row);
                self.notify(|l| l.invalidate_row_cells(external, &field_indexes));
            }
        }

        self.request_consistency_check();
        self.end_change();
        !expired.is_empty()
    }

    fn invalidate_record_change(&mut self, record_index: usize, change: RecordChange<'_>, recent: bool) {
        self.begin_change();

        let row_count = self.row_map.row_count();
        let outcome = self.update_invalidated_record_row_index(record_index);
        log::trace!("record {} invalidated: {:?}", record_index, outcome);

        match outcome {
            RowOutcome::Hidden => {}
            RowOutcome::Removed(row) => {
                self.recent_changes.process_row_deleted(row);
                let external = self.external_block(row, 1, row_count);
                let row_count = self.row_map.row_count();
                self.notify(|l| {
                    l.rows_deleted(external, 1);
                    l.row_count_changed(row_count);
                });
            }
            RowOutcome::Inserted(row) => {
                self.recent_changes.process_row_inserted(row);
                let external = self.external_row(row);
                let row_count = self.row_map.row_count();
                self.notify(|l| {
                    l.rows_inserted(external, 1);
                    l.row_count_changed(row_count);
                });
                if recent {
                    let now = self.clock.now_ms();
                    self.recent_changes.add_record_inserted_change(row, now);
                }
            }
            RowOutcome::Moved { old_index, new_index } => {
                self.recent_changes.process_row_moved(old_index, new_index);
                let old_external = self.external_row(old_index);
                let new_external = self.external_row(new_index);
                self.notify(|l| l.rows_moved(old_external, new_external, 1));
                self.invalidate_row_content(new_index, change, recent);
            }
            RowOutcome::Unchanged(row) => {
                self.invalidate_row_content(row, change, recent);
            }
        }

        self.request_consistency_check();
        self.end_change();
    }

    /// Re-evaluate filter and sort position for one record and apply the
    /// resulting structural change to the row map.
    fn update_invalidated_record_row_index(&mut self, record_index: usize) -> RowOutcome {
        let old_row = self.row_map.record_row(record_index);
        let visible = if self.config.continuous_filtering {
            let record = self.row_map.record(record_index).clone();
            self.passes_filter(&record)
        } else {
            old_row.is_some()
        };

        match (old_row, visible) {
            (None, false) => RowOutcome::Hidden,
            (Some(row), false) => {
                self.row_map.remove_row(row);
                RowOutcome::Removed(row)
            }
            (None, true) => {
                let row = self.insertion_row(record_index);
                self.row_map.insert_rows(row, &[record_index]);
                RowOutcome::Inserted(row)
            }
            (Some(row), true) => {
                let target = match &self.sort_chain {
                    Some(chain) => self
                        .row_map
                        .find_moved_row_position(row, |a, b| chain.compare(a, b)),
                    None => row,
                };
                if target == row {
                    RowOutcome::Unchanged(row)
                } else {
                    self.row_map.move_row(row, target);
                    RowOutcome::Moved {
                        old_index: row,
                        new_index: target,
                    }
                }
            }
        }
    }

    fn invalidate_row_content(&mut self, row: usize, change: RecordChange<'_>, recent: bool) {
        let external = self.external_row(row);
        match change {
            RecordChange::Record | RecordChange::RecordAndValues(_) => {
                self.notify(|l| l.invalidate_row(external));
            }
            RecordChange::Value(field_index) => {
                self.notify(|l| l.invalidate_cell(field_index, external));
            }
            RecordChange::Values(field_indexes) => {
                self.notify(|l| l.invalidate_row_cells(external, field_indexes));
            }
            RecordChange::Fields { field_index, count } => {
                self.notify(|l| l.invalidate_row_columns(external, field_index, count));
            }
        }

        if !recent {
            return;
        }

        let now = self.clock.now_ms();
        match change {
            RecordChange::Record => self.recent_changes.add_record_updated_change(row, now),
            RecordChange::Value(field_index) => {
                self.recent_changes.add_value_change(field_index, row, now)
            }
            RecordChange::Values(field_indexes) => {
                self.recent_changes
                    .add_record_values_changes(row, field_indexes, now)
            }
            RecordChange::Fields { field_index, count } => {
                let field_indexes: Vec<usize> = (field_index..field_index + count).collect();
                self.recent_changes
                    .add_record_values_changes(row, &field_indexes, now)
            }
            RecordChange::RecordAndValues(field_indexes) => {
                self.recent_changes.add_record_updated_change(row, now);
                self.recent_changes
                    .add_record_values_changes(row, field_indexes, now);
            }
        }
    }

    /// Reorder or repopulate rows wholesale. `rebuild` returns whether the
    /// visible record set survived, in which case recent changes follow
    /// their records to their new rows.
    fn reindex<F>(&mut self, rebuild: F)
    where
        F: FnOnce(&mut Self) -> bool,
    {
        let row_count = self.row_map.row_count();

        self.notify(|l| l.pre_reindex());
        self.recent_changes
            .process_pre_reindex(self.row_map.row_record_indexes());

        let all_rows_kept = rebuild(self);

        let row_map = &self.row_map;
        self.recent_changes
            .process_post_reindex(all_rows_kept, |record_index| row_map.record_row(record_index));

        log::debug!(
            "reindexed {} rows into {} (rows kept: {})",
            row_count,
            self.row_map.row_count(),
            all_rows_kept
        );

        let new_row_count = self.row_map.row_count();
        self.notify(|l| {
            l.post_reindex();
            if new_row_count != row_count {
                l.row_count_changed(new_row_count);
            }
        });
    }

    /// Rebuild rows from the current records through the cheapest path for
    /// the active filter and sort.
    fn rebuild_rows(&mut self) -> bool {
        let filter = &self.filter;
        let visible = |record: &S::Record| filter.as_ref().map_or(true, |f| f(record));
        match &self.sort_chain {
            Some(chain) => {
                let by_chain = |a: &S::Record, b: &S::Record| chain.compare(a, b);
                self.row_map.rebuild_rows(&visible, Some(&by_chain))
            }
            None if filter.is_none() => self.row_map.identity_rows(),
            None => self.row_map.rebuild_rows(&visible, None),
        }
    }

    fn finish_invalidate_all(&mut self, recent: bool) {
        self.notify(|l| l.invalidate_all());
        if recent {
            let now = self.clock.now_ms();
            self.recent_changes.add_all_changed(now);
        }
    }

    /// Row a visible record without a row belongs at.
    fn insertion_row(&self, record_index: usize) -> usize {
        match &self.sort_chain {
            Some(chain) => {
                match self
                    .row_map
                    .binary_search_rows(record_index, |a, b| chain.compare(a, b))
                {
                    Ok(row) => structure_fail!("Record {} already shown at row {}", record_index, row),
                    Err(row) => row,
                }
            }
            None => self.row_map.store_order_insertion_point(record_index),
        }
    }

    fn passes_filter(&self, record: &S::Record) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(record))
    }

    fn store_record(&self, record_index: usize) -> Rc<S::Record> {
        let store = self.store.borrow();
        let record = store.record(record_index);
        match record {
            Some(record) => record,
            None => structure_fail!(
                "Record index {} out of range [0, {})",
                record_index,
                store.record_count()
            ),
        }
    }

    fn request_consistency_check(&mut self) {
        if !self.config.consistency_checks {
            return;
        }
        if self.change_depth > 0 {
            self.consistency_check_pending = true;
        } else {
            self.check_consistency();
        }
    }

    fn notify<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Box<dyn ViewListener>),
    {
        if let Some(listener) = self.listener.as_mut() {
            f(listener);
        }
    }

    fn external_row(&self, row_index: usize) -> usize {
        if self.config.row_order_reversed {
            self.reverse_row_index(row_index)
        } else {
            row_index
        }
    }

    /// First external row of an internal block, for a row array of
    /// `row_count` rows
    fn external_block(&self, row_index: usize, count: usize, row_count: usize) -> usize {
        if self.config.row_order_reversed {
            row_count - row_index - count
        } else {
            row_index
        }
    }

    fn internal_row(&self, row_index: usize) -> usize {
        let row_count = self.row_map.row_count();
        structure_assert!(
            row_index < row_count,
            "Row index {} out of range [0, {})",
            row_index,
            row_count
        );
        self.external_row(row_index)
    }

    fn check_field_index(&self, field_index: usize) {
        structure_assert!(
            field_index < self.fields.len(),
            "Field index {} out of range [0, {})",
            field_index,
            self.fields.len()
        );
    }
}
