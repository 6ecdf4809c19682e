/// The rendering-side contract.
///
/// A `ViewListener` receives every change the adapter makes to its rows, in
/// external row coordinates (already reversed when the view shows rows in
/// reverse order). Notifications arrive between `begin_change` and
/// `end_change`; only the outermost bracket is forwarded. Every method
/// defaults to doing nothing.
pub trait ViewListener {
    fn begin_change(&mut self) {}

    fn end_change(&mut self) {}

    /// Every row is gone; a full repopulation follows.
    fn all_rows_deleted(&mut self) {}

    fn invalidate_all(&mut self) {}

    fn invalidate_row(&mut self, _row_index: usize) {}

    fn invalidate_cell(&mut self, _field_index: usize, _row_index: usize) {}

    fn invalidate_row_cells(&mut self, _row_index: usize, _field_indexes: &[usize]) {}

    /// `count` consecutive fields starting at `field_index` changed.
    fn invalidate_row_columns(&mut self, _row_index: usize, _field_index: usize, _count: usize) {}

    fn rows_inserted(&mut self, _row_index: usize, _count: usize) {}

    fn rows_deleted(&mut self, _row_index: usize, _count: usize) {}

    fn rows_moved(&mut self, _old_index: usize, _new_index: usize, _count: usize) {}

    fn row_count_changed(&mut self, _row_count: usize) {}

    /// Rows are about to be reordered wholesale (sort, filter, reversal).
    fn pre_reindex(&mut self) {}

    fn post_reindex(&mut self) {}
}
