/// Recorded view notifications.
///
/// `EventRecorder` is a `ViewListener` that turns every callback into a
/// `ViewEvent` and appends it to a shared log. Events serialize to tagged
/// JSON so they can be shipped to a remote renderer or compared in tests.

use crate::listener::ViewListener;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// A single listener callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ViewEvent {
    BeginChange,
    EndChange,
    AllRowsDeleted,
    InvalidateAll,
    InvalidateRow {
        row_index: usize,
    },
    InvalidateCell {
        field_index: usize,
        row_index: usize,
    },
    InvalidateRowCells {
        row_index: usize,
        field_indexes: Vec<usize>,
    },
    InvalidateRowColumns {
        row_index: usize,
        field_index: usize,
        count: usize,
    },
    RowsInserted {
        row_index: usize,
        count: usize,
    },
    RowsDeleted {
        row_index: usize,
        count: usize,
    },
    RowsMoved {
        old_index: usize,
        new_index: usize,
        count: usize,
    },
    RowCountChanged {
        row_count: usize,
    },
    PreReindex,
    PostReindex,
}

impl ViewEvent {
    /// True for events that change the number or order of rows
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ViewEvent::AllRowsDeleted
                | ViewEvent::RowsInserted { .. }
                | ViewEvent::RowsDeleted { .. }
                | ViewEvent::RowsMoved { .. }
        )
    }
}

/// Shared event log written by an `EventRecorder`
pub type EventLog = Rc<RefCell<Vec<ViewEvent>>>;

/// A listener that records every callback into an `EventLog`.
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    log: EventLog,
}

impl EventRecorder {
    pub fn new() -> Self {
        EventRecorder::default()
    }

    /// Handle to the log; stays valid after the recorder is boxed and handed
    /// to an adapter.
    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    fn push(&self, event: ViewEvent) {
        self.log.borrow_mut().push(event);
    }
}

impl ViewListener for EventRecorder {
    fn begin_change(&mut self) {
        self.push(ViewEvent::BeginChange);
    }

    fn end_change(&mut self) {
        self.push(ViewEvent::EndChange);
    }

    fn all_rows_deleted(&mut self) {
        self.push(ViewEvent::AllRowsDeleted);
    }

    fn invalidate_all(&mut self) {
        self.push(ViewEvent::InvalidateAll);
    }

    fn invalidate_row(&mut self, row_index: usize) {
        self.push(ViewEvent::InvalidateRow { row_index });
    }

    fn invalidate_cell(&mut self, field_index: usize, row_index: usize) {
        self.push(ViewEvent::InvalidateCell { field_index, row_index });
    }

    fn invalidate_row_cells(&mut self, row_index: usize, field_indexes: &[usize]) {
        self.push(ViewEvent::InvalidateRowCells {
            row_index,
            field_indexes: field_indexes.to_vec(),
        });
    }

    fn invalidate_row_columns(&mut self, row_index: usize, field_index: usize, count: usize) {
        self.push(ViewEvent::InvalidateRowColumns { row_index, field_index, count });
    }

    fn rows_inserted(&mut self, row_index: usize, count: usize) {
        self.push(ViewEvent::RowsInserted { row_index, count });
    }

    fn rows_deleted(&mut self, row_index: usize, count: usize) {
        self.push(ViewEvent::RowsDeleted { row_index, count });
    }

    fn rows_moved(&mut self, old_index: usize, new_index: usize, count: usize) {
        self.push(ViewEvent::RowsMoved { old_index, new_index, count });
    }

    fn row_count_changed(&mut self, row_count: usize) {
        self.push(ViewEvent::RowCountChanged { row_count });
    }

    fn pre_reindex(&mut self) {
        self.push(ViewEvent::PreReindex);
    }

    fn post_reindex(&mut self) {
        self.push(ViewEvent::PostReindex);
    }
}
