/// LiveGrid - Incremental View Maintenance for Record Grids
///
/// Keeps a filtered, sorted, optionally reversed projection of an external
/// record store in sync with that store, reports minimal batched row and
/// cell changes to a rendering layer, and tracks short-lived "recently
/// changed" markers for highlighting.

#[macro_use]
mod macros;

pub mod index_shift;
pub mod field;
pub mod clock;
pub mod config;
pub mod store;
pub mod listener;
pub mod events;
pub mod sort;
pub mod row_map;
pub mod recent_changes;
pub mod adapter;

pub use index_shift::{contiguous_blocks, IndexAdjuster};
pub use field::{Comparer, Field, FieldComparer, FieldValue, ValueAccessor};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RecentChangeDurations, ViewConfig};
pub use store::{RecordStore, VecRecordStore};
pub use listener::ViewListener;
pub use events::{EventLog, EventRecorder, ViewEvent};
pub use sort::{resolve_sort_chain, SortChain, SortFieldSpecifier};
pub use row_map::RecordRowMap;
pub use recent_changes::{CellPosition, ExpiredChanges, RecentChange, RecentChangeKind, RecentChangeTracker};
pub use adapter::{RecordFilter, ViewAdapter};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct Item {
        id: u32,
        key: Cell<i64>,
        shown: Cell<bool>,
    }

    /// Small deterministic generator so runs are reproducible
    struct XorShift(u64);

    impl XorShift {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn below(&mut self, bound: usize) -> usize {
            (self.next() % bound as u64) as usize
        }
    }

    fn fields() -> Vec<Field<Item>> {
        vec![
            Field::row_number("#"),
            Field::new("key")
                .with_value(|item: &Item| FieldValue::Int64(item.key.get()))
                .ordered_by_value(),
        ]
    }

    /// Ids a from-scratch filter and sort of the store would show
    fn expected_ids(store: &VecRecordStore<Item>, sorted: bool) -> Vec<u32> {
        let mut visible: Vec<(usize, &Rc<Item>)> = store
            .iter()
            .enumerate()
            .filter(|(_, item)| item.shown.get())
            .collect();
        if sorted {
            visible.sort_by_key(|(index, item)| (item.key.get(), *index));
        }
        visible.iter().map(|(_, item)| item.id).collect()
    }

    fn shown_ids(view: &ViewAdapter<VecRecordStore<Item>>) -> Vec<u32> {
        (0..view.row_count())
            .map(|row| view.record_at_row(row).id)
            .collect()
    }

    #[test]
    fn test_random_interleaving_matches_full_rebuild() {
        let mut rng = XorShift(0x2545_f491_4f6c_dd1d);
        let mut next_id = 0;
        let mut new_item = |rng: &mut XorShift| {
            next_id += 1;
            Item {
                id: next_id,
                key: Cell::new(rng.below(50) as i64),
                shown: Cell::new(rng.below(4) != 0),
            }
        };

        let initial: Vec<Item> = (0..30).map(|_| new_item(&mut rng)).collect();
        let store = Rc::new(RefCell::new(VecRecordStore::from_records(initial)));
        let config = ViewConfig {
            consistency_checks: true,
            ..ViewConfig::default()
        };
        let clock = Rc::new(ManualClock::new(0));
        let mut view = ViewAdapter::new(store.clone(), fields(), config)
            .unwrap()
            .with_clock(clock.clone());
        view.set_filter(Some(Box::new(|item: &Item| item.shown.get())));
        assert!(view.sort_by(1, Some(true)));

        let mut sorted = true;
        for step in 0..400 {
            clock.advance(37);
            let record_count = store.borrow().len();

            match rng.below(7) {
                0 => {
                    let index = rng.below(record_count + 1);
                    let item = new_item(&mut rng);
                    store.borrow_mut().insert(index, item).unwrap();
                    view.record_inserted(index, true);
                }
                1 if record_count > 0 => {
                    let index = rng.below(record_count);
                    store.borrow_mut().remove(index).unwrap();
                    view.record_deleted(index);
                }
                2 if record_count > 4 => {
                    let mut indexes: Vec<usize> = (0..4).map(|_| rng.below(record_count)).collect();
                    indexes.sort_unstable();
                    indexes.dedup();
                    store.borrow_mut().remove_many(&indexes).unwrap();
                    view.records_deleted(&indexes);
                }
                3 if record_count > 0 => {
                    let index = rng.below(record_count);
                    store.borrow().get(index).unwrap().key.set(rng.below(50) as i64);
                    view.invalidate_value(index, 1, true);
                }
                4 if record_count > 0 => {
                    let index = rng.below(record_count);
                    let item = store.borrow().get(index).unwrap().clone();
                    item.shown.set(!item.shown.get());
                    view.invalidate_record(index, true);
                }
                5 => {
                    let mut indexes = Vec::new();
                    let mut store = store.borrow_mut();
                    for _ in 0..3 {
                        let index = rng.below(store.len() + 1);
                        store.insert(index, new_item(&mut rng)).unwrap();
                        indexes = indexes
                            .into_iter()
                            .map(|i| IndexAdjuster::adjust_for_insert(i, index, 1))
                            .collect();
                        indexes.push(index);
                    }
                    drop(store);
                    view.records_inserted(&indexes, step % 2 == 0);
                }
                _ => {
                    sorted = !sorted;
                    if sorted {
                        assert!(view.sort_by(1, Some(true)));
                    } else {
                        view.clear_sort();
                    }
                }
            }

            view.tick();
            assert_eq!(
                shown_ids(&view),
                expected_ids(&store.borrow(), sorted),
                "diverged at step {}",
                step
            );
        }

        view.check_consistency();
    }

    #[test]
    fn test_event_stream_replays_row_count() {
        let store = Rc::new(RefCell::new(VecRecordStore::from_records(
            (0..10).map(|id| Item {
                id,
                key: Cell::new(id as i64),
                shown: Cell::new(true),
            }),
        )));
        let mut view = ViewAdapter::new(store.clone(), fields(), ViewConfig::default()).unwrap();
        let recorder = EventRecorder::new();
        let log = recorder.log();
        view.set_listener(Box::new(recorder));

        store.borrow_mut().remove_many(&[1, 2, 7]).unwrap();
        view.records_deleted(&[1, 2, 7]);
        assert!(view.sort_by(1, None));
        store.borrow_mut().push(Item {
            id: 10,
            key: Cell::new(-1),
            shown: Cell::new(true),
        });
        view.record_inserted(7, false);
        assert_eq!(view.record_at_row(0).id, 10);

        // A consumer tracking only structural events ends up with the same count
        let mut row_count = 10usize;
        for event in log.borrow().iter() {
            match event {
                ViewEvent::RowsInserted { count, .. } => row_count += count,
                ViewEvent::RowsDeleted { count, .. } => row_count -= count,
                _ => {}
            }
        }
        assert_eq!(row_count, view.row_count());

        let json = serde_json::to_string(&*log.borrow()).unwrap();
        assert!(json.contains(r#""type":"RowsDeleted""#));
    }
}
