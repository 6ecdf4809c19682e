/// LiveGrid Record Store
///
/// The view engine never owns records. It reads them from a `RecordStore`
/// and is told about every insert, delete and update after the fact. Record
/// identity is the identity of the `Rc` handle the store hands out.
///
/// # Examples
///
/// ```
/// use livegrid::{RecordStore, VecRecordStore};
///
/// let mut store = VecRecordStore::new();
/// store.push("alpha");
/// store.push("gamma");
/// store.insert(1, "beta").unwrap();
///
/// assert_eq!(store.record_count(), 3);
/// assert_eq!(*store.record(1).unwrap(), "beta");
/// ```

use std::rc::Rc;

/// The external record store a view is built on.
pub trait RecordStore {
    type Record: 'static;

    /// Number of records currently in the store
    fn record_count(&self) -> usize;

    /// The record at a store position, or None when out of range
    fn record(&self, index: usize) -> Option<Rc<Self::Record>>;

    /// Every record in store order. Implementations may build a fresh vector
    /// on each call; callers take one snapshot per repopulation.
    fn records(&self) -> Vec<Rc<Self::Record>> {
        (0..self.record_count())
            .filter_map(|index| self.record(index))
            .collect()
    }
}

/// A simple in-memory store backed by a vector of shared records.
#[derive(Debug, Clone)]
pub struct VecRecordStore<R> {
    records: Vec<Rc<R>>,
}

impl<R> VecRecordStore<R> {
    pub fn new() -> Self {
        VecRecordStore {
            records: Vec::new(),
        }
    }

    pub fn from_records(records: impl IntoIterator<Item = R>) -> Self {
        VecRecordStore {
            records: records.into_iter().map(Rc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record, returning its store index
    pub fn push(&mut self, record: R) -> usize {
        self.records.push(Rc::new(record));
        self.records.len() - 1
    }

    pub fn insert(&mut self, index: usize, record: R) -> Result<(), String> {
        if index > self.records.len() {
            return Err(format!("Index {} out of range [0, {}]", index, self.records.len()));
        }
        self.records.insert(index, Rc::new(record));
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<Rc<R>, String> {
        if index >= self.records.len() {
            return Err(format!("Index {} out of range [0, {})", index, self.records.len()));
        }
        Ok(self.records.remove(index))
    }

    /// Remove several records given by their indexes before the removal.
    pub fn remove_many(&mut self, indexes: &[usize]) -> Result<Vec<Rc<R>>, String> {
        let mut sorted = indexes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        if let Some(&last) = sorted.last() {
            if last >= self.records.len() {
                return Err(format!("Index {} out of range [0, {})", last, self.records.len()));
            }
        }

        let mut removed: Vec<Rc<R>> = sorted
            .iter()
            .rev()
            .map(|&index| self.records.remove(index))
            .collect();
        removed.reverse();
        Ok(removed)
    }

    pub fn get(&self, index: usize) -> Option<&Rc<R>> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<R>> {
        self.records.iter()
    }
}

impl<R> Default for VecRecordStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: 'static> RecordStore for VecRecordStore<R> {
    type Record = R;

    fn record_count(&self) -> usize {
        self.records.len()
    }

    fn record(&self, index: usize) -> Option<Rc<R>> {
        self.records.get(index).cloned()
    }

    fn records(&self) -> Vec<Rc<R>> {
        self.records.clone()
    }
}
