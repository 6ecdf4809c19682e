/// LiveGrid Field Implementation
///
/// A Field describes one column of the grid as seen by the view engine: how
/// to read a value out of a record and how (if at all) two records compare
/// on it. Fields never own data; records belong to the external store.
///
/// # Comparers
///
/// Each field carries at most one ascending and one descending comparer.
/// The pair is modelled as a capability (`FieldComparer`) so the sort chain
/// can be resolved once per specifier change instead of re-dispatching on
/// every comparison.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// A record comparer. Returns the ordering of `a` relative to `b`.
pub type Comparer<R> = Rc<dyn Fn(&R, &R) -> Ordering>;

/// Reads a field's value out of a record.
pub type ValueAccessor<R> = Rc<dyn Fn(&R) -> FieldValue>;

/// Field value enum to support multiple types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Bool(bool),
    /// Display ordinal of a row; produced by fields without a value accessor
    RowOrdinal(usize),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            FieldValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int64(v) => Some(*v),
            FieldValue::Int32(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_row_ordinal(&self) -> Option<usize> {
        match self {
            FieldValue::RowOrdinal(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values for sorting. Nulls sort last in both directions.
    pub fn compare(&self, other: &FieldValue, ascending: bool) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }

        let base_cmp = match (self, other) {
            (FieldValue::Int32(a), FieldValue::Int32(b)) => a.cmp(b),
            (FieldValue::Int64(a), FieldValue::Int64(b)) => a.cmp(b),
            (FieldValue::Int32(a), FieldValue::Int64(b)) => (*a as i64).cmp(b),
            (FieldValue::Int64(a), FieldValue::Int32(b)) => a.cmp(&(*b as i64)),
            (FieldValue::Float64(a), FieldValue::Float64(b)) => a.total_cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::RowOrdinal(a), FieldValue::RowOrdinal(b)) => a.cmp(b),
            // Mixed types - compare by type rank for deterministic ordering
            (a, b) => a.type_rank().cmp(&b.type_rank()),
        };

        if ascending {
            base_cmp
        } else {
            base_cmp.reverse()
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            FieldValue::Bool(_) => 0,
            FieldValue::Int32(_) | FieldValue::Int64(_) => 1,
            FieldValue::Float64(_) => 2,
            FieldValue::String(_) => 3,
            FieldValue::RowOrdinal(_) => 4,
            FieldValue::Null => 5,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int32(v) => write!(f, "{}", v),
            FieldValue::Int64(v) => write!(f, "{}", v),
            FieldValue::Float64(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::RowOrdinal(v) => write!(f, "#{}", v),
            FieldValue::Null => write!(f, "null"),
        }
    }
}

/// The comparers a field offers.
pub enum FieldComparer<R> {
    Both {
        ascending: Comparer<R>,
        descending: Comparer<R>,
    },
    AscendingOnly(Comparer<R>),
    DescendingOnly(Comparer<R>),
    NotComparable,
}

impl<R> FieldComparer<R> {
    pub fn is_comparable(&self) -> bool {
        !matches!(self, FieldComparer::NotComparable)
    }

    /// Pick the comparer for the requested direction.
    ///
    /// Returns the comparer together with the direction it actually sorts
    /// in. A missing direction falls back to the opposite comparer, and the
    /// returned direction says so; comparers are never reversed implicitly.
    pub fn resolve(&self, ascending: bool) -> Option<(Comparer<R>, bool)> {
        match (self, ascending) {
            (FieldComparer::Both { ascending: cmp, .. }, true) => Some((cmp.clone(), true)),
            (FieldComparer::Both { descending: cmp, .. }, false) => Some((cmp.clone(), false)),
            (FieldComparer::AscendingOnly(cmp), _) => Some((cmp.clone(), true)),
            (FieldComparer::DescendingOnly(cmp), _) => Some((cmp.clone(), false)),
            (FieldComparer::NotComparable, _) => None,
        }
    }
}

impl<R> Clone for FieldComparer<R> {
    fn clone(&self) -> Self {
        match self {
            FieldComparer::Both { ascending, descending } => FieldComparer::Both {
                ascending: ascending.clone(),
                descending: descending.clone(),
            },
            FieldComparer::AscendingOnly(cmp) => FieldComparer::AscendingOnly(cmp.clone()),
            FieldComparer::DescendingOnly(cmp) => FieldComparer::DescendingOnly(cmp.clone()),
            FieldComparer::NotComparable => FieldComparer::NotComparable,
        }
    }
}

impl<R> fmt::Debug for FieldComparer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldComparer::Both { .. } => "Both",
            FieldComparer::AscendingOnly(_) => "AscendingOnly",
            FieldComparer::DescendingOnly(_) => "DescendingOnly",
            FieldComparer::NotComparable => "NotComparable",
        };
        f.write_str(name)
    }
}

/// A grid field: an optional value accessor plus its comparers.
///
/// # Examples
///
/// ```
/// use livegrid::{Field, FieldValue};
///
/// struct Trade {
///     size: i64,
/// }
///
/// let size = Field::new("size")
///     .with_value(|t: &Trade| FieldValue::Int64(t.size))
///     .ordered_by_value();
///
/// let trade = Trade { size: 10 };
/// assert_eq!(size.value(&trade), Some(FieldValue::Int64(10)));
/// assert!(size.comparer().is_comparable());
/// ```
pub struct Field<R> {
    name: String,
    value: Option<ValueAccessor<R>>,
    comparer: FieldComparer<R>,
}

impl<R: 'static> Field<R> {
    /// A field with no value accessor and no comparers. Reading it yields
    /// the row ordinal, which makes it a row-number column.
    pub fn new(name: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: None,
            comparer: FieldComparer::NotComparable,
        }
    }

    /// Alias of `new` that reads better at call sites.
    pub fn row_number(name: impl Into<String>) -> Self {
        Self::new(name)
    }

    pub fn with_value<F>(mut self, accessor: F) -> Self
    where
        F: Fn(&R) -> FieldValue + 'static,
    {
        self.value = Some(Rc::new(accessor));
        self
    }

    pub fn with_ascending<F>(mut self, comparer: F) -> Self
    where
        F: Fn(&R, &R) -> Ordering + 'static,
    {
        let ascending: Comparer<R> = Rc::new(comparer);
        self.comparer = match self.comparer {
            FieldComparer::DescendingOnly(descending) | FieldComparer::Both { descending, .. } => {
                FieldComparer::Both { ascending, descending }
            }
            FieldComparer::AscendingOnly(_) | FieldComparer::NotComparable => {
                FieldComparer::AscendingOnly(ascending)
            }
        };
        self
    }

    pub fn with_descending<F>(mut self, comparer: F) -> Self
    where
        F: Fn(&R, &R) -> Ordering + 'static,
    {
        let descending: Comparer<R> = Rc::new(comparer);
        self.comparer = match self.comparer {
            FieldComparer::AscendingOnly(ascending) | FieldComparer::Both { ascending, .. } => {
                FieldComparer::Both { ascending, descending }
            }
            FieldComparer::DescendingOnly(_) | FieldComparer::NotComparable => {
                FieldComparer::DescendingOnly(descending)
            }
        };
        self
    }

    /// Derive both comparers from the value accessor using
    /// `FieldValue::compare`. Without a value accessor the field stays
    /// non-comparable.
    pub fn ordered_by_value(mut self) -> Self {
        if let Some(value) = self.value.clone() {
            let desc_value = value.clone();
            self.comparer = FieldComparer::Both {
                ascending: Rc::new(move |a: &R, b: &R| value(a).compare(&value(b), true)),
                descending: Rc::new(move |a: &R, b: &R| {
                    desc_value(a).compare(&desc_value(b), false)
                }),
            };
        }
        self
    }
}

impl<R> Field<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// Read this field from a record; None for row-number fields.
    pub fn value(&self, record: &R) -> Option<FieldValue> {
        self.value.as_ref().map(|accessor| accessor(record))
    }

    pub fn comparer(&self) -> &FieldComparer<R> {
        &self.comparer
    }
}

impl<R> fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("has_value", &self.value.is_some())
            .field("comparer", &self.comparer)
            .finish()
    }
}
