/// Sort specifiers and comparer composition.
///
/// A sort request is an ordered list of `SortFieldSpecifier`s, highest
/// priority first. It is resolved against the grid's fields into a
/// `SortChain`: a flat list of concrete comparers applied in order until one
/// of them returns a non-equal result.

use crate::field::{Comparer, Field};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single sort tier: a field index and a direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortFieldSpecifier {
    pub field_index: usize,
    pub ascending: bool,
}

impl SortFieldSpecifier {
    pub fn new(field_index: usize, ascending: bool) -> Self {
        SortFieldSpecifier {
            field_index,
            ascending,
        }
    }

    pub fn ascending(field_index: usize) -> Self {
        Self::new(field_index, true)
    }

    pub fn descending(field_index: usize) -> Self {
        Self::new(field_index, false)
    }
}

/// Composite comparer built from an ordered list of field comparers.
pub struct SortChain<R> {
    comparers: Vec<Comparer<R>>,
}

impl<R> SortChain<R> {
    pub fn new(comparers: Vec<Comparer<R>>) -> Self {
        SortChain { comparers }
    }

    /// First non-equal result wins; all equal means equal.
    pub fn compare(&self, a: &R, b: &R) -> Ordering {
        for comparer in &self.comparers {
            let ordering = comparer(a, b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub fn len(&self) -> usize {
        self.comparers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparers.is_empty()
    }
}

impl<R> fmt::Debug for SortChain<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortChain")
            .field("comparers", &self.comparers.len())
            .finish()
    }
}

/// Resolve sort specifiers against fields.
///
/// - The list is cut to `max_fields` entries.
/// - A field listed twice keeps its first (higher priority) entry.
/// - A field without a comparer for the requested direction uses its
///   opposite comparer; the returned specifier records the direction that
///   was actually applied.
/// - Unknown or non-comparable fields are dropped.
///
/// Returns None when nothing is left to sort by.
pub fn resolve_sort_chain<R>(
    fields: &[Field<R>],
    specifiers: &[SortFieldSpecifier],
    max_fields: usize,
) -> Option<(Vec<SortFieldSpecifier>, SortChain<R>)> {
    if specifiers.len() > max_fields {
        log::warn!(
            "sort request with {} fields truncated to {}",
            specifiers.len(),
            max_fields
        );
    }

    let mut applied: Vec<SortFieldSpecifier> = Vec::new();
    let mut comparers: Vec<Comparer<R>> = Vec::new();

    for specifier in specifiers.iter().take(max_fields) {
        if applied.iter().any(|s| s.field_index == specifier.field_index) {
            continue;
        }

        let resolved = fields
            .get(specifier.field_index)
            .and_then(|field| field.comparer().resolve(specifier.ascending));

        match resolved {
            Some((comparer, ascending)) => {
                if ascending != specifier.ascending {
                    log::debug!(
                        "field {} has no {} comparer, sorting {} instead",
                        specifier.field_index,
                        if specifier.ascending { "ascending" } else { "descending" },
                        if ascending { "ascending" } else { "descending" }
                    );
                }
                applied.push(SortFieldSpecifier::new(specifier.field_index, ascending));
                comparers.push(comparer);
            }
            None => {
                log::warn!(
                    "field {} is not sortable, dropped from sort",
                    specifier.field_index
                );
            }
        }
    }

    if comparers.is_empty() {
        None
    } else {
        Some((applied, SortChain::new(comparers)))
    }
}
