/// Index Shifting Helpers
///
/// Both the row map and the recent-change tracker key their state by
/// positions in an array that other code splices. These helpers keep such
/// keys aligned with a structural change instead of rebuilding them.
///
/// # Change Types
///
/// - Insert: `count` slots appear at `at`; every key `>= at` moves up
/// - Delete: `count` slots vanish at `at`; keys inside the range are gone,
///   keys past it move down
/// - Move: one slot travels from `old` to `new`; keys in between slide by one

/// Marks a mapping entry whose target was removed ahead of the entry itself.
/// Mapping adjusters leave such entries untouched.
pub const DETACHED: usize = usize::MAX;

/// Helper to adjust indices after an insert, delete or move.
pub struct IndexAdjuster;

impl IndexAdjuster {
    /// Adjust an index after `count` slots were inserted at `insert_index`.
    pub fn adjust_for_insert(index: usize, insert_index: usize, count: usize) -> usize {
        if index >= insert_index {
            index + count
        } else {
            index
        }
    }

    /// Adjust an index after `count` slots were deleted at `delete_index`.
    /// Returns None if the index was inside the deleted range.
    pub fn adjust_for_delete(index: usize, delete_index: usize, count: usize) -> Option<usize> {
        if index < delete_index {
            Some(index)
        } else if index < delete_index + count {
            None
        } else {
            Some(index - count)
        }
    }

    /// Adjust an index after the slot at `old_index` was moved to `new_index`.
    pub fn adjust_for_move(index: usize, old_index: usize, new_index: usize) -> usize {
        if index == old_index {
            new_index
        } else if old_index < new_index && index > old_index && index <= new_index {
            index - 1
        } else if new_index < old_index && index >= new_index && index < old_index {
            index + 1
        } else {
            index
        }
    }

    /// Adjust an entire index mapping for an insert
    pub fn adjust_mapping_for_insert(mapping: &mut [usize], insert_index: usize, count: usize) {
        for target in mapping.iter_mut() {
            if *target != DETACHED && *target >= insert_index {
                *target += count;
            }
        }
    }

    /// Adjust an entire index mapping for a delete.
    /// Returns positions in the mapping that pointed into the deleted range;
    /// those entries are left as they were and the caller must remove them.
    pub fn adjust_mapping_for_delete(
        mapping: &mut [usize],
        delete_index: usize,
        count: usize,
    ) -> Vec<usize> {
        let mut stale = Vec::new();

        for (position, target) in mapping.iter_mut().enumerate() {
            if *target == DETACHED {
                continue;
            }
            match Self::adjust_for_delete(*target, delete_index, count) {
                Some(adjusted) => *target = adjusted,
                None => stale.push(position),
            }
        }

        stale
    }
}

/// Groups ascending, duplicate-free indexes into `(start, len)` runs of
/// consecutive values.
///
/// ```
/// use livegrid::index_shift::contiguous_blocks;
///
/// assert_eq!(contiguous_blocks(&[2, 3, 4, 9, 10]), vec![(2, 3), (9, 2)]);
/// ```
pub fn contiguous_blocks(sorted: &[usize]) -> Vec<(usize, usize)> {
    let mut blocks: Vec<(usize, usize)> = Vec::new();

    for &index in sorted {
        match blocks.last_mut() {
            Some((start, len)) if *start + *len == index => *len += 1,
            _ => blocks.push((index, 1)),
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_adjuster_insert() {
        // Insert two slots at index 2
        assert_eq!(IndexAdjuster::adjust_for_insert(0, 2, 2), 0);
        assert_eq!(IndexAdjuster::adjust_for_insert(1, 2, 2), 1);
        assert_eq!(IndexAdjuster::adjust_for_insert(2, 2, 2), 4);
        assert_eq!(IndexAdjuster::adjust_for_insert(3, 2, 2), 5);
    }

    #[test]
    fn test_index_adjuster_delete() {
        // Delete [2, 4)
        assert_eq!(IndexAdjuster::adjust_for_delete(1, 2, 2), Some(1));
        assert_eq!(IndexAdjuster::adjust_for_delete(2, 2, 2), None);
        assert_eq!(IndexAdjuster::adjust_for_delete(3, 2, 2), None);
        assert_eq!(IndexAdjuster::adjust_for_delete(4, 2, 2), Some(2));
        assert_eq!(IndexAdjuster::adjust_for_delete(7, 2, 2), Some(5));
    }

    #[test]
    fn test_index_adjuster_move_down() {
        // 1 -> 4: slots 2..=4 slide up by one
        assert_eq!(IndexAdjuster::adjust_for_move(0, 1, 4), 0);
        assert_eq!(IndexAdjuster::adjust_for_move(1, 1, 4), 4);
        assert_eq!(IndexAdjuster::adjust_for_move(2, 1, 4), 1);
        assert_eq!(IndexAdjuster::adjust_for_move(4, 1, 4), 3);
        assert_eq!(IndexAdjuster::adjust_for_move(5, 1, 4), 5);
    }

    #[test]
    fn test_index_adjuster_move_up() {
        // 4 -> 1: slots 1..=3 slide down by one
        assert_eq!(IndexAdjuster::adjust_for_move(0, 4, 1), 0);
        assert_eq!(IndexAdjuster::adjust_for_move(1, 4, 1), 2);
        assert_eq!(IndexAdjuster::adjust_for_move(3, 4, 1), 4);
        assert_eq!(IndexAdjuster::adjust_for_move(4, 4, 1), 1);
        assert_eq!(IndexAdjuster::adjust_for_move(5, 4, 1), 5);
    }

    #[test]
    fn test_mapping_adjust_for_insert_skips_detached() {
        let mut mapping = vec![0, 2, DETACHED, 5, 7];
        IndexAdjuster::adjust_mapping_for_insert(&mut mapping, 3, 1);
        assert_eq!(mapping, vec![0, 2, DETACHED, 6, 8]);
    }

    #[test]
    fn test_mapping_adjust_for_delete() {
        let mut mapping = vec![0, 2, 3, 5, 7];
        let stale = IndexAdjuster::adjust_mapping_for_delete(&mut mapping, 3, 2);
        // Mapping position 2 pointed at 3, which is inside [3, 5)
        assert_eq!(stale, vec![2]);
        assert_eq!(mapping, vec![0, 2, 3, 3, 5]); // stale entry still here, caller removes it
    }

    #[test]
    fn test_contiguous_blocks() {
        assert!(contiguous_blocks(&[]).is_empty());
        assert_eq!(contiguous_blocks(&[5]), vec![(5, 1)]);
        assert_eq!(contiguous_blocks(&[0, 1, 2]), vec![(0, 3)]);
        assert_eq!(contiguous_blocks(&[1, 3, 4, 8]), vec![(1, 1), (3, 2), (8, 1)]);
    }
}
