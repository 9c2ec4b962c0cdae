//! Property tests for the lane partitioner

use lesson_capture::capture_engine::partition;
use proptest::prelude::*;

proptest! {
    #[test]
    fn partition_is_complete_and_ordered(items in prop::collection::vec(any::<i64>(), 0..300), lanes in 0usize..20) {
        let parts = partition(items.clone(), lanes);

        let flattened: Vec<i64> = parts.iter().flatten().copied().collect();
        prop_assert_eq!(flattened, items.clone());
        prop_assert!(parts.iter().all(|part| !part.is_empty()));
        prop_assert!(parts.len() <= lanes.max(1));
    }

    #[test]
    fn partition_sizes_differ_by_at_most_one(len in 1usize..300, lanes in 1usize..20) {
        let parts = partition((0..len).collect::<Vec<_>>(), lanes);

        let min = parts.iter().map(Vec::len).min().unwrap_or(0);
        let max = parts.iter().map(Vec::len).max().unwrap_or(0);
        prop_assert!(max - min <= 1);
        prop_assert_eq!(parts.len(), lanes.min(len));
        // Larger slices come first
        prop_assert!(parts.windows(2).all(|pair| pair[0].len() >= pair[1].len()));
    }
}

#[test]
fn test_empty_batch_yields_no_lanes() {
    assert!(partition(Vec::<i64>::new(), 4).is_empty());
}

#[test]
fn test_fewer_items_than_lanes() {
    let parts = partition(vec![1, 2], 8);
    assert_eq!(parts, vec![vec![1], vec![2]]);
}
