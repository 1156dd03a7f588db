//! Array Module Tests
//!
//! ## Test Scopes
//! - **Planner**: exact coverage of `[0, total)` and balanced segment lengths.
//! - **SegmentData**: slicing, joining and the wire shape of the container.

#[cfg(test)]
mod tests {
    use crate::array::{ElementKind, SegmentData, SegmentKey, plan_segments};
    use proptest::prelude::*;

    // ============================================================
    // PLANNER TESTS
    // ============================================================

    #[test]
    fn test_plan_ten_over_three() {
        let ranges = plan_segments(10, 3).unwrap();
        assert_eq!(ranges, vec![0..4, 4..7, 7..10]);
    }

    #[test]
    fn test_plan_omits_empty_segments() {
        let ranges = plan_segments(2, 5).unwrap();
        assert_eq!(ranges, vec![0..1, 1..2]);
    }

    #[test]
    fn test_plan_empty_array() {
        assert!(plan_segments(0, 4).unwrap().is_empty());
    }

    #[test]
    fn test_plan_rejects_zero_parts() {
        let err = plan_segments(10, 0).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    proptest! {
        #[test]
        fn prop_plan_covers_range_exactly_once(total in 0usize..5_000, parts in 1usize..64) {
            let ranges = plan_segments(total, parts).unwrap();

            let mut expected_start = 0;
            for range in &ranges {
                prop_assert_eq!(range.start, expected_start);
                prop_assert!(range.start < range.end);
                expected_start = range.end;
            }
            prop_assert_eq!(expected_start, total);

            let sum: usize = ranges.iter().map(|r| r.len()).sum();
            prop_assert_eq!(sum, total);
            prop_assert!(ranges.len() <= parts);
        }

        #[test]
        fn prop_plan_lengths_are_balanced(total in 0usize..5_000, parts in 1usize..64) {
            let ranges = plan_segments(total, parts).unwrap();
            let base = total / parts;
            for range in &ranges {
                prop_assert!(range.len() == base || range.len() == base + 1);
            }
        }
    }

    // ============================================================
    // SEGMENT DATA TESTS
    // ============================================================

    #[test]
    fn test_slice_and_concat_preserve_order() {
        let data = SegmentData::Int((1..=10).collect());
        let parts: Vec<SegmentData> = plan_segments(data.len(), 4)
            .unwrap()
            .into_iter()
            .map(|r| data.slice(r))
            .collect();

        assert_eq!(parts.len(), 4);
        let joined = SegmentData::concat(ElementKind::Int, parts).unwrap();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_concat_rejects_mixed_kinds() {
        let parts = vec![SegmentData::Int(vec![1]), SegmentData::Double(vec![2.0])];
        assert!(SegmentData::concat(ElementKind::Int, parts).is_err());
    }

    #[test]
    fn test_segment_data_wire_shape() {
        let data = SegmentData::Double(vec![1.5, 2.0]);
        let json = serde_json::to_value(&data).unwrap();

        assert_eq!(json["elementKind"], "double");
        assert_eq!(json["data"][0], 1.5);
    }

    #[test]
    fn test_segment_key_display_and_result_key() {
        let key = SegmentKey::new("a1", 4);
        assert_eq!(key.to_string(), "a1_4");
        assert_eq!(key.result_key(), SegmentKey::new("a1_result", 4));
    }

    #[test]
    fn test_segment_keys_order_by_array_then_start() {
        let mut keys = vec![
            SegmentKey::new("b", 0),
            SegmentKey::new("a", 7),
            SegmentKey::new("a", 3),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                SegmentKey::new("a", 3),
                SegmentKey::new("a", 7),
                SegmentKey::new("b", 0),
            ]
        );
    }
}
