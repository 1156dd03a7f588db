//! Worker Module Tests
//!
//! ## Test Scopes
//! - **Store**: role tables, promotion and the result key.
//! - **Transforms**: the numeric definitions of `smooth` and `classify`.
//! - **Compute**: chunked execution matches sequential execution, and any chunk
//!   failure fails the whole segment.
//! - **Node**: dispatch of coordinator instructions, observed through the
//!   outbound channel instead of a socket.

#[cfg(test)]
mod tests {
    use crate::array::{ElementKind, SegmentData, SegmentKey, SegmentRole};
    use crate::config::WorkerConfig;
    use crate::error::{ClusterError, Result};
    use crate::protocol::*;
    use crate::worker::transforms::{classify, smooth};
    use crate::worker::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn ints(values: &[i64]) -> SegmentData {
        SegmentData::Int(values.to_vec())
    }

    fn engine(units: usize) -> ComputeEngine {
        ComputeEngine::new(units, TransformRegistry::with_builtins())
    }

    // ============================================================
    // STORE TESTS
    // ============================================================

    #[test]
    fn test_store_keeps_roles_apart() {
        let store = SegmentStore::new();
        let key = SegmentKey::new("a1", 0);

        store.put(SegmentRole::Primary, key.clone(), ints(&[1, 2]));
        store.put(SegmentRole::Replica, SegmentKey::new("a1", 2), ints(&[3]));

        assert_eq!(store.primary(&key), Some(ints(&[1, 2])));
        assert!(store.replica(&key).is_none());
        assert_eq!(store.primary_count(), 1);
        assert_eq!(store.replica_count(), 1);
    }

    #[test]
    fn test_store_redelivery_overwrites() {
        let store = SegmentStore::new();
        let key = SegmentKey::new("a1", 0);

        store.put(SegmentRole::Primary, key.clone(), ints(&[1]));
        store.put(SegmentRole::Primary, key.clone(), ints(&[9]));

        assert_eq!(store.primary(&key), Some(ints(&[9])));
        assert_eq!(store.primary_count(), 1);
    }

    #[test]
    fn test_store_promote_moves_replica() {
        let store = SegmentStore::new();
        let key = SegmentKey::new("a1", 4);
        store.put(SegmentRole::Replica, key.clone(), ints(&[5, 6, 7]));

        store.promote(&key).unwrap();

        assert_eq!(store.primary(&key), Some(ints(&[5, 6, 7])));
        assert!(store.replica(&key).is_none());
    }

    #[test]
    fn test_store_promote_without_replica_fails() {
        let store = SegmentStore::new();
        let err = store.promote(&SegmentKey::new("a1", 0)).unwrap_err();

        assert!(matches!(err, ClusterError::ProtocolViolation(_)));
        assert_eq!(store.primary_count(), 0);
    }

    #[test]
    fn test_store_primary_keys_filtered_and_sorted() {
        let store = SegmentStore::new();
        store.put(SegmentRole::Primary, SegmentKey::new("a1", 7), ints(&[1]));
        store.put(SegmentRole::Primary, SegmentKey::new("a1", 0), ints(&[1]));
        store.put(SegmentRole::Primary, SegmentKey::new("b", 0), ints(&[1]));
        store.put(SegmentRole::Replica, SegmentKey::new("a1", 4), ints(&[1]));

        let keys = store.primary_keys_for("a1");
        assert_eq!(keys, vec![SegmentKey::new("a1", 0), SegmentKey::new("a1", 7)]);
    }

    #[test]
    fn test_store_results_use_result_key() {
        let store = SegmentStore::new();
        let key = SegmentKey::new("a1", 4);

        store.store_result(&key, ints(&[0]));

        assert_eq!(store.result(&key), Some(ints(&[0])));
        assert!(store.primary(&key).is_none());
    }

    // ============================================================
    // TRANSFORM TESTS
    // ============================================================

    #[test]
    fn test_classify_small_values() {
        let out: Vec<i64> = (1..=10).map(classify).collect();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 3, 7, 8, 5, 10]);
    }

    #[test]
    fn test_classify_band_and_edges() {
        assert_eq!(classify(500), 6);
        assert_eq!(classify(999), 4);
        assert_eq!(classify(1001), 1001);
        assert_eq!(classify(1002), 0);
        assert_eq!(classify(0), 0);
        assert_eq!(classify(-3), 0);
        assert_eq!(classify(-4), -4);
    }

    #[test]
    fn test_smooth_values() {
        assert_eq!(smooth(0.0), 1.0);
        assert!((smooth(1.0) - 0.954_648_713_412_841).abs() < 1e-12);
        assert_eq!(smooth(-2.0), smooth(-2.0));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = TransformRegistry::with_builtins();

        assert!(registry.has_transform("smooth"));
        assert_eq!(registry.names(), vec!["classify", "smooth"]);
        assert_eq!(
            registry.get("classify").unwrap().element_kind(),
            ElementKind::Int
        );
        assert!(matches!(
            registry.get("sharpen"),
            Err(ClusterError::UnknownOperation(name)) if name == "sharpen"
        ));
    }

    #[test]
    fn test_transform_rejects_other_kind() {
        let registry = TransformRegistry::with_builtins();
        let smooth = registry.get("smooth").unwrap();

        assert!(smooth.apply(&ints(&[1])).is_err());
    }

    // ============================================================
    // COMPUTE ENGINE TESTS
    // ============================================================

    struct Explode;

    impl Transform for Explode {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn element_kind(&self) -> ElementKind {
            ElementKind::Int
        }

        fn apply(&self, chunk: &SegmentData) -> Result<SegmentData> {
            if let SegmentData::Int(values) = chunk
                && values.contains(&13)
            {
                panic!("unlucky chunk");
            }
            Ok(chunk.clone())
        }
    }

    #[tokio::test]
    async fn test_run_classify_in_chunks() {
        let key = SegmentKey::new("a1", 0);
        let data = SegmentData::Int((1..=10).collect());

        let out = engine(3).run("classify", &key, data).await.unwrap();

        assert_eq!(out, ints(&[1, 2, 3, 4, 5, 3, 7, 8, 5, 10]));
    }

    #[tokio::test]
    async fn test_run_more_units_than_elements() {
        let key = SegmentKey::new("a1", 0);
        let out = engine(16).run("classify", &key, ints(&[3, 4])).await.unwrap();

        assert_eq!(out, ints(&[classify(3), 4]));
    }

    #[tokio::test]
    async fn test_run_empty_segment() {
        let key = SegmentKey::new("a1", 0);
        let out = engine(4)
            .run("smooth", &key, SegmentData::Double(Vec::new()))
            .await
            .unwrap();

        assert_eq!(out, SegmentData::empty(ElementKind::Double));
    }

    #[tokio::test]
    async fn test_run_kind_mismatch_is_compute_failure() {
        let key = SegmentKey::new("a1", 0);
        let err = engine(2).run("smooth", &key, ints(&[1, 2])).await.unwrap_err();

        match err {
            ClusterError::ComputeFailed { array_id, .. } => assert_eq!(array_id, "a1"),
            other => panic!("Wrong error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_unknown_operation() {
        let key = SegmentKey::new("a1", 0);
        let err = engine(2).run("sharpen", &key, ints(&[1])).await.unwrap_err();

        assert_eq!(err.code(), "UNKNOWN_OPERATION");
    }

    #[tokio::test]
    async fn test_chunk_panic_fails_segment_and_stores_nothing() {
        let registry = TransformRegistry::with_builtins();
        registry.register(Arc::new(Explode));
        let engine = ComputeEngine::new(4, registry);

        let store = SegmentStore::new();
        let key = SegmentKey::new("a1", 0);
        store.put(SegmentRole::Primary, key.clone(), SegmentData::Int((10..18).collect()));

        let err = engine.apply_segment(&store, "explode", &key).await.unwrap_err();

        assert!(matches!(err, ClusterError::ComputeFailed { .. }));
        assert!(store.result(&key).is_none());
    }

    #[tokio::test]
    async fn test_apply_stores_results_per_segment() {
        let store = SegmentStore::new();
        store.put(SegmentRole::Primary, SegmentKey::new("a1", 0), ints(&[1, 2, 3]));
        store.put(SegmentRole::Primary, SegmentKey::new("a1", 3), ints(&[4, 5, 6]));

        let outcomes = engine(2).apply(&store, "classify", "a1", None).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, SegmentKey::new("a1", 0));
        assert_eq!(
            store.result(&SegmentKey::new("a1", 3)),
            Some(ints(&[4, 5, classify(6)]))
        );
    }

    #[tokio::test]
    async fn test_apply_targets_one_segment() {
        let store = SegmentStore::new();
        store.put(SegmentRole::Primary, SegmentKey::new("a1", 0), ints(&[1]));
        store.put(SegmentRole::Primary, SegmentKey::new("a1", 1), ints(&[3]));

        let outcomes = engine(1).apply(&store, "classify", "a1", Some(1)).await.unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].0, SegmentKey::new("a1", 1));
        assert!(store.result(&SegmentKey::new("a1", 0)).is_none());
    }

    #[tokio::test]
    async fn test_apply_without_primaries() {
        let store = SegmentStore::new();
        store.put(SegmentRole::Replica, SegmentKey::new("a1", 0), ints(&[1]));

        let err = engine(1).apply(&store, "classify", "a1", None).await.unwrap_err();

        assert!(matches!(err, ClusterError::NoLocalPrimary { .. }));
    }

    proptest! {
        #[test]
        fn prop_chunked_classify_matches_sequential(
            values in prop::collection::vec(-2_000i64..2_000, 0..300),
            units in 1usize..12,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let key = SegmentKey::new("p", 0);
            let out = rt
                .block_on(engine(units).run("classify", &key, SegmentData::Int(values.clone())))
                .unwrap();

            let expected: Vec<i64> = values.iter().map(|&x| classify(x)).collect();
            prop_assert_eq!(out, SegmentData::Int(expected));
        }

        #[test]
        fn prop_chunked_smooth_matches_sequential(
            values in prop::collection::vec(-1.0e6f64..1.0e6, 0..300),
            units in 1usize..12,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let key = SegmentKey::new("p", 0);
            let out = rt
                .block_on(engine(units).run("smooth", &key, SegmentData::Double(values.clone())))
                .unwrap();

            let expected: Vec<f64> = values.iter().map(|&x| smooth(x)).collect();
            prop_assert_eq!(out, SegmentData::Double(expected));
        }
    }

    // ============================================================
    // NODE DISPATCH TESTS
    // ============================================================

    fn node() -> Arc<WorkerNode> {
        let mut config = WorkerConfig::new("w0", "127.0.0.1:1");
        config.compute_units = 2;
        WorkerNode::new(config)
    }

    fn from_coordinator(body: Body) -> Message {
        Message::new(body, COORDINATOR_ID, "w0")
    }

    fn segment(start: usize, values: &[i64], is_primary: bool) -> SegmentPayload {
        SegmentPayload {
            array_id: "a1".to_string(),
            segment_id: start,
            start_index: start,
            end_index: start + values.len(),
            data: ints(values),
            is_primary,
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Message>) -> Message {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no message within timeout")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_node_stores_distributed_segments() {
        let node = node();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let distribute = Body::DistributeArray(segment(0, &[1, 2], true));
        node.handle_message(from_coordinator(distribute), &tx);
        node.handle_message(from_coordinator(Body::DistributeArray(segment(2, &[3], false))), &tx);
        node.handle_message(from_coordinator(Body::ReplicateData(segment(3, &[4], true))), &tx);

        assert_eq!(node.store().primary(&SegmentKey::new("a1", 0)), Some(ints(&[1, 2])));
        assert_eq!(node.store().replica(&SegmentKey::new("a1", 2)), Some(ints(&[3])));
        // REPLICATE_DATA is always a replica, whatever the flag says.
        assert_eq!(node.store().replica(&SegmentKey::new("a1", 3)), Some(ints(&[4])));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_node_promotes_and_acknowledges() {
        let node = node();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let replicate = Body::ReplicateData(segment(4, &[5, 6, 7], false));
        node.handle_message(from_coordinator(replicate), &tx);

        node.handle_message(
            from_coordinator(Body::RecoverData(RecoverData {
                array_id: "a1".to_string(),
                segment_id: 4,
                make_primary: true,
            })),
            &tx,
        );

        let reply = next(&mut rx).await;
        assert_eq!(reply.to, COORDINATOR_ID);
        assert_eq!(reply.from, "w0");
        match reply.body {
            Body::RecoveryComplete(done) => {
                assert_eq!(done.segment_id, 4);
                assert_eq!(done.status, RecoveryStatus::Recovered);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
        assert!(node.store().primary(&SegmentKey::new("a1", 4)).is_some());
    }

    #[tokio::test]
    async fn test_node_reports_failed_promotion() {
        let node = node();
        let (tx, mut rx) = mpsc::unbounded_channel();

        node.handle_message(
            from_coordinator(Body::RecoverData(RecoverData {
                array_id: "a1".to_string(),
                segment_id: 0,
                make_primary: true,
            })),
            &tx,
        );

        match next(&mut rx).await.body {
            Body::RecoveryComplete(done) => assert_eq!(done.status, RecoveryStatus::Failed),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_node_processes_primaries() {
        let node = node();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let distribute = Body::DistributeArray(segment(0, &[1, 2, 3], true));
        node.handle_message(from_coordinator(distribute), &tx);

        node.handle_message(
            from_coordinator(Body::ProcessSegment(ProcessSegment {
                array_id: "a1".to_string(),
                operation: "classify".to_string(),
                segment_id: None,
            })),
            &tx,
        );

        match next(&mut rx).await.body {
            Body::SegmentResult(result) => {
                assert_eq!(result.status, SegmentStatus::Completed);
                assert_eq!(result.segment_id, 0);
                assert_eq!(result.data, Some(ints(&[1, 2, 3])));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_node_reports_missing_targeted_segment() {
        let node = node();
        let (tx, mut rx) = mpsc::unbounded_channel();

        node.handle_message(
            from_coordinator(Body::ProcessSegment(ProcessSegment {
                array_id: "a1".to_string(),
                operation: "classify".to_string(),
                segment_id: Some(7),
            })),
            &tx,
        );

        match next(&mut rx).await.body {
            Body::SegmentResult(result) => {
                assert_eq!(result.status, SegmentStatus::Failed);
                assert_eq!(result.segment_id, 7);
                assert!(result.error.unwrap().contains("no local primary"));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_node_reports_kind_mismatch() {
        let node = node();
        let (tx, mut rx) = mpsc::unbounded_channel();
        node.handle_message(from_coordinator(Body::DistributeArray(segment(0, &[1], true))), &tx);

        node.handle_message(
            from_coordinator(Body::ProcessSegment(ProcessSegment {
                array_id: "a1".to_string(),
                operation: "smooth".to_string(),
                segment_id: None,
            })),
            &tx,
        );

        match next(&mut rx).await.body {
            Body::SegmentResult(result) => {
                assert_eq!(result.status, SegmentStatus::Failed);
                assert!(result.data.is_none());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_node_stops_on_shutdown() {
        let node = node();
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(!node.is_stopped());
        node.handle_message(from_coordinator(Body::Shutdown), &tx);
        assert!(node.is_stopped());
    }
}
