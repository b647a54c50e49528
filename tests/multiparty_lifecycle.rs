//! End-to-end multi-party scenarios (`SPEC_FULL.md` §8): a full
//! Supervisor-driven startup, scoped child bulletin boards exchanging
//! labeled payloads, and a synchronized shutdown, all running over the
//! in-process `LocalTransportHub` on real OS threads.

use std::sync::Arc;

use vcr_core::byte_tree::ByteTree;
use vcr_core::config::{MapConfigSource, ParamMap, ParamValue};
use vcr_core::dev::{run_parties, LocalTransportHub};
use vcr_core::shutdown;
use vcr_core::supervisor::{Supervisor, TransportRegistry};

fn build_supervisor(
    hub: Arc<LocalTransportHub>,
    party: u32,
    k: u32,
    sid: &str,
    dir: std::path::PathBuf,
) -> Supervisor {
    let mut registry = TransportRegistry::new();
    let hub_for_factory = Arc::clone(&hub);
    registry.register(
        "local",
        Arc::new(move |_params: &ParamMap| Ok(hub_for_factory.connect(party))),
    );

    let source = MapConfigSource::new()
        .with("sid", ParamValue::String(sid.to_string()))
        .with("directory", ParamValue::Path(dir))
        .with("nopart", ParamValue::Int(k as i64))
        .with("bullboard", ParamValue::String("local".to_string()));
    let params = ParamMap::from_source(&source).unwrap();

    Supervisor::build(&params, party, &registry, None).unwrap()
}

fn with_test_subscriber<T>(body: impl FnOnce() -> T) -> T {
    use tracing_subscriber::EnvFilter;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, body)
}

#[test]
fn full_lifecycle_across_three_parties() {
    with_test_subscriber(full_lifecycle_across_three_parties_inner);
}

fn full_lifecycle_across_three_parties_inner() {
    let k = 3;
    let hub = Arc::new(LocalTransportHub::new_hub(k));
    let base = tempfile::tempdir().unwrap();

    let results = run_parties(k, {
        let hub = Arc::clone(&hub);
        let base_path = base.path().to_path_buf();
        move |party| {
            let supervisor = build_supervisor(
                Arc::clone(&hub),
                party,
                k,
                &format!("lifecycle{party}"),
                base_path.join(format!("party{party}")),
            );

            // A scoped child carries its own bulletin-board labels without
            // colliding with the root's "Synchronize" slot.
            let child_node = supervisor.node.child("round", "r1").unwrap();
            let child_bb = supervisor.bulletin_board.child("round", "r1");

            let payload = ByteTree::from_i32(party as i32 * 10);
            child_bb.publish("contribution", &payload).unwrap();

            for peer in 1..=k {
                if peer == party {
                    continue;
                }
                let fetched = child_bb.fetch_from(peer, "contribution").unwrap();
                assert_eq!(fetched.as_i32().unwrap(), peer as i32 * 10);
            }

            assert_eq!(child_node.full_name(), format!("root.lifecycle{party}/round.r1"));

            let before = supervisor.bulletin_board.counters();
            shutdown::execute(&supervisor.node, &supervisor.bulletin_board, None).unwrap();
            let after = supervisor.bulletin_board.counters();

            assert!(after.sent_bytes >= before.sent_bytes);
            assert!(after.recv_bytes >= before.recv_bytes);
            after
        }
    });

    assert_eq!(results.len(), k as usize);
    // Invariant 7: counters are monotonic non-decreasing, never reset by
    // the shutdown barrier itself.
    for counters in &results {
        assert!(counters.sent_bytes > 0);
        assert!(counters.recv_bytes > 0);
    }
}

#[test]
fn scope_names_are_unique_within_one_execution() {
    let base = tempfile::tempdir().unwrap();
    let source = MapConfigSource::new()
        .with("sid", ParamValue::String("uniq1".to_string()))
        .with("directory", ParamValue::Path(base.path().join("dir")))
        .with("nopart", ParamValue::Int(1));
    let params = ParamMap::from_source(&source).unwrap();
    let hub = Arc::new(LocalTransportHub::new_hub(1));
    let mut registry = TransportRegistry::new();
    registry.register("local", Arc::new(move |_: &ParamMap| Ok(hub.connect(1))));

    let supervisor = Supervisor::build(&params, 1, &registry, None).unwrap();
    let _child_a = supervisor.node.child("mixnet", "a").unwrap();

    // A second child with the identical (role, sid) pair must collide with
    // the first's still-live `full_name`.
    let err = supervisor.node.child("mixnet", "a").unwrap_err();
    assert!(matches!(err, vcr_core::error::CoreError::Fatal(_)));
}

#[test]
fn bulletin_board_config_caps_apply_end_to_end() {
    let k = 1;
    let hub = Arc::new(LocalTransportHub::new_hub(k));
    let base = tempfile::tempdir().unwrap();
    let source = MapConfigSource::new()
        .with("sid", ParamValue::String("caps1".to_string()))
        .with("directory", ParamValue::Path(base.path().join("dir")))
        .with("nopart", ParamValue::Int(k as i64))
        // The root BB's own "Synchronize" handshake during `start()` is a
        // 5-byte encoded empty leaf (1 tag + 4-byte length + 0 payload); the
        // cap must admit that mandatory frame or `Supervisor::build` itself
        // fails before this test gets to exercise the oversized publish.
        .with("max_byte_length", ParamValue::Int(16))
        .with("bullboard", ParamValue::String("local".to_string()));
    let params = ParamMap::from_source(&source).unwrap();
    let mut registry = TransportRegistry::new();
    registry.register("local", Arc::new(move |_: &ParamMap| Ok(hub.connect(1))));

    let supervisor = Supervisor::build(&params, 1, &registry, None).unwrap();

    let oversized = ByteTree::Leaf(vec![0u8; 64]);
    let err = supervisor.bulletin_board.publish("too-big", &oversized).unwrap_err();
    assert!(matches!(err, vcr_core::error::CoreError::InvalidArg(_)));
}
