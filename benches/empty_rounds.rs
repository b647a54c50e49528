//! Benchmarks the two components of this crate with the tightest
//! per-operation budget: the byte-tree codec (hit on every publish/fetch)
//! and a full `k`-party run of the shutdown barrier with no payload beyond
//! the two empty-tree rounds it always sends.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use vcr_core::byte_tree::{decode, ByteTree};
use vcr_core::bulletin_board::{BulletinBoard, BulletinBoardConfig};
use vcr_core::console::SilentConsole;
use vcr_core::dev::{run_parties, LocalTransportHub};
use vcr_core::node::{ProtocolNode, RootParams};
use vcr_core::random::Device;
use vcr_core::shutdown;

fn nested_tree(depth: usize) -> ByteTree {
    let mut tree = ByteTree::Leaf(vec![0u8; 32]);
    for _ in 0..depth {
        tree = ByteTree::Node(vec![tree, ByteTree::Leaf(vec![1, 2, 3, 4])]);
    }
    tree
}

fn bench_byte_tree_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("byte_tree round trip");
    for depth in [1usize, 4, 8] {
        let tree = nested_tree(depth);
        group.bench_with_input(BenchmarkId::new("encode_decode", depth), &tree, |b, tree| {
            b.iter(|| {
                let encoded = tree.encode();
                let decoded = decode(&encoded, 32, 1 << 24).unwrap();
                criterion::black_box(decoded);
            })
        });
    }
    group.finish()
}

fn root_node(sid: &str, dir: std::path::PathBuf, k: u32, j: u32) -> ProtocolNode {
    ProtocolNode::new_root(RootParams {
        role: "bench".to_string(),
        sid: sid.to_string(),
        directory: dir,
        k,
        j,
        rbitlen: 100,
        cert: 50,
        random_source: Arc::new(Device::new(std::path::PathBuf::from("/dev/urandom"))),
        console: Arc::new(SilentConsole),
    })
    .unwrap()
}

fn bench_empty_shutdown_rounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("Empty rounds");
    // The shutdown barrier's quiescence window alone is WAIT_FOR_OTHERS_MS
    // (1s); keep the sample count small so the benchmark finishes in a
    // reasonable time.
    group.sample_size(10);
    let k = 5;

    let run_counter = std::sync::atomic::AtomicU64::new(0);

    group.bench_function("5 parties, full shutdown barrier", |b| {
        b.iter(|| {
            let hub = Arc::new(LocalTransportHub::new_hub(k));
            let base = tempfile::tempdir().unwrap();
            let base_path = base.path().to_path_buf();
            let run_id = run_counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            run_parties(k, {
                let hub = Arc::clone(&hub);
                let base_path = base_path.clone();
                move |party| {
                    let dir = base_path.join(format!("run{run_id}-party{party}"));
                    let node = root_node(&format!("bench{run_id}p{party}"), dir, k, party);
                    let transport = hub.connect(party);
                    let bb = BulletinBoard::new_root(&node, transport, BulletinBoardConfig::default()).unwrap();
                    bb.start().unwrap();
                    shutdown::execute(&node, &bb, None).unwrap();
                }
            });
        })
    });

    group.finish()
}

criterion_group!(benches, bench_byte_tree_round_trip, bench_empty_shutdown_rounds);
criterion_main!(benches);
