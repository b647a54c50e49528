//! The bulletin board: a publish/wait-for rendezvous between the `k`
//! parties, keyed by `(scope_path, publisher_party, label)`, layered over a
//! [`crate::transport::Transport`].
//!
//! A `BulletinBoard` is a tree that mirrors the [`crate::node::ProtocolNode`]
//! tree: the root carries the counters and the `Started → Synchronized →
//! Running → Stopped` state machine (§4.5); [`BulletinBoard::child`] derives
//! a scoped handle that shares the same transport, config, counters, and
//! state — "a child BB never transitions independently; its liveness is its
//! parent's."

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::byte_tree::ByteTree;
use crate::error::{CoreError, Result};
use crate::node::{ActiveSink, ProtocolNode};
use crate::transport::Transport;

/// Per-root-BB configuration, inherited unchanged by every child scope.
#[derive(Debug, Clone, Copy)]
pub struct BulletinBoardConfig {
    /// `-1` for unbounded; otherwise a `fetch_from` deadline in milliseconds.
    pub max_wait_millis: i64,
    /// `publish` rejects trees whose encoding exceeds this; `fetch_from`
    /// rejects decodes whose cumulative size would.
    pub max_byte_length: u64,
    /// `fetch_from` rejects decodes whose NODE nesting would exceed this.
    pub max_recursion_depth: usize,
}

impl Default for BulletinBoardConfig {
    fn default() -> Self {
        Self {
            max_wait_millis: -1,
            max_byte_length: 1 << 40,
            max_recursion_depth: 10,
        }
    }
}

impl BulletinBoardConfig {
    fn deadline(&self) -> Option<Duration> {
        if self.max_wait_millis < 0 {
            None
        } else {
            Some(Duration::from_millis(self.max_wait_millis as u64))
        }
    }
}

/// Cumulative bandwidth/latency counters. Shared, by `Arc`, across the
/// whole BB tree: "Counters (root BB only)" in the data model is realized
/// here as a single shared instance every scope's handle points at.
#[derive(Debug, Default, Clone, Copy)]
pub struct Counters {
    pub sent_bytes: u64,
    pub recv_bytes: u64,
    pub net_millis_cumulative: u64,
    pub wait_millis_cumulative: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BbState {
    Created,
    Started,
    Synchronized,
    Running,
    Stopped,
}

/// A scope of the bulletin board: `(scope_path, this_party, k)` plus shared
/// handles to the transport, configuration, counters, and state machine.
pub struct BulletinBoard {
    scope_path: String,
    party: u32,
    k: u32,
    config: BulletinBoardConfig,
    transport: Arc<dyn Transport>,
    counters: Arc<Mutex<Counters>>,
    state: Arc<Mutex<BbState>>,
}

impl fmt::Debug for BulletinBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulletinBoard")
            .field("scope_path", &self.scope_path)
            .field("party", &self.party)
            .finish_non_exhaustive()
    }
}

/// Forwards active-party updates from a [`ProtocolNode`] to the transport
/// underlying the BB attached at its root (§4.2: "when BB is attached,
/// propagates to BB so subsequent fetch of an inactive party's slot fails
/// fast").
#[derive(Debug)]
struct TransportActiveSink {
    transport: Arc<dyn Transport>,
}

impl ActiveSink for TransportActiveSink {
    fn on_set_active(&self, active: &[bool]) {
        self.transport.set_active(active.to_vec());
    }
}

impl BulletinBoard {
    /// Attaches a root `BulletinBoard` to `node`, registering an
    /// [`ActiveSink`] so future `node.set_active` calls reach the transport.
    pub fn new_root(node: &ProtocolNode, transport: Arc<dyn Transport>, config: BulletinBoardConfig) -> Result<Self> {
        node.attach_active_sink(Arc::new(TransportActiveSink {
            transport: Arc::clone(&transport),
        }))?;

        Ok(Self {
            scope_path: String::new(),
            party: node.j(),
            k: node.k(),
            config,
            transport,
            counters: Arc::new(Mutex::new(Counters::default())),
            state: Arc::new(Mutex::new(BbState::Created)),
        })
    }

    /// A scoped child BB whose `scope_path` nests under this one's,
    /// sharing the transport, config, counters, and state machine.
    pub fn child(&self, role: &str, sid: &str) -> Self {
        let scope_path = if self.scope_path.is_empty() {
            format!("{role}.{sid}")
        } else {
            format!("{}/{role}.{sid}", self.scope_path)
        };
        Self {
            scope_path,
            party: self.party,
            k: self.k,
            config: self.config,
            transport: Arc::clone(&self.transport),
            counters: Arc::clone(&self.counters),
            state: Arc::clone(&self.state),
        }
    }

    pub fn scope_path(&self) -> &str {
        &self.scope_path
    }

    pub fn party(&self) -> u32 {
        self.party
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn counters(&self) -> Counters {
        *self.counters.lock().expect("counters mutex poisoned")
    }

    /// `Created → Started → Synchronized → Running`: starts the transport,
    /// then performs the first-round synchronization message (party 1
    /// publishes `"Synchronize"`; every other party fetches it), then clears
    /// the network-time counter.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock().map_err(|_| CoreError::fatal("BB state mutex poisoned"))?;
            if *state != BbState::Created {
                return Err(CoreError::fatal("BulletinBoard::start called more than once"));
            }
            *state = BbState::Started;
        }

        self.transport.start()?;
        tracing::info!(scope_path = %self.scope_path, "transport started");

        if self.party == 1 {
            self.publish("Synchronize", &ByteTree::Leaf(Vec::new()))?;
        } else {
            self.fetch_from(1, "Synchronize")?;
        }

        {
            let mut state = self.state.lock().map_err(|_| CoreError::fatal("BB state mutex poisoned"))?;
            *state = BbState::Synchronized;
        }
        self.clear_total_network_time();
        {
            let mut state = self.state.lock().map_err(|_| CoreError::fatal("BB state mutex poisoned"))?;
            *state = BbState::Running;
        }

        tracing::info!(scope_path = %self.scope_path, "bulletin board running");
        Ok(())
    }

    /// Encodes `tree` and advertises it under `(scope_path, label)`.
    pub fn publish(&self, label: &str, tree: &ByteTree) -> Result<()> {
        let bytes = tree.encode();
        if bytes.len() as u64 > self.config.max_byte_length {
            return Err(CoreError::invalid_arg(format!(
                "publish of {} bytes exceeds max_byte_length {}",
                bytes.len(),
                self.config.max_byte_length
            )));
        }

        let size = bytes.len() as u64;
        let started = Instant::now();
        self.transport.publish(&self.scope_path, label, bytes)?;
        let elapsed = started.elapsed();

        let mut counters = self.counters.lock().map_err(|_| CoreError::fatal("counters mutex poisoned"))?;
        counters.sent_bytes += size;
        counters.net_millis_cumulative += elapsed.as_millis() as u64;

        tracing::debug!(scope_path = %self.scope_path, %label, size, "published");
        Ok(())
    }

    /// Fetches `from_party`'s published bytes for `(scope_path, label)` and
    /// decodes them, bounded by this BB's configured depth and size caps.
    pub fn fetch_from(&self, from_party: u32, label: &str) -> Result<ByteTree> {
        let result = self
            .transport
            .fetch(from_party, &self.scope_path, label, self.config.deadline())?;

        if result.bytes.len() as u64 > self.config.max_byte_length {
            return Err(CoreError::invalid_arg(format!(
                "fetch of {} bytes exceeds max_byte_length {}",
                result.bytes.len(),
                self.config.max_byte_length
            )));
        }

        let tree = crate::byte_tree::decode(&result.bytes, self.config.max_recursion_depth, self.config.max_byte_length)?;

        let mut counters = self.counters.lock().map_err(|_| CoreError::fatal("counters mutex poisoned"))?;
        counters.recv_bytes += result.bytes.len() as u64;
        counters.net_millis_cumulative += result.timing.network.as_millis() as u64;
        counters.wait_millis_cumulative += result.timing.wait.as_millis() as u64;

        tracing::debug!(scope_path = %self.scope_path, %label, from_party, size = result.bytes.len(), "fetched");
        Ok(tree)
    }

    /// Drops this scope's slots via the transport (used by `delete_state`).
    pub fn unpublish(&self) {
        self.transport.unpublish(&self.scope_path);
    }

    /// Forwards an active-party update to the transport so in-flight
    /// `fetch_from(inactive)` calls fail fast with `Refused`.
    pub fn set_active(&self, active: &[bool]) {
        self.transport.set_active(active.to_vec());
    }

    /// Resets the network-time counter (used once after startup
    /// synchronization).
    pub fn clear_total_network_time(&self) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.net_millis_cumulative = 0;
        }
    }

    /// Reaches into `Shutdown` to stop the underlying transport. Only
    /// [`crate::shutdown::execute`] should call this.
    pub(crate) fn stop_transport(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = BbState::Stopped;
        }
        self.transport.stop();
        tracing::info!(scope_path = %self.scope_path, "transport stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::SilentConsole;
    use crate::dev::LocalTransportHub;
    use crate::node::{ProtocolNode, RootParams};
    use crate::random::Device;
    use std::path::PathBuf;

    fn root_node(sid: &str, dir: PathBuf, k: u32, j: u32) -> ProtocolNode {
        ProtocolNode::new_root(RootParams {
            role: "root".to_string(),
            sid: sid.to_string(),
            directory: dir,
            k,
            j,
            rbitlen: 100,
            cert: 50,
            random_source: Arc::new(Device::new(PathBuf::from("/dev/urandom"))),
            console: Arc::new(SilentConsole),
        })
        .unwrap()
    }

    #[test]
    fn s2_bulletin_rendezvous() {
        let hub = LocalTransportHub::new_hub(2);
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        let node1 = root_node("rendez1", dir1.path().join("dir"), 2, 1);
        let node2 = root_node("rendez2", dir2.path().join("dir"), 2, 2);

        let t1 = hub.connect(1);
        let t2 = hub.connect(2);
        let bb1 = BulletinBoard::new_root(&node1, t1, BulletinBoardConfig::default()).unwrap();
        let bb2 = BulletinBoard::new_root(&node2, t2, BulletinBoardConfig::default()).unwrap();
        bb1.transport.start().unwrap();
        bb2.transport.start().unwrap();

        bb1.publish("m", &ByteTree::Leaf(vec![0x61, 0x62])).unwrap();
        let encoded = ByteTree::Leaf(vec![0x61, 0x62]).encode();
        assert_eq!(encoded, vec![0x00, 0x00, 0x00, 0x00, 0x02, 0x61, 0x62]);

        let fetched = bb2.fetch_from(1, "m").unwrap();
        assert_eq!(fetched, ByteTree::Leaf(vec![0x61, 0x62]));
    }

    #[test]
    fn s3_size_cap_leaves_counters_unchanged() {
        let hub = LocalTransportHub::new_hub(1);
        let dir = tempfile::tempdir().unwrap();
        let node = root_node("sizecap", dir.path().join("dir"), 1, 1);
        let transport = hub.connect(1);
        let config = BulletinBoardConfig {
            max_byte_length: 4,
            ..BulletinBoardConfig::default()
        };
        let bb = BulletinBoard::new_root(&node, transport, config).unwrap();

        let before = bb.counters();
        let err = bb.publish("too-big", &ByteTree::Leaf(vec![0u8; 5])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArg(_)));
        assert_eq!(bb.counters().sent_bytes, before.sent_bytes);
    }

    #[test]
    fn counters_are_monotonic() {
        let hub = LocalTransportHub::new_hub(2);
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        let node1 = root_node("mono1", dir1.path().join("dir"), 2, 1);
        let node2 = root_node("mono2", dir2.path().join("dir"), 2, 2);
        let t1 = hub.connect(1);
        let t2 = hub.connect(2);
        let bb1 = BulletinBoard::new_root(&node1, t1, BulletinBoardConfig::default()).unwrap();
        let bb2 = BulletinBoard::new_root(&node2, t2, BulletinBoardConfig::default()).unwrap();
        bb1.transport.start().unwrap();
        bb2.transport.start().unwrap();

        let mut last_sent = bb1.counters().sent_bytes;
        for i in 0..5 {
            bb1.publish(&format!("l{i}"), &ByteTree::Leaf(vec![1, 2, 3])).unwrap();
            let sent = bb1.counters().sent_bytes;
            assert!(sent >= last_sent);
            last_sent = sent;
        }
    }
}
