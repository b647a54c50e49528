//! Test-harness-only components: an in-process [`Transport`] implementation
//! and a synchronous multi-party driver, sufficient to exercise the rest of
//! the stack end-to-end without a real network (§4.3, §4.10).
//!
//! None of this module is reachable from the HTTP-based point-to-point
//! transport the wider library ships; that one is an external collaborator
//! per §1 and is out of scope here.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{CoreError, Result};
use crate::transport::{FetchResult, FetchTiming, Transport};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

#[derive(Debug, Eq, PartialEq, Hash, Clone)]
struct SlotKey {
    publisher: u32,
    scope_path: String,
    label: String,
}

struct HubState {
    slots: Mutex<HashMap<SlotKey, Vec<u8>>>,
    active: Mutex<Vec<bool>>,
    condvar: Condvar,
    interrupted: AtomicBool,
}

/// A shared in-process bulletin board backing every [`LocalTransport`]
/// connected to it: `connect(party)` hands each party its own `Transport`
/// handle over the same underlying slot map, so `publish` by one party is
/// immediately visible to `fetch` by another.
pub struct LocalTransportHub {
    state: Arc<HubState>,
}

impl LocalTransportHub {
    /// Creates a hub for `k` parties, all initially active.
    pub fn new_hub(k: u32) -> Self {
        Self {
            state: Arc::new(HubState {
                slots: Mutex::new(HashMap::new()),
                active: Mutex::new(vec![true; (k as usize) + 1]),
                condvar: Condvar::new(),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Hands out a [`Transport`] handle for `party`.
    pub fn connect(&self, party: u32) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            party,
            state: Arc::clone(&self.state),
        })
    }

    /// Causes every blocked `fetch` across every connected transport to
    /// return [`CoreError::Cancelled`] immediately, without corrupting any
    /// counters (the fetch simply never completes as a success).
    pub fn interrupt_all(&self) {
        self.state.interrupted.store(true, Ordering::SeqCst);
        self.state.condvar.notify_all();
    }
}

/// An in-process [`Transport`] suitable for tests: `publish` writes into a
/// shared map, `fetch` polls that map under a condvar until the slot
/// appears, the deadline passes, or the hub is interrupted.
pub struct LocalTransport {
    party: u32,
    state: Arc<HubState>,
}

impl fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTransport").field("party", &self.party).finish()
    }
}

impl Transport for LocalTransport {
    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn publish(&self, scope_path: &str, label: &str, bytes: Vec<u8>) -> Result<()> {
        let key = SlotKey {
            publisher: self.party,
            scope_path: scope_path.to_string(),
            label: label.to_string(),
        };
        let mut slots = self
            .state
            .slots
            .lock()
            .map_err(|_| CoreError::fatal("local transport slots mutex poisoned"))?;
        if slots.contains_key(&key) {
            return Err(CoreError::invalid_arg(format!(
                "label '{label}' already published by party {} in scope '{scope_path}'",
                self.party
            )));
        }
        slots.insert(key, bytes);
        drop(slots);
        self.state.condvar.notify_all();
        Ok(())
    }

    fn fetch(
        &self,
        from_party: u32,
        scope_path: &str,
        label: &str,
        deadline: Option<Duration>,
    ) -> Result<FetchResult> {
        let key = SlotKey {
            publisher: from_party,
            scope_path: scope_path.to_string(),
            label: label.to_string(),
        };
        let started = Instant::now();

        loop {
            if self.state.interrupted.load(Ordering::SeqCst) {
                return Err(CoreError::Cancelled(format!(
                    "fetch of '{label}' from party {from_party} was interrupted"
                )));
            }

            {
                let active = self
                    .state
                    .active
                    .lock()
                    .map_err(|_| CoreError::fatal("local transport active mutex poisoned"))?;
                if !active.get(from_party as usize).copied().unwrap_or(false) {
                    return Err(CoreError::Refused(format!("party {from_party} is inactive")));
                }
            }

            let slots = self
                .state
                .slots
                .lock()
                .map_err(|_| CoreError::fatal("local transport slots mutex poisoned"))?;
            if let Some(bytes) = slots.get(&key) {
                let bytes = bytes.clone();
                drop(slots);
                let wait = started.elapsed();
                let copy_started = Instant::now();
                let len = bytes.len();
                let network = copy_started.elapsed();
                tracing::trace!(from_party, scope_path, label, len, "local transport fetch satisfied");
                return Ok(FetchResult {
                    bytes,
                    timing: FetchTiming { wait, network },
                });
            }
            drop(slots);

            if let Some(deadline) = deadline {
                if started.elapsed() >= deadline {
                    return Err(CoreError::Timeout(format!(
                        "fetch of '{label}' from party {from_party} exceeded {deadline:?}"
                    )));
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }

    fn set_active(&self, active: Vec<bool>) {
        if let Ok(mut guard) = self.state.active.lock() {
            *guard = active;
        }
        self.state.condvar.notify_all();
    }

    fn unpublish(&self, scope_path: &str) {
        if let Ok(mut slots) = self.state.slots.lock() {
            slots.retain(|key, _| key.scope_path != scope_path);
        }
    }

    fn stop(&self) {
        // In-process transport has nothing to drain or close.
    }
}

/// Runs `body` once per party `1..=k` on its own OS thread and collects
/// every result, panicking immediately if any thread panics. Used by
/// multi-party scenario tests (§8) that need real concurrency rather than
/// single-threaded interleaving.
pub fn run_parties<F, T>(k: u32, body: F) -> Vec<T>
where
    F: Fn(u32) -> T + Send + Sync,
    T: Send,
{
    thread::scope(|scope| {
        let handles: Vec<_> = (1..=k)
            .map(|party| {
                let body = &body;
                scope.spawn(move || body(party))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("party thread panicked"))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_fetch_returns_same_bytes() {
        let hub = LocalTransportHub::new_hub(2);
        let t1 = hub.connect(1);
        let t2 = hub.connect(2);
        t1.publish("", "greeting", vec![1, 2, 3]).unwrap();
        let result = t2.fetch(1, "", "greeting", Some(Duration::from_millis(500))).unwrap();
        assert_eq!(result.bytes, vec![1, 2, 3]);
    }

    #[test]
    fn fetch_without_publish_times_out() {
        let hub = LocalTransportHub::new_hub(2);
        let t2 = hub.connect(2);
        let err = t2.fetch(1, "", "never", Some(Duration::from_millis(20))).unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
    }

    #[test]
    fn fetch_from_inactive_party_is_refused() {
        let hub = LocalTransportHub::new_hub(2);
        let t1 = hub.connect(1);
        let t2 = hub.connect(2);
        t1.set_active(vec![true, false, true]);
        let err = t2.fetch(1, "", "anything", Some(Duration::from_millis(50))).unwrap_err();
        assert!(matches!(err, CoreError::Refused(_)));
    }

    #[test]
    fn duplicate_publish_in_same_scope_is_rejected() {
        let hub = LocalTransportHub::new_hub(1);
        let t1 = hub.connect(1);
        t1.publish("", "label", vec![1]).unwrap();
        let err = t1.publish("", "label", vec![2]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArg(_)));
    }

    #[test]
    fn interrupt_all_cancels_blocked_fetch() {
        let hub = Arc::new(LocalTransportHub::new_hub(2));
        let t2 = hub.connect(2);
        let hub_for_thread = Arc::clone(&hub);
        let interrupter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            hub_for_thread.interrupt_all();
        });
        let err = t2.fetch(1, "", "never", None).unwrap_err();
        assert!(matches!(err, CoreError::Cancelled(_)));
        interrupter.join().unwrap();
    }

    #[test]
    fn unpublish_drops_scope_slots() {
        let hub = LocalTransportHub::new_hub(1);
        let t1 = hub.connect(1);
        t1.publish("scope.a", "x", vec![9]).unwrap();
        t1.unpublish("scope.a");
        let err = t1.fetch(1, "scope.a", "x", Some(Duration::from_millis(20))).unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
    }

    #[test]
    fn run_parties_collects_every_result() {
        let results = run_parties(4, |party| party * 10);
        let mut sorted = results;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![10, 20, 30, 40]);
    }
}
