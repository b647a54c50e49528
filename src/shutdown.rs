//! A two-round synchronized termination over [`BulletinBoard`] (§4.6).
//!
//! Round 1 proves every active peer has heard from us; round 2 proves every
//! peer saw our round-1 publication; the trailing sleep is best-effort cover
//! for a peer still lagging on round 2. No execution of this protocol can
//! guarantee every peer finished reading before the transport stops — the
//! spec explicitly accepts that as unsolvable in general.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::bulletin_board::BulletinBoard;
use crate::byte_tree::ByteTree;
use crate::error::Result;
use crate::node::ProtocolNode;

/// How long, after round 2, a shutdown waits before stopping the
/// transport — best-effort cover for a peer still reading our round-2 slot.
pub const WAIT_FOR_OTHERS_MS: u64 = 1000;

const ROUND_1_LABEL: &str = "shutdown_first_round";
const ROUND_2_LABEL: &str = "shutdown_second_round";

/// Runs the two-round barrier and quiescence window, then stops the
/// transport underlying `bb`.
///
/// `interrupt`, if given, is checked during the final sleep: a message on
/// the channel (or the sender being dropped) causes the sleep to end
/// immediately and the shutdown to proceed straight to `stop()`, matching
/// "sleep is interruptible; on interruption the shutdown proceeds
/// immediately to stop()".
pub fn execute(node: &ProtocolNode, bb: &BulletinBoard, interrupt: Option<&Receiver<()>>) -> Result<()> {
    run_round(node, bb, ROUND_1_LABEL)?;
    run_round(node, bb, ROUND_2_LABEL)?;

    tracing::info!(full_name = %node.full_name(), "both shutdown rounds complete, entering quiescence window");
    wait_for_others(interrupt);

    bb.stop_transport();
    Ok(())
}

fn run_round(node: &ProtocolNode, bb: &BulletinBoard, label: &str) -> Result<()> {
    let active = node.get_actives()?;
    let this_party = bb.party();

    for i in 1..=bb.k() {
        if !active.get(i as usize).copied().unwrap_or(false) {
            continue;
        }
        if i == this_party {
            bb.publish(label, &ByteTree::Leaf(Vec::new()))?;
        } else {
            bb.fetch_from(i, label)?;
        }
    }

    tracing::debug!(full_name = %node.full_name(), %label, "shutdown round complete");
    Ok(())
}

fn wait_for_others(interrupt: Option<&Receiver<()>>) {
    let duration = Duration::from_millis(WAIT_FOR_OTHERS_MS);
    match interrupt {
        Some(rx) => match rx.recv_timeout(duration) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("shutdown quiescence window interrupted, proceeding immediately");
            }
            Err(RecvTimeoutError::Timeout) => {}
        },
        None => std::thread::sleep(duration),
    }
}
