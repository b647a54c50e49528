/*!
Coordination substrate for multi-party cryptographic protocols: a hierarchy
of protocol instances (mix-nets, threshold cryptosystems, zero-knowledge
proofs) each own a scoped working directory, rendezvous over a shared
bulletin board with strict message ordering, draw randomness from a
reseed-on-start source, and shut down through a graceful multi-round
barrier that tolerates partial failure.

This crate covers four tightly coupled subsystems and the ambient stack
around them:

- [`node`] — the protocol tree: parent/child scopes, naming, working
  directories, the active-party roster.
- [`bulletin_board`] — the publish/wait-for rendezvous between parties,
  layered over a pluggable [`transport`].
- [`byte_tree`] — the recursive LEAF/NODE wire format used for every
  on-disk and on-wire structure.
- [`random`] — a `Device` or reseed-on-start `Prg` random source.
- [`shutdown`] — the two-round synchronized termination barrier.
- [`supervisor`] — wires the above from a [`config::ParamMap`] and owns the
  only layer permitted to map an internal error to a process exit code.

Individual cryptographic primitives, the `.info`-file parsers, the
user-interface wrapper, and the HTTP transport implementation are treated
as external collaborators consuming the interfaces this crate exposes (see
`SPEC_FULL.md` §1) — none of them live here.
*/

pub mod bulletin_board;
pub mod byte_tree;
pub mod config;
pub mod console;
pub mod dev;
pub mod error;
pub mod executor;
pub mod file_atomics;
pub mod node;
pub mod random;
pub mod shutdown;
pub mod supervisor;
pub mod transport;

pub use bulletin_board::{BulletinBoard, BulletinBoardConfig};
pub use byte_tree::ByteTree;
pub use error::{CoreError, Result};
pub use node::ProtocolNode;
pub use supervisor::Supervisor;
