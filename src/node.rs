//! The protocol tree: [`ProtocolNode`] is the scope every other component in
//! this crate hangs off of. Each instance owns a working directory named
//! `role.sid`, a globally unique `full_name`, and (at the root) the
//! active-party roster that survives process restarts.
//!
//! Per the REDESIGN FLAGS in `SPEC_FULL.md`, there is no owning cycle
//! between a node and its children: a child holds a cloned [`Arc<RootState>`]
//! rather than a weak pointer back up a chain of parents, so `get_active`
//! and friends are a direct lookup, not a traversal.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use crate::byte_tree::ByteTree;
use crate::console::Console;
use crate::error::{CoreError, Result};
use crate::file_atomics::{self, TempRegistry};
use crate::random::RandomSource;

const ACTIVE_FILE: &str = "active";
const MAX_SID_LEN: usize = 256;

fn registered_names() -> &'static Mutex<HashSet<String>> {
    static NAMES: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    NAMES.get_or_init(|| Mutex::new(HashSet::new()))
}

fn register_name(full_name: &str) -> Result<()> {
    let mut names = registered_names()
        .lock()
        .map_err(|_| CoreError::fatal("scope-name registry mutex poisoned"))?;
    if !names.insert(full_name.to_string()) {
        return Err(CoreError::fatal(format!(
            "scope name '{full_name}' is already in use in this execution"
        )));
    }
    Ok(())
}

fn deregister_name(full_name: &str) {
    if let Ok(mut names) = registered_names().lock() {
        names.remove(full_name);
    }
}

/// Observer notified whenever the active-party roster changes, so a
/// [`crate::bulletin_board::BulletinBoard`] attached at the root can forward
/// the update to its [`crate::transport::Transport`] (see §4.2).
pub trait ActiveSink: fmt::Debug + Send + Sync {
    fn on_set_active(&self, active: &[bool]);
}

/// State shared, by `Arc`, across an entire protocol tree. Only the root
/// node mutates `active`; children reach it through this shared handle
/// instead of walking up a parent chain.
struct RootState {
    root_directory: PathBuf,
    k: u32,
    j: u32,
    rbitlen: u32,
    cert: u32,
    random_source: Arc<dyn RandomSource>,
    console: Arc<dyn Console>,
    temp_registry: Arc<TempRegistry>,
    active: Mutex<Vec<bool>>,
    active_sink: Mutex<Option<Arc<dyn ActiveSink>>>,
}

impl fmt::Debug for RootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootState")
            .field("root_directory", &self.root_directory)
            .field("k", &self.k)
            .field("j", &self.j)
            .finish_non_exhaustive()
    }
}

/// One node of the protocol tree: a scoped working directory, a globally
/// unique `full_name`, and a reference into the tree's shared root state.
///
/// `ProtocolNode` is not `Clone`: the application owns each instance, and
/// owns any children it constructs from it, matching "weak reference
/// upward, strong ownership of children through application code" (§3).
pub struct ProtocolNode {
    full_name: String,
    directory: PathBuf,
    role: String,
    sid: String,
    root: Arc<RootState>,
}

impl fmt::Debug for ProtocolNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolNode")
            .field("full_name", &self.full_name)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

/// Inputs needed to construct a root [`ProtocolNode`]. Everything here is
/// already resolved (a random source, not a descriptor; a directory path,
/// not a parameter map) — [`crate::supervisor::Supervisor`] is the layer
/// that turns a [`crate::config::ParamMap`] into this.
pub struct RootParams {
    pub role: String,
    pub sid: String,
    pub directory: PathBuf,
    pub k: u32,
    pub j: u32,
    pub rbitlen: u32,
    pub cert: u32,
    pub random_source: Arc<dyn RandomSource>,
    pub console: Arc<dyn Console>,
}

fn validate_sid(sid: &str) -> Result<()> {
    if sid.is_empty() || sid.len() > MAX_SID_LEN {
        return Err(CoreError::invalid_arg(format!(
            "sid must be 1..={MAX_SID_LEN} characters, got {}",
            sid.len()
        )));
    }
    let mut chars = sid.chars();
    let first = chars.next().expect("non-empty checked above");
    if !first.is_ascii_alphabetic() {
        return Err(CoreError::invalid_arg(format!(
            "sid '{sid}' must start with an ASCII letter"
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(CoreError::invalid_arg(format!(
            "sid '{sid}' must contain only ASCII letters, digits, and underscores after the first character"
        )));
    }
    Ok(())
}

fn validate_range(name: &str, value: u32, min: u32, max: u32) -> Result<()> {
    if value < min || value > max {
        return Err(CoreError::invalid_arg(format!(
            "{name} must be in {min}..={max}, got {value}"
        )));
    }
    Ok(())
}

impl ProtocolNode {
    /// Constructs the root of a protocol tree.
    ///
    /// Effects, in order, each fatal on failure (partial resources are
    /// released before the error propagates): validate `sid`; create
    /// `directory` and `directory/tmp`; read or initialize the `active`
    /// roster.
    ///
    /// The random source is expected to already be resolved (and, for a
    /// PRG, already reseeded) by the caller — see
    /// [`crate::random::RandomSourceDescriptor::resolve`] — since reseeding
    /// is a one-time side effect that belongs to descriptor resolution, not
    /// to every node that happens to be the root.
    pub fn new_root(params: RootParams) -> Result<Self> {
        validate_sid(&params.sid)?;
        validate_range("k", params.k, 1, 25)?;
        validate_range("j", params.j, 1, params.k)?;
        validate_range("rbitlen", params.rbitlen, 0, 256)?;
        validate_range("cert", params.cert, 1, 256)?;

        let full_name = format!("{}.{}", params.role, params.sid);
        register_name(&full_name)?;

        let directory = params.directory;
        if let Err(e) = file_atomics::create_dir(&directory) {
            deregister_name(&full_name);
            return Err(e);
        }
        let tmp_dir = directory.join("tmp");
        if let Err(e) = file_atomics::create_dir(&tmp_dir) {
            let _ = file_atomics::delete_tree(&directory);
            deregister_name(&full_name);
            return Err(e);
        }

        let active = match Self::load_or_init_active(&directory, params.k) {
            Ok(active) => active,
            Err(e) => {
                let _ = file_atomics::delete_tree(&directory);
                deregister_name(&full_name);
                return Err(e);
            }
        };

        let root = Arc::new(RootState {
            root_directory: directory.clone(),
            k: params.k,
            j: params.j,
            rbitlen: params.rbitlen,
            cert: params.cert,
            random_source: params.random_source,
            console: params.console,
            temp_registry: Arc::new(TempRegistry::new()),
            active: Mutex::new(active),
            active_sink: Mutex::new(None),
        });

        tracing::info!(%full_name, directory = %directory.display(), k = params.k, j = params.j, "root protocol node constructed");

        Ok(Self {
            full_name,
            directory,
            role: params.role,
            sid: params.sid,
            root,
        })
    }

    fn load_or_init_active(directory: &Path, k: u32) -> Result<Vec<bool>> {
        let path = directory.join(ACTIVE_FILE);
        if path.exists() {
            let tree = ByteTree::read(&path, 1, (k as u64) + 64)?;
            let active = tree.as_bool_array()?;
            if active.len() != (k as usize) + 1 {
                return Err(CoreError::invalid_arg(format!(
                    "active file has {} entries, expected {}",
                    active.len(),
                    k + 1
                )));
            }
            Ok(active)
        } else {
            let active = vec![true; (k as usize) + 1];
            let tree = ByteTree::from_bool_array(&active);
            tree.write(&path)?;
            Ok(active)
        }
    }

    /// Constructs a child scope of `self`.
    ///
    /// The child inherits `k`, `j`, the random source, `rbitlen`, `cert`,
    /// and the console by (shared) reference; it never holds its own copy
    /// of the active-party roster.
    pub fn child(&self, role: &str, sid: &str) -> Result<Self> {
        validate_sid(sid)?;
        let full_name = format!("{}/{}.{}", self.full_name, role, sid);
        register_name(&full_name)?;

        let directory = self.directory.join(format!("{role}.{sid}"));
        if let Err(e) = file_atomics::create_dir(&directory) {
            deregister_name(&full_name);
            return Err(e);
        }

        tracing::debug!(%full_name, directory = %directory.display(), "child protocol node constructed");

        Ok(Self {
            full_name,
            directory,
            role: role.to_string(),
            sid: sid.to_string(),
            root: Arc::clone(&self.root),
        })
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn k(&self) -> u32 {
        self.root.k
    }

    pub fn j(&self) -> u32 {
        self.root.j
    }

    pub fn rbitlen(&self) -> u32 {
        self.root.rbitlen
    }

    pub fn cert(&self) -> u32 {
        self.root.cert
    }

    pub fn random_source(&self) -> &Arc<dyn RandomSource> {
        &self.root.random_source
    }

    pub fn console(&self) -> &Arc<dyn Console> {
        &self.root.console
    }

    pub fn temp_registry(&self) -> &Arc<TempRegistry> {
        &self.root.temp_registry
    }

    /// The root node's working directory, reachable from any scope without
    /// walking a parent chain.
    pub fn root_directory(&self) -> &Path {
        &self.root.root_directory
    }

    /// No-I/O path builder: `directory/name`.
    pub fn get_file(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }

    pub fn read_int(&self, name: &str) -> Result<i32> {
        file_atomics::read_int(&self.get_file(name))
    }

    pub fn write_int(&self, name: &str, value: i32) -> Result<()> {
        file_atomics::write_int(&self.get_file(name), value)
    }

    pub fn read_bool(&self, name: &str) -> bool {
        file_atomics::read_bool(&self.get_file(name))
    }

    pub fn write_bool(&self, name: &str) -> Result<()> {
        file_atomics::write_bool(&self.get_file(name))
    }

    /// Recursively removes this scope's working directory.
    pub fn delete_state(&self) -> Result<()> {
        tracing::info!(full_name = %self.full_name, "deleting scope state");
        file_atomics::delete_tree(&self.directory)
    }

    /// Registers the sink notified whenever `set_active` changes the
    /// roster. Called once, by the root [`crate::bulletin_board::BulletinBoard`]
    /// at construction, so inactive-party fetches can fail fast at the
    /// transport.
    pub fn attach_active_sink(&self, sink: Arc<dyn ActiveSink>) -> Result<()> {
        let mut slot = self
            .root
            .active_sink
            .lock()
            .map_err(|_| CoreError::fatal("active-sink mutex poisoned"))?;
        *slot = Some(sink);
        Ok(())
    }

    /// A copy of the full active-party roster (length `k + 1`, index 0 unused).
    pub fn get_actives(&self) -> Result<Vec<bool>> {
        let active = self
            .root
            .active
            .lock()
            .map_err(|_| CoreError::fatal("active-roster mutex poisoned"))?;
        Ok(active.clone())
    }

    /// Whether party `l` is currently active.
    pub fn get_active_party(&self, l: u32) -> Result<bool> {
        let active = self.get_actives()?;
        active.get(l as usize).copied().ok_or_else(|| {
            CoreError::invalid_arg(format!("party index {l} out of range for k={}", self.root.k))
        })
    }

    /// Whether this party (`j`) is currently active.
    pub fn get_active(&self) -> Result<bool> {
        self.get_active_party(self.root.j)
    }

    /// Replaces the active-party roster, persists it atomically under the
    /// root's directory, and notifies any attached sink.
    pub fn set_active(&self, new: Vec<bool>) -> Result<()> {
        let expected_len = (self.root.k as usize) + 1;
        if new.len() != expected_len {
            return Err(CoreError::invalid_arg(format!(
                "set_active expected {expected_len} entries, got {}",
                new.len()
            )));
        }

        let path = self.root.root_directory.join(ACTIVE_FILE);
        ByteTree::from_bool_array(&new).write(&path)?;

        {
            let mut active = self
                .root
                .active
                .lock()
                .map_err(|_| CoreError::fatal("active-roster mutex poisoned"))?;
            *active = new.clone();
        }

        let sink = self
            .root
            .active_sink
            .lock()
            .map_err(|_| CoreError::fatal("active-sink mutex poisoned"))?
            .clone();
        if let Some(sink) = sink {
            sink.on_set_active(&new);
        }

        tracing::info!(full_name = %self.full_name, ?new, "active-party roster updated");
        Ok(())
    }
}

impl Drop for ProtocolNode {
    fn drop(&mut self) {
        deregister_name(&self.full_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::SilentConsole;
    use crate::random::Device;

    fn root_params(sid: &str, directory: PathBuf, k: u32, j: u32) -> RootParams {
        RootParams {
            role: "root".to_string(),
            sid: sid.to_string(),
            directory,
            k,
            j,
            rbitlen: 100,
            cert: 50,
            random_source: Arc::new(Device::new(PathBuf::from("/dev/urandom"))),
            console: Arc::new(SilentConsole),
        }
    }

    #[test]
    fn root_full_name_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProtocolNode::new_root(root_params("sessA1", dir.path().join("dir"), 3, 2)).unwrap();
        assert_eq!(root.full_name(), "root.sessA1");
        assert!(root.directory().join("tmp").is_dir());
    }

    #[test]
    fn child_full_name_nests_under_parent() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProtocolNode::new_root(root_params("sessA2", dir.path().join("dir"), 3, 1)).unwrap();
        let child = root.child("mixnet", "round1").unwrap();
        assert_eq!(child.full_name(), "root.sessA2/mixnet.round1");
        assert!(child.directory().starts_with(root.directory()));
    }

    #[test]
    fn duplicate_full_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProtocolNode::new_root(root_params("sessA3", dir.path().join("dir"), 3, 1)).unwrap();
        let err = ProtocolNode::new_root(root_params("sessA3", dir.path().join("dir2"), 3, 1)).unwrap_err();
        assert!(matches!(err, CoreError::Fatal(_)));
        drop(root);
        // Freed once the original drops.
        let _again = ProtocolNode::new_root(root_params("sessA3", dir.path().join("dir3"), 3, 1)).unwrap();
    }

    #[test]
    fn invalid_sid_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProtocolNode::new_root(root_params("1bad", dir.path().join("dir"), 3, 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArg(_)));
    }

    #[test]
    fn out_of_range_k_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ProtocolNode::new_root(root_params("sessA4", dir.path().join("dir"), 99, 1)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArg(_)));
    }

    #[test]
    fn active_round_trip_s1() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProtocolNode::new_root(root_params("sessA5", dir.path().join("dir"), 3, 2)).unwrap();
        root.set_active(vec![false, true, false, true]).unwrap();
        assert_eq!(root.get_actives().unwrap(), vec![false, true, false, true]);
        assert!(!root.get_active_party(2).unwrap());
        root.set_active(vec![false, true, true, true]).unwrap();
        assert_eq!(root.get_actives().unwrap(), vec![false, true, true, true]);
    }

    #[test]
    fn active_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let directory = dir.path().join("dir");
        {
            let root = ProtocolNode::new_root(root_params("sessA6", directory.clone(), 3, 2)).unwrap();
            root.set_active(vec![false, true, false, true]).unwrap();
        }
        let reopened = ProtocolNode::new_root(root_params("sessA6b", directory.clone(), 3, 2));
        // A fresh root with a *different* sid still reads the same directory's
        // `active` file, since the file lives under `directory`, not under a
        // per-sid subpath.
        let reopened = reopened.unwrap();
        assert_eq!(reopened.get_actives().unwrap(), vec![false, true, false, true]);
    }

    #[test]
    fn set_active_rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProtocolNode::new_root(root_params("sessA7", dir.path().join("dir"), 3, 1)).unwrap();
        let err = root.set_active(vec![true, true]).unwrap_err();
        assert!(matches!(err, CoreError::InvalidArg(_)));
    }

    #[test]
    fn delete_state_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = ProtocolNode::new_root(root_params("sessA8", dir.path().join("dir"), 3, 1)).unwrap();
        let directory = root.directory().to_path_buf();
        root.delete_state().unwrap();
        assert!(!directory.exists());
    }
}
