pub mod local;
pub mod memory;
pub mod retry;
pub mod session;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use retry::RetryPolicy;
pub use session::{Session, SessionProvider};

use std::io::Read;

use serde::{Deserialize, Serialize};
use skep_types::{Result, Sha1Hash};

/// Metadata of one stored object version as reported by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Store-assigned version ID. Download and delete address this.
    pub id: String,
    /// Client-chosen object name. Several versions may share one name.
    pub name: String,
    /// Length of the uploaded bytes.
    pub length: u64,
    /// Store-side digest of the uploaded bytes. Multipart uploads have none.
    pub sha1: Option<Sha1Hash>,
    /// Upload timestamp, milliseconds since the epoch.
    pub upload_ts: i64,
}

/// Client contract of the remote object store.
///
/// Uploading under an existing name creates a new object version rather than
/// overwriting; the newest version of a name is authoritative. Download and
/// delete address a specific version by its store-assigned ID.
///
/// Implementations are shared across upload workers, so every method takes
/// `&self` and must be safe to call concurrently. Sessions expire; each
/// implementation refreshes its own lazily via [`SessionProvider`].
pub trait RemoteStore: Send + Sync {
    /// Establish (or re-establish) an authorized session.
    fn authorize(&self) -> Result<Session>;

    /// List stored objects. With `fetch_all` every version of every name is
    /// returned; otherwise only the newest version per name.
    fn list_objects(&self, fetch_all: bool) -> Result<Vec<ObjectMeta>>;

    /// Upload `data` under `name` as a single request.
    fn upload_single(&self, name: &str, data: &[u8]) -> Result<ObjectMeta>;

    /// Upload a large payload in parts of `part_size` bytes, using up to
    /// `connections` concurrent transfers where the store supports them.
    fn upload_multipart(
        &self,
        name: &str,
        reader: &mut dyn Read,
        total_len: u64,
        part_size: u64,
        connections: usize,
    ) -> Result<ObjectMeta>;

    /// Fetch one whole object version by ID.
    fn download(&self, object_id: &str) -> Result<Vec<u8>>;

    /// Delete one object version. Stores require the matching name alongside
    /// the ID; deleting an already-absent version succeeds.
    fn delete(&self, object_id: &str, name: &str) -> Result<()>;
}

/// Keep only the newest version of each object name, ordered by name.
pub fn newest_per_name(mut all: Vec<ObjectMeta>) -> Vec<ObjectMeta> {
    use std::collections::HashMap;
    all.sort_by(|a, b| (a.upload_ts, &a.id).cmp(&(b.upload_ts, &b.id)));
    let mut newest: HashMap<String, ObjectMeta> = HashMap::new();
    for meta in all {
        newest.insert(meta.name.clone(), meta);
    }
    let mut out: Vec<ObjectMeta> = newest.into_values().collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}
