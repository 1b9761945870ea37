use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use skep_store::{MemoryStore, ObjectMeta, RemoteStore, Session};
use skep_types::{Result, Sha1Hash, SkepError};

use crate::config::SkepConfig;
use crate::manifest::FileRecord;
use crate::sharder;
use crate::vault::{encode_shard_payload, Vault};

static TEST_ENV_INIT: Once = Once::new();

pub fn init_test_environment() {
    TEST_ENV_INIT.call_once(|| {
        let base = std::env::temp_dir().join(format!("skep-tests-{}", std::process::id()));
        let home = base.join("home");
        let cache = base.join("cache");
        let _ = std::fs::create_dir_all(&home);
        let _ = std::fs::create_dir_all(&cache);

        // Rust 2024 marks env mutation as unsafe due to process-global
        // races. Done once at test startup so hash-cache writes land under
        // a writable temp root in sandboxed environments.
        unsafe {
            std::env::set_var("HOME", &home);
            std::env::set_var("XDG_CACHE_HOME", &cache);
        }
    });
}

/// Config for an in-memory, unencrypted vault.
pub fn test_config() -> SkepConfig {
    let mut config = SkepConfig::default();
    config.store.kind = "memory".into();
    config.encryption.mode = "none".into();
    config.upload.workers = 2;
    config.upload.max_attempts = 3;
    config.upload.retry_base_delay_ms = 1;
    config.upload.retry_max_delay_ms = 2;
    config.manifest.publish_retry_delay_ms = 1;
    config
}

/// Open a plaintext vault over a fresh [`MemoryStore`].
pub fn test_vault() -> Vault {
    init_test_environment();
    Vault::open(test_config()).expect("failed to open test vault")
}

/// Open a plaintext vault over a caller-supplied store.
pub fn test_vault_with_store(store: Arc<dyn RemoteStore>) -> Vault {
    init_test_environment();
    Vault::open_with_store(test_config(), store).expect("failed to open test vault")
}

/// Shard `body`, store every shard, and register the file in the manifest.
/// Fixture setup that bypasses the upload pipeline; the manifest is not
/// published.
pub fn put_file(vault: &mut Vault, name: &str, body: &[u8], shard_size: u64) -> FileRecord {
    let shards = sharder::shard_stream(&mut Cursor::new(body), shard_size)
        .expect("failed to shard fixture body");
    let mut shard_ids = Vec::with_capacity(shards.len());
    let mut shard_hashes = Vec::with_capacity(shards.len());
    for shard in &shards {
        let encoded = encode_shard_payload(vault.compression, vault.crypto.as_ref(), &shard.payload)
            .expect("failed to encode fixture shard");
        vault
            .store
            .upload_single(&shard.id.as_object_name(), &encoded)
            .expect("failed to store fixture shard");
        shard_ids.push(shard.id);
        shard_hashes.push(shard.sha1);
    }
    let record = FileRecord {
        file_name: name.to_string(),
        file_length: body.len() as i64,
        last_modified: 0,
        sha1: Sha1Hash::compute(body),
        shard_ids,
        shard_hashes,
    };
    vault.manifest.add_file(record.clone());
    record
}

/// Write a set of files below `dir`, creating parent directories as needed.
pub fn write_tree(dir: &Path, files: &[(&str, &[u8])]) {
    for (name, body) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture directory");
        }
        std::fs::write(path, body).expect("failed to write fixture file");
    }
}

/// Deterministic byte pattern that does not repeat at shard-sized strides.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Store wrapper that counts calls and injects failures on demand.
/// Delegates everything to an inner [`MemoryStore`].
pub struct FlakyStore {
    inner: MemoryStore,
    fail_uploads_remaining: AtomicUsize,
    fail_transient: AtomicBool,
    fail_downloads_remaining: AtomicUsize,
    fail_deletes_remaining: AtomicUsize,
    upload_calls: AtomicUsize,
    multipart_calls: AtomicUsize,
    download_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            fail_uploads_remaining: AtomicUsize::new(0),
            fail_transient: AtomicBool::new(true),
            fail_downloads_remaining: AtomicUsize::new(0),
            fail_deletes_remaining: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
            multipart_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// The next `n` upload calls (either tier) fail. Transient failures
    /// carry no HTTP status; permanent ones report 403.
    pub fn fail_next_uploads(&self, n: usize, transient: bool) {
        self.fail_uploads_remaining.store(n, Ordering::SeqCst);
        self.fail_transient.store(transient, Ordering::SeqCst);
    }

    /// The next `n` download calls fail with a transient error.
    pub fn fail_next_downloads(&self, n: usize) {
        self.fail_downloads_remaining.store(n, Ordering::SeqCst);
    }

    /// The next `n` delete calls fail with a transient error.
    pub fn fail_next_deletes(&self, n: usize) {
        self.fail_deletes_remaining.store(n, Ordering::SeqCst);
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn multipart_calls(&self) -> usize {
        self.multipart_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.inner.object_count()
    }

    pub fn newest_payload(&self, name: &str) -> Option<Vec<u8>> {
        self.inner.newest_payload(name)
    }

    fn claim_upload_failure(&self) -> Option<SkepError> {
        self.fail_uploads_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| {
                if self.fail_transient.load(Ordering::SeqCst) {
                    SkepError::store(None, "injected transient upload failure")
                } else {
                    SkepError::store(403, "injected permanent upload failure")
                }
            })
    }

    fn claim_download_failure(&self) -> Option<SkepError> {
        self.fail_downloads_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| SkepError::store(None, "injected transient download failure"))
    }

    fn claim_delete_failure(&self) -> Option<SkepError> {
        self.fail_deletes_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()
            .map(|_| SkepError::store(None, "injected transient delete failure"))
    }
}

impl RemoteStore for FlakyStore {
    fn authorize(&self) -> Result<Session> {
        self.inner.authorize()
    }

    fn list_objects(&self, fetch_all: bool) -> Result<Vec<ObjectMeta>> {
        self.inner.list_objects(fetch_all)
    }

    fn upload_single(&self, name: &str, data: &[u8]) -> Result<ObjectMeta> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.claim_upload_failure() {
            return Err(err);
        }
        self.inner.upload_single(name, data)
    }

    fn upload_multipart(
        &self,
        name: &str,
        reader: &mut dyn std::io::Read,
        total_len: u64,
        part_size: u64,
        connections: usize,
    ) -> Result<ObjectMeta> {
        self.multipart_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.claim_upload_failure() {
            return Err(err);
        }
        self.inner
            .upload_multipart(name, reader, total_len, part_size, connections)
    }

    fn download(&self, object_id: &str) -> Result<Vec<u8>> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.claim_download_failure() {
            return Err(err);
        }
        self.inner.download(object_id)
    }

    fn delete(&self, object_id: &str, name: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.claim_delete_failure() {
            return Err(err);
        }
        self.inner.delete(object_id, name)
    }
}
