use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Duration, Utc};
use skep_types::{Result, Sha1Hash, SkepError};
use tracing::debug;
use uuid::Uuid;

use crate::session::{Session, SessionProvider};
use crate::{ObjectMeta, RemoteStore, newest_per_name};

/// Filesystem-backed object store with the same versioning semantics as the
/// cloud contract: every upload mints a fresh object ID, and several
/// versions may share one name.
///
/// Layout under the root: `blobs/<id>` holds payload bytes, `meta/<id>.json`
/// the version metadata. A version becomes visible once its meta file
/// exists, so the payload is written first and both writes are atomic
/// renames.
pub struct LocalStore {
    root: PathBuf,
    sessions: SessionProvider,
    last_ts: AtomicI64,
}

impl LocalStore {
    pub fn open(root: &Path, session_margin_secs: i64) -> Result<Self> {
        fs::create_dir_all(root.join("blobs"))?;
        fs::create_dir_all(root.join("meta"))?;
        let root = fs::canonicalize(root)?;
        Ok(Self {
            root,
            sessions: SessionProvider::new(session_margin_secs),
            last_ts: AtomicI64::new(0),
        })
    }

    fn new_session(&self) -> Result<Session> {
        debug!(root = %self.root.display(), "authorizing local store session");
        Ok(Session {
            api_url: format!("file://{}", self.root.display()),
            download_url: format!("file://{}", self.root.display()),
            auth_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::hours(12),
        })
    }

    fn session(&self) -> Result<Session> {
        self.sessions.session(|| self.new_session())
    }

    /// Object IDs name files on disk, so only IDs this store minted are
    /// accepted back.
    fn validate_object_id(id: &str) -> Result<()> {
        if Uuid::parse_str(id).is_err() {
            return Err(SkepError::store(
                400,
                format!("malformed object id '{id}'"),
            ));
        }
        Ok(())
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.root.join("blobs").join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join("meta").join(format!("{id}.json"))
    }

    /// Upload timestamps are forced strictly monotonic so same-millisecond
    /// uploads still order as distinct versions.
    fn next_upload_ts(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut current = self.last_ts.load(Ordering::SeqCst);
        loop {
            let next = current.max(now - 1) + 1;
            match self
                .last_ts
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Write data to a temp file in the same directory, then atomically
    /// rename into place, so readers never see a partial file.
    fn atomic_write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_object(
        &self,
        name: &str,
        payload: &[u8],
        sha1: Option<Sha1Hash>,
    ) -> Result<ObjectMeta> {
        let id = Uuid::new_v4().to_string();
        let meta = ObjectMeta {
            id: id.clone(),
            name: name.to_string(),
            length: payload.len() as u64,
            sha1,
            upload_ts: self.next_upload_ts(),
        };
        self.atomic_write(&self.blob_path(&id), payload)?;
        let encoded = serde_json::to_vec(&meta)?;
        self.atomic_write(&self.meta_path(&id), &encoded)?;
        Ok(meta)
    }
}

impl RemoteStore for LocalStore {
    fn authorize(&self) -> Result<Session> {
        self.new_session()
    }

    fn list_objects(&self, fetch_all: bool) -> Result<Vec<ObjectMeta>> {
        let _session = self.session()?;
        let mut all = Vec::new();
        for entry in fs::read_dir(self.root.join("meta"))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let data = match fs::read(entry.path()) {
                Ok(d) => d,
                // Version deleted between readdir and read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let meta: ObjectMeta = serde_json::from_slice(&data)?;
            all.push(meta);
        }
        if fetch_all {
            all.sort_by(|a, b| {
                (a.name.as_str(), a.upload_ts, &a.id).cmp(&(b.name.as_str(), b.upload_ts, &b.id))
            });
            Ok(all)
        } else {
            Ok(newest_per_name(all))
        }
    }

    fn upload_single(&self, name: &str, data: &[u8]) -> Result<ObjectMeta> {
        let _session = self.session()?;
        if name.is_empty() {
            return Err(SkepError::store(400, "empty object name"));
        }
        let digest = Sha1Hash::compute(data);
        self.write_object(name, data, Some(digest))
    }

    fn upload_multipart(
        &self,
        name: &str,
        reader: &mut dyn Read,
        total_len: u64,
        part_size: u64,
        connections: usize,
    ) -> Result<ObjectMeta> {
        let _session = self.session()?;
        if name.is_empty() {
            return Err(SkepError::store(400, "empty object name"));
        }
        if part_size == 0 {
            return Err(SkepError::store(400, "part size must be positive"));
        }
        // Parallel connections are a transfer hint; local disk appends the
        // parts in order.
        let _ = connections;

        let mut payload = Vec::with_capacity(total_len.min(1 << 30) as usize);
        let mut parts = 0u32;
        loop {
            let before = payload.len();
            reader.take(part_size).read_to_end(&mut payload)?;
            if payload.len() == before {
                break;
            }
            parts += 1;
        }
        if payload.len() as u64 != total_len {
            return Err(SkepError::store(
                400,
                format!(
                    "multipart length mismatch for '{name}': declared {total_len}, read {}",
                    payload.len()
                ),
            ));
        }
        debug!(name, parts, total_len, "assembled multipart upload");
        self.write_object(name, &payload, None)
    }

    fn download(&self, object_id: &str) -> Result<Vec<u8>> {
        let _session = self.session()?;
        Self::validate_object_id(object_id)?;
        match fs::read(self.blob_path(object_id)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SkepError::ObjectNotFound(object_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, object_id: &str, name: &str) -> Result<()> {
        let _session = self.session()?;
        Self::validate_object_id(object_id)?;
        match fs::read(self.meta_path(object_id)) {
            Ok(data) => {
                let meta: ObjectMeta = serde_json::from_slice(&data)?;
                if meta.name != name {
                    return Err(SkepError::store(
                        400,
                        format!("object name mismatch: version is '{}', not '{name}'", meta.name),
                    ));
                }
            }
            // Deleting an absent version succeeds.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        // Meta goes first so the version leaves listings before the payload.
        for path in [self.meta_path(object_id), self.blob_path(object_id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
