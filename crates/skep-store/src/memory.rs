use std::collections::HashMap;
use std::io::Read;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use skep_types::{Result, Sha1Hash, SkepError};
use uuid::Uuid;

use crate::session::{Session, SessionProvider};
use crate::{ObjectMeta, RemoteStore, newest_per_name};

/// In-memory object store with the contract's versioning semantics.
/// Thread-safe via a mutex. Backs the test suites and works as a scratch
/// target for dry experiments.
pub struct MemoryStore {
    state: Mutex<State>,
    sessions: SessionProvider,
}

#[derive(Default)]
struct State {
    objects: HashMap<String, StoredObject>,
    last_ts: i64,
}

struct StoredObject {
    meta: ObjectMeta,
    payload: Vec<u8>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            sessions: SessionProvider::new(60),
        }
    }

    fn next_ts(state: &mut State) -> i64 {
        let now = Utc::now().timestamp_millis();
        state.last_ts = state.last_ts.max(now - 1) + 1;
        state.last_ts
    }

    fn insert(&self, name: &str, payload: Vec<u8>, sha1: Option<Sha1Hash>) -> Result<ObjectMeta> {
        if name.is_empty() {
            return Err(SkepError::store(400, "empty object name"));
        }
        let mut state = self.state.lock().unwrap();
        let meta = ObjectMeta {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            length: payload.len() as u64,
            sha1,
            upload_ts: Self::next_ts(&mut state),
        };
        state
            .objects
            .insert(meta.id.clone(), StoredObject { meta: meta.clone(), payload });
        Ok(meta)
    }

    /// Number of stored object versions.
    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Payload of the newest version of `name`, if any.
    pub fn newest_payload(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .values()
            .filter(|o| o.meta.name == name)
            .max_by_key(|o| (o.meta.upload_ts, o.meta.id.clone()))
            .map(|o| o.payload.clone())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for MemoryStore {
    fn authorize(&self) -> Result<Session> {
        Ok(Session {
            api_url: "memory".into(),
            download_url: "memory".into(),
            auth_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    fn list_objects(&self, fetch_all: bool) -> Result<Vec<ObjectMeta>> {
        let _session = self.sessions.session(|| self.authorize())?;
        let all: Vec<ObjectMeta> = {
            let state = self.state.lock().unwrap();
            state.objects.values().map(|o| o.meta.clone()).collect()
        };
        if fetch_all {
            let mut all = all;
            all.sort_by(|a, b| {
                (a.name.as_str(), a.upload_ts, &a.id).cmp(&(b.name.as_str(), b.upload_ts, &b.id))
            });
            Ok(all)
        } else {
            Ok(newest_per_name(all))
        }
    }

    fn upload_single(&self, name: &str, data: &[u8]) -> Result<ObjectMeta> {
        let _session = self.sessions.session(|| self.authorize())?;
        self.insert(name, data.to_vec(), Some(Sha1Hash::compute(data)))
    }

    fn upload_multipart(
        &self,
        name: &str,
        reader: &mut dyn Read,
        total_len: u64,
        part_size: u64,
        _connections: usize,
    ) -> Result<ObjectMeta> {
        let _session = self.sessions.session(|| self.authorize())?;
        if part_size == 0 {
            return Err(SkepError::store(400, "part size must be positive"));
        }
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;
        if payload.len() as u64 != total_len {
            return Err(SkepError::store(
                400,
                format!(
                    "multipart length mismatch for '{name}': declared {total_len}, read {}",
                    payload.len()
                ),
            ));
        }
        self.insert(name, payload, None)
    }

    fn download(&self, object_id: &str) -> Result<Vec<u8>> {
        let _session = self.sessions.session(|| self.authorize())?;
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(object_id)
            .map(|o| o.payload.clone())
            .ok_or_else(|| SkepError::ObjectNotFound(object_id.to_string()))
    }

    fn delete(&self, object_id: &str, name: &str) -> Result<()> {
        let _session = self.sessions.session(|| self.authorize())?;
        let mut state = self.state.lock().unwrap();
        match state.objects.get(object_id) {
            Some(obj) if obj.meta.name != name => Err(SkepError::store(
                400,
                format!(
                    "object name mismatch: version is '{}', not '{name}'",
                    obj.meta.name
                ),
            )),
            Some(_) => {
                state.objects.remove(object_id);
                Ok(())
            }
            None => Ok(()),
        }
    }
}
