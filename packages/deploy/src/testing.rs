//! In-memory doubles for the storage, filesystem and CDN collaborators.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::local::{LocalFile, LocalStore, WalkFilter, WalkedFile};
use crate::store::{CdnClient, RemoteStore};
use crate::{BoxError, DeployError, RemoteObject, UploadReason};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which [`MemoryRemote`] operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    List,
    Put,
    Delete,
}

#[derive(Debug, Clone)]
pub struct PutRecord {
    pub key: String,
    pub headers: BTreeMap<String, String>,
    pub acl: Option<String>,
    pub reason: Option<UploadReason>,
    pub start: Instant,
    pub end: Instant,
}

#[derive(Debug, Clone)]
pub struct DeleteRecord {
    pub keys: Vec<String>,
    pub start: Instant,
}

/// Bucket held in a map, recording when each mutation happened.
#[derive(Default)]
pub struct MemoryRemote {
    objects: Mutex<HashMap<String, RemoteObject>>,
    fail_at: Option<FailAt>,
    fail_key: Option<String>,
    panic_key: Option<String>,
    failed_at: Mutex<Option<Instant>>,
    delay: Duration,
    attempts: Mutex<Vec<(String, Instant)>>,
    puts: Mutex<Vec<PutRecord>>,
    deletes: Mutex<Vec<DeleteRecord>>,
}

impl MemoryRemote {
    pub fn with_objects(objects: &[(&str, &str, u64)]) -> Self {
        let objects = objects
            .iter()
            .map(|&(key, fingerprint, size)| {
                (
                    key.to_string(),
                    RemoteObject {
                        key: key.to_string(),
                        fingerprint: fingerprint.to_string(),
                        size,
                    },
                )
            })
            .collect();

        Self {
            objects: Mutex::new(objects),
            ..Self::default()
        }
    }

    pub fn with_keys(keys: &[String]) -> Self {
        let objects: Vec<(&str, &str, u64)> =
            keys.iter().map(|k| (k.as_str(), "\"x\"", 1)).collect();
        Self::with_objects(&objects)
    }

    pub fn failing(mut self, fail_at: FailAt) -> Self {
        self.fail_at = Some(fail_at);
        self
    }

    /// Fails the put of `key` only, after a fifth of the put delay. Every
    /// other key uploads normally.
    pub fn failing_key(mut self, key: &str) -> Self {
        self.fail_key = Some(key.to_string());
        self
    }

    /// Panics inside the put of `key`, taking its worker task down.
    pub fn panicking_key(mut self, key: &str) -> Self {
        self.panic_key = Some(key.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sorted keys currently stored.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.objects).keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        lock(&self.puts).clone()
    }

    /// Every put call, in call order, with its start time.
    pub fn attempts(&self) -> Vec<(String, Instant)> {
        lock(&self.attempts).clone()
    }

    /// When the put of the failing key returned its error.
    pub fn failed_at(&self) -> Option<Instant> {
        *lock(&self.failed_at)
    }

    pub fn put_of(&self, key: &str) -> Option<PutRecord> {
        lock(&self.puts).iter().find(|p| p.key == key).cloned()
    }

    pub fn deletes(&self) -> Vec<DeleteRecord> {
        lock(&self.deletes).clone()
    }

    pub fn deleted_key_count(&self) -> usize {
        lock(&self.deletes).iter().map(|d| d.keys.len()).sum()
    }

    fn fails_at(&self, op: FailAt) -> Result<(), BoxError> {
        if self.fail_at == Some(op) {
            Err(format!("{op:?} failed").into())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn file_map(&self, prefix: &str) -> Result<HashMap<String, RemoteObject>, BoxError> {
        self.fails_at(FailAt::List)?;
        Ok(lock(&self.objects)
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| (key.clone(), object.clone()))
            .collect())
    }

    async fn put(&self, file: &LocalFile, acl: Option<&str>) -> Result<(), BoxError> {
        self.fails_at(FailAt::Put)?;

        let start = Instant::now();
        lock(&self.attempts).push((file.key().to_string(), start));

        assert!(
            self.panic_key.as_deref() != Some(file.key()),
            "put of {} panicked",
            file.key()
        );

        if self.fail_key.as_deref() == Some(file.key()) {
            tokio::time::sleep(self.delay / 5).await;
            *lock(&self.failed_at) = Some(Instant::now());
            return Err(format!("put of {} rejected", file.key()).into());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        lock(&self.objects).insert(
            file.key().to_string(),
            RemoteObject {
                key: file.key().to_string(),
                fingerprint: file.fingerprint().to_string(),
                size: file.size(),
            },
        );
        lock(&self.puts).push(PutRecord {
            key: file.key().to_string(),
            headers: file.headers().clone(),
            acl: acl.map(ToString::to_string),
            reason: file.reason(),
            start,
            end: Instant::now(),
        });

        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), BoxError> {
        self.fails_at(FailAt::Delete)?;

        let start = Instant::now();
        {
            let mut objects = lock(&self.objects);
            for key in keys {
                objects.remove(key);
            }
        }
        lock(&self.deletes).push(DeleteRecord {
            keys: keys.to_vec(),
            start,
        });

        Ok(())
    }
}

struct MemoryFile {
    content: Vec<u8>,
    unreadable: bool,
}

/// Source tree held in memory under a fake root.
pub struct MemoryLocal {
    root: PathBuf,
    files: BTreeMap<String, MemoryFile>,
    reads: AtomicUsize,
}

impl MemoryLocal {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: BTreeMap::new(),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_file(mut self, rel_path: &str, content: &[u8]) -> Self {
        self.files.insert(
            rel_path.to_string(),
            MemoryFile {
                content: content.to_vec(),
                unreadable: false,
            },
        );
        self
    }

    /// Number of `read` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Marks an existing file as failing to open.
    pub fn with_unreadable_file(mut self, rel_path: &str) -> Self {
        if let Some(file) = self.files.get_mut(rel_path) {
            file.unreadable = true;
        }
        self
    }
}

impl LocalStore for MemoryLocal {
    fn walk(&self, _root: &Path, filter: &WalkFilter) -> Result<Vec<WalkedFile>, DeployError> {
        Ok(self
            .files
            .iter()
            .filter(|(rel_path, _)| filter.accepts(rel_path))
            .map(|(rel_path, file)| WalkedFile {
                rel_path: rel_path.clone(),
                abs_path: self.root.join(rel_path),
                size: file.content.len() as u64,
            })
            .collect())
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, DeployError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let rel_path = path
            .strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match self.files.get(&rel_path) {
            Some(file) if file.unreadable => Err(DeployError::io(
                path,
                std::io::Error::other("Error opening file"),
            )),
            Some(file) => Ok(file.content.clone()),
            None => Err(DeployError::io(
                path,
                std::io::Error::from(std::io::ErrorKind::NotFound),
            )),
        }
    }
}

/// CDN that records every invalidation request.
#[derive(Default)]
pub struct RecordingCdn {
    calls: Mutex<Vec<Vec<String>>>,
    fail: bool,
}

impl RecordingCdn {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl CdnClient for RecordingCdn {
    async fn invalidate_cdn_cache(&self, keys: &[String]) -> Result<(), BoxError> {
        if self.fail {
            return Err("invalidation rejected".into());
        }
        lock(&self.calls).push(keys.to_vec());
        Ok(())
    }
}
