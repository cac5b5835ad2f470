use async_trait::async_trait;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

use super::{DocumentStore, LiveQuery, Subscription};
use crate::error::{Result, RosterError};
use crate::types::DocumentPath;
use crate::value::{fields_absent_path, Fields};

type Collection = IndexMap<String, Fields>;

struct DocListener {
    id: u64,
    path: DocumentPath,
    tx: mpsc::UnboundedSender<Option<Fields>>,
}

struct CollectionListener {
    id: u64,
    collection: String,
    tx: mpsc::UnboundedSender<Vec<(String, Fields)>>,
}

#[derive(Default)]
struct Inner {
    collections: IndexMap<String, Collection>,
    doc_listeners: Vec<DocListener>,
    collection_listeners: Vec<CollectionListener>,
    next_listener: u64,
    writes: Vec<(DocumentPath, Fields)>,
    reads: usize,
    fail_reads: Option<String>,
    fail_writes: Option<String>,
}

impl Inner {
    fn document(&self, path: &DocumentPath) -> Option<Fields> {
        self.collections
            .get(&path.collection)
            .and_then(|c| c.get(&path.id))
            .cloned()
    }

    fn snapshot(&self, collection: &str) -> Vec<(String, Fields)> {
        self.collections
            .get(collection)
            .map(|c| c.iter().map(|(id, f)| (id.clone(), f.clone())).collect())
            .unwrap_or_default()
    }

    /// Pushes fresh snapshots to everyone watching `path` or its collection.
    fn notify(&mut self, path: &DocumentPath) {
        let doc = self.document(path);
        self.doc_listeners
            .retain(|l| l.path != *path || l.tx.send(doc.clone()).is_ok());

        let snapshot = self.snapshot(&path.collection);
        self.collection_listeners
            .retain(|l| l.collection != path.collection || l.tx.send(snapshot.clone()).is_ok());
    }

    fn next_id(&mut self) -> u64 {
        self.next_listener += 1;
        self.next_listener
    }
}

/// In-process document store with live queries.
///
/// Every partial write is kept in a log so callers can assert on exactly
/// what was sent.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates or replaces a whole document.
    pub fn put(&self, path: &DocumentPath, fields: Fields) {
        let mut inner = self.lock();
        inner
            .collections
            .entry(path.collection.clone())
            .or_default()
            .insert(path.id.clone(), fields);
        inner.notify(path);
    }

    pub fn remove(&self, path: &DocumentPath) {
        let mut inner = self.lock();
        if let Some(c) = inner.collections.get_mut(&path.collection) {
            c.shift_remove(&path.id);
        }
        inner.notify(path);
    }

    pub fn get(&self, path: &DocumentPath) -> Option<Fields> {
        self.lock().document(path)
    }

    /// Partial writes accepted so far, oldest first.
    pub fn writes(&self) -> Vec<(DocumentPath, Fields)> {
        self.lock().writes.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Makes every read fail with a backend error until reset with `None`.
    pub fn fail_reads(&self, reason: Option<&str>) {
        self.lock().fail_reads = reason.map(str::to_string);
    }

    /// Makes every write fail with a backend error until reset with `None`.
    pub fn fail_writes(&self, reason: Option<&str>) {
        self.lock().fail_writes = reason.map(str::to_string);
    }

    /// Live listeners, documents and collections combined.
    pub fn listener_count(&self) -> usize {
        let inner = self.lock();
        inner.doc_listeners.len() + inner.collection_listeners.len()
    }

    /// Top-level merge shared by partial writes and upserts.
    fn merge(&self, path: &DocumentPath, fields: Fields, create: bool) -> Result<()> {
        if let Some(at) = fields_absent_path(&fields) {
            return Err(RosterError::AbsentValue(at));
        }

        let mut inner = self.lock();
        if let Some(reason) = &inner.fail_writes {
            return Err(RosterError::Backend(reason.clone()));
        }
        let collection = inner.collections.entry(path.collection.clone()).or_default();
        let doc = if create {
            collection.entry(path.id.clone()).or_default()
        } else {
            collection
                .get_mut(&path.id)
                .ok_or_else(|| RosterError::NotFound(path.to_string()))?
        };

        for (k, v) in &fields {
            doc.insert(k.clone(), v.clone());
        }
        inner.writes.push((path.clone(), fields));
        inner.notify(path);
        Ok(())
    }

    fn release_listener(inner: &Weak<Mutex<Inner>>, id: u64) {
        if let Some(inner) = inner.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.doc_listeners.retain(|l| l.id != id);
            inner.collection_listeners.retain(|l| l.id != id);
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_once(&self, path: &DocumentPath) -> Result<Option<Fields>> {
        // Reads complete on a later poll, like a network round trip.
        tokio::task::yield_now().await;

        let mut inner = self.lock();
        inner.reads += 1;
        if let Some(reason) = &inner.fail_reads {
            return Err(RosterError::Backend(reason.clone()));
        }
        Ok(inner.document(path))
    }

    async fn write_partial(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        tokio::task::yield_now().await;
        self.merge(path, fields, false)
    }

    async fn upsert(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
        tokio::task::yield_now().await;
        self.merge(path, fields, true)
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Fields)>> {
        tokio::task::yield_now().await;

        let inner = self.lock();
        if let Some(reason) = &inner.fail_reads {
            return Err(RosterError::Backend(reason.clone()));
        }
        Ok(inner.snapshot(collection))
    }
}

impl LiveQuery for MemoryStore {
    fn subscribe_document(&self, path: &DocumentPath) -> Subscription<Option<Fields>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id();
        // Initial snapshot goes out before any change.
        let _ = tx.send(inner.document(path));
        inner.doc_listeners.push(DocListener {
            id,
            path: path.clone(),
            tx,
        });

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || Self::release_listener(&weak, id))
    }

    fn subscribe_collection(&self, collection: &str) -> Subscription<Vec<(String, Fields)>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        let id = inner.next_id();
        let _ = tx.send(inner.snapshot(collection));
        inner.collection_listeners.push(CollectionListener {
            id,
            collection: collection.to_string(),
            tx,
        });

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(rx, move || Self::release_listener(&weak, id))
    }
}
