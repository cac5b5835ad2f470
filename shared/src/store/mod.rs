//! Document store seams consumed by the roster core.

pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{CanonicalUser, DocumentPath, USERS};
use crate::value::Fields;

pub use dynamo::DynamoStore;
pub use memory::MemoryStore;

/// Point-in-time reads and partial writes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads one document; `Ok(None)` when it does not exist.
    async fn read_once(&self, path: &DocumentPath) -> Result<Option<Fields>>;

    /// Merges `fields` into the top level of an existing document.
    ///
    /// All-or-nothing. Fails with `NotFound` for a missing document and with
    /// `AbsentValue` if any value, at any depth, is absent.
    async fn write_partial(&self, path: &DocumentPath, fields: Fields) -> Result<()>;

    /// Like [`DocumentStore::write_partial`], but creates the document when
    /// it does not exist yet.
    async fn upsert(&self, path: &DocumentPath, fields: Fields) -> Result<()>;

    /// Every document of a collection as `(id, fields)`.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Fields)>>;
}

/// Live queries that push full snapshots until released.
pub trait LiveQuery: Send + Sync {
    fn subscribe_document(&self, path: &DocumentPath) -> Subscription<Option<Fields>>;

    fn subscribe_collection(&self, collection: &str) -> Subscription<Vec<(String, Fields)>>;
}

/// Handle to a live query. Dropping it unsubscribes.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    handle: SubscriptionHandle,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::UnboundedReceiver<T>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            handle: SubscriptionHandle {
                release: Some(Box::new(release)),
            },
        }
    }

    /// Next snapshot, or `None` once unsubscribed.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Releases the listener; no snapshot is delivered afterwards.
    pub fn unsubscribe(self) {}

    /// Separates the snapshot stream from the handle that keeps it alive, so
    /// an owner can release the listener without reaching into the consumer.
    pub fn into_parts(self) -> (mpsc::UnboundedReceiver<T>, SubscriptionHandle) {
        (self.rx, self.handle)
    }
}

/// Releases the underlying listener when dropped.
pub struct SubscriptionHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

pub fn users_from_snapshot(docs: &[(String, Fields)]) -> Vec<CanonicalUser> {
    docs.iter()
        .map(|(id, fields)| CanonicalUser::from_fields(id, fields))
        .collect()
}

/// Full snapshot of the user registry.
pub async fn load_users<S: DocumentStore + ?Sized>(store: &S) -> Result<Vec<CanonicalUser>> {
    let docs = store.list(USERS).await?;
    Ok(users_from_snapshot(&docs))
}
