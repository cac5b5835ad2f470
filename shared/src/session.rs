//! Live binding of one roster scope for an interactive surface.
//!
//! A session subscribes to the roster document and the user registry,
//! publishes both through `watch` cells, and runs a reconciliation cycle on
//! every registry snapshot. All listeners are owned by the session and are
//! released on [`RosterSession::close`] or drop.

use indexmap::IndexMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::Result;
use crate::merge::ProfilePreview;
use crate::roster::{assemble_preview, remove_reference};
use crate::store::{users_from_snapshot, DocumentStore, LiveQuery, SubscriptionHandle};
use crate::sync::RosterSynchronizer;
use crate::types::{CanonicalUser, EmbeddedReference, RosterLayout, RosterScope, USERS};
use crate::value::{Fields, Value};

/// Member lists keyed by roster field name.
pub type MemberLists = IndexMap<String, Vec<EmbeddedReference>>;

struct Cells {
    primary: watch::Sender<Option<EmbeddedReference>>,
    secondary: watch::Sender<Option<EmbeddedReference>>,
    members: watch::Sender<MemberLists>,
    users: watch::Sender<Vec<CanonicalUser>>,
    preview: watch::Sender<Option<ProfilePreview>>,
}

impl Cells {
    fn new() -> Self {
        Self {
            primary: watch::channel(None).0,
            secondary: watch::channel(None).0,
            members: watch::channel(MemberLists::new()).0,
            users: watch::channel(Vec::new()).0,
            preview: watch::channel(None).0,
        }
    }

    fn apply_roster(&self, layout: RosterLayout, doc: &Fields) {
        let lead = |field: Option<&str>| {
            field
                .and_then(|f| doc.get(f))
                .and_then(EmbeddedReference::from_value)
        };
        self.primary.send_replace(lead(layout.primary));
        self.secondary.send_replace(lead(layout.secondary));

        let members = layout
            .members
            .iter()
            .map(|&field| {
                let list = doc
                    .get(field)
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(EmbeddedReference::from_value).collect())
                    .unwrap_or_default();
                (field.to_string(), list)
            })
            .collect();
        self.members.send_replace(members);
    }
}

pub struct RosterSession<S> {
    store: Arc<S>,
    synchronizer: Arc<RosterSynchronizer<S>>,
    cells: Arc<Cells>,
    handles: Vec<SubscriptionHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S> RosterSession<S>
where
    S: DocumentStore + LiveQuery + 'static,
{
    pub fn new(store: Arc<S>, scope: RosterScope) -> Self {
        Self {
            synchronizer: Arc::new(RosterSynchronizer::new(store.clone(), scope)),
            store,
            cells: Arc::new(Cells::new()),
            handles: Vec::new(),
            tasks: Vec::new(),
        }
    }

    pub fn scope(&self) -> &RosterScope {
        self.synchronizer.scope()
    }

    /// Subscribes to the roster and the registry. Must be called inside a
    /// Tokio runtime. Calling it again replaces the previous subscriptions.
    pub fn start(&mut self) {
        self.close();

        let scope = self.scope().clone();
        let layout = scope.layout();

        let (mut roster_rx, handle) = self.store.subscribe_document(&scope.path()).into_parts();
        self.handles.push(handle);
        let cells = self.cells.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(doc) = roster_rx.recv().await {
                // A missing roster leaves the last known state in place.
                if let Some(doc) = doc {
                    cells.apply_roster(layout, &doc);
                }
            }
        }));

        let (mut users_rx, handle) = self.store.subscribe_collection(USERS).into_parts();
        self.handles.push(handle);
        let cells = self.cells.clone();
        let synchronizer = self.synchronizer.clone();
        self.tasks.push(tokio::spawn(async move {
            // Dropped with this task, which aborts any cycle still running.
            let mut cycles = JoinSet::new();
            while let Some(docs) = users_rx.recv().await {
                let snapshot = users_from_snapshot(&docs);
                cells.users.send_replace(
                    snapshot.iter().filter(|u| !u.is_super_admin()).cloned().collect(),
                );

                while cycles.try_join_next().is_some() {}
                let synchronizer = synchronizer.clone();
                cycles.spawn(async move {
                    synchronizer.on_users_changed(&snapshot).await;
                });
            }
        }));

        tracing::info!("Roster session started for {}", scope);
    }

    /// Releases every subscription and aborts the listener tasks.
    pub fn close(&mut self) {
        if self.handles.is_empty() && self.tasks.is_empty() {
            return;
        }
        self.handles.clear();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        tracing::info!("Roster session closed for {}", self.scope());
    }

    pub fn primary(&self) -> watch::Receiver<Option<EmbeddedReference>> {
        self.cells.primary.subscribe()
    }

    pub fn secondary(&self) -> watch::Receiver<Option<EmbeddedReference>> {
        self.cells.secondary.subscribe()
    }

    pub fn members(&self) -> watch::Receiver<MemberLists> {
        self.cells.members.subscribe()
    }

    /// Registry members other than super administrators.
    pub fn users(&self) -> watch::Receiver<Vec<CanonicalUser>> {
        self.cells.users.subscribe()
    }

    /// The open preview, `None` while closed.
    pub fn preview(&self) -> watch::Receiver<Option<ProfilePreview>> {
        self.cells.preview.subscribe()
    }

    pub async fn preview_profile(&self, profile: &EmbeddedReference) -> ProfilePreview {
        let users = self.cells.users.borrow().clone();
        let preview = assemble_preview(self.store.as_ref(), profile, &users).await;
        self.cells.preview.send_replace(Some(preview.clone()));
        preview
    }

    pub fn close_preview(&self) {
        self.cells.preview.send_replace(None);
    }

    pub async fn remove_reference(&self, user_id: &str) -> Result<Option<String>> {
        remove_reference(self.store.as_ref(), self.scope(), user_id).await
    }
}

impl<S> Drop for RosterSession<S> {
    fn drop(&mut self) {
        self.handles.clear();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}
