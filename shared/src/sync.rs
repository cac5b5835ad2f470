//! Keeps embedded profile copies in roster documents in step with the user
//! registry.
//!
//! Each change to the registry delivers a full snapshot of users. The
//! synchronizer reads the roster once, merges every embedded reference,
//! and issues at most one partial write holding only the fields that really
//! changed. Overlapping notifications are dropped, not queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Result;
use crate::guard::SingleFlight;
use crate::merge::merge_reference;
use crate::store::DocumentStore;
use crate::types::{CanonicalUser, EmbeddedReference, RosterLayout, RosterScope};
use crate::value::{values_equal, Fields, Value};

/// What one change notification led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle was in flight.
    Dropped,
    /// The roster document does not exist.
    NotFound,
    /// Every embedded copy was already current.
    Unchanged,
    /// One partial write went out with these fields.
    Written(Vec<String>),
    /// A read or write failed; logged, nothing retained.
    Failed,
}

pub struct RosterSynchronizer<S> {
    store: Arc<S>,
    scope: RosterScope,
    flight: SingleFlight,
}

impl<S: DocumentStore> RosterSynchronizer<S> {
    pub fn new(store: Arc<S>, scope: RosterScope) -> Self {
        Self {
            store,
            scope,
            flight: SingleFlight::new(),
        }
    }

    pub fn scope(&self) -> &RosterScope {
        &self.scope
    }

    pub fn is_syncing(&self) -> bool {
        self.flight.is_busy()
    }

    /// Runs one reconciliation cycle against `users`, unless one is running.
    pub async fn on_users_changed(&self, users: &[CanonicalUser]) -> SyncOutcome {
        let Some(_flight) = self.flight.try_enter() else {
            tracing::debug!("Sync for {} already running, dropping notification", self.scope);
            return SyncOutcome::Dropped;
        };

        match self.run_cycle(users).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Roster sync for {} failed: {}", self.scope, e);
                SyncOutcome::Failed
            }
        }
    }

    async fn run_cycle(&self, users: &[CanonicalUser]) -> Result<SyncOutcome> {
        let path = self.scope.path();
        let Some(doc) = self.store.read_once(&path).await? else {
            return Ok(SyncOutcome::NotFound);
        };

        let updates = plan_updates(self.scope.layout(), &doc, users);
        if updates.is_empty() {
            return Ok(SyncOutcome::Unchanged);
        }

        let fields: Vec<String> = updates.keys().cloned().collect();
        self.store.write_partial(&path, updates).await?;
        tracing::info!("Synced {} on {}", fields.join(", "), path);

        Ok(SyncOutcome::Written(fields))
    }
}

/// One synchronizer per roster scope over a shared store.
///
/// Handing out the same synchronizer for a scope is what lets its guard span
/// separate callers, e.g. successive requests on a warm container.
pub struct SyncRegistry<S> {
    store: Arc<S>,
    by_scope: Mutex<HashMap<RosterScope, Arc<RosterSynchronizer<S>>>>,
}

impl<S: DocumentStore> SyncRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            by_scope: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn get(&self, scope: &RosterScope) -> Arc<RosterSynchronizer<S>> {
        let mut by_scope = self.by_scope.lock().unwrap_or_else(PoisonError::into_inner);
        by_scope
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(RosterSynchronizer::new(self.store.clone(), scope.clone())))
            .clone()
    }
}

/// Fields of `doc` whose embedded references need rewriting.
///
/// Leads are staged when their merge reports a change. A member list is
/// staged whole when at least one element changed and the recomputed list
/// still differs from the stored one. Elements that are not objects, or did
/// not change, are carried over exactly as stored.
pub fn plan_updates(layout: RosterLayout, doc: &Fields, users: &[CanonicalUser]) -> Fields {
    let mut staged = Fields::new();

    for field in layout.leads() {
        let Some(entry) = doc.get(field).and_then(EmbeddedReference::from_value) else {
            continue;
        };
        if entry.identifier().is_none() {
            continue;
        }
        let outcome = merge_reference(&entry, users);
        if outcome.changed {
            staged.insert(field.to_string(), outcome.merged.sanitized());
        }
    }

    for &field in layout.members {
        let Some(stored) = doc.get(field).and_then(Value::as_array) else {
            continue;
        };

        let mut any_changed = false;
        let recomputed: Vec<Value> = stored
            .iter()
            .map(|item| match EmbeddedReference::from_value(item) {
                Some(entry) => {
                    let outcome = merge_reference(&entry, users);
                    any_changed |= outcome.changed;
                    if outcome.changed {
                        outcome.merged
                    } else {
                        item.clone()
                    }
                }
                None => item.clone(),
            })
            .collect();

        let recomputed = Value::Array(recomputed).sanitized();
        if any_changed && !values_equal(&recomputed, &Value::Array(stored.to_vec())) {
            staged.insert(field.to_string(), recomputed);
        }
    }

    staged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::DocumentPath;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        Value::from(v).as_object().cloned().unwrap()
    }

    fn user(id: &str, v: serde_json::Value) -> CanonicalUser {
        CanonicalUser::from_fields(id, &fields(v))
    }

    fn person(id: &str, name: &str, email: &str) -> serde_json::Value {
        json!({"id": id, "name": name, "fullName": name, "email": email})
    }

    fn registry() -> Vec<CanonicalUser> {
        vec![
            user("dean", json!({"fullName": "Dean D", "email": "dean@x.edu"})),
            user("sec", json!({"fullName": "Sec S", "email": "sec@x.edu"})),
            user("a", json!({"fullName": "Staff A", "email": "a@x.edu"})),
            user("b", json!({"fullName": "Staff B", "email": "b-new@x.edu"})),
            user("c", json!({"fullName": "Staff C", "email": "c@x.edu"})),
        ]
    }

    fn college_doc() -> Fields {
        fields(json!({
            "collegeDean": person("dean", "Dean D", "dean@x.edu"),
            "collegeSecretary": person("sec", "Sec S", "sec@x.edu"),
            "departmentHeads": [],
            "adminStaff": [
                person("a", "Staff A", "a@x.edu"),
                person("b", "Staff B", "b@x.edu"),
                person("c", "Staff C", "c@x.edu"),
            ],
        }))
    }

    fn setup() -> (Arc<MemoryStore>, RosterSynchronizer<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.put(&RosterScope::College.path(), college_doc());
        let sync = RosterSynchronizer::new(store.clone(), RosterScope::College);
        (store, sync)
    }

    #[tokio::test]
    async fn test_single_member_change_writes_only_that_list() {
        let (store, sync) = setup();

        let outcome = sync.on_users_changed(&registry()).await;
        assert_eq!(outcome, SyncOutcome::Written(vec!["adminStaff".to_string()]));

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        let (path, written) = &writes[0];
        assert_eq!(*path, RosterScope::College.path());
        assert_eq!(written.keys().collect::<Vec<_>>(), vec!["adminStaff"]);

        let staff = serde_json::to_value(&written["adminStaff"]).unwrap();
        assert_eq!(staff[1]["email"], json!("b-new@x.edu"));
        assert_eq!(staff[0], person("a", "Staff A", "a@x.edu"));
    }

    #[tokio::test]
    async fn test_second_cycle_is_unchanged() {
        let (store, sync) = setup();
        sync.on_users_changed(&registry()).await;

        assert_eq!(sync.on_users_changed(&registry()).await, SyncOutcome::Unchanged);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_lead_change_is_staged() {
        let (store, sync) = setup();
        let mut users = registry();
        users[0].photo = Some("https://cdn.x.edu/dean.jpg".into());

        let outcome = sync.on_users_changed(&users).await;
        assert_eq!(
            outcome,
            SyncOutcome::Written(vec!["collegeDean".to_string(), "adminStaff".to_string()])
        );
        let doc = store.get(&RosterScope::College.path()).unwrap();
        assert_eq!(
            serde_json::to_value(&doc["collegeDean"]).unwrap()["photo"],
            json!("https://cdn.x.edu/dean.jpg")
        );
    }

    #[tokio::test]
    async fn test_overlapping_notification_is_dropped() {
        let (store, sync) = setup();
        let users = registry();

        let (first, second) = tokio::join!(sync.on_users_changed(&users), sync.on_users_changed(&users));

        assert!(matches!(first, SyncOutcome::Written(_)));
        assert_eq!(second, SyncOutcome::Dropped);
        assert_eq!(store.read_count(), 1);
        assert_eq!(store.writes().len(), 1);
        assert!(!sync.is_syncing());
    }

    #[tokio::test]
    async fn test_missing_roster_is_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let sync = RosterSynchronizer::new(store.clone(), RosterScope::Department("cs".into()));

        assert_eq!(sync.on_users_changed(&registry()).await, SyncOutcome::NotFound);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_resets_for_next_cycle() {
        let (store, sync) = setup();
        store.fail_writes(Some("throttled"));

        assert_eq!(sync.on_users_changed(&registry()).await, SyncOutcome::Failed);
        assert!(!sync.is_syncing());

        store.fail_writes(None);
        assert!(matches!(sync.on_users_changed(&registry()).await, SyncOutcome::Written(_)));
    }

    #[tokio::test]
    async fn test_failed_read_is_logged_and_dropped() {
        let (store, sync) = setup();
        store.fail_reads(Some("unavailable"));
        assert_eq!(sync.on_users_changed(&registry()).await, SyncOutcome::Failed);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_stale_and_malformed_members_are_kept() {
        let doc = fields(json!({
            "headAdmin": {"name": "No Id"},
            "staff": [
                person("ghost", "Former Member", "ghost@x.edu"),
                "not-an-object",
                person("b", "Staff B", "b@x.edu"),
            ],
        }));

        let staged = plan_updates(RosterLayout::DEPARTMENT, &doc, &registry());
        assert_eq!(staged.keys().collect::<Vec<_>>(), vec!["staff"]);

        let staff = serde_json::to_value(&staged["staff"]).unwrap();
        assert_eq!(staff[0], person("ghost", "Former Member", "ghost@x.edu"));
        assert_eq!(staff[1], json!("not-an-object"));
        assert_eq!(staff[2]["email"], json!("b-new@x.edu"));
    }

    #[test]
    fn test_key_order_alone_does_not_trigger_a_write() {
        let doc = fields(json!({
            "staff": [{"email": "a@x.edu", "fullName": "Staff A", "name": "Staff A", "id": "a"}],
        }));
        assert!(plan_updates(RosterLayout::DEPARTMENT, &doc, &registry()).is_empty());
    }

    #[tokio::test]
    async fn test_department_scope_uses_its_own_layout() {
        let store = Arc::new(MemoryStore::new());
        let path = DocumentPath::department("cs");
        store.put(
            &path,
            fields(json!({
                "name": "Computer Science",
                "headAdmin": person("a", "A", "a@x.edu"),
                "staff": [],
            })),
        );

        let sync = RosterSynchronizer::new(store.clone(), RosterScope::Department("cs".into()));
        let outcome = sync.on_users_changed(&registry()).await;
        assert_eq!(outcome, SyncOutcome::Written(vec!["headAdmin".to_string()]));
        assert_eq!(
            serde_json::to_value(&store.get(&path).unwrap()["headAdmin"]).unwrap()["fullName"],
            json!("Staff A")
        );
    }

    #[tokio::test]
    async fn test_sync_registry_shares_guard_per_scope() {
        let (store, _) = setup();
        let pool = SyncRegistry::new(store.clone());

        let first = pool.get(&RosterScope::College);
        let again = pool.get(&RosterScope::College);
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &pool.get(&RosterScope::Department("cs".into()))));

        let users = registry();
        let (a, b) = tokio::join!(first.on_users_changed(&users), again.on_users_changed(&users));
        let mut outcomes = vec![a, b];
        outcomes.retain(|o| *o != SyncOutcome::Dropped);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(store.read_count(), 1);
    }
}
