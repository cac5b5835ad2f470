use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use roster_shared::store::{load_users, DocumentStore};
use roster_shared::sync::{SyncOutcome, SyncRegistry};
use roster_shared::types::{RosterScope, DEPARTMENTS};
use roster_shared::{AppState, Config};
use std::sync::Arc;

const USER_PK_PREFIX: &str = "USER#";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let aws = aws_config::load_from_env().await;
    // Synchronizers live in the state so their guards outlive one invocation.
    let state = AppState::new(DynamoClient::new(&aws), Config::from_env());

    run(service_fn(move |event: LambdaEvent<Event>| {
        let state = Arc::clone(&state);
        async move { function_handler(event, state).await }
    }))
    .await
}

async fn function_handler(event: LambdaEvent<Event>, state: Arc<AppState>) -> Result<(), Error> {
    tracing::info!("DynamoDB Stream event received with {} records", event.payload.records.len());

    for (scope, outcome) in reconcile_batch(&state.synchronizers, &event.payload.records).await? {
        if let SyncOutcome::Written(fields) = &outcome {
            tracing::info!("Updated {} on {}", fields.join(", "), scope);
        }
    }

    Ok(())
}

/// Runs one reconciliation per roster when the batch touched a user record.
///
/// Roster writes come back through the stream too; a batch without user
/// records does nothing, which keeps the lambda from feeding on itself.
async fn reconcile_batch<S: DocumentStore>(
    synchronizers: &SyncRegistry<S>,
    records: &[EventRecord],
) -> Result<Vec<(RosterScope, SyncOutcome)>, Error> {
    let changed = changed_user_ids(records);
    if changed.is_empty() {
        return Ok(Vec::new());
    }
    tracing::info!("{} user records changed, reconciling rosters", changed.len());

    let store = synchronizers.store().as_ref();
    let users = load_users(store).await?;
    let departments = match store.list(DEPARTMENTS).await {
        Ok(docs) => docs.into_iter().map(|(id, _)| id).collect(),
        Err(e) => {
            tracing::error!("Failed to list departments: {}", e);
            Vec::new()
        }
    };

    let mut outcomes = Vec::new();
    for scope in roster_scopes(departments) {
        let outcome = synchronizers.get(&scope).on_users_changed(&users).await;
        outcomes.push((scope, outcome));
    }
    Ok(outcomes)
}

/// The college roster first, then one scope per department.
fn roster_scopes(department_ids: Vec<String>) -> Vec<RosterScope> {
    std::iter::once(RosterScope::College)
        .chain(department_ids.into_iter().map(RosterScope::Department))
        .collect()
}

/// Ids of the user records a batch touched, in order, without repeats.
fn changed_user_ids(records: &[EventRecord]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for pk in records.iter().filter_map(record_pk) {
        if let Some(id) = pk.strip_prefix(USER_PK_PREFIX) {
            if !ids.iter().any(|seen| seen == id) {
                ids.push(id.to_string());
            }
        }
    }
    ids
}

/// Partition key of the changed item. REMOVE events only carry the old image.
fn record_pk(record: &EventRecord) -> Option<String> {
    let image = if record.change.new_image.is_empty() {
        &record.change.old_image
    } else {
        &record.change.new_image
    };

    // Stream attributes serialize in their tagged form, `{"S": "USER#id"}`.
    image
        .get("PK")
        .and_then(|attr| serde_json::to_value(attr).ok())
        .and_then(|v| v.get("S").and_then(|s| s.as_str()).map(|s| s.to_string()))
}
