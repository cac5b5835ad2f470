pub mod calendar;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod guard;
pub mod merge;
pub mod navbar;
pub mod roster;
pub mod search;
pub mod sections;
pub mod session;
pub mod store;
pub mod sync;
pub mod types;
pub mod users;
pub mod value;

use aws_sdk_dynamodb::Client as DynamoClient;
use std::sync::Arc;

pub use config::Config;
pub use error::{Result, RosterError};
use store::DynamoStore;
use sync::SyncRegistry;

/// Shared application state
pub struct AppState {
    pub store: Arc<DynamoStore>,
    /// Per-roster synchronizers, reused across invocations.
    pub synchronizers: SyncRegistry<DynamoStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(dynamo_client: DynamoClient, config: Config) -> Arc<Self> {
        let store = Arc::new(DynamoStore::new(dynamo_client, config.table_name.clone()));
        Arc::new(Self {
            synchronizers: SyncRegistry::new(store.clone()),
            store,
            config,
        })
    }
}
