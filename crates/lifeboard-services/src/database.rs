//! Database facade: storage-level information about the server's backing
//! database.

use crate::{call, Envelope};
use lifeboard_client::LifecycleClient;
use lifeboard_core::entities::DatabaseInfo;
use std::sync::Arc;

/// Facade over the server's database introspection.
pub struct DatabaseService {
    client: Arc<LifecycleClient>,
}

impl DatabaseService {
    /// Creates the facade over a shared client.
    pub fn new(client: Arc<LifecycleClient>) -> Self {
        Self { client }
    }

    /// Engine, size, and schema information of the backing store.
    pub async fn info(&self) -> Envelope<DatabaseInfo> {
        call(&self.client, "database/info", None, "database").await
    }
}
