//! Construction of regional clients for a session's credentials.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use crate::credentials::Credentials;
use crate::errors::AccessError;
use crate::metrics::CLIENTS_PROVISIONED_TOTAL;
use crate::region::Region;
use crate::storage::backend::{ClientFactory, ClientHandle};

/// Creates [`ClientHandle`]s bound to the session's fixed credentials.
///
/// This is the only place new regional connectivity is established.
pub struct RegionalClientFactory {
    credentials: Credentials,
    backend: Arc<dyn ClientFactory>,
}

impl RegionalClientFactory {
    pub fn new(credentials: Credentials, backend: Arc<dyn ClientFactory>) -> Self {
        Self {
            credentials,
            backend,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Build a new handle for `region`.
    pub async fn create(&self, region: Region) -> Result<ClientHandle, AccessError> {
        match self.backend.connect(&self.credentials, region).await {
            Ok(client) => {
                info!(
                    "Created client for region={} credentials={}",
                    region,
                    self.credentials.label()
                );
                counter!(CLIENTS_PROVISIONED_TOTAL, "region" => region.code()).increment(1);
                Ok(ClientHandle::new(region, self.credentials.label(), client))
            }
            Err(source) => {
                warn!(
                    "Client creation failed for region={} credentials={}: {:#}",
                    region,
                    self.credentials.label(),
                    source
                );
                Err(AccessError::ClientCreation { region, source })
            }
        }
    }

    /// Credential profiles the backend can resolve.
    pub async fn list_profiles(&self) -> anyhow::Result<Vec<String>> {
        self.backend.list_profiles().await
    }
}
