//! Bucket-to-client resolution with on-demand provisioning.
//!
//! [`BucketClientLocator::resolve_client_for_bucket`] runs three phases:
//!
//! 1. **Lookup**: ask the active client which region hosts the bucket.
//! 2. **Resolve**: return the pooled client for that region, if any.
//! 3. **Provision**: otherwise create a client for the region, pool it and
//!    make it active.
//!
//! Resolution costs at most one location round-trip plus one client
//! construction.  Failures are returned once; nothing is retried.

use metrics::counter;
use tracing::{debug, info};

use crate::errors::AccessError;
use crate::factory::RegionalClientFactory;
use crate::metrics::REGION_RESOLUTIONS_TOTAL;
use crate::pool::ClientPool;
use crate::region::Region;
use crate::resolver::location_of;
use crate::storage::backend::ClientHandle;

/// Result of resolving a bucket to a client.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Client that must serve the bucket.
    pub handle: ClientHandle,
    /// True when the client was created by this resolution.
    pub provisioned: bool,
}

/// Owns a session's [`ClientPool`] and decides which client serves a bucket.
pub struct BucketClientLocator {
    factory: RegionalClientFactory,
    pool: ClientPool,
}

impl BucketClientLocator {
    /// Create a locator whose pool holds a single client for
    /// `initial_region`, which becomes the active client.
    pub async fn bootstrap(
        factory: RegionalClientFactory,
        initial_region: Region,
    ) -> Result<Self, AccessError> {
        let handle = factory.create(initial_region).await?;
        let mut pool = ClientPool::new();
        pool.insert(handle.clone());
        pool.set_active(handle);
        Ok(Self { factory, pool })
    }

    /// Return the client that must serve `bucket`, provisioning one for
    /// the bucket's region if the pool has none yet.
    pub async fn resolve_client_for_bucket(
        &mut self,
        bucket: &str,
    ) -> Result<Resolution, AccessError> {
        let active = self.pool.active()?.clone();
        let region = match location_of(&active, bucket).await {
            Ok(region) => region,
            Err(err) => {
                counter!(REGION_RESOLUTIONS_TOTAL, "outcome" => "error").increment(1);
                return Err(err);
            }
        };

        if let Some(handle) = self.pool.lookup(region) {
            debug!("Bucket {} served by pooled client for {}", bucket, region);
            counter!(REGION_RESOLUTIONS_TOTAL, "outcome" => "hit").increment(1);
            return Ok(Resolution {
                handle: handle.clone(),
                provisioned: false,
            });
        }

        let handle = match self.factory.create(region).await {
            Ok(handle) => handle,
            Err(err) => {
                counter!(REGION_RESOLUTIONS_TOTAL, "outcome" => "error").increment(1);
                return Err(err);
            }
        };
        self.pool.insert(handle.clone());
        self.pool.set_active(handle.clone());
        info!(
            "Provisioned client for {} (bucket {}); active region is now {}",
            region, bucket, region
        );
        counter!(REGION_RESOLUTIONS_TOTAL, "outcome" => "provisioned").increment(1);
        Ok(Resolution {
            handle,
            provisioned: true,
        })
    }

    /// Make the pooled client for `region` active.  Never provisions.
    pub fn change_region(&mut self, region: Region) -> Result<(), AccessError> {
        let handle = self
            .pool
            .lookup(region)
            .cloned()
            .ok_or(AccessError::RegionNotProvisioned { region })?;
        self.pool.set_active(handle);
        info!("Active region changed to {}", region);
        Ok(())
    }

    /// Provision a client for `region` without changing the active client.
    ///
    /// Returns the existing client if the region is already pooled.
    pub async fn add_new_region(&mut self, region: Region) -> Result<ClientHandle, AccessError> {
        if let Some(existing) = self.pool.lookup(region) {
            debug!("Region {} already provisioned", region);
            return Ok(existing.clone());
        }
        let handle = self.factory.create(region).await?;
        self.pool.insert(handle.clone());
        info!("Added client for region {}", region);
        Ok(handle)
    }

    pub fn active(&self) -> Result<&ClientHandle, AccessError> {
        self.pool.active()
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    pub fn factory(&self) -> &RegionalClientFactory {
        &self.factory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::storage::memory::{MemoryClientFactory, MemoryService};
    use std::sync::Arc;

    struct Fixture {
        service: Arc<MemoryService>,
        backend: Arc<MemoryClientFactory>,
        locator: BucketClientLocator,
    }

    async fn fixture(initial: Region) -> Fixture {
        let service = MemoryService::new();
        let backend = Arc::new(MemoryClientFactory::new(service.clone(), &["default"]));
        let factory = RegionalClientFactory::new(Credentials::profile("default"), backend.clone());
        let locator = BucketClientLocator::bootstrap(factory, initial).await.unwrap();
        Fixture {
            service,
            backend,
            locator,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_populates_pool() {
        let fx = fixture(Region::US_EAST_1).await;
        assert_eq!(fx.locator.pool().regions(), vec![Region::US_EAST_1]);
        assert_eq!(fx.locator.active().unwrap().region(), Region::US_EAST_1);
        assert_eq!(fx.backend.created_clients(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_with_bad_profile_fails() {
        let backend = Arc::new(MemoryClientFactory::new(MemoryService::new(), &["default"]));
        let factory = RegionalClientFactory::new(Credentials::profile("ghost"), backend);
        let err = BucketClientLocator::bootstrap(factory, Region::US_EAST_1)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "ClientCreationError");
    }

    #[tokio::test]
    async fn test_bucket_in_new_region_is_provisioned() {
        let mut fx = fixture(Region::US_EAST_1).await;
        fx.service.seed_bucket("logs-eu", Region::EU_WEST_1).await;

        let resolution = fx.locator.resolve_client_for_bucket("logs-eu").await.unwrap();
        assert!(resolution.provisioned);
        assert_eq!(resolution.handle.region(), Region::EU_WEST_1);

        let pool = fx.locator.pool();
        assert_eq!(pool.len(), 2);
        let pooled = pool.lookup(Region::EU_WEST_1).unwrap();
        assert!(pooled.same_client(&resolution.handle));
        assert!(fx.locator.active().unwrap().same_client(&resolution.handle));
    }

    #[tokio::test]
    async fn test_missing_bucket_leaves_pool_unchanged() {
        let mut fx = fixture(Region::US_EAST_1).await;
        let before = fx.locator.active().unwrap().clone();

        let err = fx
            .locator
            .resolve_client_for_bucket("missing-bucket")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::BucketNotFound { .. }));
        assert_eq!(fx.locator.pool().len(), 1);
        assert!(fx.locator.active().unwrap().same_client(&before));
        assert_eq!(fx.backend.created_clients(), 1);
    }

    #[tokio::test]
    async fn test_change_region_requires_pooled_client() {
        let mut fx = fixture(Region::US_EAST_1).await;
        let before = fx.locator.active().unwrap().clone();

        let err = fx.locator.change_region(Region::AP_SOUTH_1).unwrap_err();
        assert!(matches!(
            err,
            AccessError::RegionNotProvisioned { region } if region == Region::AP_SOUTH_1
        ));
        assert!(fx.locator.active().unwrap().same_client(&before));
        assert_eq!(fx.locator.pool().len(), 1);
        assert_eq!(fx.backend.created_clients(), 1);
    }

    #[tokio::test]
    async fn test_repeated_resolution_returns_same_handle() {
        let mut fx = fixture(Region::US_EAST_1).await;
        fx.service.seed_bucket("logs-eu", Region::EU_WEST_1).await;

        let first = fx.locator.resolve_client_for_bucket("logs-eu").await.unwrap();
        let second = fx.locator.resolve_client_for_bucket("logs-eu").await.unwrap();
        let third = fx.locator.resolve_client_for_bucket("logs-eu").await.unwrap();

        assert!(first.provisioned);
        assert!(!second.provisioned);
        assert!(second.handle.same_client(&third.handle));
        assert!(first.handle.same_client(&second.handle));
        assert_eq!(fx.backend.created_clients(), 2);
    }

    #[tokio::test]
    async fn test_hit_does_not_change_active_client() {
        let mut fx = fixture(Region::US_EAST_1).await;
        fx.service.seed_bucket("logs-us", Region::US_EAST_1).await;
        fx.service.seed_bucket("logs-eu", Region::EU_WEST_1).await;

        fx.locator.resolve_client_for_bucket("logs-eu").await.unwrap();
        assert_eq!(fx.locator.active().unwrap().region(), Region::EU_WEST_1);

        // us-east-1 is pooled already: a hit, so eu-west-1 stays active.
        let resolution = fx.locator.resolve_client_for_bucket("logs-us").await.unwrap();
        assert!(!resolution.provisioned);
        assert_eq!(resolution.handle.region(), Region::US_EAST_1);
        assert_eq!(fx.locator.active().unwrap().region(), Region::EU_WEST_1);
    }

    #[tokio::test]
    async fn test_provisioning_failure_propagates() {
        let mut fx = fixture(Region::US_EAST_1).await;
        fx.service.seed_bucket("logs-ap", Region::AP_SOUTH_1).await;
        fx.backend.fail_region(Region::AP_SOUTH_1);

        let err = fx
            .locator
            .resolve_client_for_bucket("logs-ap")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::ClientCreation { region, .. } if region == Region::AP_SOUTH_1
        ));
        assert_eq!(fx.locator.pool().regions(), vec![Region::US_EAST_1]);
        assert_eq!(fx.locator.active().unwrap().region(), Region::US_EAST_1);
    }

    #[tokio::test]
    async fn test_change_region_switches_to_pooled_client() {
        let mut fx = fixture(Region::US_EAST_1).await;
        fx.service.seed_bucket("logs-eu", Region::EU_WEST_1).await;
        fx.locator.resolve_client_for_bucket("logs-eu").await.unwrap();

        fx.locator.change_region(Region::US_EAST_1).unwrap();
        assert_eq!(fx.locator.active().unwrap().region(), Region::US_EAST_1);
        assert_eq!(fx.locator.pool().len(), 2);
        assert_eq!(fx.backend.created_clients(), 2);
    }

    #[tokio::test]
    async fn test_add_new_region_keeps_active_client() {
        let mut fx = fixture(Region::US_EAST_1).await;

        let added = fx.locator.add_new_region(Region::AP_SOUTH_1).await.unwrap();
        assert_eq!(added.region(), Region::AP_SOUTH_1);
        assert_eq!(fx.locator.active().unwrap().region(), Region::US_EAST_1);

        let again = fx.locator.add_new_region(Region::AP_SOUTH_1).await.unwrap();
        assert!(again.same_client(&added));
        assert_eq!(fx.locator.pool().len(), 2);
        assert_eq!(fx.backend.created_clients(), 2);

        fx.locator.change_region(Region::AP_SOUTH_1).unwrap();
        assert!(fx.locator.active().unwrap().same_client(&added));
    }

    #[tokio::test]
    async fn test_legacy_eu_bucket_shares_eu_west_1_client() {
        let mut fx = fixture(Region::US_EAST_1).await;
        fx.service.seed_bucket("logs-eu", Region::EU_WEST_1).await;
        fx.service.seed_bucket_with_location("old-eu", "EU").await;

        let modern = fx.locator.resolve_client_for_bucket("logs-eu").await.unwrap();
        let legacy = fx.locator.resolve_client_for_bucket("old-eu").await.unwrap();
        assert!(!legacy.provisioned);
        assert!(legacy.handle.same_client(&modern.handle));
        assert_eq!(fx.service.location_queries(), 2);
    }
}
