//! Bucket and object operations routed through the right regional client.
//!
//! Every bucket-scoped operation first resolves the bucket to a client
//! (provisioning one if needed), then issues exactly one RPC on it.  A
//! 2xx answer is success; any other status, or a transport fault, is an
//! [`AccessError::RpcFailure`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::config::{Config, ListingConfig};
use crate::credentials::{Credentials, Profile};
use crate::errors::{settle, AccessError};
use crate::factory::RegionalClientFactory;
use crate::locator::{BucketClientLocator, Resolution};
use crate::region::Region;
use crate::resolver::location_of;
use crate::storage::aws::AwsClientFactory;
use crate::storage::backend::{
    BucketSummary, ClientFactory, ClientHandle, ObjectSummary, ObjectVersion, PutReceipt,
};

/// A logical session: one credential set, one client pool.
pub struct StorageSession {
    locator: BucketClientLocator,
    listing: ListingConfig,
}

impl StorageSession {
    /// Open a session whose first client serves `initial_region`.
    pub async fn connect(
        backend: Arc<dyn ClientFactory>,
        credentials: Credentials,
        initial_region: Region,
        listing: ListingConfig,
    ) -> Result<Self, AccessError> {
        let factory = RegionalClientFactory::new(credentials, backend);
        let locator = BucketClientLocator::bootstrap(factory, initial_region).await?;
        info!(
            "Session opened: region={} credentials={}",
            initial_region,
            locator.factory().credentials().label()
        );
        Ok(Self { locator, listing })
    }

    /// Open a session on AWS using a named credential profile.
    pub async fn with_profile(profile: Profile, region: Region) -> Result<Self, AccessError> {
        Self::connect(
            Arc::new(AwsClientFactory::default()),
            Credentials::Profile(profile),
            region,
            ListingConfig::default(),
        )
        .await
    }

    /// Open a session on AWS using explicit long-lived keys.
    pub async fn with_keys(
        access_key_id: &str,
        secret_access_key: &str,
        region: Region,
    ) -> Result<Self, AccessError> {
        Self::connect(
            Arc::new(AwsClientFactory::default()),
            Credentials::keys(access_key_id, secret_access_key),
            region,
            ListingConfig::default(),
        )
        .await
    }

    /// Open a session on AWS as described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self, AccessError> {
        let backend = AwsClientFactory::new(
            Some(config.endpoint_url.clone()).filter(|url| !url.is_empty()),
            config.use_path_style,
        );
        Self::connect(
            Arc::new(backend),
            config.credentials.to_credentials(),
            config.region,
            config.listing.clone(),
        )
        .await
    }

    // -- Region management ---------------------------------------------------

    /// Resolve `bucket` to its serving client.
    pub async fn resolve(&mut self, bucket: &str) -> Result<Resolution, AccessError> {
        self.locator.resolve_client_for_bucket(bucket).await
    }

    /// Switch the active client to an already provisioned region.
    pub fn change_region(&mut self, region: Region) -> Result<(), AccessError> {
        self.locator.change_region(region)
    }

    /// Provision a client for `region` without switching to it.
    pub async fn add_new_region(&mut self, region: Region) -> Result<(), AccessError> {
        self.locator.add_new_region(region).await.map(|_| ())
    }

    pub fn active_region(&self) -> Result<Region, AccessError> {
        self.locator.active().map(|h| h.region())
    }

    pub fn provisioned_regions(&self) -> Vec<Region> {
        self.locator.pool().regions()
    }

    /// Credential profiles known to the backend.
    pub async fn list_profiles(&self) -> Result<Vec<String>, AccessError> {
        self.locator
            .factory()
            .list_profiles()
            .await
            .map_err(|e| AccessError::transport("list_profiles", e))
    }

    // -- Bucket operations ---------------------------------------------------

    /// Every bucket owned by the account.
    pub async fn list_buckets(&self) -> Result<Vec<BucketSummary>, AccessError> {
        let active = self.locator.active()?;
        settle("list_buckets", active.client().list_buckets().await)
    }

    /// Buckets hosted in `region`.
    ///
    /// Issues one location query per bucket, sequentially.  Buckets that
    /// disappear between the listing and their location query are skipped.
    pub async fn list_buckets_in_region(
        &self,
        region: Region,
    ) -> Result<Vec<BucketSummary>, AccessError> {
        let active = self.locator.active()?;
        let all = settle("list_buckets", active.client().list_buckets().await)?;
        let mut matching = Vec::new();
        for bucket in all {
            match location_of(active, &bucket.name).await {
                Ok(found) if found == region => matching.push(bucket),
                Ok(_) => {}
                Err(AccessError::BucketNotFound { bucket }) => {
                    debug!("Bucket {} vanished during region listing", bucket);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(matching)
    }

    /// Create `bucket` in the active region.
    pub async fn create_bucket(&self, bucket: &str) -> Result<(), AccessError> {
        validate_bucket_name(bucket)?;
        let active = self.locator.active()?;
        settle("create_bucket", active.client().create_bucket(bucket).await)?;
        info!("Created bucket {} in {}", bucket, active.region());
        Ok(())
    }

    pub async fn delete_bucket(&mut self, bucket: &str) -> Result<(), AccessError> {
        let handle = self.client_for(bucket).await?;
        settle("delete_bucket", handle.client().delete_bucket(bucket).await)?;
        info!("Deleted bucket {}", bucket);
        Ok(())
    }

    // -- Object operations ---------------------------------------------------

    /// Latest version of each object in `bucket`, capped by `listing.max_keys`.
    pub async fn list_bucket_contents(
        &mut self,
        bucket: &str,
    ) -> Result<Vec<ObjectSummary>, AccessError> {
        let max_keys = self.listing.max_keys;
        let handle = self.client_for(bucket).await?;
        settle(
            "list_objects",
            handle.client().list_objects(bucket, max_keys).await,
        )
    }

    /// All versions of exactly `key`, newest first.
    pub async fn list_object_versions(
        &mut self,
        bucket: &str,
        key: &str,
    ) -> Result<Vec<ObjectVersion>, AccessError> {
        let max_versions = self.listing.max_versions;
        let handle = self.client_for(bucket).await?;
        let versions = settle(
            "list_object_versions",
            handle
                .client()
                .list_object_versions(bucket, key, max_versions)
                .await,
        )?;
        // The service filters by prefix; keep exact matches only.
        Ok(versions.into_iter().filter(|v| v.key == key).collect())
    }

    /// Upload the file at `path` as `bucket/key`.
    pub async fn upload(
        &mut self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<PutReceipt, AccessError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| AccessError::LocalIo {
                path: path.to_path_buf(),
                source,
            })?;
        self.upload_bytes(bucket, key, Bytes::from(data)).await
    }

    /// Upload `data` as `bucket/key`.
    pub async fn upload_bytes(
        &mut self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> Result<PutReceipt, AccessError> {
        let size = data.len();
        let handle = self.client_for(bucket).await?;
        let receipt = settle(
            "put_object",
            handle.client().put_object(bucket, key, data).await,
        )?;
        info!(
            "Uploaded {}/{} ({} bytes) via {}",
            bucket,
            key,
            size,
            handle.region()
        );
        Ok(receipt)
    }

    /// Download `bucket/key` into `dir`, returning the written path.
    ///
    /// The key's `/`-separated segments become nested directories under
    /// `dir`.
    pub async fn download(
        &mut self,
        bucket: &str,
        key: &str,
        dir: &Path,
    ) -> Result<PathBuf, AccessError> {
        let target = local_path_for_key(dir, key)?;
        let handle = self.client_for(bucket).await?;
        let data = settle("get_object", handle.client().get_object(bucket, key).await)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AccessError::LocalIo {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&target, &data)
            .await
            .map_err(|source| AccessError::LocalIo {
                path: target.clone(),
                source,
            })?;
        info!(
            "Downloaded {}/{} ({} bytes) to {}",
            bucket,
            key,
            data.len(),
            target.display()
        );
        Ok(target)
    }

    pub async fn delete_object(&mut self, bucket: &str, key: &str) -> Result<(), AccessError> {
        let handle = self.client_for(bucket).await?;
        settle("delete_object", handle.client().delete_object(bucket, key).await)
    }

    /// Make `version_id` the latest version of `bucket/key`.
    pub async fn restore_object_version(
        &mut self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> Result<PutReceipt, AccessError> {
        let handle = self.client_for(bucket).await?;
        let receipt = settle(
            "copy_object",
            handle
                .client()
                .copy_object_version(bucket, key, version_id)
                .await,
        )?;
        info!("Restored {}/{} to version {}", bucket, key, version_id);
        Ok(receipt)
    }

    async fn client_for(&mut self, bucket: &str) -> Result<ClientHandle, AccessError> {
        Ok(self.locator.resolve_client_for_bucket(bucket).await?.handle)
    }
}

/// Map an object key onto a path below `dir`.
///
/// Keys that would escape `dir` are rejected.
fn local_path_for_key(dir: &Path, key: &str) -> Result<PathBuf, AccessError> {
    let relative = Path::new(key);
    let safe = !key.is_empty()
        && relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(AccessError::InvalidObjectKey {
            key: key.to_string(),
        });
    }
    Ok(dir.join(relative))
}

// -- Bucket name validation ---------------------------------------------------

/// Validate that a bucket name conforms to S3 naming rules.
///
/// Rules:
/// - 3-63 characters long
/// - Only lowercase letters, numbers, hyphens, and periods
/// - Must begin and end with a letter or number
/// - Cannot be formatted as an IP address (e.g., 192.168.5.4)
/// - Must not start with `xn--` or end with `-s3alias` or `--ol-s3`
pub fn validate_bucket_name(name: &str) -> Result<(), AccessError> {
    let invalid = || AccessError::InvalidBucketName {
        name: name.to_string(),
    };

    if !(3..=63).contains(&name.len()) {
        return Err(invalid());
    }

    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '.')
    {
        return Err(invalid());
    }

    let starts_ok = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let ends_ok = name
        .chars()
        .last()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if !starts_ok || !ends_ok {
        return Err(invalid());
    }

    if looks_like_ip(name)
        || name.starts_with("xn--")
        || name.ends_with("-s3alias")
        || name.ends_with("--ol-s3")
    {
        return Err(invalid());
    }

    Ok(())
}

/// Check whether a string looks like an IPv4 address (e.g., "192.168.5.4").
fn looks_like_ip(s: &str) -> bool {
    let parts: Vec<&str> = s.split('.').collect();
    parts.len() == 4 && parts.iter().all(|p| p.parse::<u8>().is_ok())
}
