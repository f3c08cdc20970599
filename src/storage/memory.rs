//! In-memory simulation of a multi-region object-storage service.
//!
//! One [`MemoryService`] holds every bucket of an account together with
//! the region that hosts it.  [`MemoryClient`]s are bound to a single
//! region and behave like regional endpoints of the real service:
//! bucket-scoped requests sent to the wrong region are answered with
//! `301 PermanentRedirect`, while existence and location queries work
//! from any region.  All buckets are versioned.
//!
//! Individual operations can be forced to answer with a chosen status via
//! [`MemoryService::inject_status`], and [`MemoryClientFactory`] can be
//! told to fail client creation for specific regions.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{
    existence_from_status, BackendFuture, BucketSummary, ClientFactory, ObjectStorageClient,
    ObjectSummary, ObjectVersion, PutReceipt, Reply,
};
use crate::credentials::Credentials;
use crate::region::Region;
use crate::resolver::translate_location_code;

/// One stored version.  `data == None` marks a delete marker.
#[derive(Debug, Clone)]
struct StoredVersion {
    key: String,
    version_id: String,
    data: Option<Bytes>,
    etag: String,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct MemoryBucket {
    /// Location code reported by location queries.
    location_code: String,
    /// Hosting region; `None` when the location code maps to nothing.
    region: Option<Region>,
    created: DateTime<Utc>,
    /// Every version ever written, oldest first.
    versions: Vec<StoredVersion>,
}

impl MemoryBucket {
    fn new(location_code: &str) -> Self {
        Self {
            location_code: location_code.to_string(),
            region: translate_location_code(location_code).ok(),
            created: Utc::now(),
            versions: Vec::new(),
        }
    }

    /// Latest version of every key, keyed and therefore sorted by key.
    fn latest(&self) -> BTreeMap<&str, &StoredVersion> {
        let mut latest = BTreeMap::new();
        for version in &self.versions {
            latest.insert(version.key.as_str(), version);
        }
        latest
    }

    fn push(&mut self, key: &str, data: Option<Bytes>) -> &StoredVersion {
        let index = self.versions.len();
        let etag = match &data {
            Some(bytes) => compute_etag(bytes),
            None => String::new(),
        };
        self.versions.push(StoredVersion {
            key: key.to_string(),
            version_id: uuid::Uuid::new_v4().simple().to_string(),
            data,
            etag,
            last_modified: Utc::now(),
        });
        &self.versions[index]
    }
}

/// Compute the quoted MD5-hex ETag for a byte slice.
fn compute_etag(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Account-wide state shared by all regional [`MemoryClient`]s.
#[derive(Debug, Default)]
pub struct MemoryService {
    buckets: RwLock<HashMap<String, MemoryBucket>>,
    /// operation name -> status every call of that operation answers with.
    faults: RwLock<HashMap<String, StatusCode>>,
    /// Buckets removed right after the next bucket listing.
    vanishing: RwLock<HashSet<String>>,
    location_queries: AtomicUsize,
}

impl MemoryService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an empty bucket hosted in `region`.
    pub async fn seed_bucket(&self, name: &str, region: Region) {
        let code = if region == Region::US_EAST_1 {
            ""
        } else {
            region.code()
        };
        self.seed_bucket_with_location(name, code).await;
    }

    /// Create an empty bucket whose location query answers `location_code`.
    pub async fn seed_bucket_with_location(&self, name: &str, location_code: &str) {
        self.buckets
            .write()
            .await
            .insert(name.to_string(), MemoryBucket::new(location_code));
    }

    /// Make every call of `operation` answer with `status`.
    pub async fn inject_status(&self, operation: &str, status: StatusCode) {
        self.faults
            .write()
            .await
            .insert(operation.to_string(), status);
    }

    /// Delete `name` as soon as the next bucket listing has been answered.
    pub async fn vanish_after_listing(&self, name: &str) {
        self.vanishing.write().await.insert(name.to_string());
    }

    pub async fn clear_faults(&self) {
        self.faults.write().await.clear();
    }

    /// Number of location queries answered so far.
    pub fn location_queries(&self) -> usize {
        self.location_queries.load(Ordering::SeqCst)
    }

    async fn fault(&self, operation: &str) -> Option<StatusCode> {
        self.faults.read().await.get(operation).copied()
    }
}

/// A client bound to one region of a [`MemoryService`].
pub struct MemoryClient {
    service: Arc<MemoryService>,
    region: Region,
}

impl MemoryClient {
    pub fn new(service: Arc<MemoryService>, region: Region) -> Self {
        Self { service, region }
    }

    /// Run `op` against `bucket` if it exists and lives in this region,
    /// otherwise answer the way a regional endpoint would.
    async fn with_bucket<T: Default>(
        &self,
        operation: &str,
        bucket: &str,
        op: impl FnOnce(&mut MemoryBucket) -> Reply<T>,
    ) -> Reply<T> {
        if let Some(status) = self.service.fault(operation).await {
            return Reply::rejected(status, Some("InjectedFault".to_string()));
        }
        let mut buckets = self.service.buckets.write().await;
        match buckets.get_mut(bucket) {
            Some(entry) if entry.region == Some(self.region) => op(entry),
            entry => self.misrouted(operation, bucket, entry.is_some()),
        }
    }

    /// Answer for a bucket that is missing or hosted in another region.
    fn misrouted<T: Default>(&self, operation: &str, bucket: &str, exists: bool) -> Reply<T> {
        if !exists {
            return Reply::rejected(StatusCode::NOT_FOUND, Some("NoSuchBucket".to_string()));
        }
        debug!(
            "memory {operation}: bucket={} is not in {}, redirecting",
            bucket, self.region
        );
        Reply::rejected(
            StatusCode::MOVED_PERMANENTLY,
            Some("PermanentRedirect".to_string()),
        )
    }
}

impl ObjectStorageClient for MemoryClient {
    fn region(&self) -> Region {
        self.region
    }

    fn bucket_exists(&self, bucket: &str) -> BackendFuture<'_, Reply<bool>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            if let Some(status) = self.service.fault("head_bucket").await {
                return Ok(match existence_from_status(status) {
                    Some(exists) => Reply::ok(exists),
                    None => Reply::rejected(status, Some("InjectedFault".to_string())),
                });
            }
            Ok(Reply::ok(
                self.service.buckets.read().await.contains_key(&bucket),
            ))
        })
    }

    fn bucket_location(&self, bucket: &str) -> BackendFuture<'_, Reply<String>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            if let Some(status) = self.service.fault("get_bucket_location").await {
                return Ok(Reply::rejected(status, Some("InjectedFault".to_string())));
            }
            self.service.location_queries.fetch_add(1, Ordering::SeqCst);
            let buckets = self.service.buckets.read().await;
            Ok(match buckets.get(&bucket) {
                Some(b) => Reply::ok(b.location_code.clone()),
                None => Reply::rejected(StatusCode::NOT_FOUND, Some("NoSuchBucket".to_string())),
            })
        })
    }

    fn list_buckets(&self) -> BackendFuture<'_, Reply<Vec<BucketSummary>>> {
        Box::pin(async move {
            if let Some(status) = self.service.fault("list_buckets").await {
                return Ok(Reply::rejected(status, Some("InjectedFault".to_string())));
            }
            let mut buckets = self.service.buckets.write().await;
            let mut summaries: Vec<BucketSummary> = buckets
                .iter()
                .map(|(name, b)| BucketSummary {
                    name: name.clone(),
                    created: Some(b.created),
                })
                .collect();
            summaries.sort_by(|a, b| a.name.cmp(&b.name));
            for name in self.service.vanishing.write().await.drain() {
                buckets.remove(&name);
            }
            Ok(Reply::ok(summaries))
        })
    }

    fn create_bucket(&self, bucket: &str) -> BackendFuture<'_, Reply<()>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            if let Some(status) = self.service.fault("create_bucket").await {
                return Ok(Reply::rejected(status, Some("InjectedFault".to_string())));
            }
            let mut buckets = self.service.buckets.write().await;
            if buckets.contains_key(&bucket) {
                return Ok(Reply::rejected(
                    StatusCode::CONFLICT,
                    Some("BucketAlreadyOwnedByYou".to_string()),
                ));
            }
            let code = if self.region == Region::US_EAST_1 {
                ""
            } else {
                self.region.code()
            };
            buckets.insert(bucket, MemoryBucket::new(code));
            Ok(Reply::ok(()))
        })
    }

    fn delete_bucket(&self, bucket: &str) -> BackendFuture<'_, Reply<()>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            if let Some(status) = self.service.fault("delete_bucket").await {
                return Ok(Reply::rejected(status, Some("InjectedFault".to_string())));
            }
            // Emptiness check and removal share one write guard.
            let mut buckets = self.service.buckets.write().await;
            let state = buckets
                .get(&bucket)
                .map(|entry| (entry.region == Some(self.region), entry.versions.is_empty()));
            let reply = match state {
                Some((true, true)) => {
                    buckets.remove(&bucket);
                    Reply::with_status(StatusCode::NO_CONTENT, ())
                }
                Some((true, false)) => {
                    Reply::rejected(StatusCode::CONFLICT, Some("BucketNotEmpty".to_string()))
                }
                other => self.misrouted("delete_bucket", &bucket, other.is_some()),
            };
            Ok(reply)
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        max_keys: Option<i32>,
    ) -> BackendFuture<'_, Reply<Vec<ObjectSummary>>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let limit = max_keys.map_or(usize::MAX, |n| n.max(0) as usize);
            Ok(self
                .with_bucket("list_objects", &bucket, |entry| {
                    let objects: Vec<ObjectSummary> = entry
                        .latest()
                        .into_values()
                        .filter_map(|v| {
                            v.data.as_ref().map(|data| ObjectSummary {
                                key: v.key.clone(),
                                size: data.len() as u64,
                                etag: Some(v.etag.clone()),
                                last_modified: Some(v.last_modified),
                            })
                        })
                        .take(limit)
                        .collect();
                    Reply::ok(objects)
                })
                .await)
        })
    }

    fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<i32>,
    ) -> BackendFuture<'_, Reply<Vec<ObjectVersion>>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        Box::pin(async move {
            let limit = max_keys.map_or(usize::MAX, |n| n.max(0) as usize);
            Ok(self
                .with_bucket("list_object_versions", &bucket, |entry| {
                    let latest_ids: HashSet<&str> = entry
                        .latest()
                        .values()
                        .map(|v| v.version_id.as_str())
                        .collect();
                    let mut versions: Vec<(usize, ObjectVersion)> = entry
                        .versions
                        .iter()
                        .enumerate()
                        .filter(|(_, v)| v.key.starts_with(&prefix))
                        .map(|(seq, v)| {
                            (
                                seq,
                                ObjectVersion {
                                    key: v.key.clone(),
                                    version_id: v.version_id.clone(),
                                    is_latest: latest_ids.contains(v.version_id.as_str()),
                                    is_delete_marker: v.data.is_none(),
                                    size: v.data.as_ref().map_or(0, |d| d.len() as u64),
                                    last_modified: Some(v.last_modified),
                                },
                            )
                        })
                        .collect();
                    // Key order, newest version first within a key.
                    versions.sort_by(|(sa, a), (sb, b)| a.key.cmp(&b.key).then(sb.cmp(sa)));
                    let versions: Vec<ObjectVersion> =
                        versions.into_iter().map(|(_, v)| v).take(limit).collect();
                    Reply::ok(versions)
                })
                .await)
        })
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> BackendFuture<'_, Reply<PutReceipt>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("memory put_object: bucket={} key={} region={}", bucket, key, self.region);
            Ok(self
                .with_bucket("put_object", &bucket, |entry| {
                    let stored = entry.push(&key, Some(data));
                    Reply::ok(PutReceipt {
                        etag: Some(stored.etag.clone()),
                        version_id: Some(stored.version_id.clone()),
                    })
                })
                .await)
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> BackendFuture<'_, Reply<Bytes>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .with_bucket("get_object", &bucket, |entry| {
                    match entry.latest().get(key.as_str()).and_then(|v| v.data.clone()) {
                        Some(data) => Reply::ok(data),
                        None => {
                            Reply::rejected(StatusCode::NOT_FOUND, Some("NoSuchKey".to_string()))
                        }
                    }
                })
                .await)
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> BackendFuture<'_, Reply<()>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            Ok(self
                .with_bucket("delete_object", &bucket, |entry| {
                    entry.push(&key, None);
                    Reply::with_status(StatusCode::NO_CONTENT, ())
                })
                .await)
        })
    }

    fn copy_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> BackendFuture<'_, Reply<PutReceipt>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        let version_id = version_id.to_string();
        Box::pin(async move {
            Ok(self
                .with_bucket("copy_object", &bucket, |entry| {
                    let source = entry
                        .versions
                        .iter()
                        .find(|v| v.key == key && v.version_id == version_id)
                        .map(|v| v.data.clone());
                    match source {
                        None => Reply::rejected(
                            StatusCode::NOT_FOUND,
                            Some("NoSuchVersion".to_string()),
                        ),
                        Some(None) => Reply::rejected(
                            StatusCode::BAD_REQUEST,
                            Some("InvalidRequest".to_string()),
                        ),
                        Some(Some(data)) => {
                            let stored = entry.push(&key, Some(data));
                            Reply::ok(PutReceipt {
                                etag: Some(stored.etag.clone()),
                                version_id: Some(stored.version_id.clone()),
                            })
                        }
                    }
                })
                .await)
        })
    }
}

/// Builds [`MemoryClient`]s against one shared [`MemoryService`].
pub struct MemoryClientFactory {
    service: Arc<MemoryService>,
    profiles: Vec<String>,
    failing_regions: Mutex<HashSet<Region>>,
    created: AtomicUsize,
}

impl MemoryClientFactory {
    /// A factory that knows the given credential profiles.  Static keys
    /// are always accepted.
    pub fn new(service: Arc<MemoryService>, profiles: &[&str]) -> Self {
        Self {
            service,
            profiles: profiles.iter().map(|p| p.to_string()).collect(),
            failing_regions: Mutex::new(HashSet::new()),
            created: AtomicUsize::new(0),
        }
    }

    /// Make client creation for `region` fail from now on.
    pub fn fail_region(&self, region: Region) {
        self.failing_regions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(region);
    }

    /// Number of clients successfully created so far.
    pub fn created_clients(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MemoryClientFactory {
    fn connect(
        &self,
        credentials: &Credentials,
        region: Region,
    ) -> BackendFuture<'_, Arc<dyn ObjectStorageClient>> {
        let credentials = credentials.clone();
        Box::pin(async move {
            if let Credentials::Profile(profile) = &credentials {
                if !self.profiles.iter().any(|p| p == profile.name()) {
                    anyhow::bail!("profile '{profile}' not found in credential store");
                }
            }
            let failing = self
                .failing_regions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .contains(&region);
            if failing {
                anyhow::bail!("endpoint for {region} is unavailable");
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            let client: Arc<dyn ObjectStorageClient> =
                Arc::new(MemoryClient::new(self.service.clone(), region));
            Ok(client)
        })
    }

    fn list_profiles(&self) -> BackendFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.profiles.clone()) })
    }
}

// -- Tests -------------------------------------------------------------------
