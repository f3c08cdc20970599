//! Abstract object-storage client contract.
//!
//! Every regional client must implement [`ObjectStorageClient`].  RPCs
//! return a [`Reply`] carrying the HTTP status the service answered
//! with; a transport fault that never produced a status is an `Err`.
//! [`ClientFactory`] is the seam through which new regional clients are
//! built.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::credentials::Credentials;
use crate::region::Region;

/// Boxed future returned by every backend call.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Outcome of one storage RPC.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    /// HTTP status the service answered with.
    pub status: StatusCode,
    /// Decoded response body; `T::default()` when the request was rejected.
    pub body: T,
    /// Service error code (e.g. `PermanentRedirect`) for rejected requests.
    pub error_code: Option<String>,
}

impl<T> Reply<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            error_code: None,
        }
    }

    pub fn with_status(status: StatusCode, body: T) -> Self {
        Self {
            status,
            body,
            error_code: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl<T: Default> Reply<T> {
    pub fn rejected(status: StatusCode, error_code: Option<String>) -> Self {
        Self {
            status,
            body: T::default(),
            error_code,
        }
    }
}

/// What a rejected existence check says about the bucket.
///
/// `404` means absent.  A redirect or `403` means the bucket exists, in
/// another region or under another owner's policy.  Other statuses leave
/// the question open.
pub fn existence_from_status(status: StatusCode) -> Option<bool> {
    match status {
        StatusCode::NOT_FOUND => Some(false),
        StatusCode::FORBIDDEN => Some(true),
        s if s.is_redirection() => Some(true),
        _ => None,
    }
}

/// One entry of an account-wide bucket listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSummary {
    pub name: String,
    pub created: Option<DateTime<Utc>>,
}

/// Latest version of one object in a bucket listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One version (or delete marker) of an object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub is_delete_marker: bool,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// What the service reported after writing an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PutReceipt {
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// RPC surface of a client bound to a single region.
pub trait ObjectStorageClient: Send + Sync + 'static {
    /// Region this client's endpoint serves.
    fn region(&self) -> Region;

    /// Whether `bucket` exists, regardless of the region that hosts it.
    ///
    /// Answers that settle the question carry a 2xx status (see
    /// [`existence_from_status`]); any other status is a rejection.
    fn bucket_exists(&self, bucket: &str) -> BackendFuture<'_, Reply<bool>>;

    /// Raw location code of `bucket` (empty for the default region).
    fn bucket_location(&self, bucket: &str) -> BackendFuture<'_, Reply<String>>;

    /// List every bucket owned by the account.
    fn list_buckets(&self) -> BackendFuture<'_, Reply<Vec<BucketSummary>>>;

    /// Create `bucket` in this client's region.
    fn create_bucket(&self, bucket: &str) -> BackendFuture<'_, Reply<()>>;

    /// Delete an empty bucket.
    fn delete_bucket(&self, bucket: &str) -> BackendFuture<'_, Reply<()>>;

    /// List the latest version of objects in `bucket`.
    fn list_objects(
        &self,
        bucket: &str,
        max_keys: Option<i32>,
    ) -> BackendFuture<'_, Reply<Vec<ObjectSummary>>>;

    /// List all versions of objects whose key starts with `prefix`.
    fn list_object_versions(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: Option<i32>,
    ) -> BackendFuture<'_, Reply<Vec<ObjectVersion>>>;

    /// Write `data` to `bucket/key`.
    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
    ) -> BackendFuture<'_, Reply<PutReceipt>>;

    /// Read the latest version of `bucket/key`.
    fn get_object(&self, bucket: &str, key: &str) -> BackendFuture<'_, Reply<Bytes>>;

    /// Delete `bucket/key` (adds a delete marker on versioned buckets).
    fn delete_object(&self, bucket: &str, key: &str) -> BackendFuture<'_, Reply<()>>;

    /// Server-side copy of `version_id` over `key`, making it the latest.
    fn copy_object_version(
        &self,
        bucket: &str,
        key: &str,
        version_id: &str,
    ) -> BackendFuture<'_, Reply<PutReceipt>>;
}

/// A pooled reference to a regional client.
///
/// Bound at creation to one region and one credential label; cloning
/// shares the underlying client.
#[derive(Clone)]
pub struct ClientHandle {
    region: Region,
    credentials_label: Arc<str>,
    client: Arc<dyn ObjectStorageClient>,
}

impl ClientHandle {
    pub fn new(
        region: Region,
        credentials_label: &str,
        client: Arc<dyn ObjectStorageClient>,
    ) -> Self {
        Self {
            region,
            credentials_label: Arc::from(credentials_label),
            client,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn credentials_label(&self) -> &str {
        &self.credentials_label
    }

    pub fn client(&self) -> &dyn ObjectStorageClient {
        self.client.as_ref()
    }

    /// Identity comparison: true when both handles share one client.
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("region", &self.region)
            .field("credentials", &self.credentials_label)
            .finish_non_exhaustive()
    }
}

/// Builds clients bound to a region.
pub trait ClientFactory: Send + Sync + 'static {
    /// Resolve `credentials` and build a client for `region`.
    fn connect(
        &self,
        credentials: &Credentials,
        region: Region,
    ) -> BackendFuture<'_, Arc<dyn ObjectStorageClient>>;

    /// Names of the credential profiles this backend can resolve.
    fn list_profiles(&self) -> BackendFuture<'_, Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existence_from_status() {
        assert_eq!(existence_from_status(StatusCode::NOT_FOUND), Some(false));
        assert_eq!(existence_from_status(StatusCode::FORBIDDEN), Some(true));
        assert_eq!(existence_from_status(StatusCode::MOVED_PERMANENTLY), Some(true));
        assert_eq!(existence_from_status(StatusCode::BAD_REQUEST), None);
        assert_eq!(existence_from_status(StatusCode::INTERNAL_SERVER_ERROR), None);
    }

    #[test]
    fn test_listing_entries_serialize_with_timestamps() {
        let created = DateTime::from_timestamp(1_700_000_000, 0);
        let json = serde_json::to_value(BucketSummary {
            name: "logs-eu".to_string(),
            created,
        })
        .unwrap();
        assert_eq!(json["name"], "logs-eu");
        assert_eq!(json["created"], "2023-11-14T22:13:20Z");

        let version = ObjectVersion {
            key: "k".to_string(),
            version_id: "v1".to_string(),
            is_latest: true,
            is_delete_marker: false,
            size: 3,
            last_modified: created,
        };
        let json = serde_json::to_value(&version).unwrap();
        assert_eq!(json["last_modified"], "2023-11-14T22:13:20Z");
        assert_eq!(json["is_latest"], true);
    }
}
