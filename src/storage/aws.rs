//! AWS S3 storage backend.
//!
//! One [`AwsClient`] wraps an SDK client pinned to a single region.
//! Service rejections (any response that carried an HTTP status) are
//! returned as a [`Reply`] with that status and the S3 error code;
//! dispatch and timeout failures that never reached the service are
//! returned as errors.
//!
//! Credentials come either from a named profile in the shared AWS
//! config files or from explicit static keys.

use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::StatusCode;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use tracing::{debug, info};

use super::backend::{
    existence_from_status, BackendFuture, BucketSummary, ClientFactory, ObjectStorageClient,
    ObjectSummary, ObjectVersion, PutReceipt, Reply,
};
use crate::credentials::Credentials;
use crate::region::Region;

/// Characters left unescaped in a `CopySource` key.
const COPY_SOURCE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Provider name attached to static credentials.
const STATIC_PROVIDER_NAME: &str = "bucketroute-static";

/// S3 client bound to one region.
pub struct AwsClient {
    client: Client,
    region: Region,
}

impl AwsClient {
    pub fn new(client: Client, region: Region) -> Self {
        Self { client, region }
    }

    /// Map an AWS SDK error to an anyhow error with context.
    fn map_sdk_error(context: &str, err: impl std::fmt::Display) -> anyhow::Error {
        anyhow::anyhow!("AWS S3 {context}: {err}")
    }

    /// Turn an SDK failure into a rejected [`Reply`] when the service
    /// answered, or an error when it never did.
    fn rejection<T, E>(operation: &str, err: SdkError<E, HttpResponse>) -> anyhow::Result<Reply<T>>
    where
        T: Default,
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        match response_status(&err) {
            Some(status) => {
                debug!(
                    "AWS {}: service answered {} ({})",
                    operation,
                    status,
                    err.code().unwrap_or("no code")
                );
                Ok(Reply::rejected(status, err.code().map(str::to_string)))
            }
            None => Err(Self::map_sdk_error(operation, DisplayErrorContext(&err))),
        }
    }
}

fn response_status<E>(err: &SdkError<E, HttpResponse>) -> Option<StatusCode> {
    err.raw_response()
        .and_then(|raw| StatusCode::from_u16(raw.status().as_u16()).ok())
}

fn to_chrono(ts: Option<&aws_sdk_s3::primitives::DateTime>) -> Option<DateTime<Utc>> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
}

/// `CopySource` header value naming one version of `bucket/key`.
fn copy_source(bucket: &str, key: &str, version_id: &str) -> String {
    format!(
        "{}/{}?versionId={}",
        bucket,
        utf8_percent_encode(key, COPY_SOURCE_ENCODE_SET),
        utf8_percent_encode(version_id, COPY_SOURCE_ENCODE_SET)
    )
}

/// Merge order for versions and delete markers: key order, newest first.
///
/// `last_modified` only has one-second precision, so within a second the
/// latest entry of a key goes first.  The sort is stable, keeping the
/// service's own newest-first order for the remaining ties.
fn order_versions(versions: &mut [ObjectVersion]) {
    versions.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then(b.last_modified.cmp(&a.last_modified))
            .then(b.is_latest.cmp(&a.is_latest))
    });
}

/// Location constraint for a bucket created in `region`.
///
/// `us-east-1` is the default location and must not be sent explicitly.
fn location_constraint(region: Region) -> Option<BucketLocationConstraint> {
    if region == Region::US_EAST_1 {
        None
    } else {
        Some(BucketLocationConstraint::from(region.code()))
    }
}

impl ObjectStorageClient for AwsClient {
    fn region(&self) -> Region {
        self.region
    }

    fn bucket_exists(&self, bucket: &str) -> BackendFuture<'_, Reply<bool>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            debug!("AWS head_bucket: bucket={} via {}", bucket, self.region);
            match self.client.head_bucket().bucket(&bucket).send().await {
                Ok(_) => Ok(Reply::ok(true)),
                Err(e) => match response_status(&e).and_then(existence_from_status) {
                    Some(exists) => Ok(Reply::ok(exists)),
                    None => Self::rejection("head_bucket", e),
                },
            }
        })
    }

    fn bucket_location(&self, bucket: &str) -> BackendFuture<'_, Reply<String>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            debug!("AWS get_bucket_location: bucket={}", bucket);
            match self.client.get_bucket_location().bucket(&bucket).send().await {
                Ok(resp) => Ok(Reply::ok(
                    resp.location_constraint()
                        .map(|c| c.as_str().to_string())
                        .unwrap_or_default(),
                )),
                Err(e) => Self::rejection("get_bucket_location", e),
            }
        })
    }

    fn list_buckets(&self) -> BackendFuture<'_, Reply<Vec<BucketSummary>>> {
        Box::pin(async move {
            match self.client.list_buckets().send().await {
                Ok(resp) => Ok(Reply::ok(
                    resp.buckets()
                        .iter()
                        .filter_map(|b| {
                            b.name().map(|name| BucketSummary {
                                name: name.to_string(),
                                created: to_chrono(b.creation_date()),
                            })
                        })
                        .collect(),
                )),
                Err(e) => Self::rejection("list_buckets", e),
            }
        })
    }

    fn create_bucket(&self, bucket: &str) -> BackendFuture<'_, Reply<()>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let mut request = self.client.create_bucket().bucket(&bucket);
            if let Some(constraint) = location_constraint(self.region) {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(constraint)
                        .build(),
                );
            }
            match request.send().await {
                Ok(_) => Ok(Reply::ok(())),
                Err(e) => Self::rejection("create_bucket", e),
            }
        })
    }

    fn delete_bucket(&self, bucket: &str) -> BackendFuture<'_, Reply<()>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            match self.client.delete_bucket().bucket(&bucket).send().await {
                Ok(_) => Ok(Reply::with_status(StatusCode::NO_CONTENT, ())),
                Err(e) => Self::rejection("delete_bucket", e),
            }
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        max_keys: Option<i32>,
    ) -> BackendFuture<'_, Reply<Vec<ObjectSummary>>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let result = self
                .client
                .list_objects_v2()
                .bucket(&bucket)
                .set_max_keys(max_keys)
                .send()
                .await;
            match result {
                Ok(resp) => Ok(Reply::ok(
                    resp.contents()
                        .iter()
                        .filter_map(|o| {
                            o.key().map(|key| ObjectSummary {
                                key: key.to_string(),
                                size: o.size().unwrap_or(0).max(0) as u64,
                                etag: o.e_tag().map(str::to_string),
                                last_modified: to_chrono(o.last_modified()),
                            })
                        })
                        .collect(),
                )),
                Err(e) => Self::rejection("list_objects", e),
            }
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
            let result = self
                .client
                .list_object_versions()
                .bucket(&bucket)
                .prefix(&prefix)
                .set_max_keys(max_keys)
                .send()
                .await;
            let resp = match result {
                Ok(resp) => resp,
                Err(e) => return Self::rejection("list_object_versions", e),
            };

            let mut versions: Vec<ObjectVersion> = resp
                .versions()
                .iter()
                .map(|v| ObjectVersion {
                    key: v.key().unwrap_or_default().to_string(),
                    version_id: v.version_id().unwrap_or("null").to_string(),
                    is_latest: v.is_latest().unwrap_or(false),
                    is_delete_marker: false,
                    size: v.size().unwrap_or(0).max(0) as u64,
                    last_modified: to_chrono(v.last_modified()),
                })
                .collect();
            versions.extend(resp.delete_markers().iter().map(|m| ObjectVersion {
                key: m.key().unwrap_or_default().to_string(),
                version_id: m.version_id().unwrap_or("null").to_string(),
                is_latest: m.is_latest().unwrap_or(false),
                is_delete_marker: true,
                size: 0,
                last_modified: to_chrono(m.last_modified()),
            }));
            order_versions(&mut versions);
            Ok(Reply::ok(versions))
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
            debug!("AWS put_object: bucket={} key={}", bucket, key);
            let result = self
                .client
                .put_object()
                .bucket(&bucket)
                .key(&key)
                .body(aws_sdk_s3::primitives::ByteStream::from(data))
                .send()
                .await;
            match result {
                Ok(resp) => Ok(Reply::ok(PutReceipt {
                    etag: resp.e_tag().map(str::to_string),
                    version_id: resp.version_id().map(str::to_string),
                })),
                Err(e) => Self::rejection("put_object", e),
            }
        })
    }

    fn get_object(&self, bucket: &str, key: &str) -> BackendFuture<'_, Reply<Bytes>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("AWS get_object: bucket={} key={}", bucket, key);
            let resp = match self.client.get_object().bucket(&bucket).key(&key).send().await {
                Ok(resp) => resp,
                Err(e) => return Self::rejection("get_object", e),
            };
            let data = resp
                .body
                .collect()
                .await
                .map_err(|e| Self::map_sdk_error("get_object body", e))?
                .into_bytes();
            Ok(Reply::ok(data))
        })
    }

    fn delete_object(&self, bucket: &str, key: &str) -> BackendFuture<'_, Reply<()>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("AWS delete_object: bucket={} key={}", bucket, key);
            match self.client.delete_object().bucket(&bucket).key(&key).send().await {
                Ok(_) => Ok(Reply::with_status(StatusCode::NO_CONTENT, ())),
                Err(e) => Self::rejection("delete_object", e),
            }
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
        let source = copy_source(&bucket, &key, version_id);
        Box::pin(async move {
            debug!("AWS copy_object: source={} dst={}/{}", source, bucket, key);
            let result = self
                .client
                .copy_object()
                .bucket(&bucket)
                .key(&key)
                .copy_source(&source)
                .send()
                .await;
            match result {
                Ok(resp) => Ok(Reply::ok(PutReceipt {
                    etag: resp
                        .copy_object_result()
                        .and_then(|r| r.e_tag())
                        .map(str::to_string),
                    version_id: resp.version_id().map(str::to_string),
                })),
                Err(e) => Self::rejection("copy_object", e),
            }
        })
    }
}

/// Builds [`AwsClient`]s from the standard AWS config loader.
#[derive(Debug, Clone, Default)]
pub struct AwsClientFactory {
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    endpoint_url: Option<String>,
    use_path_style: bool,
}

impl AwsClientFactory {
    pub fn new(endpoint_url: Option<String>, use_path_style: bool) -> Self {
        Self {
            endpoint_url,
            use_path_style,
        }
    }
}

impl ClientFactory for AwsClientFactory {
    fn connect(
        &self,
        credentials: &Credentials,
        region: Region,
    ) -> BackendFuture<'_, Arc<dyn ObjectStorageClient>> {
        let credentials = credentials.clone();
        Box::pin(async move {
            let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(region.code()));

            if let Some(ref endpoint) = self.endpoint_url {
                config_loader = config_loader.endpoint_url(endpoint);
            }

            match &credentials {
                Credentials::Profile(profile) => {
                    config_loader = config_loader.profile_name(profile.name());
                }
                Credentials::Static {
                    access_key_id,
                    secret_access_key,
                } => {
                    let creds = aws_sdk_s3::config::Credentials::new(
                        access_key_id,
                        secret_access_key,
                        None, // session_token
                        None, // expiry
                        STATIC_PROVIDER_NAME,
                    );
                    config_loader = config_loader.credentials_provider(creds);
                }
            }

            let sdk_config = config_loader.load().await;

            // Resolve credentials now so a bad profile fails here and not
            // on the first request.
            let provider = sdk_config.credentials_provider().ok_or_else(|| {
                anyhow::anyhow!("no credentials provider for {}", credentials.label())
            })?;
            provider.provide_credentials().await.map_err(|e| {
                anyhow::anyhow!(
                    "credentials '{}' could not be resolved: {}",
                    credentials.label(),
                    DisplayErrorContext(&e)
                )
            })?;

            let s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
                .force_path_style(self.use_path_style);
            let client = Client::from_conf(s3_config_builder.build());

            info!(
                "AWS client initialized: region={} credentials={}",
                region,
                credentials.label()
            );

            let client: Arc<dyn ObjectStorageClient> = Arc::new(AwsClient::new(client, region));
            Ok(client)
        })
    }

    fn list_profiles(&self) -> BackendFuture<'_, Vec<String>> {
        Box::pin(async move {
            use aws_runtime::env_config::file::EnvConfigFiles;
            use aws_types::os_shim_internal::{Env, Fs};

            let profiles = aws_config::profile::load(
                &Fs::real(),
                &Env::real(),
                &EnvConfigFiles::default(),
                None,
            )
            .await
            .map_err(|e| anyhow::anyhow!("failed to load AWS profiles: {e}"))?;

            let mut names: Vec<String> = profiles.profiles().map(str::to_string).collect();
            names.sort();
            Ok(names)
        })
    }
}
