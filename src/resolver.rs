//! Bucket-to-region resolution.
//!
//! The location of a bucket is never cached: every resolution asks the
//! service again through the active client.

use tracing::debug;

use crate::errors::{settle, AccessError};
use crate::region::Region;
use crate::storage::backend::ClientHandle;

/// Location code the service historically used for its first EU region.
pub const LEGACY_EU_LOCATION: &str = "EU";

/// Ask the service, through `active`, which region hosts `bucket`.
///
/// Existence is checked first: location queries on missing buckets are
/// not reliable.
pub async fn location_of(active: &ClientHandle, bucket: &str) -> Result<Region, AccessError> {
    let exists = settle("head_bucket", active.client().bucket_exists(bucket).await)?;
    if !exists {
        return Err(AccessError::BucketNotFound {
            bucket: bucket.to_string(),
        });
    }

    let code = settle(
        "get_bucket_location",
        active.client().bucket_location(bucket).await,
    )?;
    let region = translate_location_code(&code)?;
    debug!(
        "Resolved bucket={} location='{}' region={} via {}",
        bucket,
        code,
        region,
        active.region()
    );
    Ok(region)
}

/// Map a service location code to a canonical [`Region`].
///
/// `"EU"` always maps to `eu-west-1`.  The code is ambiguous in the
/// service's history; this mapping is kept fixed for compatibility and
/// must not be extended to other codes.  An empty code is how the
/// service reports `us-east-1`.
pub fn translate_location_code(code: &str) -> Result<Region, AccessError> {
    match code {
        LEGACY_EU_LOCATION => Ok(Region::EU_WEST_1),
        "" => Ok(Region::US_EAST_1),
        other => Region::from_code(other).ok_or_else(|| AccessError::UnknownRegionCode {
            code: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryClient, MemoryService};
    use http::StatusCode;
    use std::sync::Arc;

    fn handle(service: &Arc<MemoryService>, region: Region) -> ClientHandle {
        ClientHandle::new(
            region,
            "default",
            Arc::new(MemoryClient::new(service.clone(), region)),
        )
    }

    #[test]
    fn test_legacy_eu_code_is_eu_west_1() {
        assert_eq!(translate_location_code("EU").unwrap(), Region::EU_WEST_1);
        // Other EU regions keep their own identity.
        assert_eq!(
            translate_location_code("eu-central-1").unwrap(),
            Region::EU_CENTRAL_1
        );
        assert_ne!(
            translate_location_code("EU").unwrap(),
            translate_location_code("eu-central-1").unwrap()
        );
    }

    #[test]
    fn test_empty_code_is_us_east_1() {
        assert_eq!(translate_location_code("").unwrap(), Region::US_EAST_1);
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(translate_location_code("ap-south-1").unwrap(), Region::AP_SOUTH_1);
        assert_eq!(translate_location_code("us-west-2").unwrap(), Region::US_WEST_2);
    }

    #[test]
    fn test_unknown_code() {
        match translate_location_code("XX") {
            Err(AccessError::UnknownRegionCode { code }) => assert_eq!(code, "XX"),
            other => panic!("expected UnknownRegionCode, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_location_of_existing_bucket() {
        let service = MemoryService::new();
        service.seed_bucket("logs-eu", Region::EU_WEST_1).await;
        let active = handle(&service, Region::US_EAST_1);

        assert_eq!(location_of(&active, "logs-eu").await.unwrap(), Region::EU_WEST_1);
    }

    #[tokio::test]
    async fn test_location_of_legacy_eu_bucket() {
        let service = MemoryService::new();
        service.seed_bucket_with_location("old-eu", "EU").await;
        let active = handle(&service, Region::US_EAST_1);

        assert_eq!(location_of(&active, "old-eu").await.unwrap(), Region::EU_WEST_1);
    }

    #[tokio::test]
    async fn test_location_of_missing_bucket_skips_location_query() {
        let service = MemoryService::new();
        let active = handle(&service, Region::US_EAST_1);

        let err = location_of(&active, "missing-bucket").await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::BucketNotFound { ref bucket } if bucket == "missing-bucket"
        ));
        assert_eq!(service.location_queries(), 0);
    }

    #[tokio::test]
    async fn test_location_of_unmapped_code() {
        let service = MemoryService::new();
        service.seed_bucket_with_location("odd", "mars-north-1").await;
        let active = handle(&service, Region::US_EAST_1);

        let err = location_of(&active, "odd").await.unwrap_err();
        assert_eq!(err.code(), "UnknownRegionCode");
    }

    #[tokio::test]
    async fn test_location_query_rejection_keeps_status() {
        let service = MemoryService::new();
        service.seed_bucket("b1", Region::US_EAST_1).await;
        service
            .inject_status("get_bucket_location", StatusCode::FORBIDDEN)
            .await;
        let active = handle(&service, Region::US_EAST_1);

        let err = location_of(&active, "b1").await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::RpcFailure {
                operation: "get_bucket_location",
                status: Some(StatusCode::FORBIDDEN),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_head_bucket_rejection_keeps_status() {
        let service = MemoryService::new();
        service.seed_bucket("b1", Region::EU_WEST_1).await;
        service
            .inject_status("head_bucket", StatusCode::SERVICE_UNAVAILABLE)
            .await;
        let active = handle(&service, Region::US_EAST_1);

        let err = location_of(&active, "b1").await.unwrap_err();
        assert!(matches!(
            err,
            AccessError::RpcFailure {
                operation: "head_bucket",
                status: Some(StatusCode::SERVICE_UNAVAILABLE),
                ..
            }
        ));
        assert_eq!(service.location_queries(), 0);
    }

    #[tokio::test]
    async fn test_access_denied_head_bucket_still_resolves() {
        let service = MemoryService::new();
        service.seed_bucket("b1", Region::EU_WEST_1).await;
        service
            .inject_status("head_bucket", StatusCode::FORBIDDEN)
            .await;
        let active = handle(&service, Region::US_EAST_1);

        assert_eq!(location_of(&active, "b1").await.unwrap(), Region::EU_WEST_1);
    }
}
