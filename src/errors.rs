//! Error types for region resolution and storage operations.
//!
//! Resolution-layer failures (bucket lookup, region translation, client
//! provisioning, region switching) and RPC failures are kept apart so a
//! caller can always tell *why* an operation failed.  Callers that only
//! want a yes/no answer can use [`AccessResultExt::succeeded`].

use std::path::PathBuf;

use http::StatusCode;
use metrics::counter;
use thiserror::Error;
use tracing::warn;

use crate::metrics::{outcome_label, RPC_TOTAL};
use crate::region::Region;
use crate::storage::backend::Reply;

/// Errors surfaced by [`crate::session::StorageSession`] and the
/// resolution layer beneath it.
#[derive(Debug, Error)]
pub enum AccessError {
    /// The bucket does not exist under the active client's credentials.
    #[error("bucket '{bucket}' does not exist")]
    BucketNotFound { bucket: String },

    /// The service answered a location query with a code we cannot map.
    #[error("unrecognized region code '{code}'")]
    UnknownRegionCode { code: String },

    /// Credential resolution or client construction failed.
    #[error("failed to create a client for region {region}: {source:#}")]
    ClientCreation {
        region: Region,
        #[source]
        source: anyhow::Error,
    },

    /// `change_region` was asked for a region with no pooled client.
    #[error("no client has been provisioned for region {region}")]
    RegionNotProvisioned { region: Region },

    /// The pool was used before any client was inserted.
    #[error("no active client")]
    NoActiveClient,

    /// A storage RPC returned a non-success status or the transport failed.
    #[error("{operation} failed{}: {detail}", status_suffix(.status.as_ref()))]
    RpcFailure {
        operation: &'static str,
        status: Option<StatusCode>,
        detail: String,
    },

    /// A bucket name that violates the service's naming rules.
    #[error("invalid bucket name '{name}'")]
    InvalidBucketName { name: String },

    /// An object key that cannot be mapped onto a local path.
    #[error("object key '{key}' cannot be written to a local path")]
    InvalidObjectKey { key: String },

    /// Reading an upload source or writing a download target failed.
    #[error("local file error at {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn status_suffix(status: Option<&StatusCode>) -> String {
    status
        .map(|s| format!(" with status {}", s.as_u16()))
        .unwrap_or_default()
}

impl AccessError {
    /// Wrap a transport fault (no HTTP status available).
    pub fn transport(operation: &'static str, err: anyhow::Error) -> Self {
        AccessError::RpcFailure {
            operation,
            status: None,
            detail: format!("{err:#}"),
        }
    }

    /// Return a stable, machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::BucketNotFound { .. } => "BucketNotFound",
            AccessError::UnknownRegionCode { .. } => "UnknownRegionCode",
            AccessError::ClientCreation { .. } => "ClientCreationError",
            AccessError::RegionNotProvisioned { .. } => "RegionNotProvisioned",
            AccessError::NoActiveClient => "NoActiveClient",
            AccessError::RpcFailure { .. } => "RpcFailure",
            AccessError::InvalidBucketName { .. } => "InvalidBucketName",
            AccessError::InvalidObjectKey { .. } => "InvalidObjectKey",
            AccessError::LocalIo { .. } => "LocalIo",
        }
    }

    /// True for failures raised while choosing a client rather than
    /// while talking to the service through one.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            AccessError::BucketNotFound { .. }
                | AccessError::UnknownRegionCode { .. }
                | AccessError::ClientCreation { .. }
                | AccessError::RegionNotProvisioned { .. }
                | AccessError::NoActiveClient
        )
    }
}

/// Turn one RPC result into the caller-facing outcome.
///
/// A 2xx reply yields its body.  Any other status becomes an
/// [`AccessError::RpcFailure`] carrying that status; a transport fault
/// becomes one without a status.
pub(crate) fn settle<T>(
    operation: &'static str,
    result: anyhow::Result<Reply<T>>,
) -> Result<T, AccessError> {
    match result {
        Ok(reply) if reply.is_success() => {
            counter!(RPC_TOTAL, "operation" => operation, "outcome" => "ok").increment(1);
            Ok(reply.body)
        }
        Ok(reply) => {
            let outcome = outcome_label(Some(reply.status));
            counter!(RPC_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
            warn!(
                "{} rejected with status {} ({})",
                operation,
                reply.status,
                reply.error_code.as_deref().unwrap_or("no error code")
            );
            Err(AccessError::RpcFailure {
                operation,
                status: Some(reply.status),
                detail: reply
                    .error_code
                    .unwrap_or_else(|| "request rejected".to_string()),
            })
        }
        Err(err) => {
            counter!(RPC_TOTAL, "operation" => operation, "outcome" => outcome_label(None))
                .increment(1);
            warn!("{} failed: {:#}", operation, err);
            Err(AccessError::transport(operation, err))
        }
    }
}

/// Boolean projection over access results.
pub trait AccessResultExt {
    /// Collapse the result to `true`/`false`, logging the error if any.
    fn succeeded(self) -> bool;
}

impl<T> AccessResultExt for Result<T, AccessError> {
    fn succeeded(self) -> bool {
        match self {
            Ok(_) => true,
            Err(err) if err.is_resolution_error() => {
                warn!(code = err.code(), "no client could serve the request: {err}");
                false
            }
            Err(err) => {
                warn!(code = err.code(), "operation failed: {err}");
                false
            }
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        let errors = [
            AccessError::BucketNotFound {
                bucket: "b".to_string(),
            },
            AccessError::UnknownRegionCode {
                code: "mars-1".to_string(),
            },
            AccessError::ClientCreation {
                region: Region::US_EAST_1,
                source: anyhow::anyhow!("boom"),
            },
            AccessError::RegionNotProvisioned {
                region: Region::AP_SOUTH_1,
            },
            AccessError::NoActiveClient,
            AccessError::transport("put_object", anyhow::anyhow!("reset")),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_resolution_errors_are_flagged() {
        assert!(AccessError::NoActiveClient.is_resolution_error());
        assert!(AccessError::RegionNotProvisioned {
            region: Region::EU_WEST_1
        }
        .is_resolution_error());
        assert!(!AccessError::transport("get_object", anyhow::anyhow!("x")).is_resolution_error());
    }

    #[test]
    fn test_rpc_failure_message_includes_status() {
        let err = AccessError::RpcFailure {
            operation: "put_object",
            status: Some(StatusCode::INTERNAL_SERVER_ERROR),
            detail: "InternalError".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("put_object"));
        assert!(msg.contains("500"));

        let err = AccessError::transport("put_object", anyhow::anyhow!("connection reset"));
        assert_eq!(err.to_string(), "put_object failed: connection reset");
    }

    #[test]
    fn test_client_creation_message_includes_cause() {
        let err = AccessError::ClientCreation {
            region: Region::EU_WEST_1,
            source: anyhow::anyhow!("profile 'ghost' not found"),
        };
        assert!(err.to_string().contains("eu-west-1"));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_settle_keeps_status_apart_from_transport_faults() {
        let ok: anyhow::Result<Reply<u8>> = Ok(Reply::ok(7));
        assert_eq!(settle("get_object", ok).unwrap(), 7);

        let no_content: anyhow::Result<Reply<()>> =
            Ok(Reply::with_status(StatusCode::NO_CONTENT, ()));
        assert!(settle("delete_object", no_content).is_ok());

        let rejected: anyhow::Result<Reply<u8>> = Ok(Reply::rejected(
            StatusCode::FORBIDDEN,
            Some("AccessDenied".to_string()),
        ));
        match settle("get_object", rejected).unwrap_err() {
            AccessError::RpcFailure {
                operation,
                status,
                detail,
            } => {
                assert_eq!(operation, "get_object");
                assert_eq!(status, Some(StatusCode::FORBIDDEN));
                assert_eq!(detail, "AccessDenied");
            }
            other => panic!("expected RpcFailure, got {other:?}"),
        }

        let fault: anyhow::Result<Reply<u8>> = Err(anyhow::anyhow!("connection reset"));
        assert!(matches!(
            settle("get_object", fault),
            Err(AccessError::RpcFailure { status: None, .. })
        ));
    }

    #[test]
    fn test_succeeded_projection() {
        let ok: Result<u8, AccessError> = Ok(1);
        assert!(ok.succeeded());
        let err: Result<u8, AccessError> = Err(AccessError::NoActiveClient);
        assert!(!err.succeeded());
    }
}
