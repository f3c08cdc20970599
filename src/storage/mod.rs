//! Object storage clients.
//!
//! The [`backend::ObjectStorageClient`] trait abstracts over one regional
//! endpoint of the service.  Implementations are the real AWS S3 client
//! and an in-memory simulation used by tests and dry runs.

pub mod aws;
pub mod backend;
pub mod memory;
