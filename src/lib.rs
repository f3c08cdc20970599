//! bucketroute library -- region-aware access to S3 buckets.
//!
//! A [`StorageSession`] keeps one client per region and routes every
//! bucket operation to the client for the bucket's home region,
//! provisioning new regional clients on demand.

pub mod config;
pub mod credentials;
pub mod errors;
pub mod factory;
pub mod locator;
pub mod metrics;
pub mod pool;
pub mod region;
pub mod resolver;
pub mod session;
pub mod storage;

pub use credentials::{Credentials, Profile};
pub use errors::{AccessError, AccessResultExt};
pub use region::Region;
pub use session::StorageSession;
