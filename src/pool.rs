//! Per-session pool of regional clients.
//!
//! The pool holds at most one [`ClientHandle`] per [`Region`] plus the
//! *active* handle used for operations that do not yet know their target
//! region.  Entries are never removed or replaced.

use crate::errors::AccessError;
use crate::region::Region;
use crate::storage::backend::ClientHandle;

#[derive(Debug, Default)]
pub struct ClientPool {
    handles: Vec<ClientHandle>,
    active: Option<ClientHandle>,
}

impl ClientPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The pooled handle for `region`, if one exists.
    pub fn lookup(&self, region: Region) -> Option<&ClientHandle> {
        self.handles.iter().find(|h| h.region() == region)
    }

    /// Append `handle` to the pool.
    ///
    /// The caller must have checked with [`lookup`](Self::lookup) that no
    /// handle for the same region is pooled yet.
    pub fn insert(&mut self, handle: ClientHandle) {
        debug_assert!(
            self.lookup(handle.region()).is_none(),
            "duplicate client for region {}",
            handle.region()
        );
        self.handles.push(handle);
        metrics::gauge!(crate::metrics::POOLED_CLIENTS).set(self.handles.len() as f64);
    }

    /// Make `handle` the active handle.  The caller guarantees it is a
    /// member of the pool.
    pub fn set_active(&mut self, handle: ClientHandle) {
        self.active = Some(handle);
    }

    pub fn active(&self) -> Result<&ClientHandle, AccessError> {
        self.active.as_ref().ok_or(AccessError::NoActiveClient)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientHandle> {
        self.handles.iter()
    }

    /// Regions with a pooled client, in provisioning order.
    pub fn regions(&self) -> Vec<Region> {
        self.iter().map(|h| h.region()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryClient, MemoryService};
    use std::sync::Arc;

    fn handle(service: &Arc<MemoryService>, region: Region) -> ClientHandle {
        ClientHandle::new(
            region,
            "default",
            Arc::new(MemoryClient::new(service.clone(), region)),
        )
    }

    #[test]
    fn test_empty_pool_has_no_active_client() {
        let pool = ClientPool::new();
        assert!(pool.is_empty());
        assert!(matches!(pool.active(), Err(AccessError::NoActiveClient)));
        assert!(pool.lookup(Region::US_EAST_1).is_none());
    }

    #[test]
    fn test_insert_and_lookup() {
        let service = MemoryService::new();
        let mut pool = ClientPool::new();
        let us = handle(&service, Region::US_EAST_1);
        pool.insert(us.clone());

        let found = pool.lookup(Region::US_EAST_1).unwrap();
        assert!(found.same_client(&us));
        assert!(pool.lookup(Region::EU_WEST_1).is_none());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_lookup_never_aliases_regions() {
        let service = MemoryService::new();
        let mut pool = ClientPool::new();
        for region in [Region::US_EAST_1, Region::EU_WEST_1, Region::AP_SOUTH_1] {
            pool.insert(handle(&service, region));
        }

        let regions = pool.regions();
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                let ha = pool.lookup(*a).unwrap();
                let hb = pool.lookup(*b).unwrap();
                assert!(!ha.same_client(hb), "{a} and {b} share a client");
            }
        }
    }

    #[test]
    fn test_set_active_replaces_active() {
        let service = MemoryService::new();
        let mut pool = ClientPool::new();
        let us = handle(&service, Region::US_EAST_1);
        let eu = handle(&service, Region::EU_WEST_1);
        pool.insert(us.clone());
        pool.insert(eu.clone());

        pool.set_active(us.clone());
        assert!(pool.active().unwrap().same_client(&us));

        pool.set_active(eu.clone());
        assert!(pool.active().unwrap().same_client(&eu));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_regions_keep_insertion_order() {
        let service = MemoryService::new();
        let mut pool = ClientPool::new();
        pool.insert(handle(&service, Region::EU_WEST_1));
        pool.insert(handle(&service, Region::US_EAST_1));
        assert_eq!(pool.regions(), vec![Region::EU_WEST_1, Region::US_EAST_1]);
        assert_eq!(pool.iter().count(), 2);
    }
}
