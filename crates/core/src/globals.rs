//! Process-wide permission service
//!
//! The host installs one service at load time and takes it down at unload.
//! Unlike a `OnceLock`, the slot can be emptied so a reload can install a
//! fresh service.

use std::sync::Arc;

use parking_lot::{const_rwlock, RwLock};

use crate::service::{PermissionService, ServiceError};

static SERVICE: RwLock<Option<Arc<PermissionService>>> = const_rwlock(None);

/// Install the global service
///
/// Returns error if one is already installed.
pub fn init_service(service: PermissionService) -> Result<Arc<PermissionService>, ServiceError> {
    let mut slot = SERVICE.write();
    if slot.is_some() {
        return Err(ServiceError::AlreadyInitialized);
    }
    let service = Arc::new(service);
    *slot = Some(service.clone());
    Ok(service)
}

/// The installed service, if any
pub fn service() -> Option<Arc<PermissionService>> {
    SERVICE.read().clone()
}

pub fn is_initialized() -> bool {
    SERVICE.read().is_some()
}

/// Remove the global service
///
/// Outstanding `Arc`s keep it alive until they are dropped.
pub fn shutdown_service() -> Option<Arc<PermissionService>> {
    SERVICE.write().take()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PexConfig;
    use pexrs_engine::MemoryStore;

    // The only test touching the global slot; others build services directly
    #[test]
    fn test_init_and_shutdown() {
        let make = || {
            PermissionService::new(PexConfig::default(), Arc::new(MemoryStore::default()))
                .unwrap()
        };

        assert!(service().is_none());
        init_service(make()).unwrap();
        assert!(is_initialized());
        assert!(matches!(
            init_service(make()),
            Err(ServiceError::AlreadyInitialized)
        ));

        assert!(shutdown_service().is_some());
        assert!(!is_initialized());
        assert!(shutdown_service().is_none());
    }
}
