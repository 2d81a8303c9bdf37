//! Load, tick and unload entry points
//!
//! A host calls [`load`] once with its data directory, [`on_tick`] from its
//! main loop, and [`unload`] on shutdown.

use std::path::Path;
use std::sync::Arc;

use tracing::instrument;

use pexrs_core::{
    init_service, service, shutdown_service, PermissionService, PexConfig, ServiceError,
};

use crate::logging::init_logging;

/// Work done by one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub completions: usize,
    pub expired_callbacks: usize,
}

/// Read config, install logging and the global service
///
/// `base_dir` holds `configs/permissions.toml` (created with defaults if
/// missing) and relative backend paths.
#[instrument(skip_all)]
pub fn load(base_dir: &Path) -> Result<Arc<PermissionService>, ServiceError> {
    let config = PexConfig::load(base_dir)?;
    init_logging(config.debug);

    tracing::info!("pexrs loading from {:?}...", base_dir);

    let service = PermissionService::from_config(config, base_dir)?;
    let service = init_service(service)?;

    tracing::info!("pexrs loaded successfully!");
    Ok(service)
}

/// Run async check callbacks and drop expired callback tokens
///
/// Call from the host's main thread.
pub fn on_tick() -> TickReport {
    let Some(service) = service() else {
        return TickReport::default();
    };

    TickReport {
        completions: service.process_completions(),
        expired_callbacks: service.purge_callbacks(),
    }
}

/// Tear down the global service
///
/// Returns `false` if nothing was loaded.
#[instrument(skip_all)]
pub fn unload() -> bool {
    tracing::info!("pexrs unloading...");

    let Some(service) = shutdown_service() else {
        return false;
    };

    // Callbacks already queued still run before the service goes away
    let drained = service.process_completions();
    if drained > 0 {
        tracing::debug!("Ran {} pending completion(s) on unload", drained);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pexrs_sdk::{ContextSet, SubjectRef};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    // Single test: the service slot is process-wide
    #[test]
    fn test_load_tick_unload() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(on_tick(), TickReport::default());

        let service = load(dir.path()).unwrap();
        assert!(matches!(
            load(dir.path()),
            Err(ServiceError::AlreadyInitialized)
        ));

        let alice = SubjectRef::user("alice");
        let mut tx = service.begin();
        tx.set_permission(&alice, &ContextSet::empty(), "chat", Some(true), 0)
            .unwrap();
        tx.commit().unwrap();

        let allowed = Arc::new(AtomicBool::new(false));
        let flag = allowed.clone();
        service
            .check_async(alice, "chat".into(), ContextSet::empty(), move |ok| {
                flag.store(ok, Ordering::SeqCst);
            })
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while service.pending_completions() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(on_tick().completions, 1);
        assert!(allowed.load(Ordering::SeqCst));

        drop(service);
        assert!(unload());
        assert!(!unload());
        assert!(dir.path().join("configs/permissions.toml").exists());
    }
}
