//! Config path resolution
//!
//! All paths are resolved against the base directory the host loads us from.

use std::path::{Path, PathBuf};

/// Name of the permissions config file
pub const CONFIG_FILE_NAME: &str = "permissions.toml";

/// Returns the base configs directory.
///
/// Path: `<base>/configs/`
pub fn configs_dir(base: &Path) -> PathBuf {
    base.join("configs")
}

/// Returns the permissions config path.
///
/// Path: `<base>/configs/permissions.toml`
pub fn core_config_path(base: &Path) -> PathBuf {
    configs_dir(base).join(CONFIG_FILE_NAME)
}

/// Resolve a path from the config: relative paths are taken from `base`
pub fn resolve_data_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_config_path_format() {
        let base = PathBuf::from("/srv/game/addons/pexrs");
        assert!(core_config_path(&base).ends_with("configs/permissions.toml"));
    }

    #[test]
    fn test_resolve_data_path() {
        let base = PathBuf::from("/srv/pexrs");
        assert_eq!(
            resolve_data_path(&base, Path::new("data/permissions.json")),
            PathBuf::from("/srv/pexrs/data/permissions.json")
        );
        assert_eq!(
            resolve_data_path(&base, Path::new("/var/lib/perms.json")),
            PathBuf::from("/var/lib/perms.json")
        );
    }
}
