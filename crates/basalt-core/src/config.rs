use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BasaltError, BasaltResult};

/// Settings controlling where material declarations are discovered and
/// where edited declarations are written back to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Folder below the VFS root that is scanned for declaration files.
    pub materials_folder: String,
    /// File extension of declaration files, without the dot.
    pub extension: String,
    /// Writable base directory that saved declaration files go to.
    /// Usually the mod directory; reads still go through the VFS.
    pub mod_path: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            materials_folder: "materials".to_string(),
            extension: "mtr".to_string(),
            mod_path: None,
        }
    }
}

impl RegistryConfig {
    pub fn load_from_file(path: &std::path::Path) -> BasaltResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RegistryConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// The writable output base, or a `MissingConfig` error when no mod
    /// path has been configured. Save operations depend on this.
    pub fn require_mod_path(&self) -> BasaltResult<&std::path::Path> {
        self.mod_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| BasaltError::MissingConfig("mod_path".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.materials_folder, "materials");
        assert_eq!(config.extension, "mtr");
        assert!(config.mod_path.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let config: RegistryConfig = toml::from_str(
            r#"
            materials_folder = "materials"
            extension = "mtr"
            mod_path = "/home/user/mod"
            "#,
        )
        .unwrap();
        assert_eq!(config.mod_path, Some(PathBuf::from("/home/user/mod")));
        assert!(config.require_mod_path().is_ok());
    }

    #[test]
    fn test_missing_mod_path() {
        let config = RegistryConfig::default();
        assert!(matches!(
            config.require_mod_path(),
            Err(BasaltError::MissingConfig(_))
        ));
    }
}
