use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONTAINER: &str = "blobns";
pub const DEFAULT_PERMISSION: u32 = 0o770;
pub const DEFAULT_REGION: &str = "us-east-1";
/// Directory under `tmp_path` that mirrors the virtual namespace.
const CACHE_ROOT_DIR: &str = "root";

/// Connection settings for the S3 adapter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct S3Config {
    /// Custom endpoint (minio, rustfs, ...). `None` uses the AWS default.
    pub endpoint: Option<String>,
    pub region: String,
    pub force_path_style: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_REGION.to_string(),
            force_path_style: true,
        }
    }
}

/// Per-mount configuration, built once and handed to `MountContext`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MountConfig {
    pub container: String,
    /// Scratch directory; the cache mirror lives in `tmp_path/root`.
    pub tmp_path: PathBuf,
    /// Permission bits for synthesized attributes and cache directories.
    pub default_permission: u32,
    /// Page size for rename/readdir listings. `None` lets the store decide.
    pub list_page_size: Option<u32>,
    pub uid: u32,
    pub gid: u32,
    pub s3: S3Config,
}

impl Default for MountConfig {
    fn default() -> Self {
        let tmp_path = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(DEFAULT_CONTAINER);
        Self {
            container: DEFAULT_CONTAINER.to_string(),
            tmp_path,
            default_permission: DEFAULT_PERMISSION,
            list_page_size: None,
            uid: nix::unistd::geteuid().as_raw(),
            gid: nix::unistd::getegid().as_raw(),
            s3: S3Config::default(),
        }
    }
}

impl MountConfig {
    pub fn new(container: impl Into<String>, tmp_path: impl Into<PathBuf>) -> Self {
        Self {
            container: container.into(),
            tmp_path: tmp_path.into(),
            ..Default::default()
        }
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {path:?}"))?;
        Self::from_yaml_str(&raw).with_context(|| format!("Failed to parse config file {path:?}"))
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn cache_root(&self) -> PathBuf {
        self.tmp_path.join(CACHE_ROOT_DIR)
    }

    pub fn default_permission(self, default_permission: u32) -> Self {
        Self {
            default_permission,
            ..self
        }
    }

    pub fn list_page_size(self, list_page_size: Option<u32>) -> Self {
        Self {
            list_page_size,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_overrides_and_defaults() {
        let cfg = MountConfig::from_yaml_str(
            "container: photos\ntmp_path: /var/tmp/blobns\ndefault_permission: 493\ns3:\n  endpoint: http://127.0.0.1:9000\n",
        )
        .unwrap();
        assert_eq!(cfg.container, "photos");
        assert_eq!(cfg.cache_root(), PathBuf::from("/var/tmp/blobns/root"));
        assert_eq!(cfg.default_permission, 0o755);
        assert_eq!(cfg.list_page_size, None);
        assert_eq!(cfg.s3.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
        assert_eq!(cfg.s3.region, DEFAULT_REGION);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = MountConfig::from_yaml_file("/nonexistent/blobns.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/blobns.yaml"));
    }
}
