use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "atcache.toml";

/// atcache.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtcacheConfig {
    #[serde(default)]
    pub airtable: AirtableConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AirtableConfig {
    /// Default base ID; calls may override it per request
    pub base: Option<String>,
    /// Airtable REST endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Caching proxy mirroring the Airtable REST API
    #[serde(default = "default_cache_url")]
    pub cache_url: String,
    /// Prefer processed rows over raw Airtable records
    #[serde(default)]
    pub process: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Runtime base image (name:tag)
    #[serde(default = "default_base_image")]
    pub base_image: String,
    /// Working directory inside the image; the project tree is copied here
    #[serde(default = "default_workdir")]
    pub workdir: String,
    /// Flush process output immediately (PYTHONUNBUFFERED)
    #[serde(default = "default_true")]
    pub unbuffered_output: bool,
    /// Dependency manifest, relative to the project root
    #[serde(default = "default_manifest")]
    pub manifest: String,
    /// Package install script, relative to the project root
    #[serde(default = "default_package_script")]
    pub package_script: String,
    /// Interpreter used to run the install script
    #[serde(default = "default_python")]
    pub python: String,
    /// Tag applied to the finished image
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Static environment variables baked into the image.
    /// Rendered in key order so the recipe stays deterministic.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Shell command run inside the finished image to check the install
    #[serde(default)]
    pub verify: Option<String>,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            base: None,
            api_url: default_api_url(),
            cache_url: default_cache_url(),
            process: false,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base_image: default_base_image(),
            workdir: default_workdir(),
            unbuffered_output: true,
            manifest: default_manifest(),
            package_script: default_package_script(),
            python: default_python(),
            tag: default_tag(),
            env: BTreeMap::new(),
            verify: None,
        }
    }
}

impl AtcacheConfig {
    /// Load from atcache.toml at the given path, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            let config: Self = toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path.clone(),
                source: e,
            })?;
            tracing::debug!(path = %config_path.display(), "loaded config");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        self.image.validate()
    }
}

impl ImageConfig {
    /// Checks the invariants the build recipe relies on.
    pub fn validate(&self) -> crate::Result<()> {
        if self.base_image.trim().is_empty() {
            return Err(crate::Error::InvalidImageConfig {
                field: "base_image",
                reason: "must not be empty",
            });
        }
        if self.tag.trim().is_empty() {
            return Err(crate::Error::InvalidImageConfig {
                field: "tag",
                reason: "must not be empty",
            });
        }
        if !self.workdir.starts_with('/') {
            return Err(crate::Error::InvalidImageConfig {
                field: "workdir",
                reason: "must be an absolute path",
            });
        }
        if self.workdir.contains(char::is_whitespace) {
            return Err(crate::Error::InvalidImageConfig {
                field: "workdir",
                reason: "must not contain whitespace",
            });
        }
        validate_project_path("manifest", &self.manifest)?;
        validate_project_path("package_script", &self.package_script)?;
        Ok(())
    }
}

/// Paths inside the copied tree must stay inside it and render as one
/// Dockerfile argument.
fn validate_project_path(field: &'static str, value: &str) -> crate::Result<()> {
    if value.trim().is_empty() {
        return Err(crate::Error::InvalidImageConfig {
            field,
            reason: "must not be empty",
        });
    }
    if value.contains(char::is_whitespace) {
        return Err(crate::Error::InvalidImageConfig {
            field,
            reason: "must not contain whitespace",
        });
    }
    for component in Path::new(value).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(crate::Error::InvalidImageConfig {
                    field,
                    reason: "must not contain '..'",
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(crate::Error::InvalidImageConfig {
                    field,
                    reason: "must be relative to the project root",
                });
            }
        }
    }
    Ok(())
}

fn default_api_url() -> String {
    "https://api.airtable.com/v0".to_owned()
}

fn default_cache_url() -> String {
    "https://at-cache-hfrsqgk6ja-uc.a.run.app/airtable/v0".to_owned()
}

fn default_base_image() -> String {
    "python:3.11-slim".to_owned()
}

fn default_workdir() -> String {
    "/app".to_owned()
}

fn default_true() -> bool {
    true
}

fn default_manifest() -> String {
    "requirements.txt".to_owned()
}

fn default_package_script() -> String {
    "setup.py".to_owned()
}

fn default_python() -> String {
    "python".to_owned()
}

fn default_tag() -> String {
    "atcache:latest".to_owned()
}
