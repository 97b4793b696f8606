use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sequencing::ResponseOrdering;

pub const DEFAULT_PROFILE_NAME: &str = "local";
pub const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineProfile {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub response_ordering: ResponseOrdering,
}

impl EngineProfile {
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            response_ordering: ResponseOrdering::default(),
        }
    }

    #[must_use]
    pub fn default_local() -> Self {
        Self::new(DEFAULT_PROFILE_NAME, DEFAULT_BASE_URL)
    }

    /// Replaces the base URL, keeping the rest of the profile.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ProfilesError> {
        self.base_url = base_url.to_string();
        self.validated()
    }

    /// Checks the URL scheme and strips trailing slashes so endpoint paths join cleanly.
    pub fn validated(mut self) -> Result<Self, ProfilesError> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(ProfilesError::InvalidBaseUrl {
                profile: self.name,
                base_url: self.base_url,
            });
        }
        self.base_url = trimmed.to_string();
        Ok(self)
    }
}

#[derive(Debug, Error)]
pub enum ProfilesError {
    #[error("config directory is unavailable for this platform")]
    ConfigDirUnavailable,
    #[error("failed to read profiles file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse profiles file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("profile `{0}` is not defined")]
    UnknownProfile(String),
    #[error("profile `{profile}` has base url `{base_url}`; expected http:// or https://")]
    InvalidBaseUrl { profile: String, base_url: String },
}

#[derive(Debug, Default, Deserialize)]
struct ProfilesDocument {
    #[serde(default)]
    profiles: Vec<EngineProfile>,
}

impl ProfilesDocument {
    fn normalize(&mut self) {
        let mut by_name = BTreeMap::new();
        for profile in self.profiles.drain(..) {
            by_name.insert(profile.name.clone(), profile);
        }
        self.profiles = by_name.into_values().collect();
    }
}

/// Engine profiles read from `profiles.toml`. The console never writes this file.
#[derive(Debug, Clone)]
pub struct FileProfilesStore {
    path: PathBuf,
    profiles: Vec<EngineProfile>,
}

impl FileProfilesStore {
    pub fn load_default() -> Result<Self, ProfilesError> {
        let path = default_profiles_path()?;
        Self::load_from_path(path)
    }

    pub fn load_from_path(path: impl Into<PathBuf>) -> Result<Self, ProfilesError> {
        let path = path.into();
        if !path.exists() {
            return Ok(Self {
                path,
                profiles: Vec::new(),
            });
        }

        let raw = fs::read_to_string(&path).map_err(|source| ProfilesError::Read {
            path: path.clone(),
            source,
        })?;

        if raw.trim().is_empty() {
            return Ok(Self {
                path,
                profiles: Vec::new(),
            });
        }

        let mut doc: ProfilesDocument =
            toml::from_str(&raw).map_err(|source| ProfilesError::Parse {
                path: path.clone(),
                source,
            })?;
        doc.normalize();

        Ok(Self {
            path,
            profiles: doc.profiles,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn profiles(&self) -> &[EngineProfile] {
        &self.profiles
    }

    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&EngineProfile> {
        self.profiles.iter().find(|profile| profile.name == name)
    }

    /// Picks the profile to connect with.
    ///
    /// A named profile must exist. Without a name, the stored `local` profile is used
    /// if present, otherwise the built-in default. `url_override` wins over either.
    pub fn resolve(
        &self,
        name: Option<&str>,
        url_override: Option<&str>,
    ) -> Result<EngineProfile, ProfilesError> {
        let profile = match name {
            Some(name) => self
                .profile(name)
                .cloned()
                .ok_or_else(|| ProfilesError::UnknownProfile(name.to_string()))?,
            None => self
                .profile(DEFAULT_PROFILE_NAME)
                .cloned()
                .unwrap_or_else(EngineProfile::default_local),
        };

        match url_override {
            Some(url) => profile.with_base_url(url),
            None => profile.validated(),
        }
    }
}

pub fn default_profiles_path() -> Result<PathBuf, ProfilesError> {
    let base_dir = if let Some(custom) = env::var_os("TABULA_CONFIG_DIR") {
        PathBuf::from(custom)
    } else if cfg!(target_os = "windows") {
        env::var_os("APPDATA")
            .map(PathBuf::from)
            .ok_or(ProfilesError::ConfigDirUnavailable)?
    } else if let Some(xdg_config_home) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config_home)
    } else {
        let home = env::var_os("HOME").ok_or(ProfilesError::ConfigDirUnavailable)?;
        PathBuf::from(home).join(".config")
    };

    Ok(base_dir.join("tabula").join("profiles.toml"))
}
