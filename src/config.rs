//! Configuration loading (.env + profiles.json)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const PROFILES_FILE: &str = "profiles.json";

/// Configuration directory: `.env`, `profiles.json` and per-resource
/// scratch directories live here.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDir {
    path: PathBuf,
}

impl ConfigDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `explicit` comes from `--config-dir` / `NIMBUS_CONFIG_DIR`.
    pub fn resolve(explicit: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = explicit {
            return Ok(Self::new(path));
        }
        let dirs = directories::ProjectDirs::from("cloud", "Nimbus", "nimbus").context(
            "Unable to determine the configuration directory; use --config-dir or NIMBUS_CONFIG_DIR",
        )?;
        Ok(Self::new(dirs.config_dir()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<config>/<kind>/<id>`
    pub fn resource_dir(&self, kind: &str, id: &str) -> PathBuf {
        self.path.join(kind).join(id)
    }

    /// Create the scratch directory of a resource, private to the user.
    pub fn create_resource_dir(&self, kind: &str, id: &str) -> Result<PathBuf> {
        let dir = self.resource_dir(kind, id);
        create_private_dir(&dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;
        Ok(dir)
    }

    /// Remove the scratch directory of a resource. Missing is not an error.
    pub fn remove_resource_dir(&self, kind: &str, id: &str) -> Result<()> {
        let dir = self.resource_dir(kind, id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove directory {:?}", dir)),
        }
    }

    /// Write a file readable only by the user in the resource's scratch directory.
    pub fn write_secret(&self, kind: &str, id: &str, file: &str, contents: &str) -> Result<PathBuf> {
        let dir = self.create_resource_dir(kind, id)?;
        let path = dir.join(file);
        write_private_file(&path, contents)
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// Load `.env` from the configuration directory, if there is one.
pub fn load_env(dir: &ConfigDir) -> Result<bool> {
    let env_path = dir.path().join(".env");
    if !env_path.exists() {
        return Ok(false);
    }
    dotenvy::from_path(&env_path)
        .with_context(|| format!("Failed to load .env from {:?}", env_path))?;
    Ok(true)
}

// ============ Profiles ============

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProfileFile {
    #[serde(default)]
    pub default_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

/// Account settings used to build the API client and fill defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub default_zone: Option<String>,
    #[serde(default)]
    pub client_timeout_secs: Option<u64>,
}

impl Profile {
    pub fn client_timeout(&self) -> Duration {
        self.client_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CLIENT_TIMEOUT)
    }

    /// Apply `NIMBUS_API_TOKEN`, `NIMBUS_API_ENDPOINT` and `NIMBUS_ZONE`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(token) = non_empty("NIMBUS_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(endpoint) = non_empty("NIMBUS_API_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(zone) = non_empty("NIMBUS_ZONE") {
            self.default_zone = Some(zone);
        }
    }
}

/// Load profiles.json. A missing file is an empty profile set.
pub fn load_profiles(dir: &ConfigDir) -> Result<ProfileFile> {
    let path = dir.path().join(PROFILES_FILE);
    if !path.exists() {
        return Ok(ProfileFile::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read profiles.json from {:?}", path))?;
    let file: ProfileFile =
        serde_json::from_str(&content).with_context(|| "Failed to parse profiles.json")?;
    Ok(file)
}

/// Pick the requested profile, else the file's default, else the only
/// profile, else an empty one.
pub fn select_profile(file: ProfileFile, requested: Option<&str>) -> Result<Profile> {
    let ProfileFile {
        default_profile,
        mut profiles,
    } = file;

    let name = match requested.or(default_profile.as_deref()) {
        Some(name) => name.to_string(),
        None if profiles.len() == 1 => profiles.keys().next().cloned().unwrap_or_default(),
        None => return Ok(Profile::default()),
    };

    let mut profile = profiles.remove(&name).with_context(|| {
        format!("Profile {:?} not found in {}", name, PROFILES_FILE)
    })?;
    profile.name = name;
    Ok(profile)
}
