//! Project configuration.
//!
//! Handles:
//! - Locating `.controlplane/controlplane.yml` by walking up from the working directory
//! - Migrating deprecated option names to their current spelling
//! - Picking the entry that matches the `--app` of this invocation

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Location of the config file relative to the project folder.
pub const CONFIG_FILE_LOCATION: &str = ".controlplane/controlplane.yml";

/// Deprecated option names and the names that replaced them.
const DEPRECATED_KEYS: &[(&str, &str)] = &[
    ("org", "cpln_org"),
    ("location", "default_location"),
    ("prefix", "match_if_app_name_starts_with"),
    ("setup", "setup_app_templates"),
];

const DEFAULT_MAINTENANCE_WORKLOAD: &str = "maintenance";
const DEFAULT_DOCKERFILE: &str = "Dockerfile";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Can't find project config file at 'project_folder/{CONFIG_FILE_LOCATION}', please create it.")]
    NotFound,

    #[error("Failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse 'controlplane.yml': {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("'controlplane.yml' is empty.")]
    Empty,

    #[error("Can't find key 'apps' in 'controlplane.yml'.")]
    MissingApps,

    #[error("App '{0}' is empty in 'controlplane.yml'.")]
    EmptyApp(String),

    #[error("Invalid options for app '{app}' in 'controlplane.yml': {source}")]
    InvalidApp {
        app: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Can't find current config, please specify an app.")]
    NoApp,

    #[error("Can't find app '{0}' in 'controlplane.yml'.")]
    UnknownApp(String),

    #[error("App '{app}' matches more than one entry in 'controlplane.yml': {}", .candidates.join(", "))]
    AmbiguousApp { app: String, candidates: Vec<String> },

    #[error("Can't find option '{key}' for app '{app}' in 'controlplane.yml'.")]
    MissingOption { key: &'static str, app: String },
}

/// Options of a single app entry, after deprecated keys were renamed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpln_org: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_location: Option<String>,

    /// Match any app whose name starts with this entry's name.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub match_if_app_name_starts_with: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_workloads: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_workloads: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_off_workload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_workload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_app_templates: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_run_workload_created_days: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_retention_days: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_app_image_deployed_days: Option<u32>,

    /// Name of the app entry this app promotes images from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
}

impl AppConfig {
    /// Whether an app named `app` is served by the entry `entry_name`.
    pub fn matches(&self, entry_name: &str, app: &str) -> bool {
        entry_name == app || (self.match_if_app_name_starts_with && app.starts_with(entry_name))
    }
}

/// A deprecated option found in an app entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeprecatedKey {
    pub old: &'static str,
    pub new: &'static str,
}

impl DeprecatedKey {
    pub fn message(&self) -> String {
        format!(
            "Option '{}' is deprecated, please use '{}' instead (in 'controlplane.yml').",
            self.old, self.new
        )
    }
}

/// An app entry as declared in the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct AppEntry {
    pub name: String,
    pub options: AppConfig,
    pub deprecated: Vec<DeprecatedKey>,
}

/// The entry selected for the app of this invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedApp {
    /// App name from the command line (also the GVC name).
    pub name: String,
    /// Name of the matching entry in the config file.
    pub entry: String,
    pub options: AppConfig,
    pub deprecated: Vec<DeprecatedKey>,
}

/// Loaded `controlplane.yml`.
#[derive(Debug, Clone)]
pub struct Config {
    app_dir: PathBuf,
    apps: Vec<AppEntry>,
}

impl Config {
    /// Find and load the config file, starting at `start` and walking up.
    pub fn discover(start: &Path) -> Result<Self, ConfigError> {
        let path = find_config_file(start)?;
        Self::load(&path)
    }

    /// Load a config file at a known path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        // `<project>/.controlplane/controlplane.yml` -> `<project>`
        let app_dir = path
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self::from_yaml(&contents, app_dir)
    }

    /// Parse config contents for a project rooted at `app_dir`.
    pub fn from_yaml(contents: &str, app_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut document: Value = serde_yaml::from_str(contents)?;
        if document.is_null() {
            return Err(ConfigError::Empty);
        }
        document.apply_merge()?;

        let apps = match document.get("apps") {
            Some(Value::Mapping(apps)) => apps,
            _ => return Err(ConfigError::MissingApps),
        };

        let mut entries = Vec::with_capacity(apps.len());
        for (name, options) in apps {
            let name = match name {
                Value::String(name) => name.clone(),
                other => serde_yaml::to_string(other)?.trim().to_string(),
            };

            let options = match options {
                Value::Mapping(options) if !options.is_empty() => options,
                _ => return Err(ConfigError::EmptyApp(name)),
            };

            let (normalized, deprecated) = normalize_keys(options);
            let options: AppConfig = serde_yaml::from_value(Value::Mapping(normalized))
                .map_err(|source| ConfigError::InvalidApp {
                    app: name.clone(),
                    source,
                })?;

            entries.push(AppEntry {
                name,
                options,
                deprecated,
            });
        }

        Ok(Self {
            app_dir: app_dir.into(),
            apps: entries,
        })
    }

    /// Project folder (the one containing `.controlplane`).
    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// The `.controlplane` folder.
    pub fn app_cpln_dir(&self) -> PathBuf {
        self.app_dir.join(".controlplane")
    }

    /// All app entries in file order.
    pub fn apps(&self) -> &[AppEntry] {
        &self.apps
    }

    /// Look up an entry by its exact name.
    pub fn entry(&self, name: &str) -> Option<&AppEntry> {
        self.apps.iter().find(|entry| entry.name == name)
    }

    /// Pick the entry serving `app`.
    ///
    /// An exact name match wins. Otherwise the single prefix-matching entry is
    /// used; more than one prefix candidate is rejected.
    pub fn resolve(&self, app: &str) -> Result<ResolvedApp, ConfigError> {
        let entry = match self.entry(app) {
            Some(entry) => entry,
            None => {
                let candidates: Vec<&AppEntry> = self
                    .apps
                    .iter()
                    .filter(|entry| entry.options.matches(&entry.name, app))
                    .collect();

                match candidates.as_slice() {
                    [] => return Err(ConfigError::UnknownApp(app.to_string())),
                    [only] => *only,
                    many => {
                        return Err(ConfigError::AmbiguousApp {
                            app: app.to_string(),
                            candidates: many.iter().map(|entry| entry.name.clone()).collect(),
                        })
                    }
                }
            }
        };

        Ok(ResolvedApp {
            name: app.to_string(),
            entry: entry.name.clone(),
            options: entry.options.clone(),
            deprecated: entry.deprecated.clone(),
        })
    }
}

impl ResolvedApp {
    fn missing(&self, key: &'static str) -> ConfigError {
        ConfigError::MissingOption {
            key,
            app: self.name.clone(),
        }
    }

    pub fn cpln_org(&self) -> Result<&str, ConfigError> {
        self.options
            .cpln_org
            .as_deref()
            .ok_or_else(|| self.missing("cpln_org"))
    }

    pub fn default_location(&self) -> Result<&str, ConfigError> {
        self.options
            .default_location
            .as_deref()
            .ok_or_else(|| self.missing("default_location"))
    }

    pub fn app_workloads(&self) -> Result<&[String], ConfigError> {
        self.options
            .app_workloads
            .as_deref()
            .ok_or_else(|| self.missing("app_workloads"))
    }

    pub fn additional_workloads(&self) -> &[String] {
        self.options.additional_workloads.as_deref().unwrap_or_default()
    }

    /// App workloads followed by additional workloads.
    pub fn all_workloads(&self) -> Result<Vec<String>, ConfigError> {
        let mut workloads = self.app_workloads()?.to_vec();
        workloads.extend(self.additional_workloads().iter().cloned());
        Ok(workloads)
    }

    pub fn one_off_workload(&self) -> Result<&str, ConfigError> {
        self.options
            .one_off_workload
            .as_deref()
            .ok_or_else(|| self.missing("one_off_workload"))
    }

    pub fn maintenance_workload(&self) -> &str {
        self.options
            .maintenance_workload
            .as_deref()
            .unwrap_or(DEFAULT_MAINTENANCE_WORKLOAD)
    }

    pub fn dockerfile(&self) -> &str {
        self.options
            .dockerfile
            .as_deref()
            .unwrap_or(DEFAULT_DOCKERFILE)
    }

    pub fn setup_app_templates(&self) -> Result<&[String], ConfigError> {
        self.options
            .setup_app_templates
            .as_deref()
            .ok_or_else(|| self.missing("setup_app_templates"))
    }

    pub fn stale_run_workload_created_days(&self) -> Result<u32, ConfigError> {
        self.options
            .stale_run_workload_created_days
            .ok_or_else(|| self.missing("stale_run_workload_created_days"))
    }

    pub fn image_retention_days(&self) -> Result<u32, ConfigError> {
        self.options
            .image_retention_days
            .ok_or_else(|| self.missing("image_retention_days"))
    }

    pub fn stale_app_image_deployed_days(&self) -> Result<u32, ConfigError> {
        self.options
            .stale_app_image_deployed_days
            .ok_or_else(|| self.missing("stale_app_image_deployed_days"))
    }

    pub fn upstream(&self) -> Result<&str, ConfigError> {
        self.options
            .upstream
            .as_deref()
            .ok_or_else(|| self.missing("upstream"))
    }

    /// Whether another app (e.g. a GVC name) is served by this entry.
    pub fn serves(&self, app: &str) -> bool {
        self.options.matches(&self.entry, app)
    }
}

/// Walk up from `start` until `.controlplane/controlplane.yml` is found.
pub fn find_config_file(start: &Path) -> Result<PathBuf, ConfigError> {
    let mut dir = start;
    loop {
        let candidate = dir.join(CONFIG_FILE_LOCATION);
        if candidate.is_file() {
            return Ok(candidate);
        }

        dir = dir.parent().ok_or(ConfigError::NotFound)?;
    }
}

/// Rename deprecated keys of one app entry.
///
/// When both spellings are present the current key keeps its value and the
/// deprecated one is dropped. Applying this to its own output is a no-op.
pub fn normalize_keys(options: &Mapping) -> (Mapping, Vec<DeprecatedKey>) {
    let mut normalized = Mapping::with_capacity(options.len());
    let mut deprecated = Vec::new();

    for (key, value) in options {
        let renamed = key
            .as_str()
            .and_then(|name| DEPRECATED_KEYS.iter().find(|(old, _)| *old == name));

        match renamed {
            Some(&(old, new)) => {
                deprecated.push(DeprecatedKey { old, new });
                if !options.contains_key(new) {
                    normalized.insert(Value::from(new), value.clone());
                }
            }
            None => {
                normalized.insert(key.clone(), value.clone());
            }
        }
    }

    (normalized, deprecated)
}
