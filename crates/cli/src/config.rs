// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration parsing and validation.
//!
//! Everything dbbm reads is JSON: the project file (`dbbm.json`), the
//! optional per-user file (`dbbm.user.json`), the releases list, feature
//! files, and task-definition files. Reference errors (duplicate release
//! names, malformed recipes) are reported at load time, not mid-deploy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Project file name, discovered by walking upward from the cwd.
pub const PROJECT_FILE_NAME: &str = "dbbm.json";

/// Per-user settings, looked up next to the project file.
pub const USER_FILE_NAME: &str = "dbbm.user.json";

/// Project configuration (`dbbm.json`).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Databases the project deploys, in deployment order.
    pub databases: Vec<String>,

    /// Path of the releases JSON file, relative to the project root.
    #[serde(default = "ProjectConfig::default_releases")]
    pub releases: String,

    /// Glob matching feature files, relative to the project root.
    #[serde(default = "ProjectConfig::default_features")]
    pub features: String,

    /// Glob matching task-definition files, relative to the project root.
    #[serde(default = "ProjectConfig::default_tasks")]
    pub tasks: String,

    /// Release deployed when `-r` is not given.
    pub active_release: Option<String>,
}

impl ProjectConfig {
    fn default_releases() -> String {
        "releases.json".to_string()
    }

    fn default_features() -> String {
        "features/*.json".to_string()
    }

    fn default_tasks() -> String {
        "tasks/*.json".to_string()
    }
}

/// User configuration (`dbbm.user.json`). Every field has a default so
/// the file itself is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    /// Baseline backup location and naming.
    #[serde(default)]
    pub backups: BackupsConfig,

    /// Backup cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Connection string handed verbatim to the SQL runner.
    #[serde(default)]
    pub connection: String,

    /// Preferred environment for baseline resolution and script filtering.
    #[serde(default = "UserConfig::default_environment")]
    pub environment: String,

    /// BEL counts per event; an absent entry is silent.
    #[serde(default)]
    pub beeps: BeepsConfig,
}

impl UserConfig {
    fn default_environment() -> String {
        "dev".to_string()
    }
}

/// Where baseline backups live and how their names parse.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupsConfig {
    /// Directory scanned for backup files.
    #[serde(default = "BackupsConfig::default_path")]
    pub path: String,

    /// Filename regex with named groups `release`, `dbName`, and
    /// optionally `env`. Files without an `env` group are
    /// environment-agnostic.
    #[serde(default = "BackupsConfig::default_pattern")]
    pub pattern: String,
}

impl BackupsConfig {
    fn default_path() -> String {
        "backups".to_string()
    }

    fn default_pattern() -> String {
        r"^(?P<release>[^-]+)-(?:(?P<env>[^-]+)-)?(?P<dbName>.+)\.bak$".to_string()
    }
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            pattern: Self::default_pattern(),
        }
    }
}

/// Backup cache tuning.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache root directory; `caches/<db>/<hex>` and `hit.json` live under it.
    #[serde(default = "CacheConfig::default_root_path")]
    pub root_path: String,

    /// Upper bound on live cache bytes after GC; negative means unbounded.
    #[serde(default = "CacheConfig::default_max_cache_size")]
    pub max_cache_size: i64,

    /// Run a silent GC before every cache add.
    #[serde(default = "CacheConfig::default_auto_gc")]
    pub auto_gc: bool,

    /// Leaves that take at least this many seconds are worth caching.
    #[serde(default = "CacheConfig::default_min_deploy_time")]
    pub min_deploy_time: u64,

    /// Ask the server to compress cache backups. Off by default: not
    /// every edition supports it.
    #[serde(default)]
    pub compress: bool,
}

impl CacheConfig {
    fn default_root_path() -> String {
        ".dbbm/cache".to_string()
    }

    fn default_max_cache_size() -> i64 {
        -1
    }

    fn default_auto_gc() -> bool {
        true
    }

    fn default_min_deploy_time() -> u64 {
        10
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_path: Self::default_root_path(),
            max_cache_size: Self::default_max_cache_size(),
            auto_gc: Self::default_auto_gc(),
            min_deploy_time: Self::default_min_deploy_time(),
            compress: false,
        }
    }
}

/// BEL counts for the buzzer side-channel.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BeepsConfig {
    #[serde(default)]
    pub start: u32,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub error: u32,
}

/// One release in the releases file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    pub name: String,

    /// Release whose backups (or deployed state) this one builds on.
    pub baseline: Option<String>,

    /// Feature names applied by this release, in order.
    #[serde(default)]
    pub features: Vec<String>,
}

/// One entry of a feature recipe or task-definition command list:
/// a single-key object `{ "<taskKind>": { ...parameters } }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct RecipeEntry(pub serde_json::Map<String, serde_json::Value>);

impl RecipeEntry {
    /// Split into the task kind and its parameter object.
    pub fn kind_and_params(&self) -> Result<(&str, &serde_json::Map<String, serde_json::Value>)> {
        let mut entries = self.0.iter();
        let (kind, params) = entries
            .next()
            .ok_or_else(|| Error::config("empty recipe entry"))?;
        if entries.next().is_some() {
            return Err(Error::config(format!(
                "recipe entry must hold exactly one task, found {} keys",
                self.0.len()
            )));
        }
        let params = params.as_object().ok_or_else(|| {
            Error::config(format!("parameters of task '{kind}' must be an object"))
        })?;
        Ok((kind, params))
    }
}

/// A feature as loaded from disk.
#[derive(Debug, Clone)]
pub struct Feature {
    pub name: String,

    /// Directory containing the feature file; task paths resolve here.
    pub base_dir: PathBuf,

    pub recipe: Vec<RecipeEntry>,

    /// Extra string fields of the feature file, exposed as `$(f:name)`.
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct FeatureFile {
    name: String,

    #[serde(default)]
    recipe: Vec<RecipeEntry>,

    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

/// A reusable task definition.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub name: String,

    /// Default context variables, overridable per recipe entry.
    #[serde(default)]
    pub define: BTreeMap<String, String>,

    /// Paths (after substitution) that must exist before the task runs.
    #[serde(default)]
    pub requires: Vec<String>,

    /// Expansions per command; the engine consumes `deploy`.
    #[serde(default)]
    pub commands: BTreeMap<String, Vec<RecipeEntry>>,
}

/// Everything loaded for one project: configs plus resolved releases,
/// features, and task definitions.
#[derive(Debug)]
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub user: UserConfig,
    pub releases: Vec<ReleaseConfig>,
    pub features: BTreeMap<String, Feature>,
    pub tasks: BTreeMap<String, TaskDefinition>,
}

impl Project {
    /// Load a project given the path of its `dbbm.json`.
    pub fn load(project_file: &Path) -> Result<Self> {
        let root = project_file
            .parent()
            .ok_or_else(|| Error::config_in("project file has no parent directory", project_file))?
            .to_path_buf();

        let config: ProjectConfig = read_json(project_file)?;
        if config.databases.is_empty() {
            return Err(Error::config_in(
                "project declares no databases",
                project_file,
            ));
        }

        let user_path = root.join(USER_FILE_NAME);
        let user: UserConfig = if user_path.exists() {
            read_json(&user_path)?
        } else {
            UserConfig::default()
        };

        let releases = load_releases(&root.join(&config.releases))?;
        let features = load_features(&root, &config.features)?;
        let tasks = load_tasks(&root, &config.tasks)?;

        Ok(Self {
            root,
            config,
            user,
            releases,
            features,
            tasks,
        })
    }

    /// Look up a release by name.
    pub fn release(&self, name: &str) -> Result<&ReleaseConfig> {
        self.releases
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::UnknownRelease(name.to_string()))
    }

    /// The release to deploy: the `-r` override, else the project default.
    pub fn active_release(&self, override_name: Option<&str>) -> Result<&ReleaseConfig> {
        match override_name.or(self.config.active_release.as_deref()) {
            Some(name) => self.release(name),
            None => Err(Error::config(
                "no release selected: pass -r or set activeRelease in dbbm.json",
            )),
        }
    }
}

/// Read and deserialize one JSON file, attributing failures to it.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config_in(format!("cannot read: {e}"), path))?;
    serde_json::from_str(&content).map_err(|e| Error::config_in(e.to_string(), path))
}

fn load_releases(path: &Path) -> Result<Vec<ReleaseConfig>> {
    let releases: Vec<ReleaseConfig> = read_json(path)?;

    let mut seen = std::collections::BTreeSet::new();
    for release in &releases {
        if !seen.insert(release.name.as_str()) {
            return Err(Error::config_in(
                format!("duplicate release name: {}", release.name),
                path,
            ));
        }
    }
    Ok(releases)
}

fn load_features(root: &Path, pattern: &str) -> Result<BTreeMap<String, Feature>> {
    let mut features = BTreeMap::new();

    for path in glob_files(root, pattern)? {
        let file: FeatureFile = read_json(&path)?;
        let base_dir = path
            .parent()
            .unwrap_or(root)
            .to_path_buf();

        let attributes = file
            .extra
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect();

        let feature = Feature {
            name: file.name.clone(),
            base_dir,
            recipe: file.recipe,
            attributes,
        };
        if features.insert(file.name.clone(), feature).is_some() {
            return Err(Error::config_in(
                format!("duplicate feature name: {}", file.name),
                &path,
            ));
        }
    }
    Ok(features)
}

fn load_tasks(root: &Path, pattern: &str) -> Result<BTreeMap<String, TaskDefinition>> {
    let mut tasks = BTreeMap::new();

    for path in glob_files(root, pattern)? {
        let task: TaskDefinition = read_json(&path)?;
        if let Some(previous) = tasks.insert(task.name.clone(), task) {
            return Err(Error::config_in(
                format!("duplicate task name: {}", previous.name),
                &path,
            ));
        }
    }
    Ok(tasks)
}

/// Expand a glob relative to `root` into a sorted list of files.
fn glob_files(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let glob = globset::GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| Error::config(format!("invalid glob '{pattern}': {e}")))?
        .compile_matcher();

    let mut matches = Vec::new();
    for entry in ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build()
    {
        let entry = entry.map_err(|e| Error::config(format!("walk error under {}: {e}", root.display())))?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if glob.is_match(relative) {
            matches.push(entry.into_path());
        }
    }

    matches.sort();
    Ok(matches)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
