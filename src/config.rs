//! Harvest configuration: defaults, environment overrides and validation.
//!
//! Every setting has a default. `from_env` overrides them from
//! `VENDOR_HARVEST_*` variables, and the CLI overrides the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::catalog::DEFAULT_BATCH_SIZE;
use crate::dispatch::DEFAULT_MAX_WORKERS;
use crate::harvest::{
    DEFAULT_BATCH_PAUSE, DEFAULT_EXPORT_EVERY, DEFAULT_TASK_TIMEOUT, DEFAULT_TASKS_PER_ITEM,
};
use crate::limiter::DEFAULT_MAX_PER_MINUTE;
use crate::persistence::StateLayout;
use crate::types::{Category, InvalidCategory};

/// Default state directory, relative to the working directory.
pub const DEFAULT_STATE_DIR: &str = "harvest_state";

/// Default catalog file, relative to the working directory.
pub const DEFAULT_CATALOG: &str = "state_city_zip.json";

pub const ENV_STATE_DIR: &str = "VENDOR_HARVEST_STATE_DIR";
pub const ENV_CATALOG: &str = "VENDOR_HARVEST_CATALOG";
pub const ENV_BATCH_SIZE: &str = "VENDOR_HARVEST_BATCH_SIZE";
pub const ENV_MAX_WORKERS: &str = "VENDOR_HARVEST_MAX_WORKERS";
pub const ENV_MAX_REQUESTS_PER_MINUTE: &str = "VENDOR_HARVEST_MAX_REQUESTS_PER_MINUTE";
/// Comma-separated category names.
pub const ENV_CATEGORIES: &str = "VENDOR_HARVEST_CATEGORIES";

/// Errors in configuration values. All are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    InvalidCategory(#[from] InvalidCategory),

    #[error("unknown category {category:?}; configured categories: {known}")]
    UnknownCategory { category: String, known: String },

    #[error("no categories configured")]
    NoCategories,
}

impl ConfigError {
    fn invalid(name: &str, value: impl ToString, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Settings for a harvest run.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestConfig {
    /// Root of all persisted state.
    pub state_dir: PathBuf,
    /// Location catalog JSON file.
    pub catalog_path: PathBuf,
    pub batch_size: usize,
    pub max_workers: usize,
    pub max_requests_per_minute: usize,
    /// Categories known to this deployment, in run order.
    pub categories: Vec<Category>,
    pub tasks_per_item: usize,
    pub batch_pause: Duration,
    pub export_every: usize,
    /// Deadline for one collaborator command.
    pub task_timeout: Duration,
}

impl HarvestConfig {
    /// Creates a configuration with every default.
    pub fn new() -> Self {
        HarvestConfig {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            catalog_path: PathBuf::from(DEFAULT_CATALOG),
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: DEFAULT_MAX_WORKERS,
            max_requests_per_minute: DEFAULT_MAX_PER_MINUTE,
            categories: Category::defaults(),
            tasks_per_item: DEFAULT_TASKS_PER_ITEM,
            batch_pause: DEFAULT_BATCH_PAUSE,
            export_every: DEFAULT_EXPORT_EVERY,
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }

    /// Creates a configuration from defaults overridden by the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates a configuration from defaults overridden by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = HarvestConfig::new();

        if let Some(dir) = lookup(ENV_STATE_DIR) {
            config.state_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup(ENV_CATALOG) {
            config.catalog_path = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_BATCH_SIZE) {
            config.batch_size = parse_positive(ENV_BATCH_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_WORKERS) {
            config.max_workers = parse_positive(ENV_MAX_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_REQUESTS_PER_MINUTE) {
            config.max_requests_per_minute = parse_positive(ENV_MAX_REQUESTS_PER_MINUTE, &value)?;
        }
        if let Some(value) = lookup(ENV_CATEGORIES) {
            config.categories = parse_categories(&value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_max_requests_per_minute(mut self, max: usize) -> Self {
        self.max_requests_per_minute = max;
        self
    }

    pub fn with_categories(mut self, categories: Vec<Category>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_tasks_per_item(mut self, tasks: usize) -> Self {
        self.tasks_per_item = tasks;
        self
    }

    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    pub fn with_export_every(mut self, batches: usize) -> Self {
        self.export_every = batches;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Checks that every numeric limit is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::invalid("batch size", 0, "must be at least 1"));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::invalid("max workers", 0, "must be at least 1"));
        }
        if self.max_requests_per_minute == 0 {
            return Err(ConfigError::invalid("max requests per minute", 0, "must be at least 1"));
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::invalid("task timeout", "0s", "must be positive"));
        }
        if self.categories.is_empty() {
            return Err(ConfigError::NoCategories);
        }
        Ok(())
    }

    /// Resolves a category name against the configured categories.
    pub fn resolve_category(&self, name: &str) -> Result<Category, ConfigError> {
        let category = Category::parse(name)?;
        if self.categories.contains(&category) {
            Ok(category)
        } else {
            Err(ConfigError::UnknownCategory {
                category: category.to_string(),
                known: self
                    .categories
                    .iter()
                    .map(Category::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
        }
    }

    /// Returns the categories selected by an optional `--category` flag.
    pub fn selected_categories(&self, name: Option<&str>) -> Result<Vec<Category>, ConfigError> {
        match name {
            Some(name) => Ok(vec![self.resolve_category(name)?]),
            None => Ok(self.categories.clone()),
        }
    }

    pub fn layout(&self) -> StateLayout {
        StateLayout::new(&self.state_dir)
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(name, value, "not a number"))?;
    if parsed <= T::default() {
        return Err(ConfigError::invalid(name, value, "must be at least 1"));
    }
    Ok(parsed)
}

fn parse_categories(value: &str) -> Result<Vec<Category>, ConfigError> {
    let mut categories = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let category = Category::parse(name)?;
        if !categories.contains(&category) {
            categories.push(category);
        }
    }
    if categories.is_empty() {
        return Err(ConfigError::NoCategories);
    }
    Ok(categories)
}
