//! Editor configuration.
//!
//! Defaults suit an interactive session; every value can be overridden with a
//! builder method or from the environment:
//!
//! - `PAGEDECK_THUMBNAIL_WIDTH`: thumbnail width in pixels (default 160)
//! - `PAGEDECK_RENDER_WORKERS`: render worker threads (default: CPUs, max 4)
//! - `PAGEDECK_CACHE_MB`: thumbnail cache limit in MB (default 64)
//! - `PAGEDECK_EXPORT_SCALE`: export resolution in pixels per point (default 2.0)
//! - `PAGEDECK_HISTORY_LIMIT`: undo steps kept (default 100)
//! - `PAGEDECK_POLL_INTERVAL_MS`: idle worker poll interval (default 5)

use crate::ConfigError;
use pagedeck_scheduler::WorkerPoolConfig;
use std::str::FromStr;
use std::time::Duration;

const MB: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub thumbnail_width: u32,
    pub render_workers: usize,
    pub poll_interval: Duration,
    /// Thumbnail cache limit in bytes.
    pub cache_size: usize,
    pub export_scale: f32,
    pub history_limit: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2);
        Self {
            thumbnail_width: 160,
            render_workers: cpus.min(4),
            poll_interval: Duration::from_millis(5),
            cache_size: 64 * MB,
            export_scale: 2.0,
            history_limit: 100,
        }
    }
}

impl EditorConfig {
    pub fn with_thumbnail_width(mut self, width: u32) -> Self {
        self.thumbnail_width = width;
        self
    }

    pub fn with_render_workers(mut self, workers: usize) -> Self {
        self.render_workers = workers;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cache_mb(mut self, mb: usize) -> Self {
        self.cache_size = mb * MB;
        self
    }

    pub fn with_export_scale(mut self, scale: f32) -> Self {
        self.export_scale = scale;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn cache_mb(&self) -> usize {
        self.cache_size / MB
    }

    pub fn worker_pool(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::new(self.render_workers).with_poll_interval(self.poll_interval)
    }

    /// Reads overrides from the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is set to an unparsable or invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`EditorConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(width) = parse(&lookup, "PAGEDECK_THUMBNAIL_WIDTH")? {
            config.thumbnail_width = width;
        }
        if let Some(workers) = parse(&lookup, "PAGEDECK_RENDER_WORKERS")? {
            config.render_workers = workers;
        }
        if let Some(mb) = parse::<usize, _>(&lookup, "PAGEDECK_CACHE_MB")? {
            config.cache_size = mb * MB;
        }
        if let Some(scale) = parse(&lookup, "PAGEDECK_EXPORT_SCALE")? {
            config.export_scale = scale;
        }
        if let Some(limit) = parse(&lookup, "PAGEDECK_HISTORY_LIMIT")? {
            config.history_limit = limit;
        }
        if let Some(ms) = parse(&lookup, "PAGEDECK_POLL_INTERVAL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Rejects values the editor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thumbnail_width == 0 {
            return Err(invalid("thumbnail_width", self.thumbnail_width));
        }
        if self.render_workers == 0 {
            return Err(invalid("render_workers", self.render_workers));
        }
        if !(self.export_scale.is_finite() && self.export_scale > 0.0) {
            return Err(invalid("export_scale", self.export_scale));
        }
        if self.history_limit == 0 {
            return Err(invalid("history_limit", self.history_limit));
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
    }
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue { key, value: value.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = EditorConfig::default();
        assert_eq!(config.thumbnail_width, 160);
        assert!(config.render_workers >= 1 && config.render_workers <= 4);
        assert_eq!(config.cache_mb(), 64);
        assert_eq!(config.export_scale, 2.0);
        assert_eq!(config.history_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = EditorConfig::default()
            .with_thumbnail_width(96)
            .with_render_workers(3)
            .with_cache_mb(8)
            .with_export_scale(1.5)
            .with_history_limit(7)
            .with_poll_interval(Duration::from_millis(1));

        assert_eq!(config.thumbnail_width, 96);
        assert_eq!(config.cache_size, 8 * MB);
        assert_eq!(config.history_limit, 7);

        let pool = config.worker_pool();
        assert_eq!(pool.num_workers, 3);
        assert_eq!(pool.poll_interval, Duration::from_millis(1));
    }

    #[test]
    fn test_from_lookup() {
        let config = EditorConfig::from_lookup(lookup(&[
            ("PAGEDECK_THUMBNAIL_WIDTH", "200"),
            ("PAGEDECK_RENDER_WORKERS", "2"),
            ("PAGEDECK_CACHE_MB", "16"),
            ("PAGEDECK_EXPORT_SCALE", "3.0"),
            ("PAGEDECK_HISTORY_LIMIT", " 5 "),
            ("PAGEDECK_POLL_INTERVAL_MS", "20"),
        ]))
        .expect("valid overrides");

        assert_eq!(config.thumbnail_width, 200);
        assert_eq!(config.render_workers, 2);
        assert_eq!(config.cache_mb(), 16);
        assert_eq!(config.export_scale, 3.0);
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_from_lookup_partial_keeps_defaults() {
        let config = EditorConfig::from_lookup(lookup(&[("PAGEDECK_CACHE_MB", "1")]))
            .expect("valid override");

        assert_eq!(config.cache_mb(), 1);
        assert_eq!(config.thumbnail_width, 160);
    }

    #[test]
    fn test_from_lookup_invalid() {
        let err = EditorConfig::from_lookup(lookup(&[("PAGEDECK_THUMBNAIL_WIDTH", "wide")]))
            .expect_err("not a number");
        assert_eq!(
            err,
            ConfigError::InvalidValue { key: "PAGEDECK_THUMBNAIL_WIDTH", value: "wide".into() }
        );

        let err = EditorConfig::from_lookup(lookup(&[("PAGEDECK_EXPORT_SCALE", "-1")]))
            .expect_err("negative scale");
        assert!(matches!(err, ConfigError::InvalidValue { key: "export_scale", .. }));
    }
}
