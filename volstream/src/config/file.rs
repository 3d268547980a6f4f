//! INI config file loading and saving.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use tracing::{debug, info};

use super::size::parse_size;
use super::{ConfigError, PipelineConfig};
use crate::cache::CacheConfig;

const SCHEDULER: &str = "scheduler";
const CACHE: &str = "cache";
const ATLAS: &str = "atlas";

/// Reads and writes [`PipelineConfig`] as an INI file.
///
/// Missing sections or keys keep their defaults, so a partial file is valid.
pub struct ConfigFile;

impl ConfigFile {
    /// Default config file location (`<config dir>/volstream/config.ini`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("volstream").join("config.ini"))
    }

    /// Loads the default config file, or defaults if it does not exist.
    pub fn load() -> Result<PipelineConfig, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(PipelineConfig::default())
            }
        }
    }

    /// Loads and validates a config file.
    pub fn load_from(path: &Path) -> Result<PipelineConfig, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini(&ini)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Writes a config file, creating parent directories as needed.
    pub fn save_to(config: &PipelineConfig, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        Self::to_ini(config).write_to_file(path).map_err(write_err)
    }

    /// Builds a config from parsed INI sections.
    pub fn from_ini(ini: &Ini) -> Result<PipelineConfig, ConfigError> {
        let mut config = PipelineConfig::default();

        if let Some(value) = get(ini, SCHEDULER, "max_active") {
            config.scheduler.max_active = parse_value(SCHEDULER, "max_active", value)?;
        }
        if let Some(value) = get(ini, SCHEDULER, "max_low_priority_active") {
            config.scheduler.max_low_priority_active =
                parse_value(SCHEDULER, "max_low_priority_active", value)?;
        }
        if let Some(value) = get(ini, CACHE, "max_size") {
            let bytes = parse_size(value).ok_or_else(|| ConfigError::Value {
                section: CACHE,
                key: "max_size",
                value: value.to_string(),
            })?;
            config.cache = CacheConfig::new(bytes);
        }
        if let Some(value) = get(ini, ATLAS, "max_edge") {
            config.max_atlas_edge = parse_value(ATLAS, "max_edge", value)?;
        }

        Ok(config)
    }

    /// Renders a config as INI sections.
    pub fn to_ini(config: &PipelineConfig) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some(SCHEDULER))
            .set("max_active", config.scheduler.max_active.to_string())
            .set(
                "max_low_priority_active",
                config.scheduler.max_low_priority_active.to_string(),
            );
        ini.with_section(Some(CACHE))
            .set("max_size", exact_size(config.cache.max_size_bytes));
        ini.with_section(Some(ATLAS))
            .set("max_edge", config.max_atlas_edge.to_string());
        ini
    }
}

/// Formats `bytes` in the largest unit that represents it exactly.
fn exact_size(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [
        ("TB", 1 << 40),
        ("GB", 1 << 30),
        ("MB", 1 << 20),
        ("KB", 1 << 10),
    ];
    UNITS
        .iter()
        .find(|(_, unit)| bytes >= *unit && bytes % unit == 0)
        .map(|(name, unit)| format!("{}{}", bytes / unit, name))
        .unwrap_or_else(|| bytes.to_string())
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section)).and_then(|s| s.get(key))
}

fn parse_value<T: FromStr>(
    section: &'static str,
    key: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Value {
        section,
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            "[scheduler]\nmax_active = 4\nmax_low_priority_active = 2\n\n\
             [cache]\nmax_size = 256MB\n\n[atlas]\nmax_edge = 4096\n",
        );
        let config = ConfigFile::load_from(file.path()).unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::new(4, 2));
        assert_eq!(config.cache.max_size_bytes, 256 * 1024 * 1024);
        assert_eq!(config.max_atlas_edge, 4096);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config("[atlas]\nmax_edge = 1024\n");
        let config = ConfigFile::load_from(file.path()).unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.cache, CacheConfig::default());
        assert_eq!(config.max_atlas_edge, 1024);
    }

    #[test]
    fn test_bad_value_reports_key() {
        let file = write_config("[scheduler]\nmax_active = many\n");
        let err = ConfigFile::load_from(file.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Value {
                section: "scheduler",
                key: "max_active",
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_combination_rejected() {
        let file = write_config("[scheduler]\nmax_active = 2\nmax_low_priority_active = 8\n");
        assert!(matches!(
            ConfigFile::load_from(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigFile::load_from(&dir.path().join("nope.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_exact_size() {
        assert_eq!(exact_size(1 << 30), "1GB");
        assert_eq!(exact_size(3 << 19), "1536KB");
        assert_eq!(exact_size(1537), "1537");
        assert_eq!(parse_size(&exact_size(1537)), Some(1537));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");
        let config = PipelineConfig::default()
            .with_scheduler(SchedulerConfig::new(6, 3))
            .with_cache(CacheConfig::new(512 * 1024 * 1024))
            .with_max_atlas_edge(8192);

        ConfigFile::save_to(&config, &path).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }
}
