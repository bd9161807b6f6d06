//! Configuration Vault – reads/writes `~/.wayfind/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use wayfind_runtime::{LogFormat, LogSettings, NavigatorConfig};

/// Persisted user configuration stored in `~/.wayfind/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Site description (floor plans, destinations, connectors).
    #[serde(default = "default_site_path")]
    pub site_path: String,

    #[serde(default)]
    pub log: LogSettings,

    /// Fusion, routing and tracking tunables plus the tick period.
    #[serde(default)]
    pub navigator: NavigatorConfig,
}

fn default_site_path() -> String {
    "config/ryokan.toml".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            site_path: default_site_path(),
            log: LogSettings::default(),
            navigator: NavigatorConfig::default(),
        }
    }
}

/// Return the path to `~/.wayfind/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".wayfind").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `WAYFIND_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WAYFIND_SITE` | `site_path` |
/// | `WAYFIND_TICK_MS` | `navigator.tick_ms` |
/// | `WAYFIND_LOG_FORMAT` | `log.format` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WAYFIND_SITE") {
        cfg.site_path = v;
    }
    if let Ok(v) = std::env::var("WAYFIND_TICK_MS") {
        match v.parse::<u64>() {
            Ok(ms) if ms > 0 => cfg.navigator.tick_ms = ms,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("WAYFIND_LOG_FORMAT") {
        cfg.log.format = LogFormat::parse(&v);
    }
}

/// Save the config to disk, creating `~/.wayfind/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    // `load_from` reads WAYFIND_* variables, so every test that loads or
    // sets them runs under this lock.
    static ENV: Mutex<()> = Mutex::new(());

    fn env_lock() -> MutexGuard<'static, ()> {
        ENV.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_meta = std::fs::metadata(path.parent().expect("parent")).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.site_path, "config/ryokan.toml");
        assert_eq!(loaded.navigator.tick_ms, 1_000);
        assert_eq!(loaded.navigator.fusion.confidence_threshold, 0.7);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "site_path = \"/srv/hotel.toml\"\n\n[navigator.tracker]\narrival_radius = 2.5\n",
        )
        .expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.site_path, "/srv/hotel.toml");
        assert_eq!(loaded.navigator.tracker.arrival_radius, 2.5);
        assert_eq!(loaded.navigator.tracker.recalculation_distance, 5.0);
        assert_eq!(loaded.log, LogSettings::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "site_path = [").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_wayfind_dir() {
        let p = config_path_for_home("/home/visitor");
        assert!(p.to_string_lossy().contains(".wayfind"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let _env = env_lock();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_site() {
        let _env = env_lock();
        // SAFETY: env access in this module is serialised by `ENV`.
        unsafe { std::env::set_var("WAYFIND_SITE", "/srv/mall.toml") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.site_path, "/srv/mall.toml");
        unsafe { std::env::remove_var("WAYFIND_SITE") };
    }

    #[test]
    fn apply_env_overrides_tick_ignores_garbage() {
        let _env = env_lock();
        // SAFETY: env access in this module is serialised by `ENV`.
        unsafe { std::env::set_var("WAYFIND_TICK_MS", "soon") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.navigator.tick_ms, 1_000);

        unsafe { std::env::set_var("WAYFIND_TICK_MS", "250") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.navigator.tick_ms, 250);
        unsafe { std::env::remove_var("WAYFIND_TICK_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_log_format() {
        let _env = env_lock();
        // SAFETY: env access in this module is serialised by `ENV`.
        unsafe { std::env::set_var("WAYFIND_LOG_FORMAT", "json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.log.format, LogFormat::Json);
        unsafe { std::env::remove_var("WAYFIND_LOG_FORMAT") };
    }
}
