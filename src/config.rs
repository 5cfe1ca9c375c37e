use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults;
use crate::pipeline::RenderSettings;
use crate::plugin::DirectoryRegistry;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub host: HostConfig,
    pub plugins: PluginsConfig,
    pub progress: ProgressConfig,
    pub render: RenderConfig,
}

/// Plugin host executable
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    pub executable: PathBuf,
    pub block_size: u32,
}

/// Where plugin bundles are found
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    pub base_dir: PathBuf,
    /// Never fall back to the older main chain.
    pub require_primary: bool,
    /// Explicit name → bundle paths, checked before the directory scan.
    pub overrides: BTreeMap<String, PathBuf>,
}

/// Interpolated progress while a plugin runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProgressConfig {
    pub poll_interval_ms: u64,
    pub main_secs: f64,
    pub reverb_secs: f64,
    pub plugin_secs: f64,
}

/// Scratch file placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RenderConfig {
    pub temp_dir: Option<PathBuf>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("vst3-host"),
            block_size: defaults::BLOCK_SIZE,
        }
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            base_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("vocalrender")
                .join("plugins"),
            require_primary: false,
            overrides: BTreeMap::new(),
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            main_secs: defaults::MAIN_EXPECTED_SECS,
            reverb_secs: defaults::REVERB_EXPECTED_SECS,
            plugin_secs: defaults::PLUGIN_EXPECTED_SECS,
        }
    }
}

fn seconds(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOCALRENDER_HOST_EXE → host.executable
    /// - VOCALRENDER_PLUGIN_DIR → plugins.base_dir
    /// - VOCALRENDER_BLOCK_SIZE → host.block_size (ignored unless 64..=65536)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("VOCALRENDER_HOST_EXE")
            && !host.is_empty()
        {
            self.host.executable = PathBuf::from(host);
        }

        if let Ok(dir) = std::env::var("VOCALRENDER_PLUGIN_DIR")
            && !dir.is_empty()
        {
            self.plugins.base_dir = PathBuf::from(dir);
        }

        if let Ok(block) = std::env::var("VOCALRENDER_BLOCK_SIZE")
            && let Ok(block) = block.trim().parse::<u32>()
            && (defaults::MIN_BLOCK_SIZE..=defaults::MAX_BLOCK_SIZE).contains(&block)
        {
            self.host.block_size = block;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/vocalrender/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vocalrender")
            .join("config.toml")
    }

    /// Renderer settings derived from this configuration.
    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            block_size: self
                .host
                .block_size
                .clamp(defaults::MIN_BLOCK_SIZE, defaults::MAX_BLOCK_SIZE),
            require_primary: self.plugins.require_primary,
            poll_interval: Duration::from_millis(self.progress.poll_interval_ms.max(1)),
            main_expected: seconds(self.progress.main_secs),
            reverb_expected: seconds(self.progress.reverb_secs),
            plugin_expected: seconds(self.progress.plugin_secs),
            temp_dir: self.render.temp_dir.clone(),
        }
    }

    /// Scans the plugin directory and applies the configured overrides.
    pub fn registry(&self) -> DirectoryRegistry {
        DirectoryRegistry::scan(&self.host.executable, &self.plugins.base_dir)
            .with_overrides(self.plugins.overrides.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginRegistry;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_vocalrender_env() {
        remove_env("VOCALRENDER_HOST_EXE");
        remove_env("VOCALRENDER_PLUGIN_DIR");
        remove_env("VOCALRENDER_BLOCK_SIZE");
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.host.executable, PathBuf::from("vst3-host"));
        assert_eq!(config.host.block_size, 2048);

        assert!(!config.plugins.require_primary);
        assert!(config.plugins.overrides.is_empty());
        assert!(config.plugins.base_dir.ends_with("vocalrender/plugins"));

        assert_eq!(config.progress.poll_interval_ms, 1000);
        assert_eq!(config.progress.main_secs, 50.0);
        assert_eq!(config.progress.reverb_secs, 18.0);
        assert_eq!(config.progress.plugin_secs, 10.0);

        assert_eq!(config.render.temp_dir, None);
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [host]
            executable = "/opt/vst/host"
            block_size = 4096

            [plugins]
            base_dir = "/srv/plugins"
            require_primary = true

            [plugins.overrides]
            globalmix = "/srv/custom/GlobalMix.vst3"

            [progress]
            poll_interval_ms = 250
            main_secs = 90.0

            [render]
            temp_dir = "/var/tmp/vocalrender"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.host.executable, PathBuf::from("/opt/vst/host"));
        assert_eq!(config.host.block_size, 4096);
        assert_eq!(config.plugins.base_dir, PathBuf::from("/srv/plugins"));
        assert!(config.plugins.require_primary);
        assert_eq!(
            config.plugins.overrides.get("globalmix"),
            Some(&PathBuf::from("/srv/custom/GlobalMix.vst3"))
        );
        assert_eq!(config.progress.poll_interval_ms, 250);
        assert_eq!(config.progress.main_secs, 90.0);
        // Not set in the file
        assert_eq!(config.progress.reverb_secs, 18.0);
        assert_eq!(config.render.temp_dir, Some(PathBuf::from("/var/tmp/vocalrender")));
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let toml_content = r#"
            [host]
            block_size = 512
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.host.block_size, 512);
        assert_eq!(config.host.executable, HostConfig::default().executable);
        assert_eq!(config.plugins, PluginsConfig::default());
        assert_eq!(config.progress, ProgressConfig::default());
    }

    #[test]
    fn test_env_override_host() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalrender_env();

        set_env("VOCALRENDER_HOST_EXE", "/usr/local/bin/host");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.host.executable, PathBuf::from("/usr/local/bin/host"));
        assert_eq!(config.host.block_size, 2048); // Not overridden

        clear_vocalrender_env();
    }

    #[test]
    fn test_env_override_all() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalrender_env();

        set_env("VOCALRENDER_HOST_EXE", "host");
        set_env("VOCALRENDER_PLUGIN_DIR", "/plugins");
        set_env("VOCALRENDER_BLOCK_SIZE", "1024");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.host.executable, PathBuf::from("host"));
        assert_eq!(config.plugins.base_dir, PathBuf::from("/plugins"));
        assert_eq!(config.host.block_size, 1024);

        clear_vocalrender_env();
    }

    #[test]
    fn test_env_override_block_size_out_of_range_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalrender_env();

        for bad in ["16", "1000000", "big", ""] {
            set_env("VOCALRENDER_BLOCK_SIZE", bad);
            let config = Config::default().with_env_overrides();
            assert_eq!(config.host.block_size, 2048, "value {bad:?}");
        }

        clear_vocalrender_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_vocalrender_env();

        set_env("VOCALRENDER_PLUGIN_DIR", "");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.plugins.base_dir, PluginsConfig::default().base_dir);

        clear_vocalrender_env();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let invalid_toml = r#"
            [host
            executable = "broken
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(invalid_toml.as_bytes()).unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_path_is_xdg_compliant() {
        let path = Config::default_path();
        let path_str = path.to_string_lossy();

        assert!(path_str.contains("vocalrender"));
        assert!(path_str.ends_with("config.toml"));
    }

    #[test]
    fn test_load_or_default_returns_default_for_missing_file() {
        let missing_path = Path::new("/tmp/nonexistent_vocalrender_config_12345.toml");
        let config = Config::load_or_default(missing_path).unwrap();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_errors_on_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[host\nexecutable = ").unwrap();

        let err = Config::load_or_default(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }

    #[test]
    fn test_render_settings_from_config() {
        let mut config = Config::default();
        config.host.block_size = 10;
        config.progress.poll_interval_ms = 0;
        config.progress.reverb_secs = -3.0;
        config.render.temp_dir = Some(PathBuf::from("/scratch"));

        let settings = config.render_settings();
        assert_eq!(settings.block_size, defaults::MIN_BLOCK_SIZE);
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
        assert_eq!(settings.main_expected, Duration::from_secs(50));
        assert_eq!(settings.reverb_expected, Duration::ZERO);
        assert_eq!(settings.temp_dir, Some(PathBuf::from("/scratch")));
    }

    #[test]
    fn test_registry_applies_overrides() {
        let mut config = Config::default();
        config.plugins.base_dir = PathBuf::from("/nonexistent/vocalrender/plugins");
        config
            .plugins
            .overrides
            .insert("Reverb 2".to_string(), PathBuf::from("/x/verb.vst3"));

        let registry = config.registry();
        assert_eq!(registry.host(), Path::new("vst3-host"));
        assert_eq!(
            registry.resolve("reverb2").map(|h| h.plugin),
            Some(PathBuf::from("/x/verb.vst3"))
        );
    }
}
