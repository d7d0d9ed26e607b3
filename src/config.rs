use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: String,
    pub storage_dir: String,
    pub max_upload_size: usize,
    pub session_max_age_secs: u64,
    pub session_sweep_interval_secs: u64,
    pub pdf_keep_count: usize,
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    pub thumbnail_quality: u8,
    pub shutdown_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            storage_dir: "./storage".to_string(),
            max_upload_size: 100 * 1024 * 1024,
            session_max_age_secs: 2 * 60 * 60,
            session_sweep_interval_secs: 60 * 60,
            pdf_keep_count: 5,
            thumbnail_max_width: 150,
            thumbnail_max_height: 190,
            thumbnail_quality: 70,
            shutdown_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Reads `path`, or writes the defaults there when it does not exist yet.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
        } else {
            let default_config = Config::default();
            let toml_string = toml::to_string_pretty(&default_config)
                .context("failed to serialize default config")?;
            std::fs::write(path, toml_string)
                .with_context(|| format!("failed to write {}", path.display()))?;
            Ok(default_config)
        }
    }

    pub fn from_env_config() -> anyhow::Result<Self> {
        let path = std::env::var("BOOKLET_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let cfg = Self::load(Path::new(&path))?;
        cfg.ensure_dirs()?;
        Ok(cfg)
    }

    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [self.temp_images_dir(), self.generated_pdfs_dir(), self.settings_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create storage dir {}", dir.display()))?;
            log::info!("storage directory ready: {}", dir.display());
        }
        Ok(())
    }

    pub fn temp_images_dir(&self) -> PathBuf {
        Path::new(&self.storage_dir).join("temp_images")
    }

    pub fn generated_pdfs_dir(&self) -> PathBuf {
        Path::new(&self.storage_dir).join("generated_pdfs")
    }

    pub fn settings_dir(&self) -> PathBuf {
        Path::new(&self.storage_dir).join("settings")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.settings_dir().join("global_settings.json")
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs.max(1))
    }
}
