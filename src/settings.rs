use crate::models::settings::{Settings, SETTINGS_VERSION};
use parking_lot::Mutex;
use serde::Serialize;
use std::io;
use std::path::PathBuf;

/// JSON-file backed operator settings.
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub last_modified: Option<String>,
    pub version: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    /// Missing or corrupt files yield defaults stamped with the current time.
    pub fn load(&self) -> Settings {
        match std::fs::read(&self.path) {
            Ok(raw) => match serde_json::from_slice::<Settings>(&raw) {
                Ok(settings) => return settings,
                Err(e) => log::warn!("failed to parse settings, using defaults: {e}"),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("failed to read settings, using defaults: {e}"),
        }
        Settings { last_modified: Some(now_iso()), ..Settings::default() }
    }

    pub fn save(&self, mut settings: Settings) -> io::Result<Settings> {
        settings.last_modified = Some(now_iso());
        let json = serde_json::to_vec_pretty(&settings).map_err(io::Error::other)?;
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        Ok(settings)
    }

    pub fn reset(&self) -> io::Result<Settings> {
        self.save(Settings::default())
    }

    pub fn sync_info(&self) -> SyncInfo {
        if !self.path.exists() {
            let settings = self.load();
            return SyncInfo {
                last_modified: settings.last_modified,
                version: settings.version,
                available: true,
                error: None,
            };
        }
        match std::fs::read(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_slice::<Settings>(&raw).map_err(|e| e.to_string()))
        {
            Ok(settings) => SyncInfo {
                last_modified: settings.last_modified,
                version: settings.version,
                available: true,
                error: None,
            },
            Err(e) => SyncInfo {
                last_modified: None,
                version: SETTINGS_VERSION.to_string(),
                available: false,
                error: Some(e),
            },
        }
    }
}

fn now_iso() -> String {
    chrono::Local::now().to_rfc3339()
}
