use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created: DateTime<Utc>,
    pub images: Vec<ImageRecord>,
    pub pdf_name: Option<String>,
}

impl Session {
    pub fn new(id: String, created: DateTime<Utc>) -> Self {
        Self { id, created, images: Vec::new(), pdf_name: None }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageRecord {
    pub id: String,
    pub path: PathBuf,
    pub metadata: serde_json::Value,
    pub stored_at: DateTime<Utc>,
    pub processed_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub processed_at: Option<DateTime<Utc>>,
    pub trim_applied: bool,
    pub enhanced: bool,
}

impl ImageRecord {
    pub fn new(id: String, path: PathBuf, metadata: serde_json::Value) -> Self {
        Self {
            id,
            path,
            metadata,
            stored_at: Utc::now(),
            processed_path: None,
            thumbnail_path: None,
            processed_at: None,
            trim_applied: false,
            enhanced: false,
        }
    }

    pub fn apply(&mut self, update: ImageUpdate) {
        if let Some(p) = update.processed_path { self.processed_path = Some(p); }
        if let Some(t) = update.thumbnail_path { self.thumbnail_path = t; }
        if let Some(t) = update.trim_applied { self.trim_applied = t; }
        if let Some(e) = update.enhanced { self.enhanced = e; }
        if self.processed_path.is_some() || self.thumbnail_path.is_some() {
            self.processed_at = Some(Utc::now());
        }
    }
}

/// Fields merged into an existing image record; `None` leaves a field untouched.
/// `thumbnail_path: Some(None)` clears a thumbnail from an earlier run.
#[derive(Debug, Clone, Default)]
pub struct ImageUpdate {
    pub processed_path: Option<PathBuf>,
    pub thumbnail_path: Option<Option<PathBuf>>,
    pub trim_applied: Option<bool>,
    pub enhanced: Option<bool>,
}
