use serde::{Serialize, Deserialize};

/// Sidecar written next to a saved PDF as `<stem>.json`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PdfSidecar {
    pub filename: String,
    pub scan_duration: f64,
    /// Seconds since the Unix epoch.
    pub created_at: f64,
    pub file_size: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct RecentPdf {
    pub filename: String,
    pub display_name: String,
    pub size_mb: f64,
    pub created_at: f64,
    pub scan_info: String,
    pub scan_duration: Option<f64>,
    pub formatted_date: String,
    pub download_url: String,
}
