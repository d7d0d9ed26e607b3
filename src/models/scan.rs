use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Active,
    Completed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanSession {
    pub session_id: String,
    pub total_pages: u32,
    pub supplement_count: u32,
    pub trim_settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub spreads: Vec<Spread>,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpreadStatus {
    Captured,
    Retaken,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SpreadImages {
    pub left: Option<String>,
    pub right: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Spread {
    pub spread_index: usize,
    pub timestamp: DateTime<Utc>,
    pub left_page: Option<serde_json::Value>,
    pub right_page: Option<serde_json::Value>,
    pub page_numbers: Vec<serde_json::Value>,
    pub images: SpreadImages,
    pub status: SpreadStatus,
}
