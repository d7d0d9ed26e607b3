use serde::{Serialize, Deserialize};

pub const SETTINGS_VERSION: &str = "1.0.0";

/// Persisted operator preferences. Unknown keys are ignored on load.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub main_pages: u32,
    pub supplement_count: u32,

    pub left_camera_device: String,
    pub left_camera_resolution: String,
    pub left_camera_rotate: i32,
    pub right_camera_device: String,
    pub right_camera_resolution: String,
    pub right_camera_rotate: i32,

    pub left_trim_top: i32,
    pub left_trim_bottom: i32,
    pub left_trim_left: i32,
    pub left_trim_right: i32,
    pub right_trim_top: i32,
    pub right_trim_bottom: i32,
    pub right_trim_left: i32,
    pub right_trim_right: i32,

    pub last_modified: Option<String>,
    pub version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            main_pages: 32,
            supplement_count: 0,
            left_camera_device: String::new(),
            left_camera_resolution: "720p".to_string(),
            left_camera_rotate: 0,
            right_camera_device: String::new(),
            right_camera_resolution: "720p".to_string(),
            right_camera_rotate: 0,
            left_trim_top: 0,
            left_trim_bottom: 0,
            left_trim_left: 0,
            left_trim_right: 0,
            right_trim_top: 0,
            right_trim_bottom: 0,
            right_trim_left: 0,
            right_trim_right: 0,
            last_modified: None,
            version: SETTINGS_VERSION.to_string(),
        }
    }
}
