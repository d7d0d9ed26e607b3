use crate::errors::CameraError;
use crate::models::camera::{CameraConfig, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Deserialize, Debug)]
pub struct ConfigureReq {
    pub camera_id: Option<String>,
    pub side: Option<String>,
    pub resolution: Option<String>,
    pub rotation: Option<i32>,
}

#[derive(Serialize, Debug, Clone)]
pub struct StreamInfo {
    pub status: &'static str,
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize, Debug)]
pub struct CameraStatus {
    pub connected_cameras: BTreeMap<Side, CameraConfig>,
    pub active_streams: Vec<Side>,
    pub total_cameras: usize,
}

/// Configuration and streaming state of the left/right cameras.
#[derive(Default)]
pub struct CameraRegistry {
    configs: BTreeMap<Side, CameraConfig>,
    streams: BTreeMap<Side, StreamInfo>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&mut self, req: ConfigureReq) -> Result<(Side, CameraConfig), CameraError> {
        let camera_id = req.camera_id.filter(|s| !s.is_empty()).ok_or(CameraError::MissingField("camera_id"))?;
        let side: Side = req
            .side
            .ok_or(CameraError::MissingField("side"))?
            .parse()
            .map_err(CameraError::InvalidSide)?;
        let config = CameraConfig {
            camera_id,
            resolution: req.resolution.unwrap_or_else(|| "720p".to_string()),
            rotation: req.rotation.unwrap_or(0),
            active: false,
        };
        self.configs.insert(side, config.clone());
        self.streams.remove(&side);
        Ok((side, config))
    }

    pub fn start(&mut self, side: Side) -> Result<StreamInfo, CameraError> {
        let config = self.configs.get_mut(&side).ok_or(CameraError::NotConfigured(side))?;
        config.active = true;
        let info = StreamInfo { status: "streaming", started_at: Utc::now() };
        self.streams.insert(side, info.clone());
        log::info!("{side} camera {} streaming", config.camera_id);
        Ok(info)
    }

    /// Stopping an unconfigured or idle camera is allowed.
    pub fn stop(&mut self, side: Side) {
        if let Some(config) = self.configs.get_mut(&side) {
            config.active = false;
        }
        self.streams.remove(&side);
    }

    pub fn status(&self) -> CameraStatus {
        CameraStatus {
            connected_cameras: self.configs.clone(),
            active_streams: self.streams.keys().copied().collect(),
            total_cameras: self.configs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(camera_id: &str, side: &str) -> ConfigureReq {
        ConfigureReq {
            camera_id: Some(camera_id.into()),
            side: Some(side.into()),
            resolution: None,
            rotation: Some(90),
        }
    }

    #[test]
    fn configure_validates_fields() {
        let mut cams = CameraRegistry::new();
        let missing = ConfigureReq { camera_id: None, side: Some("left".into()), resolution: None, rotation: None };
        assert!(matches!(cams.configure(missing), Err(CameraError::MissingField("camera_id"))));
        assert!(matches!(cams.configure(req("cam0", "top")), Err(CameraError::InvalidSide(_))));

        let (side, cfg) = cams.configure(req("cam0", "left")).unwrap();
        assert_eq!(side, Side::Left);
        assert_eq!(cfg.resolution, "720p");
        assert_eq!(cfg.rotation, 90);
        assert!(!cfg.active);
    }

    #[test]
    fn start_requires_configuration() {
        let mut cams = CameraRegistry::new();
        assert!(matches!(cams.start(Side::Right), Err(CameraError::NotConfigured(Side::Right))));
    }

    #[test]
    fn start_stop_tracks_streams() {
        let mut cams = CameraRegistry::new();
        cams.configure(req("cam0", "left")).unwrap();
        cams.configure(req("cam1", "right")).unwrap();
        cams.start(Side::Left).unwrap();

        let status = cams.status();
        assert_eq!(status.total_cameras, 2);
        assert_eq!(status.active_streams, vec![Side::Left]);
        assert!(status.connected_cameras[&Side::Left].active);

        cams.stop(Side::Left);
        cams.stop(Side::Right);
        let status = cams.status();
        assert!(status.active_streams.is_empty());
        assert!(!status.connected_cameras[&Side::Left].active);
    }
}
