use crate::errors::ScanError;
use crate::models::scan::{ScanSession, ScanStatus, Spread, SpreadImages, SpreadStatus};
use chrono::Utc;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize, Debug, Default)]
pub struct StartConfig {
    pub total_pages: Option<u32>,
    pub supplement_count: Option<u32>,
    pub trim_settings: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug, Default)]
pub struct SpreadInput {
    pub left_page: Option<serde_json::Value>,
    pub right_page: Option<serde_json::Value>,
    pub page_numbers: Option<Vec<serde_json::Value>>,
    pub left_image_path: Option<String>,
    pub right_image_path: Option<String>,
}

/// Scanning sessions keyed by id, plus which one is currently being captured.
#[derive(Default)]
pub struct ScanRegistry {
    sessions: BTreeMap<String, ScanSession>,
    current: Option<String>,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a session and makes it current. Ids are timestamp based; a
    /// second start within the same second gets a numeric suffix.
    pub fn start(&mut self, cfg: StartConfig) -> ScanSession {
        let now = Utc::now();
        let base = format!("session_{}", now.format("%Y%m%d_%H%M%S"));
        let mut session_id = base.clone();
        let mut n = 2;
        while self.sessions.contains_key(&session_id) {
            session_id = format!("{base}_{n}");
            n += 1;
        }

        let session = ScanSession {
            session_id: session_id.clone(),
            total_pages: cfg.total_pages.unwrap_or(32),
            supplement_count: cfg.supplement_count.unwrap_or(0),
            trim_settings: cfg.trim_settings.unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            spreads: Vec::new(),
            status: ScanStatus::Active,
            completed_at: None,
        };
        self.sessions.insert(session_id.clone(), session.clone());
        self.current = Some(session_id);
        log::info!("scanning session {} started", session.session_id);
        session
    }

    pub fn get(&self, session_id: &str) -> Result<&ScanSession, ScanError> {
        self.sessions
            .get(session_id)
            .ok_or_else(|| ScanError::SessionNotFound(session_id.to_string()))
    }

    pub fn current(&self) -> Result<&ScanSession, ScanError> {
        self.current
            .as_ref()
            .and_then(|id| self.sessions.get(id))
            .ok_or(ScanError::NoActiveSession)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    fn current_mut(&mut self) -> Result<&mut ScanSession, ScanError> {
        let id = self.current.as_ref().ok_or(ScanError::NoActiveSession)?;
        self.sessions.get_mut(id).ok_or(ScanError::NoActiveSession)
    }

    pub fn list(&self) -> Vec<ScanSession> {
        self.sessions.values().cloned().collect()
    }

    pub fn capture_spread(&mut self, input: SpreadInput) -> Result<(Spread, usize), ScanError> {
        let session = self.current_mut()?;
        let spread = Spread {
            spread_index: session.spreads.len(),
            timestamp: Utc::now(),
            left_page: input.left_page,
            right_page: input.right_page,
            page_numbers: input.page_numbers.unwrap_or_default(),
            images: SpreadImages { left: input.left_image_path, right: input.right_image_path },
            status: SpreadStatus::Captured,
        };
        session.spreads.push(spread.clone());
        Ok((spread, session.spreads.len()))
    }

    /// Replaces whichever fields `input` carries; the rest keep their values.
    pub fn retake_spread(&mut self, index: usize, input: SpreadInput) -> Result<Spread, ScanError> {
        let session = self.current_mut()?;
        let spread = session.spreads.get_mut(index).ok_or(ScanError::SpreadNotFound(index))?;
        spread.timestamp = Utc::now();
        if input.left_page.is_some() {
            spread.left_page = input.left_page;
        }
        if input.right_page.is_some() {
            spread.right_page = input.right_page;
        }
        if let Some(left) = input.left_image_path {
            spread.images.left = Some(left);
        }
        if let Some(right) = input.right_image_path {
            spread.images.right = Some(right);
        }
        spread.status = SpreadStatus::Retaken;
        Ok(spread.clone())
    }

    pub fn end(&mut self) -> Result<ScanSession, ScanError> {
        let session = self.current_mut()?;
        session.status = ScanStatus::Completed;
        session.completed_at = Some(Utc::now());
        let done = session.clone();
        self.current = None;
        log::info!("scanning session {} completed with {} spreads", done.session_id, done.spreads.len());
        Ok(done)
    }

    pub fn delete(&mut self, session_id: &str) -> Result<(), ScanError> {
        self.sessions
            .remove(session_id)
            .ok_or_else(|| ScanError::SessionNotFound(session_id.to_string()))?;
        if self.current.as_deref() == Some(session_id) {
            self.current = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spread(left: &str, right: &str) -> SpreadInput {
        SpreadInput {
            left_page: Some(json!(1)),
            right_page: Some(json!(2)),
            page_numbers: Some(vec![json!(1), json!(2)]),
            left_image_path: Some(left.into()),
            right_image_path: Some(right.into()),
        }
    }

    #[test]
    fn start_applies_defaults_and_becomes_current() {
        let mut reg = ScanRegistry::new();
        let s = reg.start(StartConfig::default());
        assert_eq!(s.total_pages, 32);
        assert_eq!(s.supplement_count, 0);
        assert_eq!(s.status, ScanStatus::Active);
        assert_eq!(reg.current().unwrap().session_id, s.session_id);
    }

    #[test]
    fn starts_in_the_same_second_get_distinct_ids() {
        let mut reg = ScanRegistry::new();
        let a = reg.start(StartConfig::default());
        let b = reg.start(StartConfig::default());
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(reg.list().len(), 2);
        assert_eq!(reg.current_id(), Some(b.session_id.as_str()));
    }

    #[test]
    fn capture_requires_active_session() {
        let mut reg = ScanRegistry::new();
        assert!(matches!(reg.capture_spread(spread("l", "r")), Err(ScanError::NoActiveSession)));
    }

    #[test]
    fn capture_and_retake() {
        let mut reg = ScanRegistry::new();
        reg.start(StartConfig { total_pages: Some(8), ..Default::default() });

        let (first, total) = reg.capture_spread(spread("l0.jpg", "r0.jpg")).unwrap();
        assert_eq!((first.spread_index, total), (0, 1));
        let (second, total) = reg.capture_spread(spread("l1.jpg", "r1.jpg")).unwrap();
        assert_eq!((second.spread_index, total), (1, 2));

        let retaken = reg
            .retake_spread(0, SpreadInput { left_image_path: Some("l0b.jpg".into()), ..Default::default() })
            .unwrap();
        assert_eq!(retaken.status, SpreadStatus::Retaken);
        assert_eq!(retaken.images.left.as_deref(), Some("l0b.jpg"));
        assert_eq!(retaken.images.right.as_deref(), Some("r0.jpg"));
        assert_eq!(retaken.left_page, Some(json!(1)));

        assert!(matches!(reg.retake_spread(5, SpreadInput::default()), Err(ScanError::SpreadNotFound(5))));
    }

    #[test]
    fn end_clears_current_but_keeps_history() {
        let mut reg = ScanRegistry::new();
        let s = reg.start(StartConfig::default());
        let done = reg.end().unwrap();
        assert_eq!(done.status, ScanStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(reg.current().is_err());
        assert_eq!(reg.get(&s.session_id).unwrap().status, ScanStatus::Completed);
        assert!(matches!(reg.end(), Err(ScanError::NoActiveSession)));
    }

    #[test]
    fn delete_current_session_clears_current() {
        let mut reg = ScanRegistry::new();
        let s = reg.start(StartConfig::default());
        reg.delete(&s.session_id).unwrap();
        assert!(reg.current_id().is_none());
        assert!(matches!(reg.delete(&s.session_id), Err(ScanError::SessionNotFound(_))));
    }
}
