//! Session-scoped storage of temporary page images.
//!
//! Each session owns a directory under the temp root named after its id. The
//! in-memory map is shared between HTTP workers and the expiry sweep, so all
//! access goes through the store's mutex.

use crate::errors::SessionError;
use crate::models::session::{ImageRecord, ImageUpdate, Session};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub struct SessionStore {
    root: PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

/// Rejects ids that would escape the temp root when used as a path component.
pub fn validate_id(id: &str) -> Result<(), SessionError> {
    if id.is_empty() || id == "." || id == ".." || sanitize_filename::sanitize(id) != id {
        return Err(SessionError::InvalidId(id.to_string()));
    }
    Ok(())
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), sessions: Mutex::new(HashMap::new()) }
    }

    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf, SessionError> {
        validate_id(session_id)?;
        Ok(self.root.join(session_id))
    }

    /// Where an uploaded image for `image_id` lives on disk.
    pub fn image_path(&self, session_id: &str, image_id: &str, ext: &str) -> Result<PathBuf, SessionError> {
        validate_id(image_id)?;
        Ok(self.session_dir(session_id)?.join(format!("{image_id}.{ext}")))
    }

    pub fn create_or_get(&self, session_id: &str) -> Result<Session, SessionError> {
        validate_id(session_id)?;
        let mut sessions = self.sessions.lock();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                log::info!("created image session {session_id}");
                Session::new(session_id.to_string(), Utc::now())
            });
        Ok(session.clone())
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Appends an image record. Uploading an id that already exists replaces
    /// that record in place, keeping ids unique within the session.
    pub fn add_image(
        &self,
        session_id: &str,
        image_id: &str,
        path: PathBuf,
        metadata: serde_json::Value,
    ) -> Result<ImageRecord, SessionError> {
        validate_id(image_id)?;
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        let record = ImageRecord::new(image_id.to_string(), path, metadata);
        match session.images.iter_mut().find(|img| img.id == image_id) {
            Some(existing) => {
                log::info!("replacing image {image_id} in session {session_id}");
                *existing = record.clone();
            }
            None => session.images.push(record.clone()),
        }
        Ok(record)
    }

    pub fn find_image(&self, session_id: &str, image_id: &str) -> Result<ImageRecord, SessionError> {
        let sessions = self.sessions.lock();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        session
            .images
            .iter()
            .find(|img| img.id == image_id)
            .cloned()
            .ok_or_else(|| SessionError::ImageNotFound {
                session: session_id.to_string(),
                image: image_id.to_string(),
            })
    }

    pub fn update_image(
        &self,
        session_id: &str,
        image_id: &str,
        fields: ImageUpdate,
    ) -> Result<ImageRecord, SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        let image = session
            .images
            .iter_mut()
            .find(|img| img.id == image_id)
            .ok_or_else(|| SessionError::ImageNotFound {
                session: session_id.to_string(),
                image: image_id.to_string(),
            })?;
        image.apply(fields);
        Ok(image.clone())
    }

    pub fn set_pdf_name(&self, session_id: &str, pdf_name: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        session.pdf_name = Some(pdf_name.to_string());
        log::info!("pdf name for session {session_id} set to {pdf_name}");
        Ok(())
    }

    /// Drops the session and its temp directory. Returns whether the session
    /// was known; deleting an unknown session is not an error.
    pub fn delete(&self, session_id: &str) -> Result<bool, SessionError> {
        let dir = self.session_dir(session_id)?;
        let existed = self.sessions.lock().remove(session_id).is_some();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if existed {
            log::info!("cleaned up session {session_id}");
        }
        Ok(existed)
    }

    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        self.sweep_expired_at(Utc::now(), max_age)
    }

    /// Deletes every session created more than `max_age` before `now`.
    pub fn sweep_expired_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let expired: Vec<String> = self
            .sessions
            .lock()
            .values()
            .filter(|s| now.signed_duration_since(s.created) > max_age)
            .map(|s| s.id.clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            match self.delete(&id) {
                Ok(_) => removed += 1,
                Err(e) => log::warn!("failed to clean up expired session {id}: {e}"),
            }
        }
        log::info!("expired session sweep removed {removed} session(s)");
        removed
    }

    #[cfg(test)]
    fn backdate(&self, session_id: &str, created: DateTime<Utc>) {
        if let Some(s) = self.sessions.lock().get_mut(session_id) {
            s.created = created;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (SessionStore, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        (SessionStore::new(tmp.path()), tmp)
    }

    #[test]
    fn create_or_get_returns_same_session() {
        let (store, _tmp) = store();
        let first = store.create_or_get("s1").unwrap();
        let second = store.create_or_get("s1").unwrap();
        assert_eq!(first.created, second.created);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn add_image_requires_session() {
        let (store, _tmp) = store();
        let err = store
            .add_image("missing", "a", PathBuf::from("a.jpg"), json!({}))
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));
    }

    #[test]
    fn add_image_after_delete_is_not_found() {
        let (store, _tmp) = store();
        store.create_or_get("s1").unwrap();
        store.delete("s1").unwrap();
        let err = store
            .add_image("s1", "a", PathBuf::from("a.jpg"), json!({}))
            .unwrap_err();
        assert!(matches!(err, SessionError::SessionNotFound(_)));
    }

    #[test]
    fn reuploading_an_id_replaces_the_record() {
        let (store, _tmp) = store();
        store.create_or_get("s1").unwrap();
        store.add_image("s1", "a", PathBuf::from("a.jpg"), json!({"take": 1})).unwrap();
        store.add_image("s1", "b", PathBuf::from("b.jpg"), json!({})).unwrap();
        store.add_image("s1", "a", PathBuf::from("a.jpg"), json!({"take": 2})).unwrap();

        let session = store.get("s1").unwrap();
        let ids: Vec<_> = session.images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(session.images[0].metadata["take"], 2);
    }

    #[test]
    fn update_image_merges_fields() {
        let (store, _tmp) = store();
        store.create_or_get("s1").unwrap();
        store.add_image("s1", "a", PathBuf::from("a.jpg"), json!({})).unwrap();

        let updated = store
            .update_image(
                "s1",
                "a",
                ImageUpdate {
                    thumbnail_path: Some(Some(PathBuf::from("a_thumb.jpg"))),
                    enhanced: Some(true),
                    ..ImageUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.thumbnail_path, Some(PathBuf::from("a_thumb.jpg")));
        assert!(updated.enhanced);
        assert!(!updated.trim_applied);
        assert!(updated.processed_path.is_none());
        assert!(updated.processed_at.is_some());
    }

    #[test]
    fn update_unknown_image_is_not_found() {
        let (store, _tmp) = store();
        store.create_or_get("s1").unwrap();
        let err = store.update_image("s1", "nope", ImageUpdate::default()).unwrap_err();
        assert!(matches!(err, SessionError::ImageNotFound { .. }));
    }

    #[test]
    fn delete_removes_directory_and_is_idempotent() {
        let (store, _tmp) = store();
        store.create_or_get("s1").unwrap();
        let dir = store.session_dir("s1").unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested").join("a.jpg"), b"x").unwrap();

        assert!(store.delete("s1").unwrap());
        assert!(!dir.exists());
        assert!(store.get("s1").is_none());

        assert!(!store.delete("s1").unwrap());
    }

    #[test]
    fn sweep_respects_max_age_boundary() {
        let (store, _tmp) = store();
        let max_age = Duration::from_secs(2 * 60 * 60);
        let t = Utc::now();
        store.create_or_get("s1").unwrap();
        store.backdate("s1", t);

        let eps = chrono::Duration::seconds(1);
        let max = chrono::Duration::from_std(max_age).unwrap();

        assert_eq!(store.sweep_expired_at(t + max - eps, max_age), 0);
        assert!(store.get("s1").is_some());

        assert_eq!(store.sweep_expired_at(t + max + eps, max_age), 1);
        assert!(store.get("s1").is_none());
    }

    #[test]
    fn sweep_only_removes_old_sessions() {
        let (store, _tmp) = store();
        store.create_or_get("old").unwrap();
        store.create_or_get("fresh").unwrap();
        store.backdate("old", Utc::now() - chrono::Duration::hours(3));

        assert_eq!(store.sweep_expired(Duration::from_secs(2 * 60 * 60)), 1);
        assert!(store.get("old").is_none());
        assert!(store.get("fresh").is_some());
    }

    #[test]
    fn path_traversal_ids_are_rejected() {
        let (store, _tmp) = store();
        assert!(matches!(store.create_or_get("../etc"), Err(SessionError::InvalidId(_))));
        assert!(matches!(store.create_or_get(".."), Err(SessionError::InvalidId(_))));
        assert!(matches!(store.image_path("s1", "a/b", "jpg"), Err(SessionError::InvalidId(_))));
        assert!(store.create_or_get("session_20250118_143025").is_ok());
    }
}
