use std::collections::HashMap;
use std::sync::Mutex;

use tab_service::ReceiptImage;
use tab_types::SessionId;

use crate::error::{ServerError, ServerResult};

/// Receipt photos uploaded but not yet recognized, per session.
///
/// Process-scoped: nothing here survives a restart or is visible to other
/// server instances.
pub struct PhotoStaging {
    photos: Mutex<HashMap<SessionId, Vec<ReceiptImage>>>,
    max_bytes: usize,
    max_photos: usize,
}

impl PhotoStaging {
    pub fn new(max_bytes: usize, max_photos: usize) -> Self {
        Self {
            photos: Mutex::new(HashMap::new()),
            max_bytes,
            max_photos: max_photos.max(1),
        }
    }

    /// Stage one photo. Returns how many photos the session now holds.
    pub fn stage(&self, session: SessionId, image: ReceiptImage) -> ServerResult<usize> {
        if image.bytes.is_empty() {
            return Err(ServerError::BadRequest("empty upload".into()));
        }
        if image.bytes.len() > self.max_bytes {
            return Err(ServerError::PayloadTooLarge {
                size: image.bytes.len(),
                max: self.max_bytes,
            });
        }
        let mut photos = self.lock()?;
        let staged = photos.entry(session).or_default();
        if staged.len() >= self.max_photos {
            return Err(ServerError::BadRequest(format!(
                "at most {} photos per receipt",
                self.max_photos
            )));
        }
        staged.push(image);
        Ok(staged.len())
    }

    /// Remove and return everything staged for `session`.
    pub fn take(&self, session: &SessionId) -> ServerResult<Vec<ReceiptImage>> {
        Ok(self.lock()?.remove(session).unwrap_or_default())
    }

    /// Put photos back after a failed recognition so the owner can retry.
    pub fn restore(&self, session: SessionId, mut images: Vec<ReceiptImage>) -> ServerResult<()> {
        let mut photos = self.lock()?;
        let staged = photos.entry(session).or_default();
        images.append(staged);
        *staged = images;
        Ok(())
    }

    pub fn staged(&self, session: &SessionId) -> usize {
        self.photos
            .lock()
            .map(|photos| photos.get(session).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    fn lock(&self) -> ServerResult<std::sync::MutexGuard<'_, HashMap<SessionId, Vec<ReceiptImage>>>> {
        self.photos
            .lock()
            .map_err(|_| ServerError::Internal("photo staging lock poisoned".into()))
    }
}
