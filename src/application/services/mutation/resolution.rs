use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::value_objects::{PostId, TemporaryId};
use crate::infrastructure::cache::lock::mutex_lock;
use crate::shared::error::AppError;

/// How a create-post mutation resolved its temporary id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateResolution {
    /// Re-keyed; the temporary id now stands for this permanent id.
    Created(PostId),
    /// Rolled back; the post does not exist.
    RolledBack,
}

/// Records where every temporary id ended up once its create finished.
///
/// Written and read only from inside `CacheStore::update` closures, so a
/// resolution and the cache writes it accompanies are ordered by the same
/// lock.
#[derive(Debug, Default)]
pub struct CreateResolutions {
    resolved: Mutex<HashMap<TemporaryId, CreateResolution>>,
}

impl CreateResolutions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, temporary_id: &TemporaryId) -> Option<CreateResolution> {
        mutex_lock(&self.resolved, "resolutions.get")
            .get(temporary_id)
            .cloned()
    }

    pub(crate) fn record(&self, temporary_id: TemporaryId, resolution: CreateResolution) {
        mutex_lock(&self.resolved, "resolutions.record").insert(temporary_id, resolution);
    }

    /// Returns the id a write against `post_id` should be keyed by now.
    ///
    /// Permanent ids and temporary ids whose create is still in flight come
    /// back unchanged. A re-keyed temporary id yields its permanent id, and a
    /// rolled-back one is `NotFound`.
    pub fn resolve(&self, post_id: &PostId) -> Result<PostId, AppError> {
        let PostId::Temporary(temporary_id) = post_id else {
            return Ok(post_id.clone());
        };
        match self.get(temporary_id) {
            Some(CreateResolution::Created(permanent_id)) => Ok(permanent_id),
            Some(CreateResolution::RolledBack) => Err(AppError::NotFound(format!(
                "post {temporary_id} was rolled back"
            ))),
            None => Ok(post_id.clone()),
        }
    }
}
