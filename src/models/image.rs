//! Represents a stored image and the object names derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity record for one logical image.
///
/// The bytes themselves live in the storage and cache tiers under the names
/// returned by [`ImageMetadata::object_names`].
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Unique identifier; the only input to object name derivation.
    pub id: Uuid,

    /// Owning user.
    pub user_id: Uuid,

    /// Human name, unique per user.
    pub name: String,

    pub description: String,

    pub created_at: DateTime<Utc>,

    /// Bumped by transforms and detail edits.
    pub updated_at: DateTime<Utc>,
}

impl ImageMetadata {
    /// Build a fresh record for an upload.
    pub fn new(user_id: Uuid, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn object_names(&self) -> ObjectNames {
        ObjectNames::for_id(self.id)
    }
}

/// The pair of object keys every image owns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectNames {
    /// Current full-resolution bytes.
    pub full: String,
    /// Downscaled preview bytes.
    pub preview: String,
}

impl ObjectNames {
    pub fn for_id(id: Uuid) -> Self {
        Self {
            full: format!("full-{id}"),
            preview: format!("prev-{id}"),
        }
    }
}
