use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public projection of a user, owned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub profile_picture: Option<String>,
}

/// Attachment metadata; the bytes live in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: Uuid,
    pub url: String,
    pub mime_type: String,
}
