use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Identity, ProfileAttributes};

/// Field name of the image URL inside the stored document; single-field
/// updates target it by name.
pub const PROFILE_IMAGE_URL_FIELD: &str = "profileImageUrl";

/// Storage path for a user's profile image, derived deterministically
/// from the identity so a re-upload overwrites the previous image.
pub fn profile_image_path(identity: &Identity) -> String {
    format!("profile_images/{}.jpg", identity.as_str())
}

/// The profile document as held by the remote store, keyed by identity.
/// Full saves overwrite the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub is_bmi_calculated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileDocument {
    /// Document written by a full profile save. The form values arrive
    /// already coerced; the bmi string is stored verbatim.
    pub fn from_form(weight: i64, height: f64, age: i64, gender: i64, bmi: &str) -> Self {
        Self {
            weight: Some(weight),
            height: Some(height),
            age: Some(age),
            gender: Some(gender),
            bmi: Some(bmi.to_string()),
            profile_image_url: None,
            is_bmi_calculated: true,
            updated_at: None,
        }
    }

    /// Attribute mirror taken from one document snapshot.
    pub fn attributes(&self) -> ProfileAttributes {
        ProfileAttributes {
            weight: self.weight,
            height: self.height,
            age: self.age,
            gender: self.gender,
            bmi: self.bmi.clone(),
            profile_image_url: self.profile_image_url.clone(),
        }
    }
}
