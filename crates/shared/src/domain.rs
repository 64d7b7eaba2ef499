use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque external user handle (an email address). Used as the primary
/// key into the profile store and the media store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the signed-in user as reported by the account service's
/// session listener. `None` at the listener level means signed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub identity: Identity,
    pub display_name: Option<String>,
}

/// Local mirror of the authentication state. The identity is non-empty
/// only while authenticated and is cleared on sign-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSession {
    pub is_authenticated: bool,
    pub display_name: Option<String>,
    pub identity: Option<Identity>,
}

impl AuthSession {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn from_session(info: &SessionInfo) -> Self {
        Self {
            is_authenticated: true,
            display_name: info.display_name.clone(),
            identity: Some(info.identity.clone()),
        }
    }
}

/// Local mirror of the remote profile attributes. Absent fields mean
/// "not yet set", never zero. The bmi string is display-formatted and
/// stored verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileAttributes {
    pub weight: Option<i64>,
    pub height: Option<f64>,
    pub age: Option<i64>,
    pub gender: Option<i64>,
    pub bmi: Option<String>,
    pub profile_image_url: Option<String>,
}

/// Integer form-field coercion: base-10 parse, non-numeric or empty
/// input becomes 0.
pub fn coerce_int(raw: &str) -> i64 {
    raw.trim().parse().unwrap_or(0)
}

/// Decimal form-field coercion: non-numeric or empty input becomes 0.0.
pub fn coerce_decimal(raw: &str) -> f64 {
    raw.trim().parse().unwrap_or(0.0)
}
