use std::sync::{Arc, Weak};

use async_trait::async_trait;
use shared::{
    document::{profile_image_path, ProfileDocument, PROFILE_IMAGE_URL_FIELD},
    domain::{coerce_decimal, coerce_int, AuthSession, Identity, ProfileAttributes, SessionInfo},
    error::{RemoteError, RemoteResult},
};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

const NOT_LOGGED_IN: &str = "User not logged in";

/// Remote account service: authentication, display name and password
/// maintenance, and session-change reporting.
#[async_trait]
pub trait AccountService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> RemoteResult<()>;
    async fn sign_up(&self, email: &str, password: &str) -> RemoteResult<Identity>;
    async fn update_display_name(&self, name: &str) -> RemoteResult<()>;
    async fn update_password(&self, new_password: &str) -> RemoteResult<()>;
    async fn send_password_reset(&self, email: &str) -> RemoteResult<()>;
    async fn sign_out(&self);
    /// Last-value replay of the current session; `None` means signed
    /// out. This channel is the single authority for session
    /// transitions and may fire independently of any operation the
    /// controller issued.
    fn subscribe_sessions(&self) -> watch::Receiver<Option<SessionInfo>>;
}

/// Remote key-document store holding profile attributes, keyed by
/// identity.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, identity: &Identity) -> RemoteResult<Option<ProfileDocument>>;
    async fn set(&self, identity: &Identity, document: &ProfileDocument) -> RemoteResult<()>;
    async fn update_field(
        &self,
        identity: &Identity,
        field: &str,
        value: serde_json::Value,
    ) -> RemoteResult<()>;
}

/// Remote blob storage for profile images.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> RemoteResult<()>;
    async fn download_url(&self, path: &str) -> RemoteResult<String>;
}

pub struct MissingAccountService {
    sessions: watch::Sender<Option<SessionInfo>>,
}

impl Default for MissingAccountService {
    fn default() -> Self {
        Self {
            sessions: watch::channel(None).0,
        }
    }
}

#[async_trait]
impl AccountService for MissingAccountService {
    async fn sign_in(&self, _email: &str, _password: &str) -> RemoteResult<()> {
        Err(RemoteError::unavailable("account"))
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> RemoteResult<Identity> {
        Err(RemoteError::unavailable("account"))
    }

    async fn update_display_name(&self, _name: &str) -> RemoteResult<()> {
        Err(RemoteError::unavailable("account"))
    }

    async fn update_password(&self, _new_password: &str) -> RemoteResult<()> {
        Err(RemoteError::unavailable("account"))
    }

    async fn send_password_reset(&self, _email: &str) -> RemoteResult<()> {
        Err(RemoteError::unavailable("account"))
    }

    async fn sign_out(&self) {}

    fn subscribe_sessions(&self) -> watch::Receiver<Option<SessionInfo>> {
        self.sessions.subscribe()
    }
}

pub struct MissingProfileStore;

#[async_trait]
impl ProfileStore for MissingProfileStore {
    async fn get(&self, _identity: &Identity) -> RemoteResult<Option<ProfileDocument>> {
        Err(RemoteError::unavailable("profile"))
    }

    async fn set(&self, _identity: &Identity, _document: &ProfileDocument) -> RemoteResult<()> {
        Err(RemoteError::unavailable("profile"))
    }

    async fn update_field(
        &self,
        _identity: &Identity,
        _field: &str,
        _value: serde_json::Value,
    ) -> RemoteResult<()> {
        Err(RemoteError::unavailable("profile"))
    }
}

pub struct MissingMediaStore;

#[async_trait]
impl MediaStore for MissingMediaStore {
    async fn upload(&self, _path: &str, _bytes: Vec<u8>) -> RemoteResult<()> {
        Err(RemoteError::unavailable("media"))
    }

    async fn download_url(&self, _path: &str) -> RemoteResult<String> {
        Err(RemoteError::unavailable("media"))
    }
}

/// UI-observable state changes broadcast by the controller.
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    SessionChanged(AuthSession),
    ProfileChanged(ProfileAttributes),
    Notification(String),
}

/// Composite result of the two-stage sign-up pipeline. The partial
/// success (account created, display name unset) stays representable
/// instead of collapsing into binary success/failure.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SignUpOutcome {
    Created,
    CreatedNameUnset { stage_error: String },
    Failed { stage_error: String },
}

/// Single source of truth for authentication state and profile
/// attributes. Mediates all reads and writes to the remote services and
/// translates outcomes into observable state changes plus a single-slot,
/// clear-on-read status notification.
///
/// Operations never surface remote errors to the caller; every fallible
/// operation reports its outcome through the notification slot and
/// leaves prior state intact on failure. Construct inside a tokio
/// runtime: the session-listener task is attached on creation and
/// detached on [`ProfileController::detach`] or drop.
pub struct ProfileController {
    accounts: Arc<dyn AccountService>,
    profiles: Arc<dyn ProfileStore>,
    media: Arc<dyn MediaStore>,
    session: watch::Sender<AuthSession>,
    profile: watch::Sender<ProfileAttributes>,
    notification: Mutex<Option<String>>,
    events: broadcast::Sender<ControllerEvent>,
    // Serializes profile-store writes and the fetches that follow them,
    // so a refresh triggered by an image upload cannot interleave with a
    // pending save and revert the mirror to a pre-save snapshot. One
    // controller serves one identity, making this a per-identity gate.
    write_gate: Mutex<()>,
    listener_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ProfileController {
    pub fn new() -> Arc<Self> {
        Self::with_services(
            Arc::new(MissingAccountService::default()),
            Arc::new(MissingProfileStore),
            Arc::new(MissingMediaStore),
        )
    }

    pub fn with_services(
        accounts: Arc<dyn AccountService>,
        profiles: Arc<dyn ProfileStore>,
        media: Arc<dyn MediaStore>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        let sessions = accounts.subscribe_sessions();
        let controller = Arc::new(Self {
            accounts,
            profiles,
            media,
            session: watch::channel(AuthSession::signed_out()).0,
            profile: watch::channel(ProfileAttributes::default()).0,
            notification: Mutex::new(None),
            events,
            write_gate: Mutex::new(()),
            listener_task: std::sync::Mutex::new(None),
        });
        let task = spawn_session_listener(&controller, sessions);
        if let Ok(mut slot) = controller.listener_task.lock() {
            *slot = Some(task);
        }
        controller
    }

    /// Current authentication mirror.
    pub fn session(&self) -> AuthSession {
        self.session.borrow().clone()
    }

    /// Current profile attribute mirror.
    pub fn profile(&self) -> ProfileAttributes {
        self.profile.borrow().clone()
    }

    /// Subscribes to the authentication mirror with last-value replay.
    pub fn subscribe_session(&self) -> watch::Receiver<AuthSession> {
        self.session.subscribe()
    }

    /// Subscribes to the profile mirror with last-value replay.
    pub fn subscribe_profile(&self) -> watch::Receiver<ProfileAttributes> {
        self.profile.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Returns and clears the pending notification. Repeated calls
    /// without an intervening emission return `None`.
    pub async fn consume_notification(&self) -> Option<String> {
        self.notification.lock().await.take()
    }

    /// Stops mirroring session changes. Idempotent; also runs on drop.
    pub fn detach(&self) {
        if let Ok(mut slot) = self.listener_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) {
        match self.accounts.sign_in(email, password).await {
            // No notification on success; the session listener reports
            // the transition.
            Ok(()) => info!(email, "sign-in accepted"),
            Err(err) => {
                warn!(email, "sign-in failed: {err}");
                self.notify(format!("Login failed: {err}")).await;
            }
        }
    }

    /// Creates the account, then sets the initial display name. Emits
    /// exactly one notification for the composite outcome; a failure at
    /// the name stage leaves the session authenticated with the display
    /// name unset.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: &str) {
        let outcome = self.run_sign_up_pipeline(email, password, display_name).await;
        let message = match outcome {
            SignUpOutcome::Created => "Sign up successful!".to_string(),
            SignUpOutcome::CreatedNameUnset { stage_error } => {
                warn!(email, "sign-up name stage failed: {stage_error}");
                format!("Failed to update profile: {stage_error}")
            }
            SignUpOutcome::Failed { stage_error } => {
                warn!(email, "sign-up failed: {stage_error}");
                format!("Sign up failed: {stage_error}")
            }
        };
        self.notify(message).await;
    }

    async fn run_sign_up_pipeline(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> SignUpOutcome {
        if let Err(err) = self.accounts.sign_up(email, password).await {
            return SignUpOutcome::Failed {
                stage_error: err.to_string(),
            };
        }
        match self.accounts.update_display_name(display_name).await {
            Ok(()) => SignUpOutcome::Created,
            Err(err) => SignUpOutcome::CreatedNameUnset {
                stage_error: err.to_string(),
            },
        }
    }

    /// Signs out and resets the session mirror immediately instead of
    /// waiting for the listener round-trip, so no stale authenticated
    /// frame is observable.
    pub async fn sign_out(&self) {
        self.accounts.sign_out().await;
        self.set_session(AuthSession::signed_out());
    }

    pub async fn request_password_reset(&self, email: &str) {
        if email.trim().is_empty() {
            self.notify("Email is required").await;
            return;
        }
        match self.accounts.send_password_reset(email).await {
            Ok(()) => self.notify("Password reset email sent").await,
            Err(err) => self.notify(err.to_string()).await,
        }
    }

    /// Reads the profile document for the signed-in identity and
    /// replaces the mirror atomically from that one snapshot. An absent
    /// document is a normal outcome, not an error.
    pub async fn fetch_profile(&self) {
        let Some(identity) = self.identity() else {
            self.notify(NOT_LOGGED_IN).await;
            return;
        };
        let _gate = self.write_gate.lock().await;
        self.fetch_profile_locked(&identity).await;
    }

    async fn fetch_profile_locked(&self, identity: &Identity) {
        match self.profiles.get(identity).await {
            Ok(Some(document)) => {
                self.set_profile(document.attributes());
                self.notify("User data retrieved successfully").await;
            }
            Ok(None) => self.notify("No user data found").await,
            Err(err) => {
                warn!(identity = %identity, "profile fetch failed: {err}");
                self.notify(format!("Error retrieving user data: {err}")).await;
            }
        }
    }

    /// Coerces the form fields per the coercion table and overwrites the
    /// whole remote document. The mirror is not updated locally; the
    /// next fetch refreshes it, so attributes a rejected write never
    /// reach the mirror.
    pub async fn save_profile(
        &self,
        weight: &str,
        height: &str,
        age: &str,
        gender: &str,
        bmi: &str,
    ) {
        let Some(identity) = self.identity() else {
            self.notify(NOT_LOGGED_IN).await;
            return;
        };
        let document = ProfileDocument::from_form(
            coerce_int(weight),
            coerce_decimal(height),
            coerce_int(age),
            coerce_int(gender),
            bmi,
        );
        let _gate = self.write_gate.lock().await;
        match self.profiles.set(&identity, &document).await {
            Ok(()) => {
                info!(identity = %identity, "profile saved");
                self.notify("User data saved successfully").await;
            }
            Err(err) => {
                warn!(identity = %identity, "profile save failed: {err}");
                self.notify(format!("Error saving user data: {err}")).await;
            }
        }
    }

    pub async fn update_display_name(&self, name: &str) {
        if self.identity().is_none() {
            self.notify(NOT_LOGGED_IN).await;
            return;
        }
        // No notification on success; the session listener reports the
        // new name.
        if let Err(err) = self.accounts.update_display_name(name).await {
            warn!("display name update failed: {err}");
            self.notify(format!("Failed to update name: {err}")).await;
        }
    }

    pub async fn update_password(&self, new_password: &str) {
        if self.identity().is_none() {
            self.notify(NOT_LOGGED_IN).await;
            return;
        }
        match self.accounts.update_password(new_password).await {
            Ok(()) => self.notify("Password updated successfully").await,
            Err(err) => {
                warn!("password update failed: {err}");
                self.notify("Error updating password").await;
            }
        }
    }

    /// Uploads the image under the identity-derived path, resolves its
    /// durable URL, writes it into the profile document, then refreshes
    /// the mirror. Any stage failure leaves the mirror untouched.
    pub async fn upload_profile_image(&self, bytes: Vec<u8>) {
        let Some(identity) = self.identity() else {
            self.notify(NOT_LOGGED_IN).await;
            return;
        };
        let path = profile_image_path(&identity);
        if let Err(err) = self.media.upload(&path, bytes).await {
            warn!(path = %path, "image upload failed: {err}");
            self.notify(format!("Failed to upload image: {err}")).await;
            return;
        }
        let url = match self.media.download_url(&path).await {
            Ok(url) => url,
            Err(err) => {
                warn!(path = %path, "download url fetch failed: {err}");
                self.notify(format!("Failed to upload image: {err}")).await;
                return;
            }
        };

        let _gate = self.write_gate.lock().await;
        if let Err(err) = self
            .profiles
            .update_field(
                &identity,
                PROFILE_IMAGE_URL_FIELD,
                serde_json::Value::String(url),
            )
            .await
        {
            warn!(identity = %identity, "profile image field update failed: {err}");
            self.notify(format!("Failed to update profile image: {err}"))
                .await;
            return;
        }
        info!(identity = %identity, "profile image updated");
        self.notify("Profile image updated").await;
        self.fetch_profile_locked(&identity).await;
    }

    fn identity(&self) -> Option<Identity> {
        self.session.borrow().identity.clone()
    }

    fn apply_session(&self, info: Option<SessionInfo>) {
        let session = match &info {
            Some(info) => AuthSession::from_session(info),
            None => AuthSession::signed_out(),
        };
        self.set_session(session);
    }

    fn set_session(&self, session: AuthSession) {
        let changed = self.session.send_if_modified(|current| {
            if *current == session {
                false
            } else {
                *current = session.clone();
                true
            }
        });
        if changed {
            let _ = self.events.send(ControllerEvent::SessionChanged(session));
        }
    }

    fn set_profile(&self, attributes: ProfileAttributes) {
        let changed = self.profile.send_if_modified(|current| {
            if *current == attributes {
                false
            } else {
                *current = attributes.clone();
                true
            }
        });
        if changed {
            let _ = self
                .events
                .send(ControllerEvent::ProfileChanged(attributes));
        }
    }

    async fn notify(&self, message: impl Into<String>) {
        let message = message.into();
        *self.notification.lock().await = Some(message.clone());
        let _ = self.events.send(ControllerEvent::Notification(message));
    }
}

impl Drop for ProfileController {
    fn drop(&mut self) {
        self.detach();
    }
}

fn spawn_session_listener(
    controller: &Arc<ProfileController>,
    mut sessions: watch::Receiver<Option<SessionInfo>>,
) -> JoinHandle<()> {
    // Holds only a weak handle so an abandoned controller can drop and
    // detach itself.
    let weak: Weak<ProfileController> = Arc::downgrade(controller);
    tokio::spawn(async move {
        loop {
            let snapshot = sessions.borrow_and_update().clone();
            let Some(controller) = weak.upgrade() else {
                break;
            };
            controller.apply_session(snapshot);
            drop(controller);
            if sessions.changed().await.is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
