//! Session user: durable storage and the login/registration flow.
//!
//! The session user survives restarts through a [`SessionStore`], a durable
//! key-value slot keyed `"user"`. [`SessionReducer`] drives authentication:
//! look the email up, adopt the user if found, otherwise ask for a name and
//! register.

use crate::app::AppEnvironment;
use crate::types::{AppAction, NewUser, User};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use todosync_core::effect::Effect;
use todosync_core::reducer::Reducer;
use todosync_core::{async_effect, smallvec, SmallVec};

/// Key the session user is stored under
pub const SESSION_KEY: &str = "user";

/// Shortest accepted display name on registration
pub const MIN_NAME_LEN: usize = 4;

/// Errors reading or writing the durable session slot
#[derive(Error, Debug)]
pub enum SessionError {
    /// The backing file could not be read or written
    #[error("session storage unavailable: {0}")]
    Io(#[from] std::io::Error),

    /// The stored value is not valid JSON of the expected shape
    #[error("session storage corrupted: {0}")]
    Format(#[from] serde_json::Error),
}

/// Durable slot holding the serialized session user
pub trait SessionStore: Send + Sync {
    /// The persisted user, if any
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the slot cannot be read or decoded.
    fn load(&self) -> Result<Option<User>, SessionError>;

    /// Persist `user`, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the slot cannot be written.
    fn save(&self, user: &User) -> Result<(), SessionError>;

    /// Remove the persisted user
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the slot cannot be written.
    fn clear(&self) -> Result<(), SessionError>;
}

/// JSON object file used as a key-value store
///
/// Only the `"user"` key is touched; other keys are preserved.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store backed by the file at `path`; the file need not exist yet
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, SessionError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(error) => Err(error.into()),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(map)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<User>, SessionError> {
        match self.read_map()?.remove(SESSION_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    fn save(&self, user: &User) -> Result<(), SessionError> {
        let mut map = self.read_map()?;
        map.insert(SESSION_KEY.to_string(), serde_json::to_value(user)?);
        self.write_map(&map)
    }

    fn clear(&self) -> Result<(), SessionError> {
        let mut map = self.read_map()?;
        if map.remove(SESSION_KEY).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// Process-local session slot
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    user: Mutex<Option<User>>,
}

impl MemorySessionStore {
    /// Empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot already holding `user`
    #[must_use]
    pub fn with_user(user: User) -> Self {
        Self {
            user: Mutex::new(Some(user)),
        }
    }

    /// Current contents, without going through the trait
    #[must_use]
    pub fn stored(&self) -> Option<User> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<User>, SessionError> {
        Ok(self.stored())
    }

    fn save(&self, user: &User) -> Result<(), SessionError> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// Where the authentication flow currently is
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthStep {
    /// Asking for an email
    #[default]
    Login,
    /// Email was unknown; asking for a name to register it
    Register {
        /// Trimmed email that was looked up
        email: String,
    },
    /// A session user is adopted
    SignedIn,
}

/// Session slice of the application state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Adopted session user
    pub user: Option<User>,
    /// Authentication step
    pub step: AuthStep,
    /// A lookup, registration or persistence call is in flight
    pub busy: bool,
    /// Last authentication failure, cleared by the next attempt
    pub last_error: Option<String>,
}

/// Trims an email; `None` unless it is non-empty and contains `@`
#[must_use]
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim();
    (!email.is_empty() && email.contains('@')).then(|| email.to_string())
}

/// Trims a display name; `None` if shorter than [`MIN_NAME_LEN`] characters
#[must_use]
pub fn normalize_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    (name.chars().count() >= MIN_NAME_LEN).then(|| name.to_string())
}

/// Reducer for login, registration, restore and logout
#[derive(Clone, Copy, Debug, Default)]
pub struct SessionReducer;

impl SessionReducer {
    /// Creates a new `SessionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reports a failure through the store so observers see it
    fn fail(reason: impl Into<String>) -> Effect<AppAction> {
        let reason = reason.into();
        async_effect! { Some(AppAction::AuthFailed { reason }) }
    }

    /// Persists `user`, then adopts it
    fn adopt(session: &dyn SessionStore, user: User) -> AppAction {
        match session.save(&user) {
            Ok(()) => AppAction::UserAdopted { user },
            Err(error) => AppAction::AuthFailed {
                reason: error.to_string(),
            },
        }
    }
}

impl Reducer for SessionReducer {
    type State = SessionState;
    type Action = AppAction;
    type Environment = AppEnvironment;

    #[allow(clippy::too_many_lines)] // One arm per session action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            AppAction::RestoreSession => {
                let session = Arc::clone(&env.session);
                state.busy = true;
                smallvec![async_effect! {
                    match session.load() {
                        Ok(Some(user)) => Some(AppAction::UserAdopted { user }),
                        Ok(None) => Some(AppAction::SessionEmpty),
                        Err(error) => Some(AppAction::AuthFailed { reason: error.to_string() }),
                    }
                }]
            },

            AppAction::Login { email } => {
                let Some(email) = normalize_email(&email) else {
                    return smallvec![Self::fail("Enter a valid email")];
                };

                tracing::debug!(%email, "Looking up user");
                state.busy = true;
                state.last_error = None;

                let gateway = Arc::clone(&env.gateway);
                let session = Arc::clone(&env.session);
                smallvec![async_effect! {
                    let found = gateway.find_user_by_email(&email).await;
                    match found {
                        Ok(Some(user)) => Some(Self::adopt(session.as_ref(), user)),
                        Ok(None) => Some(AppAction::RegistrationRequired { email }),
                        Err(error) => {
                            tracing::warn!(error = %error, "User lookup failed");
                            Some(AppAction::AuthFailed { reason: error.to_string() })
                        },
                    }
                }]
            },

            AppAction::Register { name } => {
                let AuthStep::Register { email } = state.step.clone() else {
                    return smallvec![Self::fail("Look up an email before registering")];
                };
                let Some(name) = normalize_name(&name) else {
                    return smallvec![Self::fail(format!(
                        "Name should be at least {MIN_NAME_LEN} characters"
                    ))];
                };

                state.busy = true;
                state.last_error = None;

                let user = NewUser { name, email };
                let gateway = Arc::clone(&env.gateway);
                let session = Arc::clone(&env.session);
                smallvec![async_effect! {
                    match gateway.create_user(user).await {
                        Ok(user) => Some(Self::adopt(session.as_ref(), user)),
                        Err(error) => {
                            tracing::warn!(error = %error, "Registration failed");
                            Some(AppAction::AuthFailed { reason: error.to_string() })
                        },
                    }
                }]
            },

            AppAction::Logout => {
                *state = SessionState::default();
                let session = Arc::clone(&env.session);
                smallvec![async_effect! {
                    match session.clear() {
                        Ok(()) => Some(AppAction::LoggedOut),
                        Err(error) => Some(AppAction::AuthFailed { reason: error.to_string() }),
                    }
                }]
            },

            AppAction::SessionEmpty => {
                state.busy = false;
                state.step = AuthStep::Login;
                smallvec![Effect::None]
            },

            AppAction::RegistrationRequired { email } => {
                state.busy = false;
                state.step = AuthStep::Register { email };
                smallvec![Effect::None]
            },

            AppAction::UserAdopted { user } => {
                tracing::info!(user_id = user.id, "Signed in");
                state.user = Some(user);
                state.step = AuthStep::SignedIn;
                state.busy = false;
                state.last_error = None;
                smallvec![Effect::None]
            },

            AppAction::AuthFailed { reason } => {
                tracing::debug!(%reason, "Authentication failed");
                state.busy = false;
                state.last_error = Some(reason);
                smallvec![Effect::None]
            },

            _ => smallvec![Effect::None],
        }
    }
}
