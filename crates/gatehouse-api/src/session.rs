// Signed cookie sessions
// Decision: All session state lives in the client cookie, signed with SESSION_SECRET;
// the server keeps nothing between requests
// Decision: Invalid or expired cookies are dropped silently and treated as "no session"
// Decision: The cookie is only written into a finished response, so a cancelled
// request never commits session changes

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha512};
use uuid::Uuid;

use crate::common::ErrorResponse;
use crate::config::SessionConfig;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Serialized form carried inside the signed cookie
#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    id: Uuid,
    /// Unix timestamp of the last time the cookie was issued
    iat: i64,
    data: Map<String, Value>,
}

#[derive(Debug, Default)]
struct SessionInner {
    id: Option<Uuid>,
    data: Map<String, Value>,
    modified: bool,
}

/// Session attached to the current request.
///
/// Cloning is cheap; all clones refer to the same request-scoped state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    fn restore(id: Uuid, data: Map<String, Value>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                id: Some(id),
                data,
                modified: false,
            })),
        }
    }

    /// Identifier of a session that came in with the request, or was issued by it
    pub fn id(&self) -> Option<Uuid> {
        self.inner.lock().id
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let inner = self.inner.lock();
        let value = inner.data.get(key)?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        let mut inner = self.inner.lock();
        inner.data.insert(key.to_string(), value);
        inner.modified = true;
        Ok(())
    }

    /// Remove and return a value
    pub fn remove<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut inner = self.inner.lock();
        let value = inner.data.remove(key)?;
        inner.modified = true;
        serde_json::from_value(value).ok()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        if !inner.data.is_empty() {
            inner.data.clear();
            inner.modified = true;
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or_else(|| {
            tracing::error!("Session extractor used on a route without the session layer");
            ErrorResponse::new("Session unavailable").with_status(StatusCode::INTERNAL_SERVER_ERROR)
        })
    }
}

/// Signs, verifies and (de)serializes session cookies
#[derive(Clone)]
pub struct SessionStore {
    key: Key,
    max_age: Duration,
    /// `max_age` in whole seconds, as used by cookie and age arithmetic
    max_age_secs: i64,
    https_only: bool,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("max_age", &self.max_age)
            .field("https_only", &self.https_only)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        // Cookie signing needs a 64-byte master key; stretch the configured secret to that size
        let digest = Sha512::digest(config.secret.as_bytes());
        Self {
            key: Key::from(digest.as_slice()),
            max_age: config.max_age,
            max_age_secs: i64::try_from(config.max_age.as_secs()).unwrap_or(i64::MAX),
            https_only: config.https_only,
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Read the session out of a request's cookies; anything unverifiable is an empty session.
    fn load(&self, jar: &SignedCookieJar) -> Session {
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Session::default();
        };

        match self.decode(cookie.value()) {
            Some(payload) => Session::restore(payload.id, payload.data),
            None => Session::default(),
        }
    }

    fn decode(&self, value: &str) -> Option<SessionPayload> {
        let bytes = URL_SAFE_NO_PAD
            .decode(value)
            .inspect_err(|e| tracing::debug!(error = %e, "Dropping undecodable session cookie"))
            .ok()?;
        let payload: SessionPayload = serde_json::from_slice(&bytes)
            .inspect_err(|e| tracing::debug!(error = %e, "Dropping malformed session cookie"))
            .ok()?;

        // Expired from `iat + max_age` onwards
        let age = Utc::now().timestamp().saturating_sub(payload.iat);
        if age < 0 || age >= self.max_age_secs {
            tracing::debug!(session_id = %payload.id, age, "Dropping expired session cookie");
            return None;
        }

        Some(payload)
    }

    fn build_cookie(&self, payload: &SessionPayload) -> Result<Cookie<'static>, serde_json::Error> {
        let value = URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload)?);
        Ok(Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.https_only)
            .max_age(time::Duration::seconds(self.max_age_secs))
            .build())
    }

    /// Apply a handler's session changes to the outgoing cookie jar.
    ///
    /// Returns `None` when the response needs no `Set-Cookie`.
    fn commit(&self, session: &Session, jar: SignedCookieJar) -> Option<SignedCookieJar> {
        let mut inner = session.inner.lock();
        if !inner.modified {
            return None;
        }

        if inner.data.is_empty() {
            // Nothing to keep; forget the client copy if there was one
            return inner
                .id
                .take()
                .map(|_| jar.remove(Cookie::build(SESSION_COOKIE).path("/")));
        }

        let id = *inner.id.get_or_insert_with(Uuid::now_v7);
        let payload = SessionPayload {
            id,
            iat: Utc::now().timestamp(),
            data: inner.data.clone(),
        };

        match self.build_cookie(&payload) {
            Ok(cookie) => Some(jar.add(cookie)),
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "Failed to serialize session");
                None
            }
        }
    }
}

/// Middleware attaching a [`Session`] to every request and persisting changes on the response
pub async fn session_layer(
    State(store): State<SessionStore>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = SignedCookieJar::from_headers(request.headers(), store.key.clone());
    let session = store.load(&jar);
    request.extensions_mut().insert(session.clone());

    let response = next.run(request).await;

    match store.commit(&session, jar) {
        Some(jar) => (jar, response).into_response(),
        None => response,
    }
}
