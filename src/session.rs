//! Server-side sessions keyed by a signed browser cookie.

use async_trait::async_trait;
use axum::extract::{FromRequest, RequestParts};
use axum::headers::{Cookie as CookieHeader, HeaderMapExt};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{DateTime, Duration, Utc};
use cookie::{Cookie, CookieJar, Key, SameSite};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::auth::{verify_password, AuthError};
use crate::models::Admin;
use crate::store::AdminStore;
use crate::{AppState, Error};

pub const COOKIE_NAME: &str = "dapodik.sid";

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    fn generate() -> Self {
        let ssid_bytes: [u8; 32] = thread_rng().gen();

        let mut hasher: Sha256 = Digest::new();
        hasher.update(&ssid_bytes);
        SessionToken(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What a session carries between requests.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub admin: Option<Admin>,
    /// Notices written by one request and consumed by the next render.
    pub flash: Vec<String>,
}

/// Backing table for sessions. Implementations own expiry: `load` must
/// never hand out a session whose `expires_at` has passed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, ssid: &str) -> Result<Option<SessionData>, Error>;

    /// Inserts or replaces. Only for sessions being opened.
    async fn save(
        &self,
        ssid: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Rewrites a live session in place. Writes nothing and returns `false`
    /// when the session was destroyed or has expired in the meantime.
    async fn update(
        &self,
        ssid: &str,
        data: &SessionData,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, Error>;

    async fn destroy(&self, ssid: &str) -> Result<(), Error>;

    /// Drops every expired session, returning how many went.
    async fn purge_expired(&self) -> Result<u64, Error>;
}

pub struct SessionGate {
    sessions: Arc<dyn SessionStore>,
    admins: Arc<dyn AdminStore>,
    ttl: Duration,
    key: Key,
}

impl SessionGate {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        admins: Arc<dyn AdminStore>,
        ttl: std::time::Duration,
        secret: &[u8],
    ) -> Result<Self, Error> {
        let ttl = Duration::from_std(ttl)
            .map_err(|e| Error::internal("ConfigError", format!("session ttl: {}", e)))?;
        // any secret length stretches to the 64 bytes a signing key needs
        let key = Key::from(Sha512::digest(secret).as_slice());
        Ok(Self {
            sessions,
            admins,
            ttl,
            key,
        })
    }

    fn expiry(&self) -> DateTime<Utc> {
        Utc::now() + self.ttl
    }

    /// Verifies the credentials and opens a brand new session for the admin.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionToken, AuthError> {
        let admin = self
            .admins
            .find_by_username(username)
            .await?
            .ok_or(AuthError::NotFound)?;

        if !verify_password(password, &admin.password_hash)? {
            return Err(AuthError::WrongPassword);
        }

        let token = SessionToken::generate();
        let data = SessionData {
            admin: Some(admin),
            flash: Vec::new(),
        };
        self.sessions
            .save(token.as_str(), &data, self.expiry())
            .await?;
        Ok(token)
    }

    /// The admin held by a live session. Success slides the expiry forward.
    pub async fn authenticate(&self, token: &SessionToken) -> Result<Option<Admin>, Error> {
        let data = match self.sessions.load(token.as_str()).await? {
            Some(data) => data,
            None => return Ok(None),
        };
        if data.admin.is_none() {
            return Ok(None);
        }
        // a logout racing this request wins
        if !self
            .sessions
            .update(token.as_str(), &data, self.expiry())
            .await?
        {
            return Ok(None);
        }
        Ok(data.admin)
    }

    pub async fn logout(&self, token: &SessionToken) -> Result<(), Error> {
        self.sessions.destroy(token.as_str()).await
    }

    /// Returns `token` if it still names a live session, otherwise opens an
    /// empty one. The flag tells whether a new cookie has to be sent.
    pub async fn open(&self, token: Option<&SessionToken>) -> Result<(SessionToken, bool), Error> {
        if let Some(token) = token {
            if self.sessions.load(token.as_str()).await?.is_some() {
                return Ok((token.clone(), false));
            }
        }
        let token = SessionToken::generate();
        self.sessions
            .save(token.as_str(), &SessionData::default(), self.expiry())
            .await?;
        Ok((token, true))
    }

    /// Queues a notice for the next render. Dropped if the session is gone.
    pub async fn flash<S: Into<String>>(&self, token: &SessionToken, msg: S) -> Result<(), Error> {
        let mut data = match self.sessions.load(token.as_str()).await? {
            Some(data) => data,
            None => return Ok(()),
        };
        data.flash.push(msg.into());
        if !self
            .sessions
            .update(token.as_str(), &data, self.expiry())
            .await?
        {
            log::debug!("Session ended before its notice could be stored");
        }
        Ok(())
    }

    /// Hands out pending notices and clears them; a second call sees none.
    pub async fn take_flash(&self, token: &SessionToken) -> Result<Vec<String>, Error> {
        let mut data = match self.sessions.load(token.as_str()).await? {
            Some(data) => data,
            None => return Ok(Vec::new()),
        };
        if data.flash.is_empty() {
            return Ok(Vec::new());
        }
        let notices = std::mem::take(&mut data.flash);
        if !self
            .sessions
            .update(token.as_str(), &data, self.expiry())
            .await?
        {
            return Ok(Vec::new());
        }
        Ok(notices)
    }

    fn base_cookie(value: String) -> Cookie<'static> {
        Cookie::build(COOKIE_NAME, value)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .finish()
    }

    /// `Set-Cookie` value carrying the signed token.
    pub fn cookie(&self, token: &SessionToken) -> String {
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key)
            .add(Self::base_cookie(token.as_str().to_string()));
        jar.get(COOKIE_NAME)
            .map(|c| c.to_string())
            .unwrap_or_default()
    }

    pub fn expired_cookie() -> String {
        let mut cleared = Self::base_cookie(String::new());
        cleared.set_max_age(cookie::time::Duration::ZERO);
        cleared.to_string()
    }

    /// Checks a raw cookie value; anything that fails to verify is ignored.
    pub fn verify(&self, value: &str) -> Option<SessionToken> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(COOKIE_NAME, value.to_string()));
        let verified = jar.signed(&self.key).get(COOKIE_NAME)?;
        if verified.value().is_empty() {
            return None;
        }
        Some(SessionToken(verified.value().to_string()))
    }

    pub fn token_from_headers(&self, headers: &HeaderMap) -> Option<SessionToken> {
        let cookies = headers.typed_get::<CookieHeader>()?;
        self.verify(cookies.get(COOKIE_NAME)?)
    }
}

/// Periodically deletes expired sessions from the backing store.
pub fn spawn_purge_task(
    sessions: Arc<dyn SessionStore>,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sessions.purge_expired().await {
                Ok(0) => {}
                Ok(n) => log::debug!("Purged {} expired sessions", n),
                Err(e) => log::warn!("Session purge failed: {}", e),
            }
        }
    })
}

fn state<B>(req: &RequestParts<B>) -> Result<AppState, Error> {
    req.extensions()
        .get::<AppState>()
        .cloned()
        .ok_or_else(|| Error::internal("StateError", "application state is not installed"))
}

/// The browser's session token, if it sent a correctly signed one.
/// Says nothing about whether the session is still alive.
pub struct SessionCookie(pub Option<SessionToken>);

#[async_trait]
impl<B> FromRequest<B> for SessionCookie
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let state = state(req)?;
        Ok(SessionCookie(state.gate.token_from_headers(req.headers())))
    }
}

/// A request made by a logged-in admin. Anyone else is sent to `/login`.
pub struct AdminSession {
    pub token: SessionToken,
    pub admin: Admin,
}

#[async_trait]
impl<B> FromRequest<B> for AdminSession
where
    B: Send,
{
    type Rejection = Response;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let state = state(req).map_err(IntoResponse::into_response)?;
        let token = match state.gate.token_from_headers(req.headers()) {
            Some(token) => token,
            None => return Err(Redirect::to("/login").into_response()),
        };
        match state.gate.authenticate(&token).await {
            Ok(Some(admin)) => Ok(AdminSession { token, admin }),
            Ok(None) => Err(Redirect::to("/login").into_response()),
            Err(e) => Err(e.into_response()),
        }
    }
}
