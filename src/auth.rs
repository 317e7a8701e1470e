use axum::extract::Form;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Extension;
use chrono::Utc;
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::Deserialize;

use crate::models::Admin;
use crate::session::{SessionCookie, SessionGate};
use crate::store::AdminStore;
use crate::{views, AppState, Error};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Username tidak ditemukan")]
    NotFound,
    #[error("Password salah")]
    WrongPassword,
    #[error(transparent)]
    Internal(#[from] Error),
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(password_hash)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

/// Creates the configured admin unless one with that username exists.
pub async fn seed_admin(
    admins: &dyn AdminStore,
    username: &str,
    password: &str,
) -> Result<bool, Error> {
    if password.is_empty() {
        return Err(Error::internal(
            "ConfigError",
            "Provided admin password was empty!",
        ));
    }
    let admin = Admin {
        username: username.to_string(),
        password_hash: hash_password(password)?,
        created_at: Utc::now(),
    };
    let created = admins.insert_if_absent(admin).await?;
    if created {
        log::info!("Seeded admin `{}`", username);
    }
    Ok(created)
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

pub(crate) fn set_cookie(mut res: Response, cookie: String) -> Result<Response, Error> {
    res.headers_mut()
        .append(SET_COOKIE, HeaderValue::from_str(&cookie)?);
    Ok(res)
}

pub async fn login_page(
    Extension(state): Extension<AppState>,
    SessionCookie(token): SessionCookie,
) -> Result<Html<String>, Error> {
    let msg = match &token {
        Some(token) => state.gate.take_flash(token).await?.into_iter().next(),
        None => None,
    };
    Ok(Html(views::login(msg.as_deref())))
}

pub async fn login(
    Extension(state): Extension<AppState>,
    SessionCookie(previous): SessionCookie,
    Form(form): Form<LoginForm>,
) -> Result<Response, Error> {
    match state.gate.login(&form.username, &form.password).await {
        Ok(token) => {
            log::info!("Admin `{}` logged in", form.username);
            if let Some(previous) = previous {
                state.gate.logout(&previous).await?;
            }
            set_cookie(Redirect::to("/").into_response(), state.gate.cookie(&token))
        }
        Err(AuthError::Internal(e)) => Err(e),
        Err(refused) => {
            log::warn!("Refused login for `{}`: {}", form.username, refused);
            refuse(&state.gate, previous, refused.to_string()).await
        }
    }
}

async fn refuse(
    gate: &SessionGate,
    previous: Option<crate::session::SessionToken>,
    msg: String,
) -> Result<Response, Error> {
    let (token, created) = gate.open(previous.as_ref()).await?;
    gate.flash(&token, msg).await?;
    let res = Redirect::to("/login").into_response();
    if created {
        set_cookie(res, gate.cookie(&token))
    } else {
        Ok(res)
    }
}

pub async fn logout(
    Extension(state): Extension<AppState>,
    SessionCookie(token): SessionCookie,
) -> Result<Response, Error> {
    if let Some(token) = token {
        state.gate.logout(&token).await?;
    }
    set_cookie(
        Redirect::to("/login").into_response(),
        SessionGate::expired_cookie(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn hashed_passwords_verify() {
        let hash = hash_password("rahasia").unwrap();
        assert_ne!(hash, "rahasia");
        assert!(verify_password("rahasia", &hash).unwrap());
        assert!(!verify_password("Rahasia", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(
            hash_password("rahasia").unwrap(),
            hash_password("rahasia").unwrap()
        );
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_password("rahasia", "plaintext").is_err());
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = MemoryStore::new();
        assert!(seed_admin(&store, "admin", "rahasia").await.unwrap());
        assert!(!seed_admin(&store, "admin", "lain").await.unwrap());

        let admin = store.find_by_username("admin").await.unwrap().unwrap();
        assert!(verify_password("rahasia", &admin.password_hash).unwrap());
    }

    #[tokio::test]
    async fn seeding_rejects_empty_password() {
        let store = MemoryStore::new();
        assert!(seed_admin(&store, "admin", "").await.is_err());
    }
}
