//! The User Directory is an external collaborator per spec §1/§6: it owns
//! accounts, characters, ratings and win/loss records. `duel-server` only
//! ever talks to it through this trait, so the session engine and the
//! matchmaker stay ignorant of whether that's a real HTTP service
//! ([`HttpUserDirectory`]) or a test double ([`FakeUserDirectory`]).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use duel_core::character::CharacterSheet;

/// The `{access, refresh, user}` shape both `/login` and `/get_user` return
/// (spec §6's fixed interface).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTokens {
    pub access: String,
    pub refresh: String,
    pub user: String,
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `POST /login` — exchanges credentials for a fresh access/refresh pair.
    async fn login(&self, username: &str, password: &str) -> Result<AuthTokens, UserDirectoryError>;

    /// `POST /get_user` — validates an access/refresh cookie pair and
    /// resolves it to a username, per the auth-token endpoint's "requires a
    /// valid user cookie" (spec §6).
    async fn get_user(&self, access: &str, refresh: &str) -> Result<AuthTokens, UserDirectoryError>;

    /// `GET /get_user_characters/<username>` — a user's playable characters.
    async fn get_user_characters(
        &self,
        username: &str,
    ) -> Result<Vec<CharacterSheet>, UserDirectoryError>;

    /// `PATCH /add_win` — body `{username}`.
    async fn add_win(&self, username: &str) -> Result<(), UserDirectoryError>;
    /// `PATCH /add_loss` — body `{username}`.
    async fn add_loss(&self, username: &str) -> Result<(), UserDirectoryError>;
    /// `PATCH /add_draw` — body `{username}`.
    async fn add_draw(&self, username: &str) -> Result<(), UserDirectoryError>;

    /// `PATCH /change_rating` — body `{username, rating: signed_int}`.
    async fn change_rating(&self, username: &str, rating: i64) -> Result<(), UserDirectoryError>;

    /// `PATCH /update_char_experience` — body `{charname, experience}`.
    async fn update_char_experience(
        &self,
        charname: &str,
        experience: i64,
    ) -> Result<(), UserDirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UserDirectoryError {
    #[error("identity token rejected")]
    Unauthenticated,
    #[error("user directory request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("user directory returned an unexpected status: {0}")]
    UnexpectedStatus(u16),
}

/// Talks to the real User Directory service over HTTP, the same way the
/// teacher's relay server would reach any out-of-process collaborator.
pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUserDirectory {
    pub fn new(base_url: String) -> Self {
        HttpUserDirectory {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn patch_with_body(&self, path: &str, body: serde_json::Value) -> Result<(), UserDirectoryError> {
        let response = self.client.patch(self.url(path)).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(UserDirectoryError::UnexpectedStatus(
                response.status().as_u16(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn login(&self, username: &str, password: &str) -> Result<AuthTokens, UserDirectoryError> {
        let response = self
            .client
            .post(self.url("/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UserDirectoryError::Unauthenticated);
        }
        if !response.status().is_success() {
            return Err(UserDirectoryError::UnexpectedStatus(
                response.status().as_u16(),
            ));
        }
        Ok(response.json().await?)
    }

    async fn get_user(&self, access: &str, refresh: &str) -> Result<AuthTokens, UserDirectoryError> {
        let response = self
            .client
            .post(self.url("/get_user"))
            .json(&json!({ "access": access, "refresh": refresh }))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(UserDirectoryError::Unauthenticated);
        }
        if !response.status().is_success() {
            return Err(UserDirectoryError::UnexpectedStatus(
                response.status().as_u16(),
            ));
        }
        Ok(response.json().await?)
    }

    async fn get_user_characters(
        &self,
        username: &str,
    ) -> Result<Vec<CharacterSheet>, UserDirectoryError> {
        let response = self
            .client
            .get(self.url(&format!("/get_user_characters/{username}")))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(UserDirectoryError::UnexpectedStatus(
                response.status().as_u16(),
            ));
        }
        Ok(response.json().await?)
    }

    async fn add_win(&self, username: &str) -> Result<(), UserDirectoryError> {
        self.patch_with_body("/add_win", json!({ "username": username }))
            .await
    }

    async fn add_loss(&self, username: &str) -> Result<(), UserDirectoryError> {
        self.patch_with_body("/add_loss", json!({ "username": username }))
            .await
    }

    async fn add_draw(&self, username: &str) -> Result<(), UserDirectoryError> {
        self.patch_with_body("/add_draw", json!({ "username": username }))
            .await
    }

    async fn change_rating(&self, username: &str, rating: i64) -> Result<(), UserDirectoryError> {
        self.patch_with_body(
            "/change_rating",
            json!({ "username": username, "rating": rating }),
        )
        .await
    }

    async fn update_char_experience(
        &self,
        charname: &str,
        experience: i64,
    ) -> Result<(), UserDirectoryError> {
        self.patch_with_body(
            "/update_char_experience",
            json!({ "charname": charname, "experience": experience }),
        )
        .await
    }
}

/// An in-memory stand-in used by tests so session and matchmaker logic can
/// be exercised without a live User Directory.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct FakeUserDirectory {
        pub characters: Mutex<HashMap<String, Vec<CharacterSheet>>>,
        pub wins: Mutex<HashMap<String, u32>>,
        pub losses: Mutex<HashMap<String, u32>>,
        pub draws: Mutex<HashMap<String, u32>>,
        pub ratings: Mutex<HashMap<String, i64>>,
        pub experience: Mutex<HashMap<String, i64>>,
    }

    #[async_trait]
    impl UserDirectory for FakeUserDirectory {
        async fn login(&self, username: &str, _password: &str) -> Result<AuthTokens, UserDirectoryError> {
            Ok(AuthTokens {
                access: format!("{username}-access"),
                refresh: format!("{username}-refresh"),
                user: username.to_string(),
            })
        }

        async fn get_user(&self, access: &str, refresh: &str) -> Result<AuthTokens, UserDirectoryError> {
            let user = access
                .strip_suffix("-access")
                .ok_or(UserDirectoryError::Unauthenticated)?
                .to_string();
            Ok(AuthTokens {
                access: access.to_string(),
                refresh: refresh.to_string(),
                user,
            })
        }

        async fn get_user_characters(
            &self,
            username: &str,
        ) -> Result<Vec<CharacterSheet>, UserDirectoryError> {
            Ok(self
                .characters
                .lock()
                .await
                .get(username)
                .cloned()
                .unwrap_or_default())
        }

        async fn add_win(&self, username: &str) -> Result<(), UserDirectoryError> {
            *self.wins.lock().await.entry(username.to_string()).or_insert(0) += 1;
            Ok(())
        }

        async fn add_loss(&self, username: &str) -> Result<(), UserDirectoryError> {
            *self
                .losses
                .lock()
                .await
                .entry(username.to_string())
                .or_insert(0) += 1;
            Ok(())
        }

        async fn add_draw(&self, username: &str) -> Result<(), UserDirectoryError> {
            *self
                .draws
                .lock()
                .await
                .entry(username.to_string())
                .or_insert(0) += 1;
            Ok(())
        }

        async fn change_rating(&self, username: &str, delta: i64) -> Result<(), UserDirectoryError> {
            *self
                .ratings
                .lock()
                .await
                .entry(username.to_string())
                .or_insert(0) += delta;
            Ok(())
        }

        async fn update_char_experience(
            &self,
            character_name: &str,
            experience_gained: i64,
        ) -> Result<(), UserDirectoryError> {
            *self
                .experience
                .lock()
                .await
                .entry(character_name.to_string())
                .or_insert(0) += experience_gained;
            Ok(())
        }
    }
}
