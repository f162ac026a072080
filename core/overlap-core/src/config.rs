//! Plugin configuration: server URL and the two tokens.
//!
//! Resolution order: defaults ← `config.json` ← environment overrides.
//! Persistence lives in [`crate::store::StateStore`].

use serde::{Deserialize, Serialize};
use std::env;

pub const SERVER_URL_ENV: &str = "OVERLAP_SERVER_URL";
pub const TEAM_TOKEN_ENV: &str = "OVERLAP_TEAM_TOKEN";
pub const USER_TOKEN_ENV: &str = "OVERLAP_USER_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_token: Option<String>,
}

impl Config {
    /// All three fields present and non-empty.
    pub fn is_configured(&self) -> bool {
        [&self.server_url, &self.team_token, &self.user_token]
            .iter()
            .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }

    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(url) = &overrides.server_url {
            self.server_url = Some(url.clone());
        }
        if let Some(token) = &overrides.team_token {
            self.team_token = Some(token.clone());
        }
        if let Some(token) = &overrides.user_token {
            self.user_token = Some(token.clone());
        }
        self
    }

    /// Copies every field that is set in `other` over this config.
    pub fn merge(&mut self, other: Config) {
        if other.server_url.is_some() {
            self.server_url = other.server_url;
        }
        if other.team_token.is_some() {
            self.team_token = other.team_token;
        }
        if other.user_token.is_some() {
            self.user_token = other.user_token;
        }
    }
}

/// Environment-provided values that win over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub team_token: Option<String>,
    pub user_token: Option<String>,
}

impl ConfigOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds overrides from an arbitrary variable lookup. Empty values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            server_url: get(SERVER_URL_ENV),
            team_token: get(TEAM_TOKEN_ENV),
            user_token: get(USER_TOKEN_ENV),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }
}

/// Masks a token for display, keeping the last four characters.
pub fn mask_token(token: Option<&str>) -> String {
    match token {
        None | Some("") => "(not set)".to_string(),
        Some(t) if t.chars().count() <= 4 => "****".to_string(),
        Some(t) => {
            let tail: String = t.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("****{}", tail)
        }
    }
}
