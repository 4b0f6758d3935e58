use std::env;

use log::warn;

/// Shared secret and endpoint URLs, read from the environment once at
/// startup. These never live in the config file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub secret: String,
    pub push_url: String,
    pub mirror_url: String,
}

impl Credentials {
    pub fn from_env() -> Self {
        let creds = Self {
            secret: clean(env::var("ARENA_SECRET").unwrap_or_default()),
            push_url: clean(env::var("ARENA_PUSH_URL").unwrap_or_default()),
            mirror_url: clean(env::var("ARENA_MIRROR_URL").unwrap_or_default()),
        };

        if creds.secret.is_empty() {
            warn!("ARENA_SECRET is not set (push will fail)");
        }
        if creds.push_url.is_empty() {
            warn!("ARENA_PUSH_URL is not set (push will fail)");
        }
        if creds.mirror_url.is_empty() {
            warn!("ARENA_MIRROR_URL is not set (mirror and time sync unavailable)");
        }
        creds
    }

    pub fn secret(&self) -> Option<&str> {
        non_empty(&self.secret)
    }

    pub fn push_url(&self) -> Option<&str> {
        non_empty(&self.push_url)
    }

    pub fn mirror_url(&self) -> Option<&str> {
        non_empty(&self.mirror_url)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Strip quotes and stray CRs that sneak in via `.env` files on Windows.
fn clean(raw: String) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .replace('\r', "")
}
