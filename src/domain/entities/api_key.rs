//! The `APIKey` entity and its scope/tier vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Read,
    Write,
    Webhook,
    Admin,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Read => "read",
            Scope::Write => "write",
            Scope::Webhook => "webhook",
            Scope::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Scope::Read),
            "write" => Some(Scope::Write),
            "webhook" => Some(Scope::Webhook),
            "admin" => Some(Scope::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitTier {
    Free,
    Pro,
    Unlimited,
}

impl RateLimitTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RateLimitTier::Free => "free",
            RateLimitTier::Pro => "pro",
            RateLimitTier::Unlimited => "unlimited",
        }
    }

    /// `(refill_per_sec, burst)`, converted from the per-minute rates
    /// spec.md §4.D quotes (`free`=60/min, `pro`=600/min) since the token
    /// bucket refills continuously per second. `Unlimited` bypasses the
    /// limiter entirely and this is never consulted for it.
    pub fn rate_and_burst(self) -> (f64, f64) {
        match self {
            RateLimitTier::Free => (60.0 / 60.0, 10.0),
            RateLimitTier::Pro => (600.0 / 60.0, 50.0),
            RateLimitTier::Unlimited => (f64::INFINITY, f64::INFINITY),
        }
    }
}

/// A verified API key, as looked up/stored. The plaintext secret is never
/// held here — only its hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub user_id: i64,
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: Vec<Scope>,
    pub rate_limit_tier: RateLimitTier,
    pub name: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&Scope::Admin) || self.scopes.contains(&scope)
    }
}

#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub user_id: i64,
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: Vec<Scope>,
    pub rate_limit_tier: RateLimitTier,
    pub name: String,
}

/// The three components of a presented plaintext key:
/// `pk_<env>_<prefix>_<secret>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedKey {
    pub env: String,
    pub prefix: String,
    pub secret: String,
}

impl PresentedKey {
    pub fn parse(plaintext: &str) -> Option<Self> {
        let mut parts = plaintext.splitn(4, '_');
        let scheme = parts.next()?;
        let env = parts.next()?;
        let prefix = parts.next()?;
        let secret = parts.next()?;
        if scheme != "pk" || env.is_empty() || prefix.len() != 6 || secret.is_empty() {
            return None;
        }
        Some(Self {
            env: env.to_string(),
            prefix: prefix.to_string(),
            secret: secret.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_key() {
        let k = PresentedKey::parse("pk_live_ab12cd_deadbeef0123").unwrap();
        assert_eq!(k.env, "live");
        assert_eq!(k.prefix, "ab12cd");
        assert_eq!(k.secret, "deadbeef0123");
    }

    #[test]
    fn rejects_wrong_scheme() {
        assert!(PresentedKey::parse("sk_live_ab12cd_deadbeef").is_none());
    }

    #[test]
    fn rejects_short_prefix() {
        assert!(PresentedKey::parse("pk_live_ab1_deadbeef").is_none());
    }

    #[test]
    fn rejects_missing_parts() {
        assert!(PresentedKey::parse("pk_live_ab12cd").is_none());
        assert!(PresentedKey::parse("garbage").is_none());
    }

    #[test]
    fn admin_scope_implies_all() {
        let key = ApiKey {
            id: 1,
            user_id: 1,
            key_hash: "h".into(),
            key_prefix: "ab12cd".into(),
            scopes: vec![Scope::Admin],
            rate_limit_tier: RateLimitTier::Free,
            name: "n".into(),
            revoked_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };
        assert!(key.has_scope(Scope::Write));
        assert!(key.has_scope(Scope::Admin));
    }

    #[test]
    fn non_admin_scope_is_exact() {
        let key = ApiKey {
            id: 1,
            user_id: 1,
            key_hash: "h".into(),
            key_prefix: "ab12cd".into(),
            scopes: vec![Scope::Read],
            rate_limit_tier: RateLimitTier::Free,
            name: "n".into(),
            revoked_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };
        assert!(key.has_scope(Scope::Read));
        assert!(!key.has_scope(Scope::Write));
    }

    #[test]
    fn revoked_key_is_not_active() {
        let key = ApiKey {
            id: 1,
            user_id: 1,
            key_hash: "h".into(),
            key_prefix: "ab12cd".into(),
            scopes: vec![],
            rate_limit_tier: RateLimitTier::Free,
            name: "n".into(),
            revoked_at: Some(Utc::now()),
            last_used_at: None,
            created_at: Utc::now(),
        };
        assert!(!key.is_active());
    }
}
