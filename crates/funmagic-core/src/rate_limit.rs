//! Rate-limit configuration.
//!
//! A single configuration row holds purchase-based tiers and a base limit per
//! request category. A user's effective limit is the base `max` scaled by the
//! multiplier of the highest tier their `lifetime_purchased` qualifies for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the tier used when no configured tier qualifies.
pub const FALLBACK_TIER: &str = "free";

/// A purchase-volume bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitTier {
    /// Tier name, e.g. `premium`.
    pub name: String,
    /// Minimum `lifetime_purchased` to qualify.
    pub min_purchased: i64,
    /// Factor applied to every base `max`.
    pub multiplier: f64,
}

/// Base limit for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitLimitEntry {
    /// Requests allowed per window.
    pub max: u32,
    /// Window length.
    pub window_seconds: u32,
}

/// Base limits for every category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitLimits {
    /// Per-user API calls.
    pub user_api: RateLimitLimitEntry,
    /// Per-user task submissions.
    pub task_creation: RateLimitLimitEntry,
    /// Per-IP upload handshakes.
    pub upload: RateLimitLimitEntry,
    /// Per-IP session checks.
    pub auth_session: RateLimitLimitEntry,
    /// Per-IP sign-in and sign-up attempts.
    pub auth_action: RateLimitLimitEntry,
    /// Per-IP ceiling on the whole API.
    pub global_api: RateLimitLimitEntry,
}

/// Request categories that carry their own limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LimitCategory {
    /// See [`RateLimitLimits::user_api`].
    UserApi,
    /// See [`RateLimitLimits::task_creation`].
    TaskCreation,
    /// See [`RateLimitLimits::upload`].
    Upload,
    /// See [`RateLimitLimits::auth_session`].
    AuthSession,
    /// See [`RateLimitLimits::auth_action`].
    AuthAction,
    /// See [`RateLimitLimits::global_api`].
    GlobalApi,
}

impl LimitCategory {
    /// All categories, in display order.
    pub const ALL: [Self; 6] = [
        Self::GlobalApi,
        Self::UserApi,
        Self::TaskCreation,
        Self::Upload,
        Self::AuthSession,
        Self::AuthAction,
    ];

    /// Whether the limit scales with the caller's tier. IP-keyed categories
    /// have no user to look up.
    #[must_use]
    pub const fn is_tiered(self) -> bool {
        matches!(self, Self::UserApi | Self::TaskCreation)
    }

    /// Short key used to namespace counters, e.g. `user:api`.
    #[must_use]
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::UserApi => "rl:user:api",
            Self::TaskCreation => "rl:user:tasks",
            Self::Upload => "rl:upload",
            Self::AuthSession => "rl:auth:session",
            Self::AuthAction => "rl:auth:action",
            Self::GlobalApi => "rl:ip:api",
        }
    }
}

impl RateLimitLimits {
    /// The base entry for a category.
    #[must_use]
    pub const fn get(&self, category: LimitCategory) -> RateLimitLimitEntry {
        match category {
            LimitCategory::UserApi => self.user_api,
            LimitCategory::TaskCreation => self.task_creation,
            LimitCategory::Upload => self.upload,
            LimitCategory::AuthSession => self.auth_session,
            LimitCategory::AuthAction => self.auth_action,
            LimitCategory::GlobalApi => self.global_api,
        }
    }

    fn entries(&self) -> impl Iterator<Item = (LimitCategory, RateLimitLimitEntry)> + '_ {
        LimitCategory::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

/// The full rate-limit configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Purchase tiers, in any order.
    pub tiers: Vec<RateLimitTier>,
    /// Base limits.
    pub limits: RateLimitLimits,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let per_minute = |max| RateLimitLimitEntry {
            max,
            window_seconds: 60,
        };
        Self {
            tiers: vec![
                RateLimitTier {
                    name: "free".into(),
                    min_purchased: 0,
                    multiplier: 1.0,
                },
                RateLimitTier {
                    name: "basic".into(),
                    min_purchased: 1,
                    multiplier: 2.0,
                },
                RateLimitTier {
                    name: "premium".into(),
                    min_purchased: 1000,
                    multiplier: 3.0,
                },
            ],
            limits: RateLimitLimits {
                global_api: per_minute(500),
                user_api: per_minute(200),
                task_creation: per_minute(10),
                upload: per_minute(20),
                auth_session: per_minute(60),
                auth_action: per_minute(10),
            },
        }
    }
}

/// A tier chosen for a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTier {
    /// Tier name.
    pub name: String,
    /// Tier multiplier.
    pub multiplier: f64,
}

/// Reasons a configuration update is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No tiers at all.
    #[error("at least one tier is required")]
    NoTiers,

    /// A tier has an empty name.
    #[error("tier names must not be empty")]
    EmptyTierName,

    /// Two tiers share a name.
    #[error("tier names must be unique: {0}")]
    DuplicateTier(String),

    /// A tier threshold is negative.
    #[error("tier {0}: minPurchased must be >= 0")]
    NegativeThreshold(String),

    /// A tier multiplier is below 0.1 or not finite.
    #[error("tier {0}: multiplier must be >= 0.1")]
    MultiplierTooSmall(String),

    /// A limit allows no requests.
    #[error("{0:?}: max must be >= 1")]
    ZeroMax(LimitCategory),

    /// A limit has an empty window.
    #[error("{0:?}: windowSeconds must be >= 1")]
    ZeroWindow(LimitCategory),
}

impl RateLimitConfig {
    /// Check an administrator-supplied configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::NoTiers);
        }

        let mut seen = std::collections::HashSet::new();
        for tier in &self.tiers {
            if tier.name.trim().is_empty() {
                return Err(ConfigError::EmptyTierName);
            }
            if !seen.insert(tier.name.as_str()) {
                return Err(ConfigError::DuplicateTier(tier.name.clone()));
            }
            if tier.min_purchased < 0 {
                return Err(ConfigError::NegativeThreshold(tier.name.clone()));
            }
            if !tier.multiplier.is_finite() || tier.multiplier < 0.1 {
                return Err(ConfigError::MultiplierTooSmall(tier.name.clone()));
            }
        }

        for (category, entry) in self.limits.entries() {
            if entry.max == 0 {
                return Err(ConfigError::ZeroMax(category));
            }
            if entry.window_seconds == 0 {
                return Err(ConfigError::ZeroWindow(category));
            }
        }

        Ok(())
    }

    /// The highest tier whose threshold `lifetime_purchased` reaches.
    ///
    /// When thresholds tie, the tier listed first wins.
    #[must_use]
    pub fn resolve_tier(&self, lifetime_purchased: i64) -> ResolvedTier {
        self.tiers
            .iter()
            .filter(|t| lifetime_purchased >= t.min_purchased)
            .fold(None::<&RateLimitTier>, |best, t| match best {
                Some(b) if b.min_purchased >= t.min_purchased => Some(b),
                _ => Some(t),
            })
            .map_or_else(
                || ResolvedTier {
                    name: FALLBACK_TIER.into(),
                    multiplier: 1.0,
                },
                |t| ResolvedTier {
                    name: t.name.clone(),
                    multiplier: t.multiplier,
                },
            )
    }

    /// The limit a user with `lifetime_purchased` gets for `category`.
    ///
    /// Untiered categories return the base entry unchanged.
    #[must_use]
    pub fn effective_limit(
        &self,
        category: LimitCategory,
        lifetime_purchased: i64,
    ) -> RateLimitLimitEntry {
        self.limit_for_tier(category, &self.resolve_tier(lifetime_purchased))
    }

    /// The limit for `category` under an already resolved tier.
    #[must_use]
    pub fn limit_for_tier(
        &self,
        category: LimitCategory,
        tier: &ResolvedTier,
    ) -> RateLimitLimitEntry {
        let base = self.limits.get(category);
        if !category.is_tiered() {
            return base;
        }
        RateLimitLimitEntry {
            max: scale(base.max, tier.multiplier),
            window_seconds: base.window_seconds,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn scale(max: u32, multiplier: f64) -> u32 {
    let scaled = (f64::from(max) * multiplier).floor();
    if scaled >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        (scaled as u32).max(1)
    }
}

/// The persisted configuration row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// The configuration.
    pub config: RateLimitConfig,
    /// When it was last written.
    pub updated_at: DateTime<Utc>,
}
