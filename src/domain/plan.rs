//! Subscription plans
//!
//! Plans are static reference data. The daily limit a new API key receives
//! comes from configuration ([`crate::config::PlanSettings`]); price and
//! feature list are fixed here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::config::PlanSettings;

/// Subscription plan attached to every user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Basic,
    Pro,
    Enterprise,
    Admin,
}

/// Every plan that is paid for (plus admin, which implies all features)
pub const PAID_PLANS: &[Plan] = &[Plan::Basic, Plan::Pro, Plan::Enterprise, Plan::Admin];

impl Plan {
    pub const ALL: [Plan; 5] = [Plan::Free, Plan::Basic, Plan::Pro, Plan::Enterprise, Plan::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Basic => "basic",
            Plan::Pro => "pro",
            Plan::Enterprise => "enterprise",
            Plan::Admin => "admin",
        }
    }

    /// Monthly price in cents
    pub fn price_cents(&self) -> i64 {
        match self {
            Plan::Free | Plan::Admin => 0,
            Plan::Basic => 999,
            Plan::Pro => 2_999,
            Plan::Enterprise => 9_999,
        }
    }

    pub fn features(&self) -> &'static [&'static str] {
        match self {
            Plan::Free => &["ai_chat", "downloader"],
            Plan::Basic => &["ai_chat", "ai_image", "downloader"],
            Plan::Pro => &["ai_chat", "ai_image", "downloader", "usage_history"],
            Plan::Enterprise | Plan::Admin => &[
                "ai_chat",
                "ai_image",
                "downloader",
                "usage_history",
                "priority_support",
            ],
        }
    }

    pub fn is_paid(&self) -> bool {
        PAID_PLANS.contains(self)
    }

    /// Reference data for this plan using the configured daily limits
    pub fn info(&self, limits: &PlanSettings) -> PlanInfo {
        PlanInfo {
            name: *self,
            price_cents: self.price_cents(),
            daily_limit: limits.daily_limit(*self),
            features: self.features().iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPlan(pub String);

impl fmt::Display for UnknownPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown plan '{}'", self.0)
    }
}

impl std::error::Error for UnknownPlan {}

impl FromStr for Plan {
    type Err = UnknownPlan;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "basic" => Ok(Plan::Basic),
            "pro" => Ok(Plan::Pro),
            "enterprise" => Ok(Plan::Enterprise),
            "admin" => Ok(Plan::Admin),
            _ => Err(UnknownPlan(s.to_string())),
        }
    }
}

/// Plan reference data as served by `GET /api/v1/plans`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlanInfo {
    pub name: Plan,
    pub price_cents: i64,
    pub daily_limit: i32,
    pub features: Vec<String>,
}
