//! Plan-gated access checks

use super::AccessError;
use crate::domain::{Plan, Principal};

/// Fails unless there is a principal whose plan is in `allowed`.
pub fn require_plan(principal: Option<&Principal>, allowed: &[Plan]) -> Result<(), AccessError> {
    let principal = principal.ok_or(AccessError::AuthRequired)?;
    if allowed.contains(&principal.plan) {
        Ok(())
    } else {
        Err(AccessError::PlanRequired {
            current_plan: principal.plan,
            required_plans: allowed.to_vec(),
        })
    }
}

pub fn require_admin(principal: Option<&Principal>) -> Result<(), AccessError> {
    let principal = principal.ok_or(AccessError::AuthRequired)?;
    if principal.plan == Plan::Admin {
        Ok(())
    } else {
        Err(AccessError::AdminRequired)
    }
}
