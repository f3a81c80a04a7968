//! Domain types shared by the access layer and the HTTP layer

pub mod context;
pub mod plan;

pub use context::{KeyContext, Principal, RequestContext, RequestMeta, UsageSnapshot};
pub use plan::{Plan, PlanInfo, PAID_PLANS};
