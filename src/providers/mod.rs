//! Upstream integrations
//!
//! ```text
//!            ┌──────────────┐
//!            │ ProxyClient  │  budget + timeout + fallback
//!            └──────┬───────┘
//!          ┌────────┴─────────┐
//!    ┌─────┴────┐      ┌──────┴───────────┐
//!    │ AiClient │      │ SocialDownloader │
//!    └──────────┘      └──────────────────┘
//! ```

pub mod ai;
pub mod http_client;
pub mod social;

pub use ai::AiClient;
pub use http_client::{ProviderError, ProxyClient, UpstreamReply};
pub use social::{Platform, SocialDownloader};
