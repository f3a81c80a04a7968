//! Social media download upstream

use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use url::Url;

use super::http_client::{ProviderError, ProxyClient, UpstreamReply};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Instagram,
    Youtube,
    Twitter,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Tiktok,
        Platform::Instagram,
        Platform::Youtube,
        Platform::Twitter,
        Platform::Facebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
        }
    }

    fn hosts(&self) -> &'static [&'static str] {
        match self {
            Platform::Tiktok => &["tiktok.com"],
            Platform::Instagram => &["instagram.com"],
            Platform::Youtube => &["youtube.com", "youtu.be"],
            Platform::Twitter => &["twitter.com", "x.com"],
            Platform::Facebook => &["facebook.com", "fb.watch"],
        }
    }

    /// Parse `raw` and check it points at this platform.
    pub fn validate_url(&self, raw: &str) -> Result<Url, ProviderError> {
        let url = Url::parse(raw.trim()).map_err(|_| ProviderError::InvalidRequest("url must be a valid URL".to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProviderError::InvalidRequest("url must use http or https".to_string()));
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let matches_host = self
            .hosts()
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}")));
        if !matches_host {
            return Err(ProviderError::InvalidRequest(format!("url is not a {} link", self.as_str())));
        }
        Ok(url)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                ProviderError::InvalidRequest(format!(
                    "Unsupported platform '{s}'. Supported: tiktok, instagram, youtube, twitter, facebook"
                ))
            })
    }
}

#[derive(Clone)]
pub struct SocialDownloader {
    client: ProxyClient,
    base_url: String,
}

impl SocialDownloader {
    pub fn new(client: ProxyClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve download links for an already validated media URL.
    pub async fn download(&self, platform: Platform, media_url: &Url) -> UpstreamReply {
        let fallback = || {
            json!({
                "platform": platform,
                "url": media_url.as_str(),
                "links": [],
                "message": "The download service is temporarily unavailable. Please try again later.",
            })
        };

        let endpoint = match Url::parse_with_params(
            &format!("{}/{}", self.base_url, platform.as_str()),
            &[("url", media_url.as_str())],
        ) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                tracing::warn!(error = %e, "Bad downloader URL, serving fallback");
                return UpstreamReply { body: fallback(), fallback: true };
            }
        };

        self.client.get_or_fallback(endpoint.as_str(), &[], fallback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parsing() {
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::Tiktok);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_url_must_match_platform() {
        assert!(Platform::Youtube.validate_url("https://youtu.be/dQw4w9WgXcQ").is_ok());
        assert!(Platform::Twitter.validate_url("https://mobile.x.com/a/status/1").is_ok());
        assert!(Platform::Instagram.validate_url("https://evil-instagram.com/p/1").is_err());
        assert!(Platform::Tiktok.validate_url("ftp://tiktok.com/v/1").is_err());
        assert!(Platform::Facebook.validate_url("not a url").is_err());
    }
}
