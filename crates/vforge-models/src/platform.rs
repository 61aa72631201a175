//! Social platform enum.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Supported social platforms for intake and publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Tiktok,
}

impl Platform {
    /// Infer the platform from a source URL host.
    pub fn from_url(source_url: &str) -> Option<Self> {
        let parsed = url::Url::parse(source_url).ok()?;
        let host = parsed.host_str()?;
        if host == "instagram.com" || host.ends_with(".instagram.com") {
            Some(Platform::Instagram)
        } else if host == "tiktok.com" || host.ends_with(".tiktok.com") {
            Some(Platform::Tiktok)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Tiktok => "tiktok",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::Tiktok),
            other => Err(format!("unknown platform: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_serde() {
        let json = serde_json::to_string(&Platform::Tiktok).unwrap();
        assert_eq!(json, "\"tiktok\"");
        assert_eq!(serde_json::from_str::<Platform>(&json).unwrap(), Platform::Tiktok);
    }

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("Instagram".parse::<Platform>().unwrap(), Platform::Instagram);
        assert!("youtube".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_from_url_host() {
        assert_eq!(
            Platform::from_url("https://www.instagram.com/reel/abc/"),
            Some(Platform::Instagram)
        );
        assert_eq!(
            Platform::from_url("https://www.tiktok.com/@user/video/123"),
            Some(Platform::Tiktok)
        );
        assert_eq!(Platform::from_url("https://youtube.com/watch?v=x"), None);
        assert_eq!(Platform::from_url("not a url"), None);
    }
}
