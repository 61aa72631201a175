//! Newtype identifiers for pipeline entities.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Create from an existing string.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

entity_id! {
    /// Unique identifier for a collected source video.
    VideoId
}

entity_id! {
    /// Unique identifier for a template.
    TemplateId
}

entity_id! {
    /// Unique identifier for a render.
    RenderId
}

entity_id! {
    /// Unique identifier for a publish log row.
    PublishLogId
}

entity_id! {
    /// Unique identifier for a user project.
    ProjectId
}

entity_id! {
    /// Unique identifier for a linked social account.
    SocialAccountId
}

entity_id! {
    /// Unique identifier for a queue job.
    JobId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(VideoId::new(), VideoId::new());
        assert_ne!(JobId::new(), JobId::new());
    }

    #[test]
    fn id_serde_is_transparent() {
        let id = RenderId::from_string("r-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"r-123\"");
        let back: RenderId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
