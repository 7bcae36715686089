//! Topic addressing for request and response topics
//!
//! A [`Topic`] is the output address of one request. It knows whether it carries
//! a wildcard marker, how to expand that marker into concrete subtopics for
//! multi-valued results, and where errors for the request are reported.
//!
//! ```
//! use hostmqtt::protocol::Topic;
//!
//! let topic = Topic::parse("disk/*/usage", "host/").unwrap();
//! assert!(topic.is_multi_valued());
//! assert_eq!(topic.subtopic("sda"), "host/disk/sda/usage");
//! assert_eq!(topic.error_topic(), "host/error/disk/*/usage");
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default wildcard marker substituted by keys and indices
pub const DEFAULT_WILDCARD: char = '*';

/// Default segment inserted in front of a topic's path for error reports
pub const DEFAULT_ERROR_SEGMENT: &str = "error";

/// Addressing conventions shared by every topic of a bridge instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicPolicy {
    /// Character marking the substitution point in a multi-valued topic
    pub wildcard: char,
    /// Segment placed between the prefix and the path of error topics
    pub error_segment: String,
}

impl Default for TopicPolicy {
    fn default() -> Self {
        Self {
            wildcard: DEFAULT_WILDCARD,
            error_segment: DEFAULT_ERROR_SEGMENT.to_string(),
        }
    }
}

/// Topic parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("Topic cannot be empty")]
    Empty,
}

/// Output topic of a single request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    prefix: String,
    path: String,
    has_wildcard: bool,
    policy: TopicPolicy,
}

impl Topic {
    /// Parse `raw` under `prefix` using the default [`TopicPolicy`]
    pub fn parse(raw: &str, prefix: &str) -> Result<Self, TopicError> {
        Self::parse_with_policy(raw, prefix, &TopicPolicy::default())
    }

    /// Parse `raw` under `prefix`.
    ///
    /// A raw topic that already starts with `prefix` is reused as-is; any other
    /// raw topic is placed under the prefix.
    pub fn parse_with_policy(
        raw: &str,
        prefix: &str,
        policy: &TopicPolicy,
    ) -> Result<Self, TopicError> {
        if raw.is_empty() {
            return Err(TopicError::Empty);
        }

        let path = raw.strip_prefix(prefix).unwrap_or(raw);

        Ok(Self {
            prefix: prefix.to_string(),
            path: path.to_string(),
            has_wildcard: path.contains(policy.wildcard),
            policy: policy.clone(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Topic path below the prefix
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `/`-separated segments of the path
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/')
    }

    /// True when the path carries the wildcard marker
    pub fn is_multi_valued(&self) -> bool {
        self.has_wildcard
    }

    /// Concrete topic for one element of a multi-valued result.
    ///
    /// Only the first wildcard marker is replaced. Calling this on a topic
    /// without a wildcard is a caller bug.
    pub fn subtopic(&self, key: &str) -> String {
        debug_assert!(
            self.has_wildcard,
            "subtopic() called on single-valued topic {}",
            self.base_topic()
        );

        let mut marker = [0u8; 4];
        let marker = self.policy.wildcard.encode_utf8(&mut marker);
        format!("{}{}", self.prefix, self.path.replacen(&*marker, key, 1))
    }

    /// Full topic without substitution, used for scalar results
    pub fn base_topic(&self) -> String {
        format!("{}{}", self.prefix, self.path)
    }

    /// Topic receiving the error report for this request
    pub fn error_topic(&self) -> String {
        if self.path.is_empty() {
            format!("{}{}", self.prefix, self.policy.error_segment)
        } else {
            format!("{}{}/{}", self.prefix, self.policy.error_segment, self.path)
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix, self.path)
    }
}
