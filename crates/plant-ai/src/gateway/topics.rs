//! Topic-pattern registry for the ingestion gateway. Patterns may use
//! the `+` single-level wildcard; a topic must resolve to exactly one
//! registered message kind.

use regex::Regex;

/// Message families the gateway knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    InspectionResult,
    InspectionValue,
}

impl MessageKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::InspectionResult => "inspection_result",
            Self::InspectionValue => "inspection_value",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TopicError {
    #[error("no pattern matches topic {0}")]
    NoMatch(String),
    #[error("topic {topic} matches {count} patterns")]
    Ambiguous { topic: String, count: usize },
    #[error("invalid topic pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
}

struct TopicEntry {
    pattern: String,
    matcher: Regex,
    kind: MessageKind,
}

pub struct TopicRegistry {
    entries: Vec<TopicEntry>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a pattern. `+` matches exactly one topic level, never
    /// across a `/` separator.
    pub fn register(&mut self, pattern: &str, kind: MessageKind) -> Result<(), TopicError> {
        let escaped = pattern
            .split('/')
            .map(|segment| {
                if segment == "+" {
                    "[^/]+".to_string()
                } else {
                    regex::escape(segment)
                }
            })
            .collect::<Vec<_>>()
            .join("/");
        let matcher =
            Regex::new(&format!("^{escaped}$")).map_err(|source| TopicError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })?;
        self.entries.push(TopicEntry {
            pattern: pattern.to_string(),
            matcher,
            kind,
        });
        Ok(())
    }

    /// Subscription patterns, for handing to the MQTT client.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.pattern.as_str())
    }

    /// Resolve a concrete topic to its message kind. Zero matches and
    /// multiple matches are both errors; the latter means the
    /// registered patterns overlap.
    pub fn resolve(&self, topic: &str) -> Result<MessageKind, TopicError> {
        let mut matches = self
            .entries
            .iter()
            .filter(|entry| entry.matcher.is_match(topic));
        match (matches.next(), matches.next()) {
            (None, _) => Err(TopicError::NoMatch(topic.to_string())),
            (Some(entry), None) => Ok(entry.kind),
            (Some(_), Some(_)) => Err(TopicError::Ambiguous {
                topic: topic.to_string(),
                count: self
                    .entries
                    .iter()
                    .filter(|entry| entry.matcher.is_match(topic))
                    .count(),
            }),
        }
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}
