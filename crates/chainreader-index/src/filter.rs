//! Filter specifications and their mapping onto index key spaces.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use chainreader_core::error::ConfigError;

use crate::error::IndexError;
use crate::kind::{
    combined_key, EventOrigin, IndexKind, EVENT_ORIGIN_PREFIX, EVENT_TYPE_PREFIX,
    MESSAGE_TYPE_PREFIX,
};

/// How per-category results are merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombinePolicy {
    /// A block matches if any requested key matches.
    #[default]
    Any,
    /// A block must match at least one key of every non-empty category.
    All,
}

/// Requested keys, grouped by category.
///
/// Within a category keys are always OR-ed; `policy` decides how the
/// categories combine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub event_types: BTreeSet<String>,
    pub event_origins: BTreeSet<EventOrigin>,
    pub message_types: BTreeSet<String>,
    pub policy: CombinePolicy,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn event_origins(mut self, origins: impl IntoIterator<Item = EventOrigin>) -> Self {
        self.event_origins.extend(origins);
        self
    }

    pub fn message_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_types.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn policy(mut self, policy: CombinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.event_types.is_empty() && self.event_origins.is_empty() && self.message_types.is_empty()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Err(ConfigError::EmptyFilter);
        }
        Ok(())
    }

    fn categories(&self) -> usize {
        [
            !self.event_types.is_empty(),
            !self.event_origins.is_empty(),
            !self.message_types.is_empty(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// The narrowest index able to answer this filter.
    pub fn default_kind(&self) -> IndexKind {
        if self.categories() != 1 {
            IndexKind::Combined
        } else if !self.event_types.is_empty() {
            IndexKind::EventType
        } else if !self.event_origins.is_empty() {
            IndexKind::EventOrigin
        } else {
            IndexKind::MessageType
        }
    }

    /// Key groups in the key space of `kind`, one group per non-empty
    /// category.
    pub fn key_groups(&self, kind: IndexKind) -> Result<Vec<Vec<String>>, IndexError> {
        self.validate()?;

        let origins = || self.event_origins.iter().map(|o| o.as_str().to_string());
        let single = |category: &'static str, keys: Vec<String>, only: bool| {
            if only {
                Ok(vec![keys])
            } else {
                Err(IndexError::UnsupportedFilter {
                    kind: kind.short_name(),
                    category,
                })
            }
        };

        match kind {
            IndexKind::EventType => single(
                "event origin or message type",
                self.event_types.iter().cloned().collect(),
                self.event_origins.is_empty() && self.message_types.is_empty(),
            ),
            IndexKind::EventOrigin => single(
                "event type or message type",
                origins().collect(),
                self.event_types.is_empty() && self.message_types.is_empty(),
            ),
            IndexKind::MessageType => single(
                "event type or event origin",
                self.message_types.iter().cloned().collect(),
                self.event_types.is_empty() && self.event_origins.is_empty(),
            ),
            IndexKind::Combined => {
                let groups = [
                    (EVENT_TYPE_PREFIX, self.event_types.iter().cloned().collect::<Vec<_>>()),
                    (EVENT_ORIGIN_PREFIX, origins().collect()),
                    (MESSAGE_TYPE_PREFIX, self.message_types.iter().cloned().collect()),
                ];
                Ok(groups
                    .into_iter()
                    .filter(|(_, keys)| !keys.is_empty())
                    .map(|(prefix, keys)| keys.iter().map(|k| combined_key(prefix, k)).collect())
                    .collect())
            }
        }
    }
}

impl std::fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |set: Vec<&str>| set.join(",");
        write!(
            f,
            "event types:[{}] event origins:[{}] message types:[{}] policy:{:?}",
            join(self.event_types.iter().map(String::as_str).collect()),
            join(self.event_origins.iter().map(|o| o.as_str()).collect()),
            join(self.message_types.iter().map(String::as_str).collect()),
            self.policy,
        )
    }
}
