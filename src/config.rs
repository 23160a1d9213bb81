//! String keyed client configuration.
//!
//! A [`ClientConfig`] is a flat map of string keys to string values. At
//! construction the consumer splits it exactly once: keys owned by the
//! deserializers are consumed first, client-local keys are parsed into a
//! [`ConsumerConfig`], and every remaining key is handed to the transport
//! untouched.

use std::{
    collections::{btree_map, BTreeMap},
    time::Duration,
};

use crate::error::{Error, Result};

/// Recognised configuration keys.
pub mod property_names {
    pub const GROUP_ID: &str = "group.id";
    pub const CLIENT_ID: &str = "client.id";
    pub const ENABLE_AUTO_COMMIT: &str = "enable.auto.commit";
    pub const AUTO_COMMIT_INTERVAL_MS: &str = "auto.commit.interval.ms";
    pub const ENABLE_AUTO_OFFSET_STORE: &str = "enable.auto.offset.store";
    pub const AUTO_OFFSET_RESET: &str = "auto.offset.reset";
    pub const ENABLE_PARTITION_EOF: &str = "enable.partition.eof";
    pub const SESSION_TIMEOUT_MS: &str = "session.timeout.ms";
    pub const STATISTICS_INTERVAL_MS: &str = "statistics.interval.ms";

    // client-local
    pub const CONSUME_RESULT_FIELDS: &str = "consume.result.fields";
    pub const STRING_DESERIALIZER_ENCODING_KEY: &str = "string.deserializer.encoding.key";
    pub const STRING_DESERIALIZER_ENCODING_VALUE: &str = "string.deserializer.encoding.value";
    pub const ENABLE_BACKGROUND_POLL: &str = "enable.background.poll";
    pub const DELIVERY_REPORT_FIELDS: &str = "delivery.report.fields";
}

use property_names as names;

const DEFAULT_CLIENT_ID: &str = crate::DEFAULT_CLIENT_ID;
const DEFAULT_AUTO_COMMIT_INTERVAL_MS: u64 = 5000;

/// Producer options that have no meaning for a consumer.
const PRODUCER_ONLY_PROPERTIES: [&str; 2] =
    [names::ENABLE_BACKGROUND_POLL, names::DELIVERY_REPORT_FIELDS];

/// A flat `key -> value` configuration map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    conf_map: BTreeMap<String, String>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.conf_map.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.conf_map.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.conf_map.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.conf_map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.conf_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conf_map.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.conf_map.iter()
    }

    /// Keep only the entries also present in `other`.
    pub fn intersect(&self, other: &ClientConfig) -> ClientConfig {
        self.conf_map
            .iter()
            .filter(|(key, _)| other.contains_key(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Parse a boolean option, `default` if absent.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => parse_bool(value).ok_or_else(|| {
                Error::Config(format!("'{}' must be a boolean, got '{}'", key, value))
            }),
        }
    }

    /// Parse a non-negative integer option, `default` if absent.
    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.trim().parse::<u64>().map_err(|_| {
                Error::Config(format!(
                    "'{}' must be a non-negative integer, got '{}'",
                    key, value
                ))
            }),
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ClientConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            conf_map: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ClientConfig {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.conf_map.iter()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

/// Which optional parts of a record are marshaled into a consume result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConsumeResultFields {
    pub headers: bool,
    pub timestamp: bool,
    pub topic: bool,
}

impl Default for ConsumeResultFields {
    fn default() -> Self {
        Self::all()
    }
}

impl ConsumeResultFields {
    pub fn all() -> Self {
        Self {
            headers: true,
            timestamp: true,
            topic: true,
        }
    }

    pub fn none() -> Self {
        Self {
            headers: false,
            timestamp: false,
            topic: false,
        }
    }

    /// Parse `all`, `none` or a comma separated list of
    /// `headers`, `timestamp` and `topic`.
    pub fn parse(value: &str) -> Result<Self> {
        let mut fields = Self::none();
        for field in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match field {
                "all" => fields = Self::all(),
                "none" => {}
                "headers" => fields.headers = true,
                "timestamp" => fields.timestamp = true,
                "topic" => fields.topic = true,
                unknown => {
                    return Err(Error::Config(format!(
                        "unknown field '{}' in '{}'",
                        unknown,
                        names::CONSUME_RESULT_FIELDS
                    )))
                }
            }
        }
        Ok(fields)
    }
}

/// Client-local settings read once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    pub group_id: String,
    pub client_id: String,
    pub consume_result_fields: ConsumeResultFields,
    pub enable_auto_commit: bool,
    pub auto_commit_interval: Duration,
    pub enable_auto_offset_store: bool,
}

impl ConsumerConfig {
    /// Validate `config` and split it into client-local settings and the
    /// configuration forwarded to the transport.
    ///
    /// Engine settings the transport also needs (group id, commit and store
    /// toggles) stay in the forwarded map; purely client-local keys do not.
    pub fn split(mut config: ClientConfig) -> Result<(ConsumerConfig, ClientConfig)> {
        let group_id = match config.get(names::GROUP_ID) {
            Some(group_id) if !group_id.trim().is_empty() => group_id.to_owned(),
            _ => {
                return Err(Error::Config(format!(
                    "'{}' configuration parameter is required and was not specified",
                    names::GROUP_ID
                )))
            }
        };

        let client_id = config
            .get(names::CLIENT_ID)
            .unwrap_or(DEFAULT_CLIENT_ID)
            .to_owned();

        let consume_result_fields = match config.remove(names::CONSUME_RESULT_FIELDS) {
            Some(value) => ConsumeResultFields::parse(&value)?,
            None => ConsumeResultFields::default(),
        };

        for key in PRODUCER_ONLY_PROPERTIES {
            if config.remove(key).is_some() {
                tracing::warn!("Ignoring producer-only property '{}' on a consumer", key);
            }
        }

        let enable_auto_commit = config.get_bool(names::ENABLE_AUTO_COMMIT, true)?;
        let auto_commit_interval = Duration::from_millis(
            config.get_u64(names::AUTO_COMMIT_INTERVAL_MS, DEFAULT_AUTO_COMMIT_INTERVAL_MS)?,
        );
        let enable_auto_offset_store = config.get_bool(names::ENABLE_AUTO_OFFSET_STORE, true)?;

        for (key, value) in config.iter() {
            if value.is_empty() {
                return Err(Error::Config(format!(
                    "'{}' configuration parameter must not be empty",
                    key
                )));
            }
        }

        tracing::debug!(
            "Consumer {} in group {} | auto commit {} every {:?}, auto store {}, fields {:?}",
            client_id,
            group_id,
            enable_auto_commit,
            auto_commit_interval,
            enable_auto_offset_store,
            consume_result_fields
        );

        Ok((
            ConsumerConfig {
                group_id,
                client_id,
                consume_result_fields,
                enable_auto_commit,
                auto_commit_interval,
                enable_auto_offset_store,
            },
            config,
        ))
    }
}
