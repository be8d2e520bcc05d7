//! Key-value persistence and the job error channel.

use std::{collections::HashMap, fmt};

use redis::Commands;

use crate::{record::AnalysisResult, AnalyzerError, Result};

/// Channel that receives the mutated job record when an analysis fails.
pub const JOB_ERROR_CHANNEL: &str = "analysis:job:error";

/// Key under which the analysis result of a track is stored.
pub fn analysis_key(track_id: &str) -> String {
    format!("track:{track_id}:analysis")
}

/// Key of the externally owned job status record.
pub fn job_key(job_id: &str) -> String {
    format!("analysis:job:{job_id}")
}

/// Minimal string store with pub/sub, as needed by the pipeline. Every call
/// is a single blocking round trip without retries.
pub trait KeyValueStore {
    /// Returns None if the key does not exist.
    fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Overwrites any existing value.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn publish(&mut self, channel: &str, message: &str) -> Result<()>;
}

/// Reads back the analysis stored for `track_id`, if any.
pub fn load_analysis(
    store: &mut dyn KeyValueStore,
    track_id: &str,
) -> Result<Option<AnalysisResult>> {
    store
        .get(&analysis_key(track_id))?
        .map(|json| serde_json::from_str(&json).map_err(AnalyzerError::from))
        .transpose()
}

/// Redis-backed store. The connection string is parsed up front; the
/// connection itself is opened on first use.
pub struct RedisStore {
    client: redis::Client,
    connection: Option<redis::Connection>,
}

impl RedisStore {
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: None,
        })
    }

    fn connection(&mut self) -> Result<&mut redis::Connection> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => {
                tracing::debug!(
                    addr = %self.client.get_connection_info().addr,
                    "connecting to store"
                );
                self.client.get_connection()?
            }
        };
        Ok(self.connection.insert(connection))
    }
}

impl KeyValueStore for RedisStore {
    fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.connection()?.get(key)?)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.connection()?.set::<_, _, ()>(key, value)?;
        Ok(())
    }

    fn publish(&mut self, channel: &str, message: &str) -> Result<()> {
        let receivers: i64 = self.connection()?.publish(channel, message)?;
        tracing::debug!(channel, receivers, "published");
        Ok(())
    }
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

/// In-process store that also records everything published to it.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
    published: Vec<(String, String)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// `(channel, message)` pairs in publish order.
    pub fn published(&self) -> &[(String, String)] {
        &self.published
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn publish(&mut self, channel: &str, message: &str) -> Result<()> {
        self.published.push((channel.to_string(), message.to_string()));
        Ok(())
    }
}
