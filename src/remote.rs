//! Remote door-state store.
//!
//! The database is a Firebase-style realtime tree. Each medication has a
//! boolean under `users/<uid>/door/<name>` and optional metadata under
//! `users/<uid>/medicationlist/<name>`. Every node is read and written as a
//! JSON document at `<path>.json`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Url;
use serde_json::Value;

use crate::{
    config::RemoteCfg,
    error::{DispenserError, Result},
};

/// Schedule time placeholder when the stored value is null or empty.
pub const NO_TIME: &str = "No Time";
/// Schedule time placeholder when the lookup failed.
pub const TIME_ERROR: &str = "Error";

/// What a door-state write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The record was gone; writing would have recreated it.
    SkippedMissing,
}

/// Access to the remote source of truth.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Names of all medications with a door record.
    async fn list_medications(&self) -> Result<Vec<String>>;

    /// Scheduled dispense time as stored, or a placeholder. Never fails.
    async fn fetch_scheduled_time(&self, name: &str) -> String;

    /// Whether the door of `name` should be open. A missing record reads as
    /// closed.
    async fn get_door_state(&self, name: &str) -> Result<bool>;

    /// Writes the door state of an existing record. A deleted record is
    /// left deleted.
    async fn set_door_state(&self, name: &str, open: bool) -> Result<WriteOutcome>;
}

/// JSON truthiness: null, false, zero and empty values are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// REST client for the realtime database.
#[derive(Debug, Clone)]
pub struct FirebaseClient {
    base: Url,
    user_id: String,
    api_key: String,
    client: reqwest::Client,
}

impl FirebaseClient {
    pub fn new(cfg: &RemoteCfg) -> Result<Self> {
        let base = Url::parse(&cfg.database_url)
            .map_err(|e| DispenserError::config(format!("database_url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(DispenserError::config(format!(
                "database_url '{}' cannot hold a path",
                cfg.database_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;

        Ok(Self {
            base,
            user_id: cfg.user_id.clone(),
            api_key: cfg.api_key.clone(),
            client,
        })
    }

    /// `<db>/users/<uid>/<segments...>.json?auth=<key>`, every segment
    /// percent-encoded.
    fn node_url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("users").push(&self.user_id);
            if let Some((last, parents)) = segments.split_last() {
                path.extend(parents);
                path.push(&format!("{last}.json"));
            }
        }
        if !self.api_key.is_empty() {
            url.query_pairs_mut().append_pair("auth", &self.api_key);
        }
        url
    }

    async fn get_node(&self, segments: &[&str]) -> Result<Value> {
        let url = self.node_url(segments);
        let response = self.client.get(url).send().await?.error_for_status()?;
        response
            .json::<Value>()
            .await
            .map_err(|e| DispenserError::parse(format!("invalid JSON from database: {e}")))
    }

    async fn put_node(&self, segments: &[&str], value: &Value) -> Result<()> {
        let url = self.node_url(segments);
        self.client
            .put(url)
            .json(value)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FirebaseClient {
    async fn list_medications(&self) -> Result<Vec<String>> {
        match self.get_node(&["door"]).await? {
            Value::Null => Ok(Vec::new()),
            Value::Object(doors) => {
                let mut names: Vec<String> = doors.into_iter().map(|(k, _)| k).collect();
                names.sort();
                Ok(names)
            }
            other => Err(DispenserError::parse(format!(
                "door node is not a map: {other}"
            ))),
        }
    }

    async fn fetch_scheduled_time(&self, name: &str) -> String {
        let path = ["medicationlist", name, "timeIntervals", "0", "time"];
        match self.get_node(&path).await {
            Ok(Value::String(time)) if !time.is_empty() => time,
            Ok(value) if is_truthy(&value) => value.to_string(),
            Ok(_) => NO_TIME.to_string(),
            Err(e) => {
                warn!("Error fetching time for {name}: {e}");
                TIME_ERROR.to_string()
            }
        }
    }

    async fn get_door_state(&self, name: &str) -> Result<bool> {
        let value = self.get_node(&["door", name]).await?;
        let open = is_truthy(&value);
        debug!("Fetched door state for {name} = {open}");
        Ok(open)
    }

    async fn set_door_state(&self, name: &str, open: bool) -> Result<WriteOutcome> {
        let path = ["door", name];
        if self.get_node(&path).await?.is_null() {
            debug!("Skipping update: {name} does not exist in the database");
            return Ok(WriteOutcome::SkippedMissing);
        }

        self.put_node(&path, &Value::Bool(open)).await?;
        debug!("Set door state for {name} to {open}");
        Ok(WriteOutcome::Written)
    }
}
