//! REST Key-Value Store Adapter
//!
//! Speaks the Redis-over-HTTP protocol used by Upstash and compatible
//! services: each command is a JSON array POSTed to the endpoint with a
//! bearer token, and the reply is `{"result": ...}` or `{"error": "..."}`.

use crate::error::{Error, Result};
use crate::store::{KeyTtl, KvStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Turn a reply body into its `result`, mapping `error` to a command error
fn parse_reply(command: &str, reply: CommandReply) -> Result<Value> {
    if let Some(reason) = reply.error {
        return Err(Error::StoreCommand {
            command: command.to_string(),
            reason,
        });
    }
    Ok(reply.result.unwrap_or(Value::Null))
}

fn unexpected(command: &str, value: &Value) -> Error {
    Error::StoreResponse {
        command: command.to_string(),
        response: value.to_string(),
    }
}

fn as_optional_string(command: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(unexpected(command, &other)),
    }
}

fn as_integer(command: &str, value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| unexpected(command, value))
}

// =============================================================================
// REST Store
// =============================================================================

/// Remote store reached over HTTPS
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl fmt::Debug for RestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStore")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl RestStore {
    /// Create a client for `endpoint` authenticated with `token`
    pub fn new(endpoint: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(Error::Configuration("REST store endpoint is empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            token: token.to_string(),
        })
    }

    /// Endpoint this store talks to
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one command and return its `result`
    async fn command(&self, args: Vec<String>) -> Result<Value> {
        let name = args.first().cloned().unwrap_or_default();

        let reply: CommandReply = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&args)
            .send()
            .await?
            .json()
            .await?;

        debug!(command = %name, "REST store command completed");
        parse_reply(&name, reply)
    }
}

#[async_trait]
impl KvStore for RestStore {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self.command(vec!["GET".into(), key.into()]).await?;
        as_optional_string("GET", value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.command(vec!["SET".into(), key.into(), value.into()])
            .await?;
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            return Err(Error::InvalidTtl { key: key.to_string() });
        }

        self.command(vec![
            "SET".into(),
            key.into(),
            value.into(),
            "EX".into(),
            ttl_seconds.to_string(),
        ])
        .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("DEL".to_string());
        args.extend(keys.iter().cloned());

        let value = self.command(args).await?;
        Ok(as_integer("DEL", &value)?.max(0) as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let value = self.command(vec!["KEYS".into(), pattern.into()]).await?;
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(unexpected("KEYS", &other)),
                })
                .collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(unexpected("KEYS", &other)),
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = Vec::with_capacity(keys.len() + 1);
        args.push("MGET".to_string());
        args.extend(keys.iter().cloned());

        match self.command(args).await? {
            Value::Array(items) if items.len() == keys.len() => items
                .into_iter()
                .map(|item| as_optional_string("MGET", item))
                .collect(),
            other => Err(unexpected("MGET", &other)),
        }
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let value = self.command(vec!["TTL".into(), key.into()]).await?;
        Ok(KeyTtl::from_raw(as_integer("TTL", &value)?))
    }

    async fn ping(&self) -> Result<()> {
        self.command(vec!["PING".into()]).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
