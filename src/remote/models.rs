// ABOUTME: Data structures exchanged with the Cloudant HTTP API
// ABOUTME: Uniform per-request results plus replication and security documents

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Outcome of one HTTP call, consumed once by a result collector.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub method: Method,
    pub target: String,
    /// `None` when the request never produced a response.
    pub status: Option<StatusCode>,
    pub body: String,
    pub error: Option<String>,
    /// Set on results that stand in for a request that was never sent.
    pub skipped: bool,
}

impl OperationResult {
    /// A request that produced no response.
    pub fn failed(method: Method, target: &str, error: String) -> Self {
        Self {
            method,
            target: target.to_string(),
            status: None,
            body: String::new(),
            error: Some(error),
            skipped: false,
        }
    }

    pub fn skipped(method: Method, target: &str, reason: String) -> Self {
        Self {
            method,
            target: target.to_string(),
            status: None,
            body: String::new(),
            error: Some(reason),
            skipped: true,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_status(&self, status: StatusCode) -> bool {
        self.status == Some(status)
    }

    /// Marks the result failed unless it has one of the `accepted` statuses.
    pub fn require_status(mut self, accepted: &[StatusCode], error: impl FnOnce() -> String) -> Self {
        let ok = self.error.is_none() && self.status.map_or(false, |s| accepted.contains(&s));
        if !ok {
            self.error = Some(match self.error.take() {
                Some(transport) => format!("{} ({})", error(), transport),
                None => error(),
            });
        }
        self
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let status = match self.status {
            Some(status) => status.to_string(),
            None => "no response".to_string(),
        };
        write!(f, "{} {} -> {}", self.method, self.target, status)
    }
}

/// Job document stored in a target account's `_replicator` database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationDoc {
    #[serde(rename = "_id")]
    pub id: String,
    pub source: String,
    pub target: String,
    pub create_target: bool,
    pub continuous: bool,
}

impl ReplicationDoc {
    /// The id depends only on source account and database, so reruns collide
    /// with the existing job instead of duplicating it.
    pub fn job_id(source_username: &str, db: &str) -> String {
        format!("{}-{}", source_username, db)
    }
}

/// Key under which Cloudant keeps per-user role grants.
pub const CLOUDANT_ROLES_KEY: &str = "cloudant";
pub const READER_ROLE: &str = "_reader";
pub const REPLICATOR_ROLE: &str = "_replicator";

/// A database `_security` document.
///
/// Kept as an ordered JSON map so keys this tool does not understand survive
/// the read-modify-write untouched. Only `cloudant -> {username: [roles]}` is
/// interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityDocument(Map<String, Value>);

impl SecurityDocument {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    pub fn roles(&self, username: &str) -> Vec<String> {
        self.0
            .get(CLOUDANT_ROLES_KEY)
            .and_then(|grants| grants.get(username))
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `false` when `cloudant` exists but is not an object; such a document
    /// cannot take grants without losing what it holds.
    pub fn accepts_grants(&self) -> bool {
        self.0.get(CLOUDANT_ROLES_KEY).map_or(true, Value::is_object)
    }

    /// Appends each missing role to `username`'s grant list, keeping existing
    /// entries and their order. A grant held as a single value becomes the
    /// first element of the list. Does nothing unless [`Self::accepts_grants`].
    pub fn grant(&mut self, username: &str, roles: &[&str]) {
        if !self.accepts_grants() {
            return;
        }
        let Some(grants) = self
            .0
            .entry(CLOUDANT_ROLES_KEY)
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
        else {
            return;
        };

        let current = grants
            .entry(username)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !current.is_array() {
            *current = match current.take() {
                Value::Null => Value::Array(Vec::new()),
                single => Value::Array(vec![single]),
            };
        }
        let Some(current) = current.as_array_mut() else {
            return;
        };

        for role in roles {
            if !current.iter().any(|existing| existing.as_str() == Some(*role)) {
                current.push(Value::String(role.to_string()));
            }
        }
    }
}
