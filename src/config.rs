// ABOUTME: TOML configuration for the set of regional accounts to link
// ABOUTME: Validates the working set before any network call is made

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::account::Account;
use crate::error::MeshError;

#[derive(Debug, Clone, Deserialize)]
pub struct MeshConfig {
    #[serde(default)]
    pub settings: Settings,
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub request_timeout_secs: u64,
    pub domain: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            domain: "cloudant.com".to_string(),
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub endpoint: String,
    pub username: String,
    pub password: Option<String>,
    pub url: Option<String>,
}

impl MeshConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: MeshConfig = toml::from_str(raw).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MeshError> {
        if self.accounts.len() < 2 {
            return Err(MeshError::Validation(format!(
                "at least two accounts are required for replication, found {}",
                self.accounts.len()
            )));
        }

        let mut seen = HashSet::new();
        for account in &self.accounts {
            if account.username.trim().is_empty() {
                return Err(MeshError::Validation(format!(
                    "account for '{}' has an empty username",
                    account.endpoint
                )));
            }
            if !seen.insert(account.username.as_str()) {
                return Err(MeshError::Validation(format!(
                    "username '{}' appears more than once",
                    account.username
                )));
            }
        }

        validate_databases(&self.databases)
    }

    /// Accounts without a session; `shared_password` fills in missing passwords.
    pub fn accounts(&self, shared_password: Option<&str>) -> Result<Vec<Account>, MeshError> {
        self.accounts
            .iter()
            .map(|cfg| {
                let password = cfg
                    .password
                    .as_deref()
                    .or(shared_password)
                    .ok_or_else(|| {
                        MeshError::Validation(format!(
                            "no password available for '{}'",
                            cfg.username
                        ))
                    })?;
                let url = cfg
                    .url
                    .clone()
                    .unwrap_or_else(|| Account::derive_url(&cfg.username, &self.settings.domain));
                Ok(Account::new(&cfg.username, password, &url, &cfg.endpoint))
            })
            .collect()
    }

    pub fn needs_shared_password(&self) -> bool {
        self.accounts.iter().any(|a| a.password.is_none())
    }
}

pub fn validate_databases(databases: &[String]) -> Result<(), MeshError> {
    if databases.iter().any(|db| db.trim().is_empty()) {
        return Err(MeshError::Validation(
            "database names must not be empty".to_string(),
        ));
    }
    Ok(())
}
