// ABOUTME: Cookie session lifecycle for the linked accounts
// ABOUTME: Sessions are opened together up front and must be consumed by terminate()

use anyhow::{Context, Result};
use futures::future::join_all;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use super::collector::Phase;
use crate::account::Account;
use crate::error::MeshError;
use crate::remote::{CloudantClient, OperationResult, Payload};

/// Logged-in accounts. The only way to give them up is [`Sessions::terminate`].
#[must_use = "sessions stay valid on the server until terminate() is called"]
pub struct Sessions {
    accounts: Arc<Vec<Account>>,
}

impl Sessions {
    /// Logs every account in concurrently. If any login fails, the sessions
    /// that did open are terminated before the error is returned.
    pub async fn open(client: &CloudantClient, accounts: Vec<Account>) -> Result<Self> {
        info!("Opening sessions for {} accounts", accounts.len());
        let cookies = join_all(accounts.iter().map(|account| client.login(account))).await;

        let mut opened = Vec::with_capacity(accounts.len());
        let mut first_error = None;
        for (mut account, cookie) in accounts.into_iter().zip(cookies) {
            match cookie {
                Ok(cookie) => {
                    account.cookie = cookie;
                    opened.push(account);
                }
                Err(e) => {
                    warn!("Login failed for '{}': {:#}", account.endpoint, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            None => Ok(Self {
                accounts: Arc::new(opened),
            }),
            Some(e) => {
                if !opened.is_empty() {
                    let partial = Self {
                        accounts: Arc::new(opened),
                    };
                    if let Err(cleanup) = partial.terminate(client).await {
                        warn!("Cleanup after failed login: {}", cleanup);
                    }
                }
                Err(e).context("Could not log in to every account")
            }
        }
    }

    /// Wraps accounts that already carry a session cookie.
    pub fn from_accounts(accounts: Vec<Account>) -> Result<Self, MeshError> {
        if let Some(account) = accounts.iter().find(|a| !a.has_session()) {
            return Err(MeshError::Authentication(format!(
                "account '{}' has no session cookie",
                account.username
            )));
        }
        let mut seen = HashSet::new();
        if let Some(account) = accounts.iter().find(|a| !seen.insert(a.username.as_str())) {
            return Err(MeshError::Validation(format!(
                "username '{}' appears more than once",
                account.username
            )));
        }
        Ok(Self {
            accounts: Arc::new(accounts),
        })
    }

    pub fn accounts(&self) -> &Arc<Vec<Account>> {
        &self.accounts
    }

    /// Re-posts each account's credentials with its current cookie, which
    /// makes the server invalidate that cookie.
    pub async fn terminate(self, client: &CloudantClient) -> Result<(), MeshError> {
        let phase = Phase::new("Deleting cookies", self.accounts.len());

        for index in 0..self.accounts.len() {
            let tx = phase.sender();
            let client = client.clone();
            let accounts = Arc::clone(&self.accounts);
            tokio::spawn(async move {
                let result = end_session(&client, &accounts[index]).await;
                let _ = tx.send(result).await;
            });
        }

        phase.collect().await
    }
}

async fn end_session(client: &CloudantClient, account: &Account) -> OperationResult {
    let url = format!("{}/_session", account.url);
    let mut headers = account.cookie_headers();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    let form = vec![
        ("name".to_string(), account.username.clone()),
        ("password".to_string(), account.password.clone()),
    ];

    client
        .request(Method::POST, &url, Payload::Form(form), headers)
        .await
        .require_status(&[StatusCode::OK], || {
            format!("Failed to retrieve cookie for '{}'", account.endpoint)
        })
}
