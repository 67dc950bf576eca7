// ABOUTME: HTTP client for the Cloudant accounts being linked
// ABOUTME: Issues single authenticated requests and folds them into OperationResults

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, CONTENT_TYPE, SET_COOKIE};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::models::OperationResult;
use crate::account::Account;

const SESSION_COOKIE: &str = "AuthSession";

/// Request payload; the matching `Content-Type` comes from the caller's headers.
#[derive(Debug, Clone)]
pub enum Payload {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
}

#[derive(Clone)]
pub struct CloudantClient {
    client: Client,
}

impl CloudantClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Sends one request and drains the response body before returning.
    ///
    /// Transport failures come back as a result with `error` set and no status;
    /// status interpretation is left to the caller.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        payload: Payload,
        headers: HeaderMap,
    ) -> OperationResult {
        let mut builder = self.client.request(method.clone(), url).headers(headers);
        builder = match payload {
            Payload::Empty => builder,
            Payload::Json(body) => match serde_json::to_vec_pretty(&body) {
                Ok(bytes) => builder.body(bytes),
                Err(e) => {
                    return OperationResult::failed(method, url, format!("Failed to encode body: {}", e))
                }
            },
            Payload::Form(fields) => builder.form(&fields),
        };

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                return OperationResult::failed(method, url, format!("Request failed: {}", e))
            }
        };

        let status = response.status();
        let (body, error) = match response.text().await {
            Ok(body) => (body, None),
            Err(e) => (String::new(), Some(format!("Failed to read response body: {}", e))),
        };
        debug!("{} {} -> {}", method, url, status);

        OperationResult {
            method,
            target: url.to_string(),
            status: Some(status),
            body,
            error,
            skipped: false,
        }
    }

    /// Opens a cookie session for `account` and returns the `AuthSession=...` pair.
    pub async fn login(&self, account: &Account) -> Result<String> {
        let url = format!("{}/_session", account.url);

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[
                ("name", account.username.as_str()),
                ("password", account.password.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to reach {} for '{}'", url, account.endpoint))?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!(
                "Login as '{}' for '{}' failed with status {}: {}. Check the account credentials",
                account.username,
                account.endpoint,
                status,
                body
            );
        }

        session_cookie(response.headers()).with_context(|| {
            format!(
                "Login for '{}' succeeded but no {} cookie was returned",
                account.endpoint, SESSION_COOKIE
            )
        })
    }

    /// Lists the databases of `account`, used when none were named up front.
    pub async fn all_dbs(&self, account: &Account) -> Result<Vec<String>> {
        let url = format!("{}/_all_dbs", account.url);

        let response = self
            .client
            .get(&url)
            .headers(account.cookie_headers())
            .send()
            .await
            .with_context(|| format!("Failed to list databases for '{}'", account.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!(
                "Listing databases for '{}' failed with status {}: {}",
                account.endpoint,
                status,
                body
            );
        }

        response
            .json()
            .await
            .context("Failed to parse database list")
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .map(str::trim)
        .find(|pair| pair.starts_with(SESSION_COOKIE) && pair.contains('='))
        .map(str::to_string)
}
