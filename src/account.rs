// ABOUTME: Regional Cloudant account record shared by every orchestration phase
// ABOUTME: Builds the cookie-authenticated headers each request carries

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};

/// Connection facts for one regional account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    pub password: String,
    /// `AuthSession=...` pair returned at login. Empty until logged in.
    pub cookie: String,
    pub url: String,
    /// Region label, used in diagnostics only.
    pub endpoint: String,
}

impl Account {
    pub fn new(username: &str, password: &str, url: &str, endpoint: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            cookie: String::new(),
            url: url.trim_end_matches('/').to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    /// `https://{username}.{domain}`
    pub fn derive_url(username: &str, domain: &str) -> String {
        format!("https://{}.{}", username, domain)
    }

    /// Database names may contain `/`, so the name is encoded as one path segment.
    pub fn database_url(&self, db: &str) -> String {
        format!("{}/{}", self.url, urlencoding::encode(db))
    }

    pub fn has_session(&self) -> bool {
        !self.cookie.is_empty()
    }

    /// Headers for reads: the session cookie only.
    pub fn cookie_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        // A cookie that is not a valid header value is sent as no cookie; the
        // server then answers 401 and the caller reports it.
        if let Ok(value) = HeaderValue::from_str(&self.cookie) {
            headers.insert(COOKIE, value);
        }
        headers
    }

    /// Headers for JSON writes.
    pub fn json_headers(&self) -> HeaderMap {
        let mut headers = self.cookie_headers();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}
