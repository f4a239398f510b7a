//! HTTP client: listing reads against the public API, form posts against the OAuth API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};

use crate::error::{Result, TransportError};
use crate::models::{self, Comment, Link, UserInfo};

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";
pub const DEFAULT_AUTH_BASE_URL: &str = "https://oauth.reddit.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Direction of a vote on a link or comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    None,
    Down,
}

impl Vote {
    fn dir(self) -> &'static str {
        match self {
            Vote::Up => "1",
            Vote::None => "0",
            Vote::Down => "-1",
        }
    }
}

/// API client. Clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
    auth_base_url: String,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Unauthenticated client for public listings.
    pub fn public(user_agent: impl Into<String>) -> Result<Self> {
        Self::builder().user_agent(user_agent).build()
    }

    /// Client that sends an already-issued OAuth access token.
    pub fn pre_authorized(
        access_token: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Result<Self> {
        Self::builder()
            .user_agent(user_agent)
            .access_token(access_token)
            .build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth_base_url(&self) -> &str {
        &self.auth_base_url
    }

    async fn get_json(&self, url: String, query: &[(&str, &str)]) -> Result<serde_json::Value> {
        let response = self.http.get(&url).query(query).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.json::<serde_json::Value>().await?)
    }

    async fn post_form(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<()> {
        let url = format!("{}{}", self.auth_base_url, endpoint);
        let response = self.http.post(&url).form(form).send().await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            });
        }
        Ok(())
    }

    /// Newest submissions in `subreddit`, newest first.
    pub async fn get_new_links(&self, subreddit: &str) -> Result<Vec<Link>> {
        let url = format!("{}/r/{}/new.json", self.base_url, subreddit);
        let value = self.get_json(url, &[]).await?;
        models::links_from_listing(&value)
    }

    /// Top-level comments on the link with id `link_id`.
    pub async fn get_link_comments(&self, link_id: &str) -> Result<Vec<Comment>> {
        let url = format!("{}/comments/{}.json", self.base_url, link_id);
        let value = self.get_json(url, &[]).await?;
        models::comments_from_thread(&value)
    }

    pub async fn get_user_info(&self, username: &str) -> Result<UserInfo> {
        let url = format!("{}/user/{}/about.json", self.base_url, username);
        let value = self.get_json(url, &[]).await?;
        let data = value
            .get("data")
            .cloned()
            .ok_or_else(|| TransportError::Decode("missing data".into()))?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn is_username_available(&self, username: &str) -> Result<bool> {
        let url = format!("{}/api/username_available.json", self.base_url);
        let value = self.get_json(url, &[("user", username)]).await?;
        value
            .as_bool()
            .ok_or_else(|| TransportError::Decode(format!("expected bool, got {}", value)))
    }

    /// Posts `text` as a reply to a link, comment or message fullname.
    pub async fn comment_on(&self, thing_id: &str, text: &str) -> Result<()> {
        self.post_form(
            "/api/comment",
            &[("thing_id", thing_id), ("text", text), ("api_type", "json")],
        )
        .await
    }

    pub async fn reply_to_message(&self, message_id: &str, text: &str) -> Result<()> {
        self.comment_on(message_id, text).await
    }

    pub async fn edit_text(&self, thing_id: &str, text: &str) -> Result<()> {
        self.post_form(
            "/api/editusertext",
            &[("thing_id", thing_id), ("text", text), ("api_type", "json")],
        )
        .await
    }

    pub async fn delete(&self, thing_id: &str) -> Result<()> {
        self.post_form("/api/del", &[("id", thing_id)]).await
    }

    pub async fn vote(&self, thing_id: &str, vote: Vote) -> Result<()> {
        self.post_form(
            "/api/vote",
            &[("thing_id", thing_id), ("dir", vote.dir()), ("api_type", "json")],
        )
        .await
    }

    pub async fn save(&self, thing_id: &str, category: &str) -> Result<()> {
        self.post_form(
            "/api/save",
            &[
                ("thing_id", thing_id),
                ("category", category),
                ("api_type", "json"),
            ],
        )
        .await
    }
}

/// Builder for [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    user_agent: Option<String>,
    base_url: Option<String>,
    auth_base_url: Option<String>,
    timeout: Option<Duration>,
    proxy_url: Option<String>,
    access_token: Option<String>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.auth_base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn build(self) -> Result<Client> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("snoo/{}", env!("CARGO_PKG_VERSION")));

        let mut headers = HeaderMap::new();
        if let Some(token) = &self.access_token {
            let value = HeaderValue::from_str(&format!("bearer {}", token))
                .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut http = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT));
        if let Some(proxy_url) = &self.proxy_url {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| TransportError::InvalidConfig(e.to_string()))?;
            http = http.proxy(proxy);
        }

        Ok(Client {
            http: http.build()?,
            base_url: trim_slash(self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
            auth_base_url: trim_slash(
                self.auth_base_url
                    .as_deref()
                    .unwrap_or(DEFAULT_AUTH_BASE_URL),
            ),
        })
    }
}

fn trim_slash(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
