pub mod api;
pub mod rate_limiter;

#[cfg(test)]
mod tests;

use api::{flatten_comments, listing_children, RedditApiClient};
use async_trait::async_trait;
use gapscout_core::{
    ConfigError, CoreError, GapscoutConfig, RedditApiError, RedditComment, RedditSettings,
    RedditThread,
};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, ResourceOwnerPassword, ResourceOwnerUsername,
    TokenResponse, TokenUrl,
};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

const REDDIT_AUTH_URL: &str = "https://www.reddit.com/api/v1/authorize";
const REDDIT_TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Read access to a discussion platform.
#[async_trait]
pub trait DiscussionSource: Send + Sync {
    /// Threads matching `keyword`, restricted to `subreddits` unless it is `["all"]`.
    async fn search_threads(
        &self,
        keyword: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditThread>, CoreError>;

    /// Comments of one thread, flattened, at most `limit` of them.
    async fn get_comments(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<RedditComment>, CoreError>;

    async fn get_thread(&self, thread_id: &str) -> Result<RedditThread, CoreError>;
}

#[derive(Debug, Clone)]
pub struct RedditOAuth2Config {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl RedditOAuth2Config {
    pub fn new(
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
        user_agent: String,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            username,
            password,
            user_agent,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_settings(settings: &RedditSettings) -> Result<Self, ConfigError> {
        let mut config = Self::new(
            GapscoutConfig::require(&settings.client_id, "REDDIT_CLIENT_ID")?.to_string(),
            GapscoutConfig::require(&settings.client_secret, "REDDIT_CLIENT_SECRET")?.to_string(),
            GapscoutConfig::require(&settings.username, "REDDIT_USERNAME")?.to_string(),
            GapscoutConfig::require(&settings.password, "REDDIT_PASSWORD")?.to_string(),
            settings.user_agent.clone(),
        );
        config.request_timeout = Duration::from_secs(settings.request_timeout_secs);
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct RedditToken {
    pub access_token: String,
    pub expires_at: Instant,
    /// How long before expiry the token is treated as stale.
    pub refresh_margin: Duration,
}

impl RedditToken {
    /// Short-lived tokens refresh at half their lifetime instead of the full margin.
    pub fn new(access_token: String, lifetime: Duration) -> Self {
        Self {
            access_token,
            expires_at: Instant::now() + lifetime,
            refresh_margin: TOKEN_REFRESH_MARGIN.min(lifetime / 2),
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() + self.refresh_margin < self.expires_at
    }
}

/// Reddit client using the OAuth2 password grant of a script app.
pub struct RedditClient {
    config: RedditOAuth2Config,
    oauth_client: BasicClient,
    api: RedditApiClient,
    token: RwLock<Option<RedditToken>>,
    time_window: String,
    max_reply_depth: u32,
}

impl RedditClient {
    pub fn new(config: RedditOAuth2Config) -> Result<Self, CoreError> {
        let invalid_url = |e: url::ParseError| {
            CoreError::Internal {
                message: format!("Invalid Reddit OAuth URL: {}", e),
            }
        };
        let oauth_client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(REDDIT_AUTH_URL.to_string()).map_err(invalid_url)?,
            Some(TokenUrl::new(REDDIT_TOKEN_URL.to_string()).map_err(invalid_url)?),
        );
        let api = RedditApiClient::new(&config.user_agent, config.request_timeout)?;

        Ok(Self {
            config,
            oauth_client,
            api,
            token: RwLock::new(None),
            time_window: "year".to_string(),
            max_reply_depth: 2,
        })
    }

    /// Search recency window, one of Reddit's `t` values (`hour` .. `all`).
    pub fn with_time_window(mut self, time_window: impl Into<String>) -> Self {
        self.time_window = time_window.into();
        self
    }

    pub fn with_max_reply_depth(mut self, max_reply_depth: u32) -> Self {
        self.max_reply_depth = max_reply_depth;
        self
    }

    pub fn with_api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api = self.api.with_base_url(base_url);
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    pub fn max_reply_depth(&self) -> u32 {
        self.max_reply_depth
    }

    pub fn time_window(&self) -> &str {
        &self.time_window
    }

    pub async fn set_token(&self, token: RedditToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .map(RedditToken::is_fresh)
            .unwrap_or(false)
    }

    pub async fn authenticate(&self) -> Result<RedditToken, CoreError> {
        info!("Authenticating with Reddit as {}", self.config.username);

        let response = self
            .oauth_client
            .exchange_password(
                &ResourceOwnerUsername::new(self.config.username.clone()),
                &ResourceOwnerPassword::new(self.config.password.clone()),
            )
            .request_async(async_http_client)
            .await
            .map_err(|e| {
                CoreError::RedditApi(RedditApiError::AuthenticationFailed {
                    reason: e.to_string(),
                })
            })?;

        let lifetime = response.expires_in().unwrap_or(Duration::from_secs(3600));
        let token = RedditToken::new(response.access_token().secret().clone(), lifetime);

        self.set_token(token.clone()).await;
        debug!("Reddit token valid for {:?}", lifetime);
        Ok(token)
    }

    async fn access_token(&self) -> Result<String, CoreError> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.access_token.clone());
        }
        Ok(self.authenticate().await?.access_token)
    }
}

#[async_trait]
impl DiscussionSource for RedditClient {
    async fn search_threads(
        &self,
        keyword: &str,
        subreddits: &[String],
        limit: u32,
    ) -> Result<Vec<RedditThread>, CoreError> {
        let token = self.access_token().await?;
        self.api
            .search(&token, keyword, subreddits, limit, &self.time_window)
            .await
    }

    async fn get_comments(
        &self,
        thread_id: &str,
        limit: usize,
    ) -> Result<Vec<RedditComment>, CoreError> {
        let token = self.access_token().await?;
        let (_, comments) = self
            .api
            .get_submission(&token, thread_id, limit, self.max_reply_depth)
            .await?;

        let flattened = flatten_comments(
            listing_children(&comments),
            thread_id,
            limit,
            self.max_reply_depth,
        );
        debug!("Fetched {} comments from thread {}", flattened.len(), thread_id);
        Ok(flattened)
    }

    async fn get_thread(&self, thread_id: &str) -> Result<RedditThread, CoreError> {
        let token = self.access_token().await?;
        let (post, _) = self
            .api
            .get_submission(&token, thread_id, 1, 0)
            .await?;

        post.data
            .children
            .into_iter()
            .next()
            .map(|child| child.data.into())
            .ok_or_else(|| {
                CoreError::RedditApi(RedditApiError::ThreadNotFound {
                    thread_id: thread_id.to_string(),
                })
            })
    }
}
