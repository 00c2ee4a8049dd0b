use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use gapscout_core::{
    timestamp_from_utc_seconds, ConfigError, CoreError, RedditApiError, RedditComment,
    RedditThread,
};
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const REDDIT_API_BASE: &str = "https://oauth.reddit.com";
const REDDIT_WEB_BASE: &str = "https://reddit.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub subreddit_name_prefixed: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub created_utc: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub parent_id: String,
}

/// `/comments/{id}` answers with the submission listing followed by the comment
/// listing, which stays untyped because it mixes `t1` and `more` children.
pub type SubmissionResponse = (RedditListing<RedditPostData>, Value);

impl From<RedditPostData> for RedditThread {
    fn from(post: RedditPostData) -> Self {
        Self {
            url: format!("{}{}", REDDIT_WEB_BASE, post.permalink),
            id: post.id,
            scope: post.subreddit_name_prefixed,
            title: post.title,
            score: post.score,
            comment_count: post.num_comments,
            created_at: timestamp_from_utc_seconds(post.created_utc),
        }
    }
}

/// Returns `None` when the search should not be restricted to any subreddit.
pub fn subreddit_path(subreddits: &[String]) -> Option<String> {
    let names: Vec<&str> = subreddits
        .iter()
        .map(|s| s.trim().trim_start_matches("r/"))
        .filter(|s| !s.is_empty())
        .collect();

    if names.is_empty() || names[0].eq_ignore_ascii_case("all") {
        None
    } else {
        Some(names.join("+"))
    }
}

/// Children of a listing value; empty for `""` reply placeholders.
pub fn listing_children(listing: &Value) -> &[Value] {
    listing
        .get("data")
        .and_then(|data| data.get("children"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Flattens a comment tree in pre-order using an explicit stack.
///
/// Top-level comments are depth 0; replies deeper than `max_depth` are not
/// visited. Items that are not `t1` comments or have an empty body are
/// skipped, and traversal stops once `limit` comments are collected.
pub fn flatten_comments(
    top_level: &[Value],
    thread_id: &str,
    limit: usize,
    max_depth: u32,
) -> Vec<RedditComment> {
    let mut comments = Vec::new();
    let mut stack: Vec<(&Value, u32)> = top_level.iter().rev().map(|item| (item, 0)).collect();

    while let Some((item, depth)) = stack.pop() {
        if comments.len() >= limit {
            break;
        }
        if item.get("kind").and_then(Value::as_str) != Some("t1") {
            continue;
        }
        let Some(raw) = item.get("data") else {
            continue;
        };
        let data = match RedditCommentData::deserialize(raw) {
            Ok(data) => data,
            Err(e) => {
                debug!("Skipping malformed comment in {}: {}", thread_id, e);
                continue;
            }
        };

        if depth < max_depth {
            if let Some(replies) = raw.get("replies") {
                for child in listing_children(replies).iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }

        if data.body.is_empty() {
            continue;
        }
        comments.push(RedditComment {
            id: data.id,
            body: data.body,
            score: data.score,
            created_at: timestamp_from_utc_seconds(data.created_utc),
            parent_id: data.parent_id,
            thread_id: thread_id.to_string(),
        });
    }

    comments
}

/// Reddit ids are base36, optionally with a `t3_` kind prefix. Anything else
/// would be spliced into the request path, so it is rejected up front.
pub fn validate_thread_id(thread_id: &str) -> Result<&str, CoreError> {
    let valid = !thread_id.is_empty()
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(thread_id)
    } else {
        Err(CoreError::InvalidInput {
            message: format!("'{}' is not a Reddit thread id", thread_id),
        })
    }
}

fn map_error_status(status: StatusCode, endpoint: &str, retry_after: Option<u64>) -> CoreError {
    let error = match status.as_u16() {
        429 => RedditApiError::RateLimitExceeded {
            retry_after: retry_after.unwrap_or(60),
        },
        401 => RedditApiError::InvalidToken,
        403 => RedditApiError::Forbidden {
            resource: endpoint.to_string(),
        },
        404 if endpoint.starts_with("/comments/") => RedditApiError::ThreadNotFound {
            thread_id: endpoint.trim_start_matches("/comments/").to_string(),
        },
        404 => RedditApiError::SubredditNotFound {
            subreddit: endpoint.to_string(),
        },
        code if status.is_server_error() => RedditApiError::ServerError { status_code: code },
        code => RedditApiError::InvalidResponse {
            details: format!("Unexpected status {} for {}", code, endpoint),
        },
    };
    CoreError::RedditApi(error)
}

/// Authenticated, rate-limited access to the Reddit OAuth API.
#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    base_url: String,
}

impl RedditApiClient {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                CoreError::Config(ConfigError::InvalidValue {
                    field: "reddit.user_agent".to_string(),
                    value: e.to_string(),
                })
            })?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RateLimitConfig::reddit_oauth()),
            base_url: REDDIT_API_BASE.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub async fn make_request(
        &self,
        method: Method,
        endpoint: &str,
        access_token: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let waited = self.rate_limiter.acquire().await;
        debug!("Acquired rate limit permit for {} {} after {:?}", method, endpoint, waited);

        info!("Making Reddit API request: {} {}", method, endpoint);
        let response = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for {} {}: {}", method, endpoint, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited on {}, retry after {:?}s", endpoint, retry_after);
        } else {
            error!("Request failed with status: {} for {}", status, endpoint);
        }
        Err(map_error_status(status, endpoint, retry_after))
    }

    pub async fn search(
        &self,
        access_token: &str,
        keyword: &str,
        subreddits: &[String],
        limit: u32,
        time_window: &str,
    ) -> Result<Vec<RedditThread>, CoreError> {
        let restricted = subreddit_path(subreddits);
        let endpoint = match &restricted {
            Some(path) => format!("/r/{}/search", path),
            None => "/search".to_string(),
        };
        let params = [
            ("q", format!("{} self:yes", keyword)),
            ("limit", limit.to_string()),
            ("sort", "relevance".to_string()),
            ("t", time_window.to_string()),
            ("restrict_sr", restricted.is_some().to_string()),
            ("type", "link".to_string()),
        ];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, &params)
            .await?;

        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse search results: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse search results for '{}'", keyword),
            })
        })?;

        let threads: Vec<RedditThread> = listing
            .data
            .children
            .into_iter()
            .map(|child| child.data.into())
            .collect();

        info!("Found {} threads for '{}'", threads.len(), keyword);
        Ok(threads)
    }

    pub async fn get_submission(
        &self,
        access_token: &str,
        thread_id: &str,
        limit: usize,
        max_depth: u32,
    ) -> Result<SubmissionResponse, CoreError> {
        let endpoint = format!("/comments/{}", validate_thread_id(thread_id)?);
        let params = [
            ("limit", limit.to_string()),
            ("depth", (max_depth + 1).to_string()),
        ];

        let response = self
            .make_request(Method::GET, &endpoint, access_token, &params)
            .await?;

        response.json::<SubmissionResponse>().await.map_err(|e| {
            error!("Failed to parse submission {}: {}", thread_id, e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse submission {}", thread_id),
            })
        })
    }
}
