use crate::KeywordMetricsProvider;
use async_trait::async_trait;
use gapscout_core::{
    ConfigError, CoreError, DataForSeoSettings, GapscoutConfig, KeywordMetrics,
    KeywordMetricsError,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info};

pub const DATAFORSEO_API_BASE: &str = "https://api.dataforseo.com/v3";
const KEYWORD_IDEAS_ENDPOINT: &str = "/keywords_data/google_ads/keywords_for_keywords/live";
const PROVIDER: &str = "DataForSEO";
const STATUS_OK: u32 = 20000;
const IDEAS_LIMIT: u32 = 50;

/// Google Ads location code for a two-letter market.
pub fn location_code(database: &str) -> u32 {
    match database.to_ascii_lowercase().as_str() {
        "au" => 2036,
        _ => 2840,
    }
}

#[derive(Debug, Serialize)]
struct KeywordIdeasTask<'a> {
    keywords: [&'a str; 1],
    location_code: u32,
    language_code: &'a str,
    include_seed_keyword: bool,
    include_serp_info: bool,
    limit: u32,
}

#[derive(Debug, Deserialize)]
pub struct DataForSeoResponse {
    pub status_code: u32,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub tasks: Vec<DataForSeoTask>,
}

#[derive(Debug, Deserialize)]
pub struct DataForSeoTask {
    #[serde(default)]
    pub id: String,
    pub status_code: u32,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub result: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct KeywordItem {
    keyword: String,
    search_volume: Option<u64>,
    keyword_difficulty: Option<f64>,
    cpc: Option<f64>,
    competition: Option<Value>,
    competition_index: Option<f64>,
    serp_info: Option<SerpInfo>,
}

#[derive(Debug, Deserialize)]
struct SerpInfo {
    #[serde(default)]
    serp_item_types: Option<Vec<String>>,
}

impl KeywordItem {
    fn into_metrics(self, task_id: &str) -> KeywordMetrics {
        // Google Ads reports competition as LOW/MEDIUM/HIGH plus a 0-100 index
        let competition = self
            .competition
            .as_ref()
            .and_then(Value::as_f64)
            .or_else(|| self.competition_index.map(|index| index / 100.0));

        KeywordMetrics {
            keyword: self.keyword,
            volume: self.search_volume.unwrap_or(0),
            difficulty: self.keyword_difficulty.unwrap_or(0.0),
            cpc: self.cpc,
            competition,
            serp_features: self
                .serp_info
                .and_then(|info| info.serp_item_types)
                .unwrap_or_default(),
            task_id: Some(task_id.to_string()),
        }
    }
}

/// Converts a live-endpoint response into keyword metrics.
///
/// Results either carry an `items` array (Labs-style) or are keyword rows
/// themselves (Google Ads-style); both are accepted.
pub fn parse_keyword_ideas(response: DataForSeoResponse) -> Result<Vec<KeywordMetrics>, CoreError> {
    if response.status_code != STATUS_OK {
        return Err(status_error(response.status_code, &response.status_message, ""));
    }

    let task = response.tasks.into_iter().next().ok_or_else(|| {
        CoreError::KeywordMetrics(KeywordMetricsError::InvalidResponse {
            details: "response contained no tasks".to_string(),
        })
    })?;

    if task.status_code != STATUS_OK {
        return Err(status_error(task.status_code, &task.status_message, &task.id));
    }

    let rows: Vec<Value> = match task.result {
        Some(result) => match result.first().and_then(|first| first.get("items")) {
            Some(items) => items.as_array().cloned().unwrap_or_default(),
            None => result,
        },
        None => Vec::new(),
    };

    let mut metrics = Vec::with_capacity(rows.len());
    for row in rows {
        match KeywordItem::deserialize(&row) {
            Ok(item) => metrics.push(item.into_metrics(&task.id)),
            Err(e) => debug!("Skipping malformed keyword row in task {}: {}", task.id, e),
        }
    }
    Ok(metrics)
}

fn status_error(status_code: u32, message: &str, task_id: &str) -> CoreError {
    let error = match status_code {
        40100..=40199 => KeywordMetricsError::InvalidCredentials {
            provider: PROVIDER.to_string(),
        },
        40200..=40299 => KeywordMetricsError::QuotaExhausted {
            provider: PROVIDER.to_string(),
        },
        _ => KeywordMetricsError::TaskFailed {
            task_id: task_id.to_string(),
            status_code,
            message: message.to_string(),
        },
    };
    CoreError::KeywordMetrics(error)
}

fn map_http_status(status: StatusCode) -> CoreError {
    let error = match status.as_u16() {
        401 | 403 => KeywordMetricsError::InvalidCredentials {
            provider: PROVIDER.to_string(),
        },
        402 => KeywordMetricsError::QuotaExhausted {
            provider: PROVIDER.to_string(),
        },
        code if status.is_server_error() => KeywordMetricsError::ServerError { status_code: code },
        code => KeywordMetricsError::InvalidResponse {
            details: format!("Unexpected HTTP status {}", code),
        },
    };
    CoreError::KeywordMetrics(error)
}

/// DataForSEO v3 client authenticated with HTTP basic auth.
pub struct DataForSeoClient {
    login: String,
    password: String,
    location_code: u32,
    language_code: String,
    base_url: String,
    http: Client,
}

impl DataForSeoClient {
    /// `api_key` is `login:password`.
    pub fn new(api_key: &str) -> Result<Self, ConfigError> {
        let (login, password) = api_key
            .split_once(':')
            .filter(|(login, password)| !login.is_empty() && !password.is_empty())
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "dataforseo.api_key".to_string(),
                value: "expected login:password".to_string(),
            })?;

        Ok(Self {
            login: login.to_string(),
            password: password.to_string(),
            location_code: location_code("us"),
            language_code: "en".to_string(),
            base_url: DATAFORSEO_API_BASE.to_string(),
            http: Client::new(),
        })
    }

    pub fn from_settings(settings: &DataForSeoSettings) -> Result<Self, ConfigError> {
        let api_key = GapscoutConfig::require(&settings.api_key, "DATAFORSEO_API_KEY")?;
        let mut client = Self::new(api_key)?;
        client.location_code = location_code(&settings.database);
        client.language_code = settings.language_code.clone();
        Ok(client)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn location(&self) -> u32 {
        self.location_code
    }
}

#[async_trait]
impl KeywordMetricsProvider for DataForSeoClient {
    async fn keyword_ideas(&self, seed: &str) -> Result<Vec<KeywordMetrics>, CoreError> {
        let task = KeywordIdeasTask {
            keywords: [seed],
            location_code: self.location_code,
            language_code: &self.language_code,
            include_seed_keyword: true,
            include_serp_info: true,
            limit: IDEAS_LIMIT,
        };

        debug!(keyword = %seed, location = self.location_code, "Requesting keyword ideas");
        let response = self
            .http
            .post(format!("{}{}", self.base_url, KEYWORD_IDEAS_ENDPOINT))
            .basic_auth(&self.login, Some(&self.password))
            .json(&[task])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!("DataForSEO request failed with status {}", status);
            return Err(map_http_status(status));
        }

        let body: DataForSeoResponse = response.json().await.map_err(|e| {
            CoreError::KeywordMetrics(KeywordMetricsError::InvalidResponse {
                details: e.to_string(),
            })
        })?;

        let ideas = parse_keyword_ideas(body)?;
        info!("Received {} keyword ideas for '{}'", ideas.len(), seed);
        Ok(ideas)
    }
}
