#[cfg(test)]
mod tests {
    use crate::{RedditClient, RedditOAuth2Config, RedditToken};
    use gapscout_core::{ConfigError, RedditSettings};
    use std::time::{Duration, Instant};

    fn create_test_config() -> RedditOAuth2Config {
        RedditOAuth2Config::new(
            "test_client_id".to_string(),
            "test_client_secret".to_string(),
            "test_user".to_string(),
            "test_password".to_string(),
            "gapscout/1.0 by test_user".to_string(),
        )
    }

    #[test]
    fn test_config_creation() {
        let config = create_test_config();
        assert_eq!(config.client_id, "test_client_id");
        assert_eq!(config.client_secret, "test_client_secret");
        assert_eq!(config.username, "test_user");
        assert_eq!(config.user_agent, "gapscout/1.0 by test_user");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = RedditSettings {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            user_agent: "agent/1.0".to_string(),
            request_timeout_secs: 12,
        };

        let config = RedditOAuth2Config::from_settings(&settings).unwrap();
        assert_eq!(config.username, "user");
        assert_eq!(config.request_timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_config_from_settings_missing_credentials() {
        let settings = RedditSettings {
            client_id: Some("id".to_string()),
            ..Default::default()
        };

        let result = RedditOAuth2Config::from_settings(&settings);
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvironmentVariable { var_name }) if var_name == "REDDIT_CLIENT_SECRET"
        ));
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = RedditClient::new(create_test_config())
            .unwrap()
            .with_time_window("month")
            .with_max_reply_depth(1);

        assert_eq!(client.user_agent(), "gapscout/1.0 by test_user");
        assert_eq!(client.time_window(), "month");
        assert_eq!(client.max_reply_depth(), 1);
        assert!(!client.is_authenticated().await);
    }

    #[test]
    fn test_token_freshness() {
        let client = RedditClient::new(create_test_config()).unwrap();

        let valid_token = RedditToken::new("valid_token".to_string(), Duration::from_secs(3600));
        tokio_test::block_on(client.set_token(valid_token));
        assert!(tokio_test::block_on(client.is_authenticated()));

        // Tokens inside the refresh margin count as stale
        let expiring_token = RedditToken {
            access_token: "expiring_token".to_string(),
            expires_at: Instant::now() + Duration::from_secs(30),
            refresh_margin: crate::TOKEN_REFRESH_MARGIN,
        };
        assert!(!expiring_token.is_fresh());
        tokio_test::block_on(client.set_token(expiring_token));
        assert!(!tokio_test::block_on(client.is_authenticated()));
    }

    #[test]
    fn test_short_lived_token_is_reused() {
        let short = RedditToken::new("short".to_string(), Duration::from_secs(40));
        assert_eq!(short.refresh_margin, Duration::from_secs(20));
        assert!(short.is_fresh());

        let long = RedditToken::new("long".to_string(), Duration::from_secs(3600));
        assert_eq!(long.refresh_margin, crate::TOKEN_REFRESH_MARGIN);

        let client = RedditClient::new(create_test_config()).unwrap();
        tokio_test::block_on(client.set_token(short));
        assert!(tokio_test::block_on(client.is_authenticated()));

        let spent = RedditToken::new("spent".to_string(), Duration::ZERO);
        assert!(!spent.is_fresh());
    }
}
