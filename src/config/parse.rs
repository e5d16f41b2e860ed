//! Plain-text `Key=Value` configuration documents.
//!
//! The operator publishes a document such as:
//!
//! ```text
//! CfClientVersion=a-6.15-2405
//! UserAgent=okhttp/3.12.1
//! Host=api.cloudflareclient.com
//! BaseURL=https://api.cloudflareclient.com/v0a2405
//! WaitTime=45
//! Keys=key-one,key-two
//! ```
//!
//! Missing keys keep the value from the base config. Unknown keys are ignored.

use super::ClientConfig;
use crate::WarpstashError;
use std::time::Duration;

const CLIENT_VERSION_KEY: &str = "CfClientVersion";
const USER_AGENT_KEY: &str = "UserAgent";
const HOST_KEY: &str = "Host";
const BASE_URL_KEY: &str = "BaseURL";
const WAIT_TIME_KEY: &str = "WaitTime";
const KEYS_KEY: &str = "Keys";

/// Parse a configuration document on top of `base`.
///
/// A non-blank line without `=` rejects the whole document. An unparsable
/// `WaitTime` keeps the base interval.
pub fn parse_client_config(text: &str, base: &ClientConfig) -> Result<ClientConfig, WarpstashError> {
    let mut config = base.clone();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            WarpstashError::ConfigFetch(format!("unexpected line in config document: {}", line))
        })?;
        let value = value.trim();

        match key.trim() {
            CLIENT_VERSION_KEY => config.client_version = value.to_string(),
            USER_AGENT_KEY => config.user_agent = value.to_string(),
            HOST_KEY => config.host = value.to_string(),
            BASE_URL_KEY => config.base_url = value.to_string(),
            WAIT_TIME_KEY => {
                if let Ok(secs) = value.parse::<u64>() {
                    config.poll_interval = Duration::from_secs(secs);
                }
            }
            KEYS_KEY => {
                let keys: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect();
                if !keys.is_empty() {
                    config.redemption_keys = keys;
                }
            }
            other => tracing::debug!(key = other, "ignoring unknown config key"),
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = "CfClientVersion=a-7.0-1000\n\
        UserAgent=okhttp/4.0.0\r\n\
        Host=api.example.test\n\
        BaseURL=https://api.example.test/v0a1000\n\
        WaitTime=60\n\
        Keys=aaa-111, bbb-222 ,,ccc-333\n";

    #[test]
    fn test_parse_full_document() {
        let config = parse_client_config(DOCUMENT, &ClientConfig::default()).unwrap();

        assert_eq!(config.client_version, "a-7.0-1000");
        assert_eq!(config.user_agent, "okhttp/4.0.0");
        assert_eq!(config.host, "api.example.test");
        assert_eq!(config.base_url, "https://api.example.test/v0a1000");
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.redemption_keys, vec!["aaa-111", "bbb-222", "ccc-333"]);
    }

    #[test]
    fn test_missing_keys_keep_base_values() {
        let base = ClientConfig {
            redemption_keys: vec!["base-key".to_string()],
            ..ClientConfig::default()
        };
        let config = parse_client_config("UserAgent=custom\n", &base).unwrap();

        assert_eq!(config.user_agent, "custom");
        assert_eq!(config.redemption_keys, vec!["base-key"]);
        assert_eq!(config.host, base.host);
    }

    #[test]
    fn test_bad_wait_time_keeps_base() {
        let config = parse_client_config("WaitTime=soon\n", &ClientConfig::default()).unwrap();
        assert_eq!(config.poll_interval, crate::config::DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_line_without_separator_rejects_document() {
        let result = parse_client_config("Host=a\ngarbage\n", &ClientConfig::default());
        assert!(matches!(result, Err(WarpstashError::ConfigFetch(_))));
    }

    #[test]
    fn test_value_may_contain_equals() {
        let config =
            parse_client_config("BaseURL=https://x.test/v0?a=b\n", &ClientConfig::default()).unwrap();
        assert_eq!(config.base_url, "https://x.test/v0?a=b");
    }

    #[test]
    fn test_empty_key_list_keeps_base() {
        let base = ClientConfig {
            redemption_keys: vec!["keep".to_string()],
            ..ClientConfig::default()
        };
        let config = parse_client_config("Keys= , ,\n", &base).unwrap();
        assert_eq!(config.redemption_keys, vec!["keep"]);
    }
}
