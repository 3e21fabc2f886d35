use std::{fmt::Display, str::FromStr, time::Duration};

use batch_aggregator::AggregatorConfig;
use relay_common::secret::SecretString;

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_url: String,
    /// Public URL of `/webhook`, registered with Telegram at startup when set.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub batch: AggregatorConfig,
    pub sink_url: String,
    pub sink_timeout: Duration,
    pub telegram: Option<TelegramConfig>,
    pub forwarded_only: bool,
    pub port: u16,
    pub metrics_port: u16,
}

impl Configuration {
    pub fn from_env() -> Result<Configuration, Box<dyn std::error::Error>> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> Result<Configuration, Box<dyn std::error::Error>>
    where
        L: Fn(&str) -> Option<String>,
    {
        let telegram = read_string(&lookup, "TELEGRAM_BOT_TOKEN").map(|token| TelegramConfig {
            bot_token: SecretString::new(token),
            api_url: read_string(&lookup, "TELEGRAM_API_URL")
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.into()),
            webhook_url: read_string(&lookup, "WEBHOOK_URL"),
        });

        Ok(Configuration {
            batch: AggregatorConfig {
                max_size: read_number(&lookup, "BATCH_MAX_SIZE", 20)?,
                max_wait: Duration::from_secs(read_number(&lookup, "BATCH_MAX_WAIT_SECS", 10)?),
                notify_timeout: Duration::from_secs(read_number(
                    &lookup,
                    "NOTIFY_TIMEOUT_SECS",
                    5,
                )?),
            },
            sink_url: ensure_string(&lookup, "SINK_URL")?,
            sink_timeout: Duration::from_secs(read_number(&lookup, "SINK_TIMEOUT_SECS", 60)?),
            telegram,
            forwarded_only: read_bool(&lookup, "FORWARDED_ONLY"),
            port: read_number(&lookup, "PORT", 8080)?,
            metrics_port: read_number(&lookup, "METRICS_PORT", 4000)?,
        })
    }
}

fn read_string<L: Fn(&str) -> Option<String>>(lookup: &L, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}

fn ensure_string<L: Fn(&str) -> Option<String>>(
    lookup: &L,
    key: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    read_string(lookup, key).ok_or_else(|| format!("Missing environment variable {}", key).into())
}

fn read_number<L, T>(lookup: &L, key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    L: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match read_string(lookup, key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| format!("Invalid value {:?} for {}: {}", value, key, e).into()),
    }
}

fn read_bool<L: Fn(&str) -> Option<String>>(lookup: &L, key: &str) -> bool {
    read_string(lookup, key)
        .map(|value| matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::Configuration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Configuration::from_lookup(lookup(&[("SINK_URL", "https://sink.example/exec")]))
                .unwrap();

        assert_eq!(config.sink_url, "https://sink.example/exec");
        assert_eq!(config.batch.max_size, 20);
        assert_eq!(config.batch.max_wait, Duration::from_secs(10));
        assert_eq!(config.batch.notify_timeout, Duration::from_secs(5));
        assert_eq!(config.sink_timeout, Duration::from_secs(60));
        assert!(config.telegram.is_none());
        assert!(!config.forwarded_only);
        assert_eq!(config.port, 8080);
        assert_eq!(config.metrics_port, 4000);
    }

    #[test]
    fn test_overrides() {
        let config = Configuration::from_lookup(lookup(&[
            ("SINK_URL", "https://sink.example/exec"),
            ("BATCH_MAX_SIZE", "3"),
            ("BATCH_MAX_WAIT_SECS", " 5 "),
            ("TELEGRAM_BOT_TOKEN", "123456:secret-token"),
            ("WEBHOOK_URL", "https://relay.example/webhook"),
            ("FORWARDED_ONLY", "TRUE"),
            ("PORT", "9000"),
        ]))
        .unwrap();

        assert_eq!(config.batch.max_size, 3);
        assert_eq!(config.batch.max_wait, Duration::from_secs(5));
        assert!(config.forwarded_only);
        assert_eq!(config.port, 9000);

        let telegram = config.telegram.clone().unwrap();
        assert_eq!(telegram.bot_token.expose(), "123456:secret-token");
        assert_eq!(telegram.api_url, "https://api.telegram.org");
        assert_eq!(
            telegram.webhook_url.as_deref(),
            Some("https://relay.example/webhook")
        );
        assert!(!format!("{:?}", config).contains("secret-token"));
    }

    #[test]
    fn test_missing_sink_url() {
        let err = Configuration::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("SINK_URL"));
    }

    #[test]
    fn test_invalid_number() {
        let err = Configuration::from_lookup(lookup(&[
            ("SINK_URL", "https://sink.example/exec"),
            ("BATCH_MAX_SIZE", "many"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BATCH_MAX_SIZE"));
    }
}
