use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{
    error::{Error, Result},
    retry::RetryPolicy,
};

/// Runtime settings, read from the environment (and a `.env` file if present).
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// base url of the job service, e.g. `https://repairs.local:8000`
    pub base_url: Option<String>,
    /// directory holding `rootCA.crt` and `clientKeyCert.pem`
    pub certs_dir: Option<PathBuf>,
    pub query_retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            certs_dir: None,
            query_retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// same as [`Config::from_env`] with an explicit variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = value("REPAIR_BASE_URL").map(|url| url.trim_end_matches('/').to_string());
        let certs_dir = value("REPAIR_CERTS_DIR").map(PathBuf::from);

        let max_retries = parse(&value, "REPAIR_QUERY_RETRIES")?
            .unwrap_or(defaults.query_retry.max_retries);
        let base_delay = parse(&value, "REPAIR_RETRY_BASE_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.query_retry.base_delay);
        let max_delay = parse(&value, "REPAIR_RETRY_MAX_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.query_retry.max_delay);
        let request_timeout = parse(&value, "REPAIR_REQUEST_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout);

        Ok(Self {
            base_url,
            certs_dir,
            query_retry: RetryPolicy {
                max_retries,
                base_delay,
                max_delay,
            },
            request_timeout,
        })
    }

    pub fn require_base_url(&self) -> Result<&str> {
        self.base_url
            .as_deref()
            .ok_or_else(|| Error::Config("REPAIR_BASE_URL is missing".to_string()))
    }
}

fn parse<T, F>(value: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match value(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid number: {}", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, time::Duration};

    use super::Config;
    use crate::error::Error;

    fn config(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(Config::default(), config);
        assert!(config.require_base_url().is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("REPAIR_BASE_URL", "https://repairs.local:8000/"),
            ("REPAIR_QUERY_RETRIES", "1"),
            ("REPAIR_RETRY_BASE_MS", "10"),
            ("REPAIR_REQUEST_TIMEOUT_SECS", " 5 "),
            ("REPAIR_CERTS_DIR", ""),
        ])
        .unwrap();
        assert_eq!("https://repairs.local:8000", config.require_base_url().unwrap());
        assert_eq!(1, config.query_retry.max_retries);
        assert_eq!(Duration::from_millis(10), config.query_retry.base_delay);
        assert_eq!(Duration::from_secs(5), config.request_timeout);
        assert_eq!(None, config.certs_dir);
    }

    #[test]
    fn test_malformed_number() {
        match config(&[("REPAIR_QUERY_RETRIES", "many")]) {
            Err(Error::Config(msg)) => assert!(msg.contains("REPAIR_QUERY_RETRIES")),
            other => panic!("expected config error, got: {:?}", other),
        }
    }
}
