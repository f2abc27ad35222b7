use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const URL_ENV: &str = "RAPPORT_SUPABASE_URL";
pub const ANON_KEY_ENV: &str = "RAPPORT_SUPABASE_ANON_KEY";
pub const TIMEOUT_ENV: &str = "RAPPORT_REQUEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub supabase_url: String,
    pub anon_key: String,
    /// Deadline applied to every remote call.
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            supabase_url: String::new(),
            anon_key: String::new(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self::from_settings(&HashMap::new())
    }

    /// Settings stored in the local database win over environment variables.
    pub fn from_settings(settings: &HashMap<String, String>) -> Self {
        Self::from_sources(settings, |name| std::env::var(name).ok())
    }

    pub(crate) fn from_sources<F>(settings: &HashMap<String, String>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str, env_name: &str| -> Option<String> {
            settings
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .or_else(|| env(env_name).filter(|v| !v.trim().is_empty()))
                .map(|v| v.trim().to_string())
        };

        let request_timeout = lookup("request_timeout_secs", TIMEOUT_ENV)
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        BackendConfig {
            supabase_url: lookup("supabase_url", URL_ENV).unwrap_or_default(),
            anon_key: lookup("supabase_anon_key", ANON_KEY_ENV).unwrap_or_default(),
            request_timeout: Duration::from_secs(request_timeout),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.anon_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_settings_take_precedence_over_env() {
        let s = settings(&[("supabase_url", "https://db.example.co"), ("supabase_anon_key", "")]);
        let config = BackendConfig::from_sources(&s, |name| match name {
            URL_ENV => Some("https://env.example.co".into()),
            ANON_KEY_ENV => Some("anon-from-env".into()),
            _ => None,
        });
        assert_eq!(config.supabase_url, "https://db.example.co");
        assert_eq!(config.anon_key, "anon-from-env");
        assert!(config.is_configured());
    }

    #[test]
    fn test_missing_values_are_not_configured() {
        let config = BackendConfig::from_sources(&HashMap::new(), |_| None);
        assert!(!config.is_configured());
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        let only_url = BackendConfig::from_sources(&settings(&[("supabase_url", "https://x")]), |_| None);
        assert!(!only_url.is_configured());
    }

    #[test]
    fn test_timeout_parsing() {
        let config = BackendConfig::from_sources(&settings(&[("request_timeout_secs", "5")]), |_| None);
        assert_eq!(config.request_timeout, Duration::from_secs(5));

        let config = BackendConfig::from_sources(&settings(&[("request_timeout_secs", "0")]), |_| None);
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));

        let config = BackendConfig::from_sources(&HashMap::new(), |name| {
            (name == TIMEOUT_ENV).then(|| "abc".to_string())
        });
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
    }
}
