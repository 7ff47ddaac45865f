use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_JWT_EXPIRES_IN: &str = "90d";
const DEFAULT_BCRYPT_COST: u32 = 12;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("environment variable {name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    /// Absent disables rate limiting.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub bcrypt_cost: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub max_page_size: Option<u64>,
    pub mail_webhook_url: Option<String>,
    /// Lets the log mailer write reset links (and their tokens) at debug level.
    pub mail_log_links: bool,
    /// Origin used when building reset links.
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let jwt_secret = optional("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        let expires_in =
            optional("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_JWT_EXPIRES_IN.into());
        let jwt_expiration_secs = parse_duration_secs(&expires_in).ok_or(ConfigError::Invalid {
            name: "JWT_EXPIRES_IN",
            value: expires_in.clone(),
        })?;
        let server_port = parsed("SERVER_PORT")?.unwrap_or(3000);

        Ok(Config {
            database_url: optional("DATABASE_URL"),
            redis_url: optional("REDIS_URL"),
            jwt_secret,
            jwt_expiration_secs,
            bcrypt_cost: parsed("BCRYPT_COST")?.unwrap_or(DEFAULT_BCRYPT_COST),
            rate_limit_window_secs: parsed("RATE_LIMIT_WINDOW")?.unwrap_or(3600),
            rate_limit_requests: parsed("RATE_LIMIT_REQUESTS")?.unwrap_or(100),
            server_host: optional("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port,
            api_base_uri: optional("API_BASE_URI").unwrap_or_else(|| "/api/v1".into()),
            max_page_size: parsed("MAX_PAGE_SIZE")?,
            mail_webhook_url: optional("MAIL_WEBHOOK_URL"),
            mail_log_links: parsed("MAIL_LOG_LINKS")?.unwrap_or(false),
            public_url: optional("PUBLIC_URL")
                .unwrap_or_else(|| format!("http://127.0.0.1:{server_port}")),
        })
    }

    /// Defaults for everything but the signing secret; no environment access.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Config {
            database_url: None,
            redis_url: None,
            jwt_secret: jwt_secret.into(),
            jwt_expiration_secs: 90 * 24 * 3600,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            rate_limit_window_secs: 3600,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api/v1".into(),
            max_page_size: None,
            mail_webhook_url: None,
            mail_log_links: false,
            public_url: "http://127.0.0.1:3000".into(),
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn reset_url(&self, token: &str) -> String {
        format!(
            "{}{}/users/reset-password/{token}",
            self.public_url.trim_end_matches('/'),
            self.api_base_uri
        )
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    optional(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { name, value })
        })
        .transpose()
}

/// `90d`, `24h`, `30m`, `45s` or a bare number of seconds.
pub fn parse_duration_secs(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (number, unit) = match raw.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&raw[..i], c.to_ascii_lowercase()),
        _ => (raw, 's'),
    };
    let value: u64 = number.trim().parse().ok()?;
    let scale = match unit {
        'd' => 86_400,
        'h' => 3_600,
        'm' => 60,
        's' => 1,
        _ => return None,
    };
    value.checked_mul(scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("90d", Some(90 * 86_400))]
    #[case("24h", Some(86_400))]
    #[case("30m", Some(1_800))]
    #[case("45", Some(45))]
    #[case(" 2D ", Some(172_800))]
    #[case("10w", None)]
    #[case("d", None)]
    #[case("", None)]
    fn duration_suffixes(#[case] raw: &str, #[case] expected: Option<u64>) {
        assert_eq!(parse_duration_secs(raw), expected);
    }

    #[test]
    fn reset_links_join_origin_and_base() {
        let mut config = Config::with_secret("s");
        config.public_url = "https://tours.example/".into();
        assert_eq!(
            config.reset_url("abc"),
            "https://tours.example/api/v1/users/reset-password/abc"
        );
    }
}
