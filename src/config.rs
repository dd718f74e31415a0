use std::env;
use std::ops::RangeInclusive;

use rand::distributions::Alphanumeric;
use rand::Rng;

const BCRYPT_COST_RANGE: &str = "a bcrypt cost between 4 and 31";
const JWT_TTL_RANGE: &str = "a number of days between 1 and 3650";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_days: i64,
    pub bcrypt_cost: u32,
    /// Hides error details from response bodies.
    pub production: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            database_url: "sqlite://chat.db?mode=rwc".to_owned(),
            jwt_secret: random_secret(),
            jwt_ttl_days: 30,
            bcrypt_cost: 10,
            production: false,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                tracing::warn!("JWT_SECRET not set, tokens will not survive a restart");
                defaults.jwt_secret
            }
        };

        let bcrypt_cost = within(
            "BCRYPT_COST",
            BCRYPT_COST_RANGE,
            parse_var::<u32>("BCRYPT_COST", BCRYPT_COST_RANGE)?,
            4..=31,
        )?
        .unwrap_or(defaults.bcrypt_cost);

        let jwt_ttl_days = within(
            "JWT_TTL_DAYS",
            JWT_TTL_RANGE,
            parse_var::<i64>("JWT_TTL_DAYS", JWT_TTL_RANGE)?,
            1..=3650,
        )?
        .unwrap_or(defaults.jwt_ttl_days);

        Ok(Self {
            port: parse_var("PORT", "a port number")?.unwrap_or(defaults.port),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret,
            jwt_ttl_days,
            bcrypt_cost,
            production: env::var("APP_ENV").is_ok_and(|v| v == "production"),
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    key: &'static str,
    expected: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key,
                expected,
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn within<T>(
    key: &'static str,
    expected: &'static str,
    value: Option<T>,
    range: RangeInclusive<T>,
) -> Result<Option<T>, ConfigError>
where
    T: PartialOrd + ToString,
{
    match value {
        Some(v) if !range.contains(&v) => Err(ConfigError::Invalid {
            key,
            expected,
            value: v.to_string(),
        }),
        v => Ok(v),
    }
}

fn random_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_secrets_differ() {
        let a = Config::default().jwt_secret;
        let b = Config::default().jwt_secret;
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn parse_var_reports_bad_values() {
        env::set_var("CHAT_TEST_BAD_PORT", "eighty");
        let err = parse_var::<u16>("CHAT_TEST_BAD_PORT", "a port number").unwrap_err();
        assert_eq!(
            err.to_string(),
            "CHAT_TEST_BAD_PORT must be a port number, got \"eighty\""
        );
        assert!(parse_var::<u16>("CHAT_TEST_UNSET", "a port number")
            .unwrap()
            .is_none());
    }

    #[test]
    fn token_lifetime_must_be_in_range() {
        for bad in [0i64, -1, 3651, 1_000_000_000_000_000] {
            let err = within("JWT_TTL_DAYS", JWT_TTL_RANGE, Some(bad), 1..=3650).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("JWT_TTL_DAYS must be {JWT_TTL_RANGE}, got \"{bad}\"")
            );
        }
        assert_eq!(
            within("JWT_TTL_DAYS", JWT_TTL_RANGE, Some(3650), 1..=3650).unwrap(),
            Some(3650)
        );
        assert_eq!(
            within::<i64>("JWT_TTL_DAYS", JWT_TTL_RANGE, None, 1..=3650).unwrap(),
            None
        );
    }

    #[test]
    fn from_env_rejects_huge_token_lifetime() {
        env::set_var("JWT_TTL_DAYS", "1000000000000000");
        let result = Config::from_env();
        env::remove_var("JWT_TTL_DAYS");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { key: "JWT_TTL_DAYS", .. })
        ));
    }
}
