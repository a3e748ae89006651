use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
    #[error("environment variable {var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" | "local" => Ok(Environment::Development),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub gateway: GatewayConfig,
    pub app: AppConfig,
    /// Raw `token=role:user[:gym_id]` directory, parsed by `TokenAuthenticator`.
    #[serde(skip_serializing)]
    pub auth_tokens: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(skip_serializing)]
    pub webhook_secret: String,
    pub signature_header: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    /// Only honoured outside production.
    pub verify_webhook_signature: bool,
    pub trial_days: i64,
    pub admin_activation_days: i64,
    pub admin_default_tier: String,
    pub extend_trial_clears_subscription: bool,
    pub default_currency: String,
}

impl AppConfig {
    /// Production always verifies, whatever the flag says.
    pub fn enforce_webhook_signature(&self) -> bool {
        self.environment.is_production() || self.verify_webhook_signature
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            verify_webhook_signature: true,
            trial_days: 30,
            admin_activation_days: 30,
            admin_default_tier: "monthly".to_string(),
            extend_trial_clears_subscription: true,
            default_currency: "COP".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            webhook_secret: String::new(),
            signature_header: "X-Gateway-Signature".to_string(),
            timeout_secs: 10,
            max_retries: 2,
            success_url: None,
            cancel_url: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let gateway_defaults = GatewayConfig::default();

        let environment = match env::var("APP_ENV") {
            Ok(value) => value
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "APP_ENV", value })?,
            Err(_) => defaults.environment,
        };

        let app = AppConfig {
            environment,
            verify_webhook_signature: parse_or("VERIFY_WEBHOOK_SIGNATURE", defaults.verify_webhook_signature)?,
            trial_days: parse_or("TRIAL_DAYS", defaults.trial_days)?,
            admin_activation_days: parse_or("ADMIN_ACTIVATION_DAYS", defaults.admin_activation_days)?,
            admin_default_tier: env::var("ADMIN_DEFAULT_TIER").unwrap_or(defaults.admin_default_tier),
            extend_trial_clears_subscription: parse_or(
                "EXTEND_TRIAL_CLEARS_SUBSCRIPTION",
                defaults.extend_trial_clears_subscription,
            )?,
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or(defaults.default_currency),
        };

        if app.environment.is_production() && !app.verify_webhook_signature {
            log::warn!("VERIFY_WEBHOOK_SIGNATURE=false is ignored in production");
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "memory://".to_string()),
            port: parse_or("PORT", 8080)?,
            gateway: GatewayConfig {
                base_url: required("GATEWAY_BASE_URL")?,
                api_key: required("GATEWAY_API_KEY")?,
                webhook_secret: required("GATEWAY_WEBHOOK_SECRET")?,
                signature_header: env::var("GATEWAY_SIGNATURE_HEADER")
                    .unwrap_or(gateway_defaults.signature_header),
                timeout_secs: parse_or("GATEWAY_TIMEOUT_SECS", gateway_defaults.timeout_secs)?,
                max_retries: parse_or("GATEWAY_MAX_RETRIES", gateway_defaults.max_retries)?,
                success_url: env::var("GATEWAY_SUCCESS_URL").ok(),
                cancel_url: env::var("GATEWAY_CANCEL_URL").ok(),
            },
            app,
            auth_tokens: env::var("AUTH_TOKENS").unwrap_or_default(),
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn parse_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_always_verifies() {
        let app = AppConfig {
            environment: Environment::Production,
            verify_webhook_signature: false,
            ..AppConfig::default()
        };
        assert!(app.enforce_webhook_signature());
    }

    #[test]
    fn test_development_may_disable_verification() {
        let app = AppConfig {
            environment: Environment::Development,
            verify_webhook_signature: false,
            ..AppConfig::default()
        };
        assert!(!app.enforce_webhook_signature());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("staging-ish".parse::<Environment>().is_err());
    }
}
