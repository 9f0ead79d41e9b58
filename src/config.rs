use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::domain::PaymentMethod;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub reconcile_interval_secs: u64,
    pub reconcile_grace_secs: i64,
    pub reconcile_batch_size: i64,
    pub reconcile_concurrency: usize,
    pub pending_max_age_hours: i64,
    pub provider_timeout_secs: u64,
    pub providers: Vec<ProviderSettings>,
}

/// Static per-provider registration, loaded once at process start and
/// treated as immutable for the process lifetime.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub base_url: String,
    pub countries: Vec<String>,
    pub currencies: Vec<String>,
    pub methods: Vec<PaymentMethod>,
    pub priority: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let mut providers = Vec::new();
        for name in ["flutterwave", "paystack"] {
            if let Some(settings) = provider_from_env(name)? {
                providers.push(settings);
            }
        }

        Ok(Config {
            server_port: env_or("SERVER_PORT", "3000")?,
            database_url: env::var("DATABASE_URL")?,
            reconcile_interval_secs: env_or("RECONCILE_INTERVAL_SECS", "120")?,
            reconcile_grace_secs: env_or("RECONCILE_GRACE_SECS", "300")?,
            reconcile_batch_size: env_or("RECONCILE_BATCH_SIZE", "50")?,
            reconcile_concurrency: env_or("RECONCILE_CONCURRENCY", "8")?,
            pending_max_age_hours: env_or("PENDING_MAX_AGE_HOURS", "24")?,
            provider_timeout_secs: env_or("PROVIDER_TIMEOUT_SECS", "30")?,
            providers,
        })
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(env::var(key).unwrap_or_else(|_| default.to_string()).parse()?)
}

/// A provider is enabled by the presence of `{NAME}_SECRET_KEY`. Corridor
/// capabilities and priority have per-provider defaults but are overridable,
/// so none of this lives inside adapter logic.
fn provider_from_env(name: &str) -> Result<Option<ProviderSettings>> {
    let prefix = name.to_uppercase();
    let secret_key = match env::var(format!("{}_SECRET_KEY", prefix)) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let (base_url, countries, currencies, methods, priority) = defaults_for(name);

    let settings = ProviderSettings {
        name: name.to_string(),
        secret_key,
        webhook_secret: env::var(format!("{}_WEBHOOK_SECRET", prefix)).unwrap_or_default(),
        base_url: env::var(format!("{}_BASE_URL", prefix)).unwrap_or_else(|_| base_url.into()),
        countries: csv_or(&format!("{}_COUNTRIES", prefix), countries),
        currencies: csv_or(&format!("{}_CURRENCIES", prefix), currencies),
        methods: parse_methods(&csv_or(&format!("{}_METHODS", prefix), methods))?,
        priority: env_or(&format!("{}_PRIORITY", prefix), priority)?,
    };

    if settings.webhook_secret.is_empty() {
        anyhow::bail!("{}_WEBHOOK_SECRET must be set when the provider is enabled", prefix);
    }

    Ok(Some(settings))
}

fn defaults_for(name: &str) -> (&'static str, &'static str, &'static str, &'static str, &'static str) {
    match name {
        "flutterwave" => (
            "https://api.flutterwave.com",
            "NG,GH,KE,UG,TZ,ZA,CI,SN,CM,RW",
            "NGN,GHS,KES,UGX,TZS,ZAR,XOF,XAF,RWF,USD",
            "card,mobile_money,bank_transfer,ussd",
            "10",
        ),
        "paystack" => (
            "https://api.paystack.co",
            "NG,GH,KE,ZA",
            "NGN,GHS,KES,ZAR,USD",
            "card,mobile_money,bank_transfer",
            "20",
        ),
        _ => ("", "", "", "", "100"),
    }
}

fn csv_or(key: &str, default: &str) -> Vec<String> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_methods(raw: &[String]) -> Result<Vec<PaymentMethod>> {
    raw.iter()
        .map(|m| m.parse::<PaymentMethod>().map_err(|e| anyhow::anyhow!(e)))
        .collect()
}
