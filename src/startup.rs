use crate::config::Config;
use crate::router::ProviderRegistry;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub providers: Vec<(String, bool)>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.providers.iter().all(|(_, ok)| *ok)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        for (name, ok) in &self.providers {
            println!("Provider {:<12} {}", format!("{}:", name), status(*ok));
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  - {}", error);
            }
        }

        println!(
            "\nOverall Status: {}",
            if self.is_valid() { "PASS" } else { "FAIL" }
        );
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "FAIL"
    }
}

pub async fn validate_environment(
    config: &Config,
    pool: &PgPool,
    registry: &ProviderRegistry,
) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        providers: Vec::new(),
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    // Credential checks run off the hot path, at startup only.
    for adapter in registry.all() {
        match adapter.validate_credentials().await {
            Ok(()) => report.providers.push((adapter.name().to_string(), true)),
            Err(e) => {
                report.providers.push((adapter.name().to_string(), false));
                report.errors.push(format!("Provider {}: {}", adapter.name(), e));
            }
        }
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.providers.is_empty() {
        anyhow::bail!("no payment provider configured (set e.g. FLUTTERWAVE_SECRET_KEY)");
    }
    if config.reconcile_grace_secs < 0 {
        anyhow::bail!("RECONCILE_GRACE_SECS must not be negative");
    }

    for provider in &config.providers {
        url::Url::parse(&provider.base_url)
            .with_context(|| format!("{}_BASE_URL is not a valid URL", provider.name.to_uppercase()))?;
        if provider.countries.is_empty() || provider.currencies.is_empty() {
            anyhow::bail!("provider {} has an empty corridor configuration", provider.name);
        }
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::domain::PaymentMethod;

    fn base_config() -> Config {
        Config {
            server_port: 3000,
            database_url: "postgres://localhost:5432/afriflow".to_string(),
            reconcile_interval_secs: 120,
            reconcile_grace_secs: 300,
            reconcile_batch_size: 50,
            reconcile_concurrency: 8,
            pending_max_age_hours: 24,
            provider_timeout_secs: 30,
            providers: vec![ProviderSettings {
                name: "flutterwave".into(),
                secret_key: "FLWSECK_TEST".into(),
                webhook_secret: "hash".into(),
                base_url: "https://api.flutterwave.com".into(),
                countries: vec!["NG".into()],
                currencies: vec!["NGN".into()],
                methods: vec![PaymentMethod::Card],
                priority: 10,
            }],
        }
    }

    #[test]
    fn test_validate_env_vars_ok() {
        assert!(validate_env_vars(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_env_vars_empty_database_url() {
        let mut config = base_config();
        config.database_url = String::new();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_no_providers() {
        let mut config = base_config();
        config.providers.clear();
        assert!(validate_env_vars(&config).is_err());
    }

    #[test]
    fn test_validate_env_vars_invalid_base_url() {
        let mut config = base_config();
        config.providers[0].base_url = "not-a-url".into();
        assert!(validate_env_vars(&config).is_err());
    }
}
