pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod providers;
pub mod router;
pub mod services;
pub mod startup;
pub mod store;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::services::OrchestrationService;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrchestrationService>,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments", post(handlers::payments::initiate))
        .route("/payments/methods", get(handlers::payments::list_methods))
        .route("/payments/:tx_ref", get(handlers::payments::get_payment))
        .route("/webhooks/:provider", post(handlers::webhooks::receive))
        .route("/events", get(handlers::events::list_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Builds the provider registry from static configuration. Unknown provider
/// names are a configuration error, not a silent skip.
pub fn build_registry(config: &config::Config) -> anyhow::Result<router::ProviderRegistry> {
    use providers::{FlutterwaveAdapter, PaystackAdapter, ProviderAdapter};

    let mut registry = router::ProviderRegistry::new();
    for settings in &config.providers {
        let adapter: Arc<dyn ProviderAdapter> = match settings.name.as_str() {
            providers::flutterwave::PROVIDER_NAME => {
                Arc::new(FlutterwaveAdapter::new(settings, config.provider_timeout_secs))
            }
            providers::paystack::PROVIDER_NAME => {
                Arc::new(PaystackAdapter::new(settings, config.provider_timeout_secs))
            }
            other => anyhow::bail!("unknown provider in configuration: {}", other),
        };
        registry.register(adapter, settings.priority);
    }
    Ok(registry)
}
