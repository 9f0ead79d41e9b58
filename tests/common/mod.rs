#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use afriflow::config::Config;
use afriflow::domain::{Customer, PaymentMethod, Transaction, TxStatus};
use afriflow::providers::{InitiateRequest, ProviderAdapter, ProviderError, ProviderPayment};
use afriflow::router::ProviderRegistry;
use afriflow::services::OrchestrationService;
use afriflow::store::{MemoryTransactionStore, TransactionStore};

/// Programmable provider behavior for one call family.
#[derive(Debug, Clone)]
pub enum Behavior {
    Report(TxStatus),
    Timeout,
    Rejected(String),
}

/// Test double implementing the adapter contract with scriptable outcomes.
pub struct MockAdapter {
    name: String,
    countries: Vec<String>,
    currencies: Vec<String>,
    methods: Vec<PaymentMethod>,
    pub initiate_behavior: Mutex<Behavior>,
    pub verify_behavior: Mutex<Behavior>,
    pub verify_calls: AtomicUsize,
}

impl MockAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            countries: vec!["CI".into(), "NG".into()],
            currencies: vec!["XOF".into(), "NGN".into()],
            methods: vec![PaymentMethod::MobileMoney, PaymentMethod::Card],
            initiate_behavior: Mutex::new(Behavior::Report(TxStatus::Pending)),
            verify_behavior: Mutex::new(Behavior::Report(TxStatus::Pending)),
            verify_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_verify(&self, behavior: Behavior) {
        *self.verify_behavior.lock().unwrap() = behavior;
    }

    pub fn set_initiate(&self, behavior: Behavior) {
        *self.initiate_behavior.lock().unwrap() = behavior;
    }

    fn payment(&self, tx_ref: &str, status: TxStatus) -> ProviderPayment {
        ProviderPayment {
            tx_ref: tx_ref.to_string(),
            provider_reference: Some(format!("{}-ref-1", self.name)),
            status,
            checkout_url: Some(format!("https://checkout.{}.test/pay", self.name)),
            raw: json!({"provider": self.name, "status": status}),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initiate_payment(
        &self,
        request: &InitiateRequest,
    ) -> Result<ProviderPayment, ProviderError> {
        match self.initiate_behavior.lock().unwrap().clone() {
            Behavior::Report(status) => {
                let mut payment = self.payment(&request.tx_ref, status);
                // Like redirect-based providers, no reference at initiation.
                payment.provider_reference = None;
                Ok(payment)
            }
            Behavior::Timeout => Err(ProviderError::Timeout),
            Behavior::Rejected(reason) => Err(ProviderError::Rejected(reason)),
        }
    }

    async fn verify_payment(
        &self,
        tx_ref: &str,
        _provider_reference: Option<&str>,
    ) -> Result<ProviderPayment, ProviderError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verify_behavior.lock().unwrap().clone() {
            Behavior::Report(status) => Ok(self.payment(tx_ref, status)),
            Behavior::Timeout => Err(ProviderError::Timeout),
            Behavior::Rejected(reason) => Err(ProviderError::Rejected(reason)),
        }
    }

    async fn handle_webhook(
        &self,
        _body: &[u8],
        _headers: &HeaderMap,
    ) -> Result<ProviderPayment, ProviderError> {
        Err(ProviderError::InvalidSignature(
            "mock adapter does not accept webhooks".into(),
        ))
    }

    fn supported_methods(&self, country: &str) -> Vec<PaymentMethod> {
        if self.countries.iter().any(|c| c == country) {
            self.methods.clone()
        } else {
            Vec::new()
        }
    }

    fn supported_currencies(&self) -> Vec<String> {
        self.currencies.clone()
    }

    async fn validate_credentials(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub struct TestHarness {
    pub orchestrator: Arc<OrchestrationService>,
    pub store: Arc<MemoryTransactionStore>,
}

pub fn harness(adapters: Vec<(Arc<dyn ProviderAdapter>, u32)>) -> TestHarness {
    let mut registry = ProviderRegistry::new();
    for (adapter, priority) in adapters {
        registry.register(adapter, priority);
    }
    let store = Arc::new(MemoryTransactionStore::new());
    let store_dyn: Arc<dyn TransactionStore> = store.clone();
    let orchestrator = Arc::new(OrchestrationService::new(Arc::new(registry), store_dyn));
    TestHarness { orchestrator, store }
}

pub fn pending_transaction(tx_ref: &str, provider: &str) -> Transaction {
    Transaction::new(
        "order123".into(),
        tx_ref.into(),
        provider.into(),
        5000,
        "XOF".into(),
        "CI".into(),
        PaymentMethod::MobileMoney,
        Customer {
            name: Some("Awa Diabaté".into()),
            email: "awa@example.ci".into(),
            phone: Some("+2250700000001".into()),
        },
    )
}

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: "postgres://unused".into(),
        reconcile_interval_secs: 60,
        reconcile_grace_secs: 120,
        reconcile_batch_size: 50,
        reconcile_concurrency: 4,
        pending_max_age_hours: 24,
        provider_timeout_secs: 5,
        providers: Vec::new(),
    }
}
