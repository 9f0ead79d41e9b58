//! Shared outbound HTTP client for provider adapters.
//!
//! Wraps reqwest with a per-call timeout and a consecutive-failures circuit
//! breaker so one flapping provider cannot tie up reconciliation workers.

use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::ProviderError;

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    secret_key: String,
    circuit_breaker: Breaker,
}

impl RestClient {
    pub fn new(base_url: String, secret_key: String, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(30), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(5, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        RestClient {
            client,
            base_url,
            secret_key,
            circuit_breaker,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url(), path);
        let client = self.client.clone();
        let secret = self.secret_key.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.get(&url).bearer_auth(&secret).send().await?;
                decode(response).await
            })
            .await;

        unwrap_breaker(result)
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url(), path);
        let client = self.client.clone();
        let secret = self.secret_key.clone();
        let body = body.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client
                    .post(&url)
                    .bearer_auth(&secret)
                    .json(&body)
                    .send()
                    .await?;
                decode(response).await
            })
            .await;

        unwrap_breaker(result)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ProviderError> {
    let status = response.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::InvalidCredentials(format!(
            "provider returned {}",
            status
        )));
    }

    let text = response.text().await?;

    if status.is_client_error() {
        // 4xx carries the provider's rejection reason, not a transport fault.
        return Err(ProviderError::Rejected(text));
    }
    if !status.is_success() {
        return Err(ProviderError::Communication(format!(
            "provider returned {}: {}",
            status, text
        )));
    }

    serde_json::from_str(&text)
        .map_err(|e| ProviderError::InvalidPayload(format!("{}: {}", e, text)))
}

fn unwrap_breaker<T>(result: Result<T, FailsafeError<ProviderError>>) -> Result<T, ProviderError> {
    match result {
        Ok(v) => Ok(v),
        Err(FailsafeError::Rejected) => Err(ProviderError::CircuitOpen),
        Err(FailsafeError::Inner(e)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_json_success() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ping")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"ok"}"#)
            .create_async()
            .await;

        let client = RestClient::new(server.url(), "sk_test".into(), 5);
        let body: serde_json::Value = client.get_json("/ping").await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_invalid_credentials() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ping")
            .with_status(401)
            .create_async()
            .await;

        let client = RestClient::new(server.url(), "sk_bad".into(), 5);
        let result: Result<serde_json::Value, _> = client.get_json("/ping").await;
        assert!(matches!(result, Err(ProviderError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_client_error_maps_to_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/charge")
            .with_status(400)
            .with_body(r#"{"message":"invalid currency"}"#)
            .create_async()
            .await;

        let client = RestClient::new(server.url(), "sk_test".into(), 5);
        let result: Result<serde_json::Value, _> =
            client.post_json("/charge", &serde_json::json!({})).await;
        assert!(matches!(result, Err(ProviderError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_consecutive_failures() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/ping")
            .with_status(500)
            .expect_at_least(5)
            .create_async()
            .await;

        let client = RestClient::new(server.url(), "sk_test".into(), 5);
        for _ in 0..5 {
            let _: Result<serde_json::Value, _> = client.get_json("/ping").await;
        }
        let result: Result<serde_json::Value, _> = client.get_json("/ping").await;
        assert!(matches!(result, Err(ProviderError::CircuitOpen)));
    }
}
