//! Classifier backend capability and the HTTP implementation.
//!
//! The backend is whatever service answers "what category is this
//! merchant?". The engine only sees the capability, never a vendor.

use async_trait::async_trait;
use finsight_core::{Category, ClassifyError, Transaction};
use serde::{Deserialize, Serialize};

use crate::engine::CategoryProvider;

/// External classification capability. May be remote and may fail
/// transiently; the orchestrator owns the retry policy.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    async fn classify(
        &self,
        merchant: &str,
        description: &str,
    ) -> Result<(String, f64), ClassifyError>;
}

/// HTTP classifier client: POST {merchant, description}, read
/// {category, confidence}.
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemoteClassifier {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl ClassifierBackend for RemoteClassifier {
    async fn classify(
        &self,
        merchant: &str,
        description: &str,
    ) -> Result<(String, f64), ClassifyError> {
        #[derive(Serialize)]
        struct Req<'a> {
            merchant: &'a str,
            description: &'a str,
        }

        #[derive(Deserialize)]
        struct Resp {
            category: String,
            confidence: f64,
        }

        let mut request = self.client.post(&self.endpoint).json(&Req {
            merchant,
            description,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ClassifyError::Unavailable(format!("request: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClassifyError::Unavailable(format!(
                "classifier returned {status}: {body}"
            )));
        }

        let out: Resp = resp
            .json()
            .await
            .map_err(|e| ClassifyError::Unavailable(format!("decode: {e}")))?;
        Ok((out.category, out.confidence.clamp(0.0, 1.0)))
    }
}

/// Adapts a `ClassifierBackend` into the provider chain. Labels the engine
/// does not recognize land in `Uncategorized` with zero confidence rather
/// than failing the transaction.
pub struct BackendProvider<B> {
    backend: B,
}

impl<B: ClassifierBackend> BackendProvider<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl<B: ClassifierBackend> CategoryProvider for BackendProvider<B> {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn categorize(
        &self,
        txn: &Transaction,
    ) -> Result<Option<(Category, f64)>, ClassifyError> {
        let (label, confidence) = self
            .backend
            .classify(&txn.merchant, &txn.raw_description)
            .await?;
        match Category::from_label(&label) {
            Some(category) => Ok(Some((category, confidence))),
            None => {
                tracing::warn!(label = %label, "classifier returned unknown category label");
                Ok(Some((Category::Uncategorized, 0.0)))
            }
        }
    }
}
