//! Client for the inference server's model registry
//!
//! The inference server owns the authoritative model list. This module only
//! speaks its HTTP surface:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list      | `GET /models` |
//! | import    | `POST /models/import {model, modelPath, name}` |
//! | update    | `PATCH /models/{id}` |
//! | pull      | `POST /models/pull {model, id, name}` |
//! | cancel    | `DELETE /models/pull {taskId}` |
//! | delete    | `DELETE /models/{id}` |

use super::record::ModelRecord;
use crate::error::{ModelError, ModelResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// Body of a pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Model reference understood by the server (repo, url or catalog id)
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PullRequest {
    /// Id the server will register the pulled model under
    pub fn model_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.model)
    }
}

/// Mutable display metadata pushed for models the server already knows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdate {
    #[serde(skip)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl From<&ModelRecord> for ModelUpdate {
    fn from(record: &ModelRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            metadata: record.metadata.clone(),
        }
    }
}

/// Body of an import request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&ModelRecord> for ImportRequest {
    fn from(record: &ModelRecord) -> Self {
        // The folder holding the descriptor, else wherever the first binary lives
        let model_path = record
            .file_path
            .as_deref()
            .and_then(|p| Path::new(p).parent())
            .map(|p| p.to_string_lossy().to_string())
            .or_else(|| record.sources.first().map(|s| s.url.clone()));

        Self {
            model: record.id.clone(),
            model_path,
            name: record.name.clone(),
        }
    }
}

// ============================================================================
// Trait Definitions
// ============================================================================

/// Operations the registry core needs from the inference server
#[async_trait]
pub trait RemoteRegistry: Send + Sync {
    async fn list_models(&self) -> ModelResult<Vec<ModelRecord>>;

    /// Register a locally known model with the server
    async fn import_model(&self, record: &ModelRecord) -> ModelResult<()>;

    async fn update_model(&self, update: &ModelUpdate) -> ModelResult<()>;

    /// Start a download; the server deduplicates concurrent pulls
    async fn pull_model(&self, request: &PullRequest) -> ModelResult<()>;

    /// Cancel a pull; resolves once the server acknowledged
    async fn cancel_pull(&self, task_id: &str) -> ModelResult<()>;

    async fn delete_model(&self, model_id: &str) -> ModelResult<()>;
}

// ============================================================================
// Production Implementation
// ============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Wrapped { data: Vec<ModelRecord> },
    Bare(Vec<ModelRecord>),
}

/// HTTP client for the inference server
pub struct HttpRemoteRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteRegistry {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:39291/v1`)
    pub fn new(base_url: &str, timeout: Duration) -> ModelResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::RemoteUnavailable(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn model_url(&self, model_id: &str) -> String {
        self.url(&format!("/models/{}", urlencoding::encode(model_id)))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ModelResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ModelError::RemoteUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            Err(ModelError::RemoteUnavailable(format!("{}: {}", status, message)))
        } else {
            Err(ModelError::Remote {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl RemoteRegistry for HttpRemoteRegistry {
    async fn list_models(&self) -> ModelResult<Vec<ModelRecord>> {
        let response = self.send(self.client.get(self.url("/models"))).await?;
        let status = response.status().as_u16();

        let body: ListResponse = response.json().await.map_err(|e| ModelError::Remote {
            status,
            message: format!("invalid model list: {}", e),
        })?;

        let mut models = match body {
            ListResponse::Wrapped { data } => data,
            ListResponse::Bare(models) => models,
        };
        // Provenance is only ever set by the scanner
        for model in &mut models {
            model.file_path = None;
            model.file_name = None;
        }
        Ok(models)
    }

    async fn import_model(&self, record: &ModelRecord) -> ModelResult<()> {
        let body = ImportRequest::from(record);
        tracing::debug!(model_id = %record.id, model_path = ?body.model_path, "Importing model");
        self.send(self.client.post(self.url("/models/import")).json(&body))
            .await?;
        Ok(())
    }

    async fn update_model(&self, update: &ModelUpdate) -> ModelResult<()> {
        self.send(self.client.patch(self.model_url(&update.id)).json(update))
            .await?;
        Ok(())
    }

    async fn pull_model(&self, request: &PullRequest) -> ModelResult<()> {
        self.send(self.client.post(self.url("/models/pull")).json(request))
            .await?;
        Ok(())
    }

    async fn cancel_pull(&self, task_id: &str) -> ModelResult<()> {
        let body = serde_json::json!({ "taskId": task_id });
        self.send(self.client.delete(self.url("/models/pull")).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_model(&self, model_id: &str) -> ModelResult<()> {
        self.send(self.client.delete(self.model_url(model_id))).await?;
        Ok(())
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::InferenceEngine;
    use serde_json::json;

    #[test]
    fn test_pull_request_serializes_exact_fields() {
        let request = PullRequest {
            model: "test-model".to_string(),
            id: Some("test-id".to_string()),
            name: Some("test-name".to_string()),
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "model": "test-model", "id": "test-id", "name": "test-name" })
        );
        assert_eq!(request.model_id(), "test-id");
    }

    #[test]
    fn test_pull_request_omits_absent_fields() {
        let request = PullRequest {
            model: "llama3".to_string(),
            id: None,
            name: None,
        };
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({ "model": "llama3" }));
        assert_eq!(request.model_id(), "llama3");
    }

    #[test]
    fn test_import_request_uses_descriptor_folder() {
        let mut record = ModelRecord::new("llama3", InferenceEngine::LlamaCpp)
            .with_name("Llama 3")
            .with_source("llama3.gguf", "file://models/llama3/llama3.gguf");
        record.file_path = Some("/data/models/llama3/model.json".to_string());

        let body = serde_json::to_value(ImportRequest::from(&record)).unwrap();
        assert_eq!(
            body,
            json!({ "model": "llama3", "modelPath": "/data/models/llama3", "name": "Llama 3" })
        );
    }

    #[test]
    fn test_import_request_falls_back_to_source() {
        let record = ModelRecord::new("mistral", InferenceEngine::Nitro)
            .with_source("mistral", "https://example.com/mistral.gguf");
        let body = ImportRequest::from(&record);
        assert_eq!(body.model_path.as_deref(), Some("https://example.com/mistral.gguf"));
    }

    #[test]
    fn test_update_body_excludes_id() {
        let record = ModelRecord::new("phi3", InferenceEngine::LlamaCpp).with_name("Phi 3");
        let update = ModelUpdate::from(&record);
        assert_eq!(update.id, "phi3");
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({ "name": "Phi 3" }));
    }

    #[test]
    fn test_list_response_shapes() {
        let wrapped: ListResponse =
            serde_json::from_value(json!({ "data": [{ "id": "a", "engine": "llama-cpp" }] })).unwrap();
        let bare: ListResponse = serde_json::from_value(json!([{ "id": "b" }])).unwrap();
        assert!(matches!(wrapped, ListResponse::Wrapped { data } if data[0].id == "a"));
        assert!(matches!(bare, ListResponse::Bare(models) if models[0].id == "b"));
    }

    #[test]
    fn test_model_url_encodes_id() {
        let registry =
            HttpRemoteRegistry::new("http://127.0.0.1:39291/v1/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            registry.model_url("org/model:q4"),
            "http://127.0.0.1:39291/v1/models/org%2Fmodel%3Aq4"
        );
    }
}
