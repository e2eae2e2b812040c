//! Model record schema and legacy descriptor normalization
//!
//! Descriptors on disk come in several historical shapes:
//!
//! ```text
//! { "id": "llama3", "engine": "llama-cpp", "sources": [{ "filename": "...", "url": "..." }] }
//! { "id": "tinyllama", "engine": "nitro", "source": [{ "filename": "...", "url": "..." }] }
//! { "id": "mistral", "source_url": "https://huggingface.co/.../mistral.gguf" }
//! ```
//!
//! All of them are read into a [`LegacyDescriptor`] and converted to the
//! canonical [`ModelRecord`] by [`normalize_legacy_record`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// File name of the per-model descriptor
pub const DESCRIPTOR_FILE_NAME: &str = "model.json";

/// Inference backend owning a model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InferenceEngine {
    LlamaCpp,
    /// Legacy descriptors without an engine field were served by nitro
    #[default]
    Nitro,
    /// Packs the whole model into one engine file regardless of declared sources
    NitroTensorrtLlm,
    Onnx,
    OpenAi,
    Anthropic,
    Other(String),
}

impl InferenceEngine {
    pub fn as_str(&self) -> &str {
        match self {
            Self::LlamaCpp => "llama-cpp",
            Self::Nitro => "nitro",
            Self::NitroTensorrtLlm => "nitro-tensorrt-llm",
            Self::Onnx => "onnx",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for InferenceEngine {
    fn from(value: String) -> Self {
        match value.as_str() {
            "llama-cpp" | "llamacpp" | "cortex.llamacpp" => Self::LlamaCpp,
            "nitro" => Self::Nitro,
            "nitro-tensorrt-llm" | "tensorrt-llm" | "cortex.tensorrt-llm" => Self::NitroTensorrtLlm,
            "onnx" | "cortex.onnx" => Self::Onnx,
            "openai" => Self::OpenAi,
            "anthropic" => Self::Anthropic,
            _ => Self::Other(value),
        }
    }
}

impl From<InferenceEngine> for String {
    fn from(engine: InferenceEngine) -> Self {
        engine.as_str().to_string()
    }
}

impl fmt::Display for InferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One binary artifact belonging to a model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSource {
    pub filename: String,
    pub url: String,
}

impl ModelSource {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }

    /// Whether the artifact lives on a remote host (nothing to check locally)
    pub fn is_remote(&self) -> bool {
        is_remote_url(&self.url)
    }
}

/// Whether a source url points at a remote host
pub fn is_remote_url(url: &str) -> bool {
    let lower = url.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Canonical descriptor for one installable model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Stable identifier, also the on-disk directory name
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub engine: InferenceEngine,

    #[serde(default)]
    pub sources: Vec<ModelSource>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,

    /// Where the descriptor was read from (set by the scanner only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    /// Fields this crate does not interpret, preserved across read/write
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelRecord {
    pub fn new(id: impl Into<String>, engine: InferenceEngine) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            engine,
            sources: Vec::new(),
            settings: Map::new(),
            parameters: Map::new(),
            metadata: Map::new(),
            file_path: None,
            file_name: None,
            extra: Map::new(),
        }
    }

    pub fn with_source(mut self, filename: impl Into<String>, url: impl Into<String>) -> Self {
        self.sources.push(ModelSource::new(filename, url));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name shown to users, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Whether every declared source is a remote reference
    pub fn all_sources_remote(&self) -> bool {
        !self.sources.is_empty() && self.sources.iter().all(ModelSource::is_remote)
    }

    /// Whether `local` carries display fields this record lacks or disagrees on
    ///
    /// Fields absent on `local` never count as a difference.
    pub fn display_differs(&self, local: &ModelRecord) -> bool {
        local
            .name
            .as_ref()
            .is_some_and(|name| self.name.as_ref() != Some(name))
            || local
                .description
                .as_ref()
                .is_some_and(|desc| self.description.as_ref() != Some(desc))
            || (!local.metadata.is_empty() && self.metadata != local.metadata)
    }

    /// Copy provenance from a scanned record when this one has none
    pub fn adopt_provenance(&mut self, scanned: &ModelRecord) {
        if self.file_path.is_none() {
            self.file_path = scanned.file_path.clone();
        }
        if self.file_name.is_none() {
            self.file_name = scanned.file_name.clone();
        }
    }

    /// Copy of this record without scanner-only provenance fields
    pub fn without_provenance(&self) -> ModelRecord {
        let mut record = self.clone();
        record.file_path = None;
        record.file_name = None;
        record
    }
}

/// Descriptor as found on disk, before normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyDescriptor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub engine: Option<InferenceEngine>,
    #[serde(default, alias = "source")]
    pub sources: Option<Vec<ModelSource>>,
    /// Deprecated singular form of `sources`
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Convert an on-disk descriptor into the canonical record
///
/// `source_url` becomes a single source named after the model id when no
/// `sources` are declared. Provenance fields are left empty; callers that
/// read from disk stamp them.
pub fn normalize_legacy_record(raw: LegacyDescriptor) -> ModelRecord {
    let sources = match (raw.sources, raw.source_url) {
        (Some(sources), _) if !sources.is_empty() => sources,
        (_, Some(url)) => vec![ModelSource::new(raw.id.clone(), url)],
        (sources, None) => sources.unwrap_or_default(),
    };

    let mut extra = raw.extra;
    // Provenance is never trusted from file contents
    extra.remove("file_path");
    extra.remove("file_name");

    ModelRecord {
        id: raw.id,
        name: raw.name,
        description: raw.description,
        engine: raw.engine.unwrap_or_default(),
        sources,
        settings: raw.settings,
        parameters: raw.parameters,
        metadata: raw.metadata,
        file_path: None,
        file_name: None,
        extra,
    }
}
