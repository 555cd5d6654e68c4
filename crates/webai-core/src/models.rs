//! Model name resolution: any client-supplied string maps to a supported model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Supported Gemini web models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ModelId {
    Pro,
    #[default]
    Flash,
    FlashThinking,
}

impl ModelId {
    /// Canonical wire name as the web client expects it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::Pro => "gemini-3.0-pro",
            ModelId::Flash => "gemini-3.0-flash",
            ModelId::FlashThinking => "gemini-3.0-flash-thinking",
        }
    }

    /// All supported models in listing order.
    #[must_use]
    pub fn all() -> [ModelId; 3] {
        [ModelId::Pro, ModelId::Flash, ModelId::FlashThinking]
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ModelId> for String {
    fn from(m: ModelId) -> Self {
        m.as_str().to_owned()
    }
}

impl TryFrom<String> for ModelId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Ok(resolve_model(Some(&s)))
    }
}

/// Static alias table from external model names to supported models.
/// Covers Home Assistant / OpenAI-style names and legacy Gemini versions.
static MODEL_ALIASES: LazyLock<HashMap<&'static str, ModelId>> = LazyLock::new(|| {
    HashMap::from([
        // Canonical names (pass-through)
        ("gemini-3.0-pro", ModelId::Pro),
        ("gemini-3.0-flash", ModelId::Flash),
        ("gemini-3.0-flash-thinking", ModelId::FlashThinking),
        // Home Assistant / common variants
        ("gemini-pro", ModelId::Pro),
        ("gemini-ultra", ModelId::Pro),
        ("gemini-flash", ModelId::Flash),
        ("gemini-1.0-pro", ModelId::Pro),
        ("gemini-1.5-pro", ModelId::Pro),
        ("gemini-1.5-pro-latest", ModelId::Pro),
        ("gemini-1.5-flash", ModelId::Flash),
        ("gemini-1.5-flash-latest", ModelId::Flash),
        ("gemini-2.0-flash", ModelId::Flash),
        ("gemini-2.0-flash-exp", ModelId::Flash),
        ("gemini-2.0-pro", ModelId::Pro),
        ("gemini-2.5-pro", ModelId::Pro),
        ("gemini-2.5-flash", ModelId::Flash),
        ("gemini-3-pro", ModelId::Pro),
        ("gemini-3-flash", ModelId::Flash),
        ("gemini-3-flash-thinking", ModelId::FlashThinking),
    ])
});

/// Resolve any model string to a supported [`ModelId`].
///
/// Lookup priority:
/// 1. Exact match in the alias table (case-insensitive)
/// 2. Substring heuristics: "thinking" → FlashThinking, "pro" → Pro, "flash" → Flash
/// 3. Default: Flash
///
/// Resolution never fails. Heuristic fallthrough logs a warning so operators
/// can see what clients are sending and extend the alias table.
#[must_use]
pub fn resolve_model(raw: Option<&str>) -> ModelId {
    let Some(raw) = raw else {
        return ModelId::Flash;
    };
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return ModelId::Flash;
    }

    if let Some(model) = MODEL_ALIASES.get(lower.as_str()) {
        return *model;
    }

    // Substring heuristics (handles "gemini-3-pro-image-preview" etc.)
    let resolved = if lower.contains("thinking") {
        ModelId::FlashThinking
    } else if lower.contains("pro") {
        ModelId::Pro
    } else {
        ModelId::Flash
    };

    tracing::warn!(
        "Unknown model '{}' mapped to '{}'. Add an explicit alias in MODEL_ALIASES if needed.",
        raw,
        resolved
    );
    resolved
}

/// All model ids for `GET /v1/models`.
#[must_use]
pub fn list_model_ids() -> Vec<&'static str> {
    ModelId::all().iter().map(|m| m.as_str()).collect()
}
