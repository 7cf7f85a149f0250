//! Generation collaborator
//!
//! The text-generation backend is external; the pipeline only sees this
//! contract.

use crate::config::StageKind;
use crate::error::GenerationError;
use crate::project::PlannedUnit;
use async_trait::async_trait;
use novella_bible::{EntityKind, EntityRegistry};
use novella_kernel::budget::ModelTier;
use novella_scene::PointOfView;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything a generation call may read
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub project_id: String,
    pub stage: String,
    pub stage_kind: StageKind,
    pub unit: PlannedUnit,
    /// Stage attempt this call belongs to (1-based)
    pub attempt: u32,
    pub tier: ModelTier,
    /// Current text of the scene, when revising
    pub current_text: Option<String>,
    /// Why the unit is being regenerated
    pub repair_reasons: Vec<String>,
    /// Story bible as of the start of the stage
    pub registry: Arc<EntityRegistry>,
}

/// Entity named in generated output, still unchecked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub kind: EntityKind,
    pub payload: serde_json::Value,
}

impl EntityMention {
    /// Create mention
    #[must_use]
    pub fn new(kind: EntityKind, payload: serde_json::Value) -> Self {
        Self { kind, payload }
    }
}

/// Result of one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub model_tier: ModelTier,
    #[serde(default)]
    pub mentions: Vec<EntityMention>,
    /// Point of view the text was written in, when the generator says so
    #[serde(default)]
    pub pov: Option<PointOfView>,
    #[serde(default)]
    pub beats: Vec<String>,
    /// Paragraphs that break point of view on purpose
    #[serde(default)]
    pub frame_breaks: Vec<usize>,
}

impl GenerationOutput {
    /// Output with text only
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_in: 0,
            tokens_out: 0,
            model_tier: ModelTier::default(),
            mentions: Vec::new(),
            pov: None,
            beats: Vec::new(),
            frame_breaks: Vec::new(),
        }
    }

    /// With token usage
    #[inline]
    #[must_use]
    pub fn with_tokens(mut self, tokens_in: u64, tokens_out: u64) -> Self {
        self.tokens_in = tokens_in;
        self.tokens_out = tokens_out;
        self
    }

    /// With the tier that served the call
    #[inline]
    #[must_use]
    pub fn with_tier(mut self, tier: ModelTier) -> Self {
        self.model_tier = tier;
        self
    }

    /// With an entity mention
    #[must_use]
    pub fn with_mention(mut self, kind: EntityKind, payload: serde_json::Value) -> Self {
        self.mentions.push(EntityMention::new(kind, payload));
        self
    }

    /// With declared point of view
    #[inline]
    #[must_use]
    pub fn with_pov(mut self, pov: PointOfView) -> Self {
        self.pov = Some(pov);
        self
    }

    /// With declared beats
    #[must_use]
    pub fn with_beats<I, S>(mut self, beats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.beats = beats.into_iter().map(Into::into).collect();
        self
    }

    /// With frame-break paragraphs
    #[must_use]
    pub fn with_frame_breaks(mut self, paragraphs: impl IntoIterator<Item = usize>) -> Self {
        self.frame_breaks = paragraphs.into_iter().collect();
        self
    }
}

/// Text-generation backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the text of one unit
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError>;
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for Arc<G> {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, GenerationError> {
        (**self).generate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_decodes_with_missing_fields() {
        let out: GenerationOutput = serde_json::from_value(json!({
            "text": "She waited.",
            "mentions": [{"kind": "thread", "payload": {"label": "the ledger"}}],
            "future_field": 1
        }))
        .unwrap();
        assert_eq!(out.model_tier, ModelTier::Premium);
        assert_eq!(out.mentions[0].kind, EntityKind::Thread);
        assert!(out.pov.is_none());
    }
}
