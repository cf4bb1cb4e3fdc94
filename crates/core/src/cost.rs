//! Reference-workload cost estimation for workflows and templates.
//!
//! Costs are priced against a fixed reference workload per modality so that
//! models can be compared in the catalog. They are not a measurement of what
//! a run will actually consume.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{flex_bool, DefinitionKind, IoDefinition, IoDirection, NodeDefinition};
use crate::error::CoreError;
use crate::graph::WorkflowNode;
use crate::pricing::{
    infer_output_modalities, Modality, ModalityPricing, OutputSource, PricingConfig, Rate,
};
use crate::store::NodeRegistry;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Reference workloads
// ---------------------------------------------------------------------------

/// Text workload in millions of tokens (1,000 tokens).
pub const REFERENCE_TEXT_MTOKENS: f64 = 0.001;
/// Image workload in megapixels.
pub const REFERENCE_IMAGE_MEGAPIXELS: f64 = 1.0;
/// Video and audio workload in seconds.
pub const REFERENCE_MEDIA_SECONDS: f64 = 5.0;

// ---------------------------------------------------------------------------
// Fallback output rates
// ---------------------------------------------------------------------------

pub const DEFAULT_IMAGE_OUTPUT: Rate = Rate::new(0.0, 0.04);
pub const DEFAULT_VIDEO_WITH_AUDIO_OUTPUT: Rate = Rate::new(0.0, 0.15);
pub const DEFAULT_VIDEO_WITHOUT_AUDIO_OUTPUT: Rate = Rate::new(0.0, 0.10);
pub const DEFAULT_TEXT_OUTPUT: Rate = Rate::new(0.0, 10.0);
pub const DEFAULT_AUDIO_OUTPUT: Rate = Rate::new(0.0, 0.02);

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum number of steps across all clips in one template estimate.
pub const MAX_TEMPLATE_STEPS: usize = 500;

/// Config key selecting the with-audio video schedule.
pub const GENERATE_AUDIO_KEY: &str = "generate_audio";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What the cost engine needs to know about one model.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub definition_id: DbId,
    pub kind: DefinitionKind,
    pub inputs: BTreeSet<Modality>,
    pub outputs: BTreeSet<Modality>,
    pub pricing: Option<PricingConfig>,
}

impl ModelProfile {
    pub fn new(definition: &NodeDefinition, io: &[IoDefinition]) -> Self {
        let modalities = |direction: IoDirection| -> BTreeSet<Modality> {
            io.iter()
                .filter(|row| row.definition_id == definition.id && row.direction == direction)
                .filter_map(|row| Modality::from_socket_type(&row.socket_type))
                .collect()
        };
        Self {
            definition_id: definition.id,
            kind: definition.kind,
            inputs: modalities(IoDirection::Input),
            outputs: modalities(IoDirection::Output),
            pricing: definition
                .pricing
                .as_ref()
                .filter(|p| !p.is_null())
                .map(PricingConfig::from_value),
        }
    }
}

/// Cost of one AI-model node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCost {
    pub node_id: String,
    pub definition_id: DbId,
    pub input_usd: f64,
    pub output_usd: f64,
    pub total_usd: f64,
    pub is_estimate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCost {
    pub total_usd: f64,
    pub is_estimate: bool,
    pub nodes: Vec<NodeCost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateClip {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub steps: Vec<TemplateStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateStep {
    pub model_id: DbId,
    #[serde(default)]
    pub operation_code: Option<String>,
    #[serde(default)]
    pub config: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateCost {
    /// Rounded to 4 decimal places.
    pub total_usd: f64,
    pub is_estimate: bool,
    pub clip_count: usize,
    pub step_count: usize,
}

// ---------------------------------------------------------------------------
// Pure pricing
// ---------------------------------------------------------------------------

/// Round a USD amount to 4 decimal places.
pub fn round_usd(amount: f64) -> f64 {
    (amount * 10_000.0).round() / 10_000.0
}

/// Read the node's `generate_audio` setting. Absent or unreadable values
/// price with audio.
pub fn wants_audio(config: &serde_json::Map<String, Value>) -> bool {
    config
        .get(GENERATE_AUDIO_KEY)
        .and_then(flex_bool)
        .unwrap_or(true)
}

fn input_cost(pricing: &ModalityPricing, inputs: &BTreeSet<Modality>) -> f64 {
    inputs
        .iter()
        .filter_map(|modality| match modality {
            Modality::Text => pricing.input.text.map(|r| r.cost(REFERENCE_TEXT_MTOKENS)),
            Modality::Image => pricing.input.image.map(|r| r.cost(REFERENCE_IMAGE_MEGAPIXELS)),
            Modality::Video => pricing.input.video.map(|r| r.cost(REFERENCE_MEDIA_SECONDS)),
            Modality::Audio => None,
        })
        .sum()
}

fn output_cost(pricing: &ModalityPricing, outputs: &BTreeSet<Modality>, with_audio: bool) -> f64 {
    outputs
        .iter()
        .filter_map(|modality| match modality {
            Modality::Image => pricing.output.image.map(|r| r.cost(REFERENCE_IMAGE_MEGAPIXELS)),
            Modality::Video => pricing
                .output
                .video(with_audio)
                .map(|r| r.cost(REFERENCE_MEDIA_SECONDS)),
            Modality::Text => pricing.output.text.map(|r| r.cost(REFERENCE_TEXT_MTOKENS)),
            Modality::Audio => None,
        })
        .sum()
}

fn default_output_cost(outputs: &BTreeSet<Modality>, with_audio: bool) -> f64 {
    outputs
        .iter()
        .map(|modality| match modality {
            Modality::Image => DEFAULT_IMAGE_OUTPUT.cost(REFERENCE_IMAGE_MEGAPIXELS),
            Modality::Video if with_audio => {
                DEFAULT_VIDEO_WITH_AUDIO_OUTPUT.cost(REFERENCE_MEDIA_SECONDS)
            }
            Modality::Video => DEFAULT_VIDEO_WITHOUT_AUDIO_OUTPUT.cost(REFERENCE_MEDIA_SECONDS),
            Modality::Text => DEFAULT_TEXT_OUTPUT.cost(REFERENCE_TEXT_MTOKENS),
            Modality::Audio => DEFAULT_AUDIO_OUTPUT.cost(REFERENCE_MEDIA_SECONDS),
        })
        .sum()
}

/// Input and output cost plus the estimate flag for one priced model use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedUse {
    pub input_usd: f64,
    pub output_usd: f64,
    pub is_estimate: bool,
}

/// Price one use of a model against the reference workload.
///
/// Falls back to the default output rates when the model has no usable
/// structured pricing, or when its pricing yields nothing for the outputs
/// it produces.
pub fn price_model(
    profile: &ModelProfile,
    outputs: &BTreeSet<Modality>,
    config: &serde_json::Map<String, Value>,
) -> PricedUse {
    let with_audio = wants_audio(config);
    let structured = profile.pricing.as_ref().and_then(PricingConfig::structured);

    let input_usd = structured.map_or(0.0, |p| input_cost(p, &profile.inputs));
    let priced_output = structured.map_or(0.0, |p| output_cost(p, outputs, with_audio));

    if structured.is_none() || (priced_output == 0.0 && !outputs.is_empty()) {
        return PricedUse {
            input_usd,
            output_usd: default_output_cost(outputs, with_audio),
            is_estimate: true,
        };
    }
    PricedUse {
        input_usd,
        output_usd: priced_output,
        is_estimate: false,
    }
}

fn price_node(
    node: &WorkflowNode,
    definition_id: DbId,
    profile: Option<&ModelProfile>,
) -> NodeCost {
    let Some(profile) = profile else {
        tracing::warn!(
            node_id = %node.id,
            definition_id,
            "Pricing node with missing definition as zero"
        );
        return NodeCost {
            node_id: node.id.clone(),
            definition_id,
            input_usd: 0.0,
            output_usd: 0.0,
            total_usd: 0.0,
            is_estimate: true,
        };
    };
    let (outputs, _) =
        infer_output_modalities(&profile.outputs, profile.pricing.as_ref(), None);
    let priced = price_model(profile, &outputs, &node.config_values);
    NodeCost {
        node_id: node.id.clone(),
        definition_id,
        input_usd: priced.input_usd,
        output_usd: priced.output_usd,
        total_usd: priced.input_usd + priced.output_usd,
        is_estimate: priced.is_estimate,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CostEngine {
    registry: Arc<dyn NodeRegistry>,
}

impl CostEngine {
    pub fn new(registry: Arc<dyn NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Cost of one node. `None` for nodes that are not AI-model nodes.
    pub async fn compute_node_cost(
        &self,
        node: &WorkflowNode,
    ) -> Result<Option<NodeCost>, CoreError> {
        let mut costs = self.compute_workflow_cost(std::slice::from_ref(node)).await?;
        Ok(costs.nodes.pop())
    }

    /// Sum of all AI-model node costs, with definitions fetched in one batch.
    pub async fn compute_workflow_cost(
        &self,
        nodes: &[WorkflowNode],
    ) -> Result<WorkflowCost, CoreError> {
        let ids: Vec<DbId> = unique(
            nodes
                .iter()
                .filter(|n| n.binding.is_ai_model())
                .filter_map(|n| n.binding.definition_id()),
        );
        let profiles = self.load_profiles(&ids).await?;

        let mut costs = Vec::new();
        for node in nodes.iter().filter(|n| n.binding.is_ai_model()) {
            let Some(definition_id) = node.binding.definition_id() else {
                continue;
            };
            let profile = profiles.get(&definition_id);
            if profile.is_some_and(|p| p.kind != DefinitionKind::AiModel) {
                tracing::debug!(node_id = %node.id, definition_id, "Skipping non-model definition");
                continue;
            }
            costs.push(price_node(node, definition_id, profile));
        }

        Ok(WorkflowCost {
            total_usd: costs.iter().map(|c| c.total_usd).sum(),
            is_estimate: costs.iter().any(|c| c.is_estimate),
            nodes: costs,
        })
    }

    /// Price an ordered clip/step template.
    ///
    /// All referenced models are fetched in one batch. Steps on models whose
    /// output sockets are undeclared have their outputs inferred from the
    /// pricing keys, then from the step's operation code.
    pub async fn compute_template_cost_from_clips(
        &self,
        clips: &[TemplateClip],
    ) -> Result<TemplateCost, CoreError> {
        let step_count: usize = clips.iter().map(|c| c.steps.len()).sum();
        if step_count > MAX_TEMPLATE_STEPS {
            return Err(CoreError::Validation(format!(
                "Template has {step_count} steps; at most {MAX_TEMPLATE_STEPS} can be estimated"
            )));
        }

        let ids = unique(clips.iter().flat_map(|c| c.steps.iter().map(|s| s.model_id)));
        let profiles = self.load_profiles(&ids).await?;

        let mut total = 0.0;
        let mut is_estimate = false;
        for (clip_index, clip) in clips.iter().enumerate() {
            let clip_name = clip.name.as_deref().unwrap_or("");
            let mut clip_total = 0.0;
            for (step_index, step) in clip.steps.iter().enumerate() {
                let (usd, estimated, source) = match profiles.get(&step.model_id) {
                    None => (0.0, true, OutputSource::Unknown),
                    Some(profile) if profile.kind != DefinitionKind::AiModel => {
                        (0.0, false, OutputSource::Unknown)
                    }
                    Some(profile) => {
                        let (outputs, source) = infer_output_modalities(
                            &profile.outputs,
                            profile.pricing.as_ref(),
                            step.operation_code.as_deref(),
                        );
                        let priced = price_model(profile, &outputs, &step.config);
                        (priced.input_usd + priced.output_usd, priced.is_estimate, source)
                    }
                };
                tracing::debug!(
                    clip = clip_index,
                    clip_name,
                    step = step_index,
                    model_id = step.model_id,
                    operation_code = step.operation_code.as_deref().unwrap_or(""),
                    output_source = ?source,
                    usd,
                    estimate = estimated,
                    "Template step cost"
                );
                clip_total += usd;
                is_estimate |= estimated;
            }
            tracing::debug!(clip = clip_index, clip_name, usd = clip_total, "Template clip cost");
            total += clip_total;
        }

        let total_usd = round_usd(total);
        tracing::debug!(
            total_usd,
            is_estimate,
            clips = clips.len(),
            steps = step_count,
            "Template cost"
        );
        Ok(TemplateCost {
            total_usd,
            is_estimate,
            clip_count: clips.len(),
            step_count,
        })
    }

    async fn load_profiles(&self, ids: &[DbId]) -> Result<HashMap<DbId, ModelProfile>, CoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let definitions = self.registry.find_definitions(ids).await?;
        let io = self.registry.list_io_for(ids).await?;
        Ok(definitions
            .iter()
            .map(|d| (d.id, ModelProfile::new(d, &io)))
            .collect())
    }
}

fn unique(ids: impl Iterator<Item = DbId>) -> Vec<DbId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionStatus, NewIoDefinition};
    use crate::graph::{NodeBinding, Position};
    use crate::store::memory::InMemoryCatalog;
    use crate::store::{CatalogStore, DefinitionRecord};
    use serde_json::json;

    fn io(name: &str, direction: IoDirection, socket_type: &str) -> NewIoDefinition {
        NewIoDefinition {
            name: name.into(),
            label: None,
            direction,
            socket_type: socket_type.into(),
            required: false,
            is_list: false,
            constraints: json!({}),
            sort_order: 0,
        }
    }

    async fn model(
        catalog: &InMemoryCatalog,
        slug: &str,
        pricing: Option<Value>,
        sockets: &[NewIoDefinition],
    ) -> DbId {
        catalog
            .create_definition(
                &DefinitionRecord {
                    kind: DefinitionKind::AiModel,
                    slug: slug.into(),
                    name: slug.into(),
                    description: None,
                    icon: None,
                    color: None,
                    version: "1.0.0".into(),
                    status: DefinitionStatus::Active,
                    config_schema: json!({}),
                    pricing,
                },
                sockets,
            )
            .await
            .unwrap()
            .id
    }

    fn node(id: &str, definition_id: DbId, config: Value) -> WorkflowNode {
        WorkflowNode {
            id: id.into(),
            workflow_id: 0,
            binding: NodeBinding::AiModel { definition_id },
            position: Position::default(),
            size: None,
            config_values: config.as_object().cloned().unwrap_or_default(),
            ui: Value::Null,
        }
    }

    fn assert_usd(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    fn video_pricing() -> Value {
        json!({
            "input": {"text": {"fixed": 0.0, "per_unit": 2.0}},
            "output": {
                "video_with_audio": {"fixed": 0.0, "per_unit": 0.4},
                "video_without_audio": {"fixed": 0.0, "per_unit": 0.2}
            }
        })
    }

    async fn video_model(catalog: &InMemoryCatalog) -> DbId {
        model(
            catalog,
            "veo",
            Some(video_pricing()),
            &[io("prompt", IoDirection::Input, "text"), io("video", IoDirection::Output, "video")],
        )
        .await
    }

    #[tokio::test]
    async fn empty_workflow_costs_nothing() {
        let engine = CostEngine::new(Arc::new(InMemoryCatalog::new()));
        let cost = engine.compute_workflow_cost(&[]).await.unwrap();
        assert_eq!(cost.total_usd, 0.0);
        assert!(!cost.is_estimate);
        assert!(cost.nodes.is_empty());
    }

    #[tokio::test]
    async fn generate_audio_false_uses_silent_schedule_only() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let id = video_model(&catalog).await;
        let engine = CostEngine::new(catalog);

        let cost = engine
            .compute_node_cost(&node("n1", id, json!({"generate_audio": false})))
            .await
            .unwrap()
            .unwrap();
        // input: 2.0 * 0.001; output: 0.2 * 5
        assert_usd(cost.input_usd, 0.002);
        assert_usd(cost.output_usd, 1.0);
        assert!(!cost.is_estimate);

        let with_audio = engine
            .compute_node_cost(&node("n2", id, json!({"generate_audio": "true"})))
            .await
            .unwrap()
            .unwrap();
        assert_usd(with_audio.output_usd, 2.0);
    }

    #[tokio::test]
    async fn missing_pricing_falls_back_and_flags_estimate() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let id = model(&catalog, "sdxl", None, &[io("image", IoDirection::Output, "image")]).await;
        let engine = CostEngine::new(catalog);
        let cost = engine.compute_workflow_cost(&[node("n", id, json!({}))]).await.unwrap();
        assert!(cost.is_estimate);
        assert_usd(cost.total_usd, DEFAULT_IMAGE_OUTPUT.cost(REFERENCE_IMAGE_MEGAPIXELS));
    }

    #[tokio::test]
    async fn zero_output_despite_outputs_falls_back() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let id = model(
            &catalog,
            "img",
            Some(json!({"output": {"text": {"per_unit": 1.0}}})),
            &[io("image", IoDirection::Output, "image")],
        )
        .await;
        let engine = CostEngine::new(catalog);
        let cost = engine.compute_workflow_cost(&[node("n", id, json!({}))]).await.unwrap();
        assert!(cost.is_estimate);
        assert_usd(cost.nodes[0].output_usd, 0.04);
    }

    #[tokio::test]
    async fn workflow_cost_sums_ai_nodes_and_is_deterministic() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let id = video_model(&catalog).await;
        let engine = CostEngine::new(catalog);

        let mut note = node("note", 0, json!({}));
        note.binding = NodeBinding::Builtin { name: "note".into() };
        let nodes = vec![
            node("a", id, json!({"generate_audio": false})),
            node("b", id, json!({"generate_audio": true})),
            note,
        ];
        let first = engine.compute_workflow_cost(&nodes).await.unwrap();
        let second = engine.compute_workflow_cost(&nodes).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.nodes.len(), 2);
        assert_usd(first.total_usd, 0.002 + 1.0 + 0.002 + 2.0);
        assert!(!first.is_estimate);
    }

    #[tokio::test]
    async fn system_definitions_are_not_priced() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let model_id = video_model(&catalog).await;
        let system_id = catalog
            .create_definition(
                &DefinitionRecord {
                    kind: DefinitionKind::System,
                    slug: "resize".into(),
                    name: "Resize".into(),
                    description: None,
                    icon: None,
                    color: None,
                    version: "1.0.0".into(),
                    status: DefinitionStatus::Active,
                    config_schema: json!({}),
                    pricing: None,
                },
                &[io("image", IoDirection::Output, "image")],
            )
            .await
            .unwrap()
            .id;
        let engine = CostEngine::new(catalog);

        let nodes = [
            node("a", model_id, json!({"generate_audio": false})),
            node("sys", system_id, json!({})),
        ];
        let cost = engine.compute_workflow_cost(&nodes).await.unwrap();
        assert_eq!(cost.nodes.len(), 1);
        assert_eq!(cost.nodes[0].node_id, "a");
        assert_usd(cost.total_usd, 0.002 + 1.0);
        assert!(!cost.is_estimate);

        assert_eq!(engine.compute_node_cost(&nodes[1]).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleted_definition_is_an_estimate() {
        let engine = CostEngine::new(Arc::new(InMemoryCatalog::new()));
        let cost = engine.compute_workflow_cost(&[node("n", 77, json!({}))]).await.unwrap();
        assert!(cost.is_estimate);
        assert_eq!(cost.total_usd, 0.0);
    }

    #[tokio::test]
    async fn template_infers_outputs_and_rounds() {
        let catalog = Arc::new(InMemoryCatalog::new());
        // No declared outputs: pricing keys decide.
        let by_keys = model(
            &catalog,
            "kling",
            Some(json!({"output": {"video_without_audio": {"fixed": 0.012345, "per_unit": 0.1}}})),
            &[],
        )
        .await;
        // No declared outputs and no pricing: the operation code decides.
        let by_code = model(&catalog, "flux", None, &[]).await;
        let engine = CostEngine::new(catalog);

        let clips: Vec<TemplateClip> = serde_json::from_value(json!([
            {"name": "intro", "steps": [
                {
                    "model_id": by_keys,
                    "operation_code": "text_to_video",
                    "config": {"generate_audio": false}
                }
            ]},
            {"name": "cover", "steps": [
                {"model_id": by_code, "operation_code": "text_to_image"}
            ]}
        ]))
        .unwrap();
        let cost = engine.compute_template_cost_from_clips(&clips).await.unwrap();
        // 0.012345 + 0.5, then the image fallback 0.04
        assert_usd(cost.total_usd, 0.5523);
        assert!(cost.is_estimate);
        assert_eq!(cost.clip_count, 2);
        assert_eq!(cost.step_count, 2);
    }

    #[tokio::test]
    async fn template_step_limit() {
        let engine = CostEngine::new(Arc::new(InMemoryCatalog::new()));
        let clip = TemplateClip {
            name: None,
            steps: (0..=MAX_TEMPLATE_STEPS as i64)
                .map(|i| TemplateStep {
                    model_id: i,
                    operation_code: None,
                    config: Default::default(),
                })
                .collect(),
        };
        assert!(matches!(
            engine.compute_template_cost_from_clips(&[clip]).await,
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn rounding_and_audio_flag() {
        assert_eq!(round_usd(0.123456), 0.1235);
        let mut config = serde_json::Map::new();
        assert!(wants_audio(&config));
        config.insert(GENERATE_AUDIO_KEY.into(), json!(0));
        assert!(!wants_audio(&config));
    }
}
