//! Pricing metadata attached to AI-model definitions.
//!
//! Stored pricing is free JSON. [`PricingConfig::from_value`] parses it into
//! per-modality rate tables when it has the expected shape and keeps the raw
//! payload otherwise, so the cost engine always knows which case it is in.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::normalize_json_document;

// ---------------------------------------------------------------------------
// Modalities
// ---------------------------------------------------------------------------

/// Media kind carried by a socket or produced by a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    Text,
    Image,
    Video,
    Audio,
}

impl Modality {
    /// Map a socket type name to the modality it carries. Non-media
    /// sockets (numbers, flags, JSON) have none.
    pub fn from_socket_type(socket_type: &str) -> Option<Self> {
        match socket_type.trim().to_ascii_lowercase().as_str() {
            "text" | "string" | "prompt" => Some(Self::Text),
            "image" | "mask" => Some(Self::Image),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// A rate schedule: a fixed charge plus a per-unit charge.
///
/// Units are millions of tokens for text, megapixels for images and seconds
/// for video and audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    #[serde(default, alias = "fixed_usd")]
    pub fixed: f64,
    #[serde(default, alias = "perUnit", alias = "per_unit_usd")]
    pub per_unit: f64,
}

impl Rate {
    pub const fn new(fixed: f64, per_unit: f64) -> Self {
        Self { fixed, per_unit }
    }

    /// Cost of `workload` units.
    pub fn cost(&self, workload: f64) -> f64 {
        self.fixed + self.per_unit * workload
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputRates {
    pub text: Option<Rate>,
    pub image: Option<Rate>,
    pub video: Option<Rate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputRates {
    pub image: Option<Rate>,
    pub video_with_audio: Option<Rate>,
    pub video_without_audio: Option<Rate>,
    pub text: Option<Rate>,
}

impl OutputRates {
    /// The video schedule to charge. Uses the one matching `with_audio`, or
    /// the only one present.
    pub fn video(&self, with_audio: bool) -> Option<Rate> {
        if with_audio {
            self.video_with_audio.or(self.video_without_audio)
        } else {
            self.video_without_audio.or(self.video_with_audio)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityPricing {
    #[serde(default)]
    pub input: InputRates,
    #[serde(default)]
    pub output: OutputRates,
}

/// Parsed pricing metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum PricingConfig {
    Structured(ModalityPricing),
    /// A payload without the `input` / `output` rate tables.
    Legacy(Value),
}

impl PricingConfig {
    /// Parse stored pricing. JSON text is unwrapped first.
    pub fn from_value(raw: &Value) -> Self {
        let value = normalize_json_document(raw);
        let has_tables = value
            .as_object()
            .is_some_and(|map| map.contains_key("input") || map.contains_key("output"));
        if has_tables {
            if let Ok(pricing) = serde_json::from_value::<ModalityPricing>(value.clone()) {
                return Self::Structured(pricing);
            }
        }
        Self::Legacy(value)
    }

    pub fn structured(&self) -> Option<&ModalityPricing> {
        match self {
            Self::Structured(pricing) => Some(pricing),
            Self::Legacy(_) => None,
        }
    }

    /// Output modalities implied by which keys the pricing carries.
    pub fn output_modalities(&self) -> BTreeSet<Modality> {
        let mut found = BTreeSet::new();
        match self {
            Self::Structured(pricing) => {
                let out = &pricing.output;
                if out.image.is_some() {
                    found.insert(Modality::Image);
                }
                if out.video_with_audio.is_some() || out.video_without_audio.is_some() {
                    found.insert(Modality::Video);
                }
                if out.text.is_some() {
                    found.insert(Modality::Text);
                }
            }
            Self::Legacy(value) => {
                let scope = value.get("output").unwrap_or(value);
                if let Some(map) = scope.as_object() {
                    for key in map.keys() {
                        found.extend(modalities_from_keyword(key));
                    }
                }
            }
        }
        found
    }
}

// ---------------------------------------------------------------------------
// Output inference
// ---------------------------------------------------------------------------

const VIDEO_KEYWORDS: &[&str] = &["video", "t2v", "i2v", "v2v", "animate", "motion", "lipsync"];
const IMAGE_KEYWORDS: &[&str] = &["image", "t2i", "i2i", "upscale", "inpaint", "photo"];
const AUDIO_KEYWORDS: &[&str] = &["audio", "tts", "speech", "voice", "music", "sound"];
const TEXT_KEYWORDS: &[&str] = &["text", "llm", "chat", "caption", "script", "token"];

fn modalities_from_keyword(word: &str) -> BTreeSet<Modality> {
    let word = word.to_ascii_lowercase();
    let tables = [
        (Modality::Video, VIDEO_KEYWORDS),
        (Modality::Image, IMAGE_KEYWORDS),
        (Modality::Audio, AUDIO_KEYWORDS),
        (Modality::Text, TEXT_KEYWORDS),
    ];
    tables
        .into_iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| word.contains(k)))
        .map(|(modality, _)| modality)
        .collect()
}

/// Guess output modalities from an operation code such as
/// `"image_to_video"` or `"tts"`.
///
/// For `x_to_y` codes only the part after the last `_to_` is considered.
pub fn modalities_from_operation(operation_code: &str) -> BTreeSet<Modality> {
    let code = operation_code.to_ascii_lowercase();
    let target = code.rsplit("_to_").next().unwrap_or(&code);
    modalities_from_keyword(target)
}

/// Where an inferred output modality set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Declared,
    PricingKeys,
    OperationCode,
    Unknown,
}

/// Output modalities of a model, taken from the first source that yields
/// any: declared output sockets, pricing keys, then the operation code.
pub fn infer_output_modalities(
    declared: &BTreeSet<Modality>,
    pricing: Option<&PricingConfig>,
    operation_code: Option<&str>,
) -> (BTreeSet<Modality>, OutputSource) {
    if !declared.is_empty() {
        return (declared.clone(), OutputSource::Declared);
    }
    if let Some(found) = pricing.map(PricingConfig::output_modalities) {
        if !found.is_empty() {
            return (found, OutputSource::PricingKeys);
        }
    }
    if let Some(found) = operation_code.map(modalities_from_operation) {
        if !found.is_empty() {
            return (found, OutputSource::OperationCode);
        }
    }
    (BTreeSet::new(), OutputSource::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn structured_pricing_parses_with_aliases() {
        let pricing = PricingConfig::from_value(&json!({
            "input": {"text": {"fixed": 0.0, "perUnit": 2.5}},
            "output": {"image": {"fixed_usd": 0.01, "per_unit_usd": 0.03}}
        }));
        let structured = pricing.structured().unwrap();
        assert_eq!(structured.input.text, Some(Rate::new(0.0, 2.5)));
        assert_eq!(structured.output.image, Some(Rate::new(0.01, 0.03)));
    }

    #[test]
    fn pricing_as_json_text_is_unwrapped() {
        let pricing = PricingConfig::from_value(&json!(
            r#"{"output": {"video_without_audio": {"per_unit": 0.1}}}"#
        ));
        assert!(pricing.structured().is_some());
        assert_eq!(
            pricing.output_modalities().into_iter().collect::<Vec<_>>(),
            vec![Modality::Video]
        );
    }

    #[test]
    fn unknown_shape_is_legacy() {
        let raw = json!({"price_per_image": 0.04});
        let pricing = PricingConfig::from_value(&raw);
        assert_eq!(pricing, PricingConfig::Legacy(raw));
        assert!(pricing.output_modalities().contains(&Modality::Image));
    }

    #[test]
    fn malformed_tables_are_legacy() {
        let pricing = PricingConfig::from_value(&json!({"output": {"image": "cheap"}}));
        assert!(pricing.structured().is_none());
    }

    #[test]
    fn video_schedule_selection() {
        let both = OutputRates {
            video_with_audio: Some(Rate::new(0.0, 0.2)),
            video_without_audio: Some(Rate::new(0.0, 0.1)),
            ..Default::default()
        };
        assert_eq!(both.video(false), Some(Rate::new(0.0, 0.1)));
        assert_eq!(both.video(true), Some(Rate::new(0.0, 0.2)));

        let only_silent = OutputRates {
            video_without_audio: Some(Rate::new(0.0, 0.1)),
            ..Default::default()
        };
        assert_eq!(only_silent.video(true), Some(Rate::new(0.0, 0.1)));
    }

    #[test]
    fn operation_code_keywords() {
        assert_eq!(
            modalities_from_operation("image_to_video").into_iter().collect::<Vec<_>>(),
            vec![Modality::Video]
        );
        assert!(modalities_from_operation("tts").contains(&Modality::Audio));
        assert!(modalities_from_operation("noop").is_empty());
    }

    #[test]
    fn inference_priority() {
        let declared: BTreeSet<Modality> = [Modality::Image].into();
        let pricing = PricingConfig::from_value(&json!({"output": {"text": {"per_unit": 1.0}}}));

        let (found, source) = infer_output_modalities(&declared, Some(&pricing), Some("t2v"));
        assert_eq!(source, OutputSource::Declared);
        assert!(found.contains(&Modality::Image));

        let (found, source) =
            infer_output_modalities(&BTreeSet::new(), Some(&pricing), Some("t2v"));
        assert_eq!(source, OutputSource::PricingKeys);
        assert!(found.contains(&Modality::Text));

        let (found, source) = infer_output_modalities(&BTreeSet::new(), None, Some("t2v"));
        assert_eq!(source, OutputSource::OperationCode);
        assert!(found.contains(&Modality::Video));

        let (_, source) = infer_output_modalities(&BTreeSet::new(), None, None);
        assert_eq!(source, OutputSource::Unknown);
    }

    #[test]
    fn socket_types_map_to_modalities() {
        assert_eq!(Modality::from_socket_type("Image"), Some(Modality::Image));
        assert_eq!(Modality::from_socket_type("number"), None);
    }
}
