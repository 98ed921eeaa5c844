//! Slide manifest model.
//!
//! A manifest is either a bare JSON array of slides or an object envelope
//! carrying the slides plus slideshow defaults. Both shapes normalize into a
//! [`SlideDeck`].

use std::time::Duration;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::util::clamp;

pub const DEFAULT_SLIDE_INTERVAL: Duration = Duration::from_millis(6000);
pub const DEFAULT_TRANSITION_DURATION: Duration = Duration::ZERO;

/// One entry of the slide list.
///
/// Decoding never fails: a non-object entry, or a `src`/`style` that is not a
/// string, leaves the field empty and the slide takes the skip path at load
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Slide {
    /// Image path relative to the master path.
    pub src: Option<String>,
    /// Literal style applied to the slide's layer before the mandatory
    /// background styling.
    pub style: Option<String>,
}

impl Slide {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            style: None,
        }
    }

    /// `master_path + src`, or `None` when the slide has no usable source.
    pub fn image_url(&self, master_path: &str) -> Option<String> {
        self.src
            .as_deref()
            .filter(|src| !src.trim().is_empty())
            .map(|src| format!("{master_path}{src}"))
    }

    fn from_value(value: Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_owned);
        Self {
            src: field("src"),
            style: field("style"),
        }
    }
}

impl<'de> Deserialize<'de> for Slide {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManifestEnvelope {
    #[serde(deserialize_with = "lenient_slides")]
    pub slides: Vec<Slide>,
    #[serde(deserialize_with = "lenient_string")]
    pub master_path: Option<String>,
    #[serde(alias = "slideInterval", deserialize_with = "lenient_millis")]
    pub slide_interval_ms: Option<f64>,
    #[serde(alias = "transitionDuration", deserialize_with = "lenient_millis")]
    pub transition_duration_ms: Option<f64>,
    #[serde(deserialize_with = "truthy")]
    pub shuffle_slides: bool,
}

fn lenient_slides<'de, D>(deserializer: D) -> Result<Vec<Slide>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items.into_iter().map(Slide::from_value).collect(),
        _ => Vec::new(),
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

// Numeric strings count; anything else is treated as unset.
fn lenient_millis<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0 && !v.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

/// A fetched manifest document: a bare slide array or an object envelope.
#[derive(Debug, Clone)]
pub enum Manifest {
    Slides(Vec<Slide>),
    Envelope(ManifestEnvelope),
}

impl<'de> Deserialize<'de> for Manifest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Array(items) => {
                Ok(Self::Slides(items.into_iter().map(Slide::from_value).collect()))
            }
            envelope @ Value::Object(_) => ManifestEnvelope::deserialize(envelope)
                .map(Self::Envelope)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!(
                "manifest must be a slide array or an object, found {other}"
            ))),
        }
    }
}

impl Manifest {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A manifest with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideDeck {
    pub slides: Vec<Slide>,
    pub master_path: String,
    pub slide_interval: Duration,
    pub transition_duration: Duration,
    pub shuffle: bool,
}

impl Default for SlideDeck {
    fn default() -> Self {
        Self {
            slides: Vec::new(),
            master_path: String::new(),
            slide_interval: DEFAULT_SLIDE_INTERVAL,
            transition_duration: DEFAULT_TRANSITION_DURATION,
            shuffle: false,
        }
    }
}

impl From<Manifest> for SlideDeck {
    fn from(manifest: Manifest) -> Self {
        match manifest {
            Manifest::Slides(slides) => Self {
                slides,
                ..Self::default()
            },
            Manifest::Envelope(env) => Self {
                slides: env.slides,
                master_path: env.master_path.unwrap_or_default(),
                slide_interval: millis_or(env.slide_interval_ms, DEFAULT_SLIDE_INTERVAL),
                transition_duration: millis_or(
                    env.transition_duration_ms,
                    DEFAULT_TRANSITION_DURATION,
                ),
                shuffle: env.shuffle_slides,
            },
        }
    }
}

// Zero, negative and non-finite values fall back to the default.
fn millis_or(raw: Option<f64>, fallback: Duration) -> Duration {
    match raw.map(|ms| clamp(ms, Some(0.0), None)) {
        Some(ms) if ms.is_finite() && ms > 0.0 => {
            Duration::from_micros((ms * 1000.0).round() as u64)
        }
        _ => fallback,
    }
}
