use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

use crate::events::OBSERVED_ATTRIBUTES;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Manifest URL or path; mirrored into the `data` attribute.
    pub data: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    /// Overrides the manifest's slide interval, in ms.
    pub interval_ms: Option<u64>,
    /// Overrides the manifest's transition duration, in ms.
    pub fade_duration_ms: Option<u64>,
    /// Per-request timeout for manifest and image fetches.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Deterministic seed for manifest `shuffleSlides`.
    pub shuffle_seed: Option<u64>,
    /// Capacity of the panel's command channel.
    pub command_buffer: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            data: None,
            width: None,
            height: None,
            interval_ms: None,
            fade_duration_ms: None,
            request_timeout: Duration::from_secs(30),
            shuffle_seed: None,
            command_buffer: 16,
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn validated(self) -> Result<Self> {
        ensure!(
            !self.request_timeout.is_zero(),
            "request-timeout must be greater than zero"
        );
        ensure!(self.command_buffer > 0, "command-buffer must be at least 1");
        if let Some(data) = &self.data {
            ensure!(!data.trim().is_empty(), "data must not be empty");
        }
        Ok(self)
    }

    /// Initial attribute values, in the order a host would apply them.
    ///
    /// `data` comes last so the timing overrides are in place before the
    /// first slide loads.
    pub fn attributes(&self) -> Vec<(&'static str, String)> {
        let mut attrs = Vec::with_capacity(OBSERVED_ATTRIBUTES.len());
        if let Some(width) = &self.width {
            attrs.push(("width", width.clone()));
        }
        if let Some(height) = &self.height {
            attrs.push(("height", height.clone()));
        }
        if let Some(ms) = self.interval_ms {
            attrs.push(("interval", ms.to_string()));
        }
        if let Some(ms) = self.fade_duration_ms {
            attrs.push(("fade-duration", ms.to_string()));
        }
        if let Some(data) = &self.data {
            attrs.push(("data", data.clone()));
        }
        attrs
    }
}
