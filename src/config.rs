use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{ReconstructionError, Result};

pub const DEFAULT_AORTA_LABEL: u16 = 1;
pub const DEFAULT_ILIAC_LEFT_LABEL: u16 = 2;
pub const DEFAULT_ILIAC_RIGHT_LABEL: u16 = 3;

/// Configuration bundle for a reconstruction run.
///
/// Every field has a default so a TOML file only needs the values it changes:
///
/// ```toml
/// smoothing_strength = 0.4
/// deadline_secs = 30.0
///
/// [label_id_map]
/// aorta = 1
/// iliac_left = 2
/// iliac_right = 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    /// structure name -> label id in the masks
    pub label_id_map: BTreeMap<String, u16>,
    /// Taubin lambda, in (0, 1]
    pub smoothing_strength: f64,
    pub smoothing_iterations: usize,
    /// discarded fragment area / kept area above which a warning is recorded
    pub discard_fragment_area_ratio: f64,
    /// minimum endpoint distance (mm) for a defined tortuosity
    pub min_tortuosity_denominator: f64,
    #[serde(rename = "deadline_secs", with = "optional_secs")]
    pub deadline: Option<Duration>,
    pub fill_holes: bool,
    /// moving-average window over centerline points, 0 or 1 disables it
    pub centerline_smoothing_window: usize,
    /// share of the solid the inscribed balls along the path must cover
    pub min_path_coverage: f64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        let mut label_id_map = BTreeMap::new();
        label_id_map.insert("aorta".to_string(), DEFAULT_AORTA_LABEL);
        label_id_map.insert("iliac_left".to_string(), DEFAULT_ILIAC_LEFT_LABEL);
        label_id_map.insert("iliac_right".to_string(), DEFAULT_ILIAC_RIGHT_LABEL);
        Self {
            label_id_map,
            smoothing_strength: 0.5,
            smoothing_iterations: 10,
            discard_fragment_area_ratio: 0.05,
            min_tortuosity_denominator: 1.0,
            deadline: None,
            fill_holes: true,
            centerline_smoothing_window: 5,
            min_path_coverage: 0.8,
        }
    }
}

impl ReconstructionConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: ReconstructionConfig =
            toml::from_str(text).context("parsing reconstruction config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("loading config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.label_id_map.is_empty() {
            return Err(ReconstructionError::InvalidConfig(
                "label_id_map must name at least one structure".into(),
            ));
        }
        if let Some((name, _)) = self.label_id_map.iter().find(|(_, &id)| id == 0) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "structure '{}' mapped to background label 0",
                name
            )));
        }
        // names become output file stems
        if let Some(name) = self.label_id_map.keys().find(|name| !is_plain_name(name)) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "structure name {:?} may only use letters, digits, '_' and '-'",
                name
            )));
        }
        let mut ids: Vec<u16> = self.label_id_map.values().copied().collect();
        ids.sort_unstable();
        if ids.windows(2).any(|w| w[0] == w[1]) {
            return Err(ReconstructionError::InvalidConfig(
                "two structures share a label id".into(),
            ));
        }
        if !(self.smoothing_strength > 0.0 && self.smoothing_strength <= 1.0) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "smoothing_strength must be in (0, 1], got {}",
                self.smoothing_strength
            )));
        }
        if !(self.discard_fragment_area_ratio >= 0.0 && self.discard_fragment_area_ratio.is_finite()) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "discard_fragment_area_ratio must be >= 0, got {}",
                self.discard_fragment_area_ratio
            )));
        }
        if !(self.min_tortuosity_denominator > 0.0 && self.min_tortuosity_denominator.is_finite()) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "min_tortuosity_denominator must be > 0, got {}",
                self.min_tortuosity_denominator
            )));
        }
        if !(0.0..=1.0).contains(&self.min_path_coverage) {
            return Err(ReconstructionError::InvalidConfig(format!(
                "min_path_coverage must be in [0, 1], got {}",
                self.min_path_coverage
            )));
        }
        Ok(())
    }

    /// Reverse lookup of the structure name for a label id.
    pub fn structure_name(&self, label: u16) -> Option<&str> {
        self.label_id_map
            .iter()
            .find(|(_, &id)| id == label)
            .map(|(name, _)| name.as_str())
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(d)?;
        match secs {
            Some(s) if s.is_finite() && s >= 0.0 => Ok(Some(Duration::from_secs_f64(s))),
            Some(s) => Err(serde::de::Error::custom(format!(
                "deadline_secs must be a non-negative number, got {}",
                s
            ))),
            None => Ok(None),
        }
    }
}
