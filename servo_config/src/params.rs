//! JSON servo parameter file.
//!
//! Layout: `servo-name → { max_angle, min_duty, max_duty, min_speed_d_s,
//! max_speed_d_s, speed_config: { "<step>" → { min_speed, max_speed,
//! params: [a, b], mae } } }`. Keys this crate does not know about are kept
//! verbatim so a calibration run never drops hand-written settings.
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One calibrated step: `speed = a / wait_ms + b` holds for `min_speed..=max_speed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEntry {
    pub min_speed: f64,
    pub max_speed: f64,
    pub params: [f64; 2],
    /// Mean absolute error in deg/s. Also accepts the text form "0.1234 degree/s".
    #[serde(deserialize_with = "de_mae")]
    pub mae: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServoEntry {
    #[serde(default = "default_max_angle")]
    pub max_angle: u32,
    #[serde(default = "default_min_duty")]
    pub min_duty: u16,
    #[serde(default = "default_max_duty")]
    pub max_duty: u16,
    #[serde(default)]
    pub min_speed_d_s: f64,
    #[serde(default = "default_max_speed")]
    pub max_speed_d_s: f64,
    #[serde(default, deserialize_with = "de_speed_config")]
    pub speed_config: BTreeMap<u32, StepEntry>,
    /// Unrecognised keys (e.g. acquisition sleep bounds), preserved on save.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_max_angle() -> u32 {
    180
}
fn default_min_duty() -> u16 {
    1500
}
fn default_max_duty() -> u16 {
    7500
}
fn default_max_speed() -> f64 {
    600.0
}

impl Default for ServoEntry {
    fn default() -> Self {
        Self {
            max_angle: default_max_angle(),
            min_duty: default_min_duty(),
            max_duty: default_max_duty(),
            min_speed_d_s: 0.0,
            max_speed_d_s: default_max_speed(),
            speed_config: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MaeJson {
    Number(f64),
    Text(String),
}

fn de_mae<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match MaeJson::deserialize(deserializer)? {
        MaeJson::Number(v) => Ok(v),
        MaeJson::Text(s) => s
            .split_whitespace()
            .next()
            .and_then(|tok| tok.parse::<f64>().ok())
            .ok_or_else(|| serde::de::Error::custom(format!("invalid mae value {s:?}"))),
    }
}

// Step keys are JSON object keys (strings); parse them here because the
// flattened `extra` map routes this field through serde's buffered content,
// which does not coerce string keys into integers.
fn de_speed_config<'de, D>(deserializer: D) -> Result<BTreeMap<u32, StepEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, StepEntry> = BTreeMap::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (key, entry) in raw {
        let step = key
            .trim()
            .parse::<u32>()
            .map_err(|_| serde::de::Error::custom(format!("invalid step key {key:?}")))?;
        out.insert(step, entry);
    }
    Ok(out)
}

impl ServoEntry {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.max_angle == 0 {
            eyre::bail!("max_angle must be > 0");
        }
        if self.min_duty == self.max_duty {
            eyre::bail!("min_duty and max_duty must differ");
        }
        if !(self.min_speed_d_s.is_finite() && self.max_speed_d_s.is_finite()) {
            eyre::bail!("min_speed_d_s and max_speed_d_s must be finite");
        }
        if self.min_speed_d_s > self.max_speed_d_s {
            eyre::bail!("min_speed_d_s must be <= max_speed_d_s");
        }
        for (step, entry) in &self.speed_config {
            if *step == 0 {
                eyre::bail!("speed_config step keys must be >= 1");
            }
            if !(entry.min_speed.is_finite() && entry.max_speed.is_finite()) {
                eyre::bail!("speed_config.{step} speeds must be finite");
            }
            if entry.min_speed > entry.max_speed {
                eyre::bail!("speed_config.{step}.min_speed must be <= max_speed");
            }
            if entry.params.iter().any(|p| !p.is_finite()) {
                eyre::bail!("speed_config.{step}.params must be finite");
            }
        }
        Ok(())
    }
}

/// Whole params file: servo name → entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServoParams {
    pub servos: BTreeMap<String, ServoEntry>,
}

impl ServoParams {
    pub fn entry(&self, name: &str) -> eyre::Result<&ServoEntry> {
        self.servos.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.servos.keys().map(String::as_str).collect();
            eyre::eyre!(
                "servo {name:?} not found in params (known: {})",
                known.join(", ")
            )
        })
    }

    /// Entry for `name`, created with defaults when absent.
    pub fn entry_mut_or_default(&mut self, name: &str) -> &mut ServoEntry {
        self.servos.entry(name.to_string()).or_default()
    }
}

pub fn parse_params_json(s: &str) -> eyre::Result<ServoParams> {
    let params: ServoParams =
        serde_json::from_str(s).map_err(|e| eyre::eyre!("invalid servo params JSON: {e}"))?;
    for (name, entry) in &params.servos {
        entry
            .validate()
            .map_err(|e| eyre::eyre!("servo {name:?}: {e}"))?;
    }
    Ok(params)
}

pub fn load_params_json(path: &Path) -> eyre::Result<ServoParams> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read servo params {:?}: {}", path, e))?;
    parse_params_json(&text)
}

pub fn save_params_json(path: &Path, params: &ServoParams) -> eyre::Result<()> {
    let mut text = serde_json::to_string_pretty(params)
        .map_err(|e| eyre::eyre!("encode servo params: {e}"))?;
    text.push('\n');
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .map_err(|e| eyre::eyre!("create directory {:?}: {}", dir, e))?;
    }
    std::fs::write(path, text).map_err(|e| eyre::eyre!("write servo params {:?}: {}", path, e))
}
