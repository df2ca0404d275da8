//! Declarative network description, deserialized from JSON.
//!
//! Elements reference buses and standard types by name; the builder in
//! [`crate::builder`] resolves those names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::GridResult;
use crate::std_types::{LineType, TrafoType};

fn default_name() -> String {
    "Default Network".to_string()
}

fn one() -> f64 {
    1.0
}

fn one_u32() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "one")]
    pub sn_mva: f64,
    #[serde(default)]
    pub f_hz: Option<f64>,
    #[serde(default)]
    pub buses: Vec<BusDef>,
    #[serde(default)]
    pub std_lines: Vec<StdLineDef>,
    #[serde(default)]
    pub std_trafos: Vec<StdTrafoDef>,
    #[serde(default)]
    pub ext_grids: Vec<ExtGridDef>,
    #[serde(default)]
    pub lines: Vec<LineDef>,
    #[serde(default)]
    pub transformers: Vec<TrafoDef>,
    #[serde(default)]
    pub loads: Vec<LoadDef>,
    #[serde(default)]
    pub sgens: Vec<SgenDef>,
    #[serde(default)]
    pub gens: Vec<GenDef>,
    #[serde(default)]
    pub shunts: Vec<ShuntDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusDef {
    pub name: String,
    pub vn_kv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdLineDef {
    pub name: String,
    pub data: LineType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdTrafoDef {
    pub name: String,
    pub data: TrafoType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtGridDef {
    #[serde(default)]
    pub name: Option<String>,
    pub bus: String,
    #[serde(default = "one")]
    pub vm_pu: f64,
    #[serde(default)]
    pub va_degree: f64,
    #[serde(default)]
    pub s_sc_max_mva: Option<f64>,
    #[serde(default)]
    pub s_sc_min_mva: Option<f64>,
    #[serde(default)]
    pub rx_max: Option<f64>,
    #[serde(default)]
    pub rx_min: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineDef {
    #[serde(default)]
    pub name: Option<String>,
    pub from_bus: String,
    pub to_bus: String,
    pub length_km: f64,
    pub std_type: String,
    #[serde(default = "one_u32")]
    pub parallel: u32,
    #[serde(default = "one")]
    pub df: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafoDef {
    #[serde(default)]
    pub name: Option<String>,
    pub hv_bus: String,
    pub lv_bus: String,
    pub std_type: String,
    #[serde(default)]
    pub tap_pos: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadDef {
    #[serde(default)]
    pub name: Option<String>,
    pub bus: String,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
    #[serde(default = "one")]
    pub scaling: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgenDef {
    #[serde(default)]
    pub name: Option<String>,
    pub bus: String,
    pub p_mw: f64,
    #[serde(default)]
    pub q_mvar: f64,
    #[serde(default)]
    pub sn_mva: Option<f64>,
    #[serde(default)]
    pub k: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenDef {
    #[serde(default)]
    pub name: Option<String>,
    pub bus: String,
    pub p_mw: f64,
    #[serde(default = "one")]
    pub vm_pu: f64,
}

/// `q_mvar` consumed at 1.0 pu, negative for capacitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuntDef {
    #[serde(default)]
    pub name: Option<String>,
    pub bus: String,
    #[serde(default)]
    pub p_mw: f64,
    pub q_mvar: f64,
}

impl NetworkConfig {
    pub fn from_json_str(text: &str) -> GridResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> GridResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_fills_defaults() {
        let cfg = NetworkConfig::from_json_str(
            r#"{
                "buses": [{"name": "A", "vn_kv": 20}],
                "ext_grids": [{"bus": "A"}],
                "loads": [{"bus": "A", "p_mw": 0.1}]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.name, "Default Network");
        assert_eq!(cfg.sn_mva, 1.0);
        assert_eq!(cfg.ext_grids[0].vm_pu, 1.0);
        assert_eq!(cfg.loads[0].q_mvar, 0.0);
        assert!(cfg.lines.is_empty());
    }

    #[test]
    fn malformed_document_is_config_error() {
        let err = NetworkConfig::from_json_str(r#"{"buses": [{"name": 3}]}"#).unwrap_err();
        assert!(err.to_string().starts_with("configuration error"));
    }
}
