//! Scenario file schema.

use std::collections::BTreeMap;

use gd_components::{CheckLevel, ParamValue};
use serde::{Deserialize, Serialize};

/// Parameters keyed by name; a key may carry an inline unit, e.g. `"p(MW)"`.
pub type ParamMap = BTreeMap<String, ParamDef>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Scenario {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub run: RunDef,
    #[serde(default)]
    pub buses: Vec<BusDef>,
    /// Buses created as structural copies of buses defined above.
    #[serde(default)]
    pub clones: Vec<CloneDef>,
    /// Scheduled bus changes; applied after cloning, so they only affect the named bus.
    #[serde(default)]
    pub disturbances: Vec<DisturbanceDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamDef {
    Number(f64),
    Text(String),
}

impl From<&ParamDef> for ParamValue {
    fn from(p: &ParamDef) -> Self {
        match p {
            ParamDef::Number(v) => ParamValue::Number(*v),
            ParamDef::Text(s) => ParamValue::Text(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckLevelDef {
    Reversible,
    #[default]
    Full,
    Complete,
}

impl From<CheckLevelDef> for CheckLevel {
    fn from(c: CheckLevelDef) -> Self {
        match c {
            CheckLevelDef::Reversible => CheckLevel::ReversibleOnly,
            CheckLevelDef::Full => CheckLevel::Full,
            CheckLevelDef::Complete => CheckLevel::Complete,
        }
    }
}

/// Settings for the reference driver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunDef {
    /// Step size (s)
    pub dt: f64,
    /// End time (s)
    pub t_end: f64,
    pub record_every: usize,
    pub check_level: CheckLevelDef,
}

impl Default for RunDef {
    fn default() -> Self {
        Self {
            dt: 1e-3,
            t_end: 1.0,
            record_every: 10,
            check_level: CheckLevelDef::Full,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusDef {
    pub name: String,
    /// `v`, `theta` and `f`, with optional unit suffixes.
    #[serde(default)]
    pub params: ParamMap,
    #[serde(default)]
    pub generators: Vec<GeneratorDef>,
    #[serde(default)]
    pub loads: Vec<ModelDef>,
    #[serde(default)]
    pub relays: Vec<ModelDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorDef {
    pub name: String,
    /// `p` and `q` of the generator; anything else goes to the machine.
    #[serde(default)]
    pub params: ParamMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exciter: Option<SubModelDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governor: Option<SubModelDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SubModelDef>,
}

/// A model held in a generator slot; it is named after the generator and slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubModelDef {
    pub model: String,
    #[serde(default)]
    pub params: ParamMap,
}

/// A standalone bus object (load or relay).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub name: String,
    pub model: String,
    #[serde(default)]
    pub params: ParamMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisturbanceDef {
    pub bus: String,
    /// Time (s)
    pub time: f64,
    pub field: String,
    pub value: f64,
    /// Unit name of `value`; the field's base unit when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloneDef {
    pub source: String,
    pub name: String,
}
