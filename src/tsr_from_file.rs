//! Reading and writing TSRs and TSR chains as JSON and YAML.
//!
//! Both encodings carry the same record. A TSR looks like this in YAML:
//! ```yaml
//! T0_w: [[1, 0, 0, 0.5], [0, 1, 0, 0], [0, 0, 1, 0.8], [0, 0, 0, 1]]
//! Tw_e: [[1, 0, 0, -0.1], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]
//! Bw: [[0, 0], [0, 0], [-0.05, 0.05], [0, 0], [0, 0], [-3.14159, 3.14159]]
//! manipindex: 0
//! bodyandlink: "mug link0"
//! ```
//! `T0_w` and `Tw_e` are row-major 4x4 rigid transforms, `Bw` is [min, max] for
//! x, y, z, roll, pitch, yaw. Missing keys default to identity, identity, zero box,
//! -1 (no manipulator) and "NULL" (no body). A chain adds `sample_start`,
//! `sample_goal`, `constrain`, `mimicbodyname`, `mimicbodyjoints` and the list
//! `tsrs` of TSR records.
//!
//! YAML is read with yaml-rust2 and mapped onto the same serde schema as JSON.
//!
//! Rotations written by hand are often rounded. A matrix is accepted when its rotation
//! is orthonormal within `1e-3`, and the rotation is then normalized, so writing the
//! TSR back does not reproduce such a matrix exactly. The change is logged at debug level.

use nalgebra::Matrix4;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Number, Value};
use yaml_rust2::yaml::Hash;
use yaml_rust2::{Yaml, YamlEmitter, YamlLoader};

use crate::tsr::Tsr;
use crate::tsr_chain::TsrChain;
use crate::tsr_error::TsrError;
use crate::tsr_traits::{Bounds, Pose, ZERO_BOUNDS};
use crate::utils::pose_to_matrix;

/// Body name meaning "none".
pub const NULL_NAME: &str = "NULL";

/// Manipulator index meaning "none".
pub const NO_MANIPULATOR: i64 = -1;

fn identity_matrix() -> [[f64; 4]; 4] {
    [[1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], [0.0, 0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]]
}
fn zero_bounds() -> Bounds { ZERO_BOUNDS }
fn no_manipulator() -> i64 { NO_MANIPULATOR }
fn null_name() -> String { NULL_NAME.to_string() }

/// Accepts YAML null (unquoted NULL in some writers) as the "none" name.
fn name_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_else(null_name))
}

/// Serialized form of a TSR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsrRecord {
    #[serde(rename = "T0_w", default = "identity_matrix")]
    pub t0_w: [[f64; 4]; 4],
    #[serde(rename = "Tw_e", default = "identity_matrix")]
    pub tw_e: [[f64; 4]; 4],
    #[serde(rename = "Bw", default = "zero_bounds")]
    pub bw: Bounds,
    #[serde(rename = "manipindex", default = "no_manipulator")]
    pub manip_index: i64,
    #[serde(rename = "bodyandlink", default = "null_name", deserialize_with = "name_or_null")]
    pub body_and_link: String,
}

/// Serialized form of a TSR chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsrChainRecord {
    #[serde(default)]
    pub sample_goal: bool,
    #[serde(default)]
    pub sample_start: bool,
    #[serde(default)]
    pub constrain: bool,
    #[serde(rename = "mimicbodyname", default = "null_name", deserialize_with = "name_or_null")]
    pub mimic_body_name: String,
    #[serde(rename = "mimicbodyjoints", default)]
    pub mimic_body_joints: Vec<usize>,
    #[serde(default)]
    pub tsrs: Vec<TsrRecord>,
}

fn rows(pose: &Pose) -> [[f64; 4]; 4] {
    let m = pose_to_matrix(pose);
    std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)]))
}

fn matrix(rows: &[[f64; 4]; 4]) -> Matrix4<f64> {
    Matrix4::from_fn(|r, c| rows[r][c])
}

fn optional_name(name: &str) -> Option<String> {
    if name == NULL_NAME { None } else { Some(name.to_string()) }
}

impl Tsr {
    pub fn to_record(&self) -> TsrRecord {
        TsrRecord {
            t0_w: rows(self.t0_w()),
            tw_e: rows(self.tw_e()),
            bw: *self.bw(),
            manip_index: self.manip_index().map_or(NO_MANIPULATOR, |index| index as i64),
            body_and_link: self.link_reference().unwrap_or(NULL_NAME).to_string(),
        }
    }

    /// Builds the TSR from the record, validating the transforms and the bounds.
    pub fn from_record(record: &TsrRecord) -> Result<Self, TsrError> {
        let manip_index = match record.manip_index {
            NO_MANIPULATOR => None,
            index if index >= 0 => Some(index as usize),
            index => {
                return Err(TsrError::ParseError(format!(
                    "manipindex must be -1 or a non-negative index (got {})", index
                )));
            }
        };
        Ok(Tsr::from_matrices(&matrix(&record.t0_w), &matrix(&record.tw_e), record.bw)?
            .with_manip_index(manip_index)
            .with_link_reference(optional_name(&record.body_and_link)))
    }

    pub fn to_json(&self) -> Result<String, TsrError> {
        to_json(&self.to_record())
    }

    pub fn from_json(text: &str) -> Result<Self, TsrError> {
        Tsr::from_record(&from_json(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, TsrError> {
        to_yaml(&self.to_record())
    }

    pub fn from_yaml(text: &str) -> Result<Self, TsrError> {
        Tsr::from_record(&from_yaml(text)?)
    }

    #[cfg(feature = "allow_filesystem")]
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, TsrError> {
        Tsr::from_yaml(&std::fs::read_to_string(path)?)
    }

    #[cfg(feature = "allow_filesystem")]
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, TsrError> {
        Tsr::from_json(&std::fs::read_to_string(path)?)
    }
}

impl TsrChain {
    pub fn to_record(&self) -> TsrChainRecord {
        TsrChainRecord {
            sample_goal: self.sample_goal,
            sample_start: self.sample_start,
            constrain: self.constrain,
            mimic_body_name: self.mimic_body_name.clone().unwrap_or_else(null_name),
            mimic_body_joints: self.mimic_body_joints.clone(),
            tsrs: self.tsrs().iter().map(Tsr::to_record).collect(),
        }
    }

    pub fn from_record(record: &TsrChainRecord) -> Result<Self, TsrError> {
        let tsrs = record.tsrs.iter().map(Tsr::from_record).collect::<Result<Vec<_>, _>>()?;
        let mut chain = TsrChain::new(record.sample_start, record.sample_goal, record.constrain).with_tsrs(tsrs);
        chain.mimic_body_name = optional_name(&record.mimic_body_name);
        chain.mimic_body_joints = record.mimic_body_joints.clone();
        Ok(chain)
    }

    pub fn to_json(&self) -> Result<String, TsrError> {
        to_json(&self.to_record())
    }

    pub fn from_json(text: &str) -> Result<Self, TsrError> {
        TsrChain::from_record(&from_json(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, TsrError> {
        to_yaml(&self.to_record())
    }

    pub fn from_yaml(text: &str) -> Result<Self, TsrError> {
        TsrChain::from_record(&from_yaml(text)?)
    }

    #[cfg(feature = "allow_filesystem")]
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, TsrError> {
        TsrChain::from_yaml(&std::fs::read_to_string(path)?)
    }

    #[cfg(feature = "allow_filesystem")]
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, TsrError> {
        TsrChain::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Content of a TSR file: either a single TSR or a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionFile {
    Single(Tsr),
    Chain(TsrChain),
}

/// Reads a TSR or a TSR chain. Files ending with `.json` are JSON, anything else YAML.
/// A record with a top level `tsrs` key is a chain.
#[cfg(feature = "allow_filesystem")]
pub fn read_region_file<P: AsRef<std::path::Path>>(path: P) -> Result<RegionFile, TsrError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let value = if is_json {
        serde_json::from_str::<Value>(&text).map_err(|e| TsrError::ParseError(e.to_string()))?
    } else {
        yaml_value(&text)?
    };
    region_from_value(value)
}

#[cfg(any(test, feature = "allow_filesystem"))]
fn region_from_value(value: Value) -> Result<RegionFile, TsrError> {
    if value.get("tsrs").is_some() {
        let record: TsrChainRecord = from_value(value)?;
        Ok(RegionFile::Chain(TsrChain::from_record(&record)?))
    } else {
        let record: TsrRecord = from_value(value)?;
        Ok(RegionFile::Single(Tsr::from_record(&record)?))
    }
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, TsrError> {
    serde_json::from_value(value).map_err(|e| TsrError::ParseError(e.to_string()))
}

fn to_json<T: Serialize>(record: &T) -> Result<String, TsrError> {
    serde_json::to_string(record).map_err(|e| TsrError::EmitError(e.to_string()))
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, TsrError> {
    serde_json::from_str(text).map_err(|e| TsrError::ParseError(e.to_string()))
}

fn to_yaml<T: Serialize>(record: &T) -> Result<String, TsrError> {
    let value = serde_json::to_value(record).map_err(|e| TsrError::EmitError(e.to_string()))?;
    let mut out = String::new();
    YamlEmitter::new(&mut out)
        .dump(&json_to_yaml(&value))
        .map_err(|e| TsrError::EmitError(format!("{:?}", e)))?;
    out.push('\n');
    Ok(out)
}

fn from_yaml<T: DeserializeOwned>(text: &str) -> Result<T, TsrError> {
    from_value(yaml_value(text)?)
}

fn yaml_value(text: &str) -> Result<Value, TsrError> {
    let documents = YamlLoader::load_from_str(text).map_err(|e| TsrError::ParseError(e.to_string()))?;
    let document = documents
        .first()
        .ok_or_else(|| TsrError::ParseError("empty YAML document".to_string()))?;
    yaml_to_json(document)
}

fn json_to_yaml(value: &Value) -> Yaml {
    match value {
        Value::Null => Yaml::Null,
        Value::Bool(b) => Yaml::Boolean(*b),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Yaml::Integer(i),
            // Debug formatting of f64 is the shortest text that parses back to the same value
            (None, Some(f)) => Yaml::Real(format!("{:?}", f)),
            (None, None) => Yaml::Null,
        },
        Value::String(s) => Yaml::String(s.clone()),
        Value::Array(items) => Yaml::Array(items.iter().map(json_to_yaml).collect()),
        Value::Object(fields) => {
            let mut hash = Hash::new();
            for (key, field) in fields {
                hash.insert(Yaml::String(key.clone()), json_to_yaml(field));
            }
            Yaml::Hash(hash)
        }
    }
}

fn yaml_to_json(yaml: &Yaml) -> Result<Value, TsrError> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(*b),
        Yaml::Integer(i) => Value::from(*i),
        Yaml::Real(text) => {
            let real = yaml
                .as_f64()
                .ok_or_else(|| TsrError::ParseError(format!("not a number: {}", text)))?;
            Value::Number(
                Number::from_f64(real)
                    .ok_or_else(|| TsrError::ParseError(format!("not a finite number: {}", text)))?,
            )
        }
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Array(items) => Value::Array(items.iter().map(yaml_to_json).collect::<Result<_, _>>()?),
        Yaml::Hash(hash) => {
            let mut fields = Map::new();
            for (key, field) in hash {
                let key = match key {
                    Yaml::String(s) | Yaml::Real(s) => s.clone(),
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    other => return Err(TsrError::ParseError(format!("unsupported YAML key {:?}", other))),
                };
                fields.insert(key, yaml_to_json(field)?);
            }
            Value::Object(fields)
        }
        other => return Err(TsrError::ParseError(format!("unsupported YAML value {:?}", other))),
    })
}
