//! Tracked parameters and value normalization at the device boundary.

use thiserror::Error;

/// Wire name of the power state parameter.
pub const PARAM_PW: &str = "Pw";
/// Wire name of the power-on flag.
pub const PARAM_PON: &str = "POn";
/// Wire name of the power-down flag.
pub const PARAM_PDWN: &str = "PDwn";
/// Wire name of the monitored voltage (volts).
pub const PARAM_VMON: &str = "VMon";
/// Wire name of the monitored current (microamps).
pub const PARAM_IMON: &str = "IMon";
/// Wire name of the voltage setpoint (volts).
pub const PARAM_V0SET: &str = "V0Set";
/// Wire name of the current setpoint (microamps).
pub const PARAM_I0SET: &str = "I0Set";

/// How a parameter's raw device values are normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ParamKind {
    /// Voltage/current style quantity, normalized to `f64`.
    Analog,
    /// Power state or on/off flag, normalized to `i64`.
    Flag,
}

/// A raw value as returned by the device gateway, before normalization.
///
/// Device SDKs are loose about types: the same parameter may arrive as an
/// integer, a float, or even a decimal string depending on link and
/// firmware. Normalization pins each tracked parameter to one Rust type.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A normalized parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    /// The value as a float, converting integers losslessly-enough for
    /// display and classification.
    pub fn as_f64(&self) -> f64 {
        match self {
            ParamValue::Int(i) => *i as f64,
            ParamValue::Float(f) => *f,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(_) => None,
        }
    }
}

/// A raw value that could not be coerced to the parameter's kind.
#[derive(Debug, Error, PartialEq)]
#[error("cannot normalize {raw:?} as {kind:?}")]
pub struct NormalizeError {
    pub kind: ParamKind,
    pub raw: RawValue,
}

impl ParamKind {
    /// Coerce a raw device value to this kind.
    ///
    /// Analog values accept floats, integers, and parseable decimal text.
    /// Flags accept integers, booleans, integral floats, and parseable
    /// integer text. Anything else is a malformed reading, which the
    /// poller treats as grounds to discard the whole tick.
    pub fn normalize(&self, raw: &RawValue) -> Result<ParamValue, NormalizeError> {
        let err = || NormalizeError {
            kind: *self,
            raw: raw.clone(),
        };
        match self {
            ParamKind::Analog => match raw {
                RawValue::Float(f) => Ok(ParamValue::Float(*f)),
                RawValue::Int(i) => Ok(ParamValue::Float(*i as f64)),
                RawValue::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(ParamValue::Float)
                    .map_err(|_| err()),
                RawValue::Bool(_) => Err(err()),
            },
            ParamKind::Flag => match raw {
                RawValue::Int(i) => Ok(ParamValue::Int(*i)),
                RawValue::Bool(b) => Ok(ParamValue::Int(*b as i64)),
                RawValue::Float(f) if f.fract() == 0.0 => Ok(ParamValue::Int(*f as i64)),
                RawValue::Float(_) => Err(err()),
                RawValue::Text(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(ParamValue::Int)
                    .map_err(|_| err()),
            },
        }
    }
}

/// One tracked per-channel quantity: its wire name, the store column it
/// lands in, and how raw values are normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Parameter {
    name: String,
    column: String,
    kind: ParamKind,
}

impl Parameter {
    /// An analog (float) parameter.
    pub fn analog(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            kind: ParamKind::Analog,
        }
    }

    /// A flag (integer) parameter.
    pub fn flag(name: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            kind: ParamKind::Flag,
        }
    }

    /// The wire name used in gateway bulk reads.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The store column this parameter persists to.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// How raw values of this parameter are normalized.
    pub fn kind(&self) -> ParamKind {
        self.kind
    }
}

/// Errors rejected when constructing a [`ParameterSet`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
    #[error("parameter set is empty")]
    Empty,

    #[error("parameter {name:?} declared more than once")]
    DuplicateName { name: String },

    #[error("column {column:?} used by more than one parameter")]
    DuplicateColumn { column: String },

    /// Column names are spliced into SQL identifiers, so they are
    /// restricted to `[A-Za-z_][A-Za-z0-9_]*` and validated here rather
    /// than trusted at insert time.
    #[error("column {column:?} is not a valid identifier")]
    InvalidColumn { column: String },
}

/// The ordered set of parameters tracked for every channel.
///
/// Loaded once at startup; the poller's round-trip count and the store's
/// column layout are both driven by this list, so adding a parameter is a
/// configuration change, not a code change.
///
/// # Example
///
/// ```rust
/// use hvwatch_types::ParameterSet;
///
/// let params = ParameterSet::default_set();
/// assert_eq!(params.len(), 7);
/// assert_eq!(params.iter().next().unwrap().name(), "Pw");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    /// Build a parameter set, rejecting duplicates and invalid columns.
    pub fn new(params: Vec<Parameter>) -> Result<Self, ParameterError> {
        if params.is_empty() {
            return Err(ParameterError::Empty);
        }
        let mut names = std::collections::BTreeSet::new();
        let mut columns = std::collections::BTreeSet::new();
        for p in &params {
            if !is_identifier(&p.column) {
                return Err(ParameterError::InvalidColumn {
                    column: p.column.clone(),
                });
            }
            if !names.insert(p.name.as_str()) {
                return Err(ParameterError::DuplicateName {
                    name: p.name.clone(),
                });
            }
            if !columns.insert(p.column.as_str()) {
                return Err(ParameterError::DuplicateColumn {
                    column: p.column.clone(),
                });
            }
        }
        Ok(Self { params })
    }

    /// The standard seven-parameter set for CAEN-style HV boards: power
    /// state, power-on and power-down flags, monitored voltage/current,
    /// and voltage/current setpoints.
    pub fn default_set() -> Self {
        Self {
            params: vec![
                Parameter::flag(PARAM_PW, "power"),
                Parameter::flag(PARAM_PON, "poweron"),
                Parameter::flag(PARAM_PDWN, "powerdown"),
                Parameter::analog(PARAM_VMON, "vmon"),
                Parameter::analog(PARAM_IMON, "imon"),
                Parameter::analog(PARAM_V0SET, "v0set"),
                Parameter::analog(PARAM_I0SET, "i0set"),
            ],
        }
    }

    /// Iterate parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    /// Number of tracked parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True if no parameters are tracked (unreachable via `new`).
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
