use std::error::Error;
use std::fmt;

use smartstring::alias::String as SmartString;

mod constraints;
mod orderedmap;
mod templates;

pub use constraints::PConstraint;
pub use orderedmap::OrderedMap;
pub use templates::{
	base_ptemplate, make_base_capture_template, CaptureTemplate, PTemplate, PType, TemplateError,
};

/// Names of the parameters understood by the built-in capture templates.
///
/// A capture template may use any name; these are the ones shared between
/// flowgraphs, event handlers and validators.
pub mod pnames {
	pub const AMPLITUDE: &str = "amplitude";
	pub const BANDWIDTH: &str = "bandwidth";
	pub const BATCH_SIZE: &str = "batch_size";
	pub const CENTER_FREQUENCY: &str = "center_frequency";
	pub const FREQUENCY: &str = "frequency";
	pub const FREQUENCY_RESOLUTION: &str = "frequency_resolution";
	pub const FREQUENCY_STEP: &str = "frequency_step";
	pub const INSTRUMENT: &str = "instrument";
	pub const KEEP_SIGNAL: &str = "keep_signal";
	pub const MAX_FREQUENCY: &str = "max_frequency";
	pub const MAX_SAMPLES_PER_STEP: &str = "max_samples_per_step";
	pub const MIN_FREQUENCY: &str = "min_frequency";
	pub const MIN_SAMPLES_PER_STEP: &str = "min_samples_per_step";
	pub const OBJECT: &str = "object";
	pub const OBS_ALT: &str = "obs_alt";
	pub const OBS_LAT: &str = "obs_lat";
	pub const OBS_LON: &str = "obs_lon";
	pub const ORIGIN: &str = "origin";
	pub const SAMPLE_RATE: &str = "sample_rate";
	pub const SAMPLES_PER_STEP: &str = "samples_per_step";
	pub const TELESCOPE: &str = "telescope";
	pub const TIME_RANGE: &str = "time_range";
	pub const TIME_RESOLUTION: &str = "time_resolution";
	pub const WATCH_EXTENSION: &str = "watch_extension";
	pub const WINDOW_HOP: &str = "window_hop";
	pub const WINDOW_SIZE: &str = "window_size";
	pub const WINDOW_TYPE: &str = "window_type";
}

#[derive(Debug)]
pub enum ParameterError {
	Duplicate {
		name: SmartString,
	},
	NotFound {
		name: SmartString,
	},
	WrongType {
		name: SmartString,
		expected: &'static str,
		found: &'static str,
	},
	BadKeyValue {
		raw: String,
	},
	Unrepresentable {
		reason: String,
	},
}

impl fmt::Display for ParameterError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Duplicate { name } => {
				write!(f, "a parameter named {:?} already exists", name)
			}
			Self::NotFound { name } => {
				write!(f, "no parameter named {:?}", name)
			}
			Self::WrongType {
				name,
				expected,
				found,
			} => {
				write!(
					f,
					"parameter {:?} has type {}, expected {}",
					name, found, expected
				)
			}
			Self::BadKeyValue { raw } => {
				write!(f, "invalid parameter {:?}: expected KEY=VALUE", raw)
			}
			Self::Unrepresentable { reason } => {
				write!(f, "value cannot be represented: {}", reason)
			}
		}
	}
}

impl Error for ParameterError {}

/// A parameter value as it appears in a capture configuration document.
///
/// This is the boundary representation; validated values are unpacked into
/// plain typed fields before any signal processing sees them.
#[derive(Debug, Clone, PartialEq)]
pub enum PValue {
	Int(i64),
	Float(f64),
	Str(String),
	Bool(bool),
	Null,
}

impl PValue {
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Int(_) => "int",
			Self::Float(_) => "float",
			Self::Str(_) => "string",
			Self::Bool(_) => "bool",
			Self::Null => "null",
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Self::Int(v) => Some(*v),
			_ => None,
		}
	}

	/// Numeric view; integers widen to floats.
	pub fn as_float(&self) -> Option<f64> {
		match self {
			Self::Float(v) => Some(*v),
			Self::Int(v) => Some(*v as f64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::Str(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn from_json(v: &serde_json::Value) -> Result<Self, ParameterError> {
		match v {
			serde_json::Value::Null => Ok(Self::Null),
			serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
			serde_json::Value::Number(n) => {
				if let Some(i) = n.as_i64() {
					Ok(Self::Int(i))
				} else if let Some(x) = n.as_f64() {
					Ok(Self::Float(x))
				} else {
					Err(ParameterError::Unrepresentable {
						reason: format!("number {} does not fit i64 or f64", n),
					})
				}
			}
			serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
			other => Err(ParameterError::Unrepresentable {
				reason: format!("unsupported JSON value {}", other),
			}),
		}
	}

	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Self::Int(v) => serde_json::Value::from(*v),
			Self::Float(v) => serde_json::Value::from(*v),
			Self::Str(v) => serde_json::Value::from(v.as_str()),
			Self::Bool(v) => serde_json::Value::from(*v),
			Self::Null => serde_json::Value::Null,
		}
	}
}

impl fmt::Display for PValue {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Int(v) => write!(f, "{}", v),
			Self::Float(v) => write!(f, "{}", v),
			Self::Str(v) => write!(f, "{}", v),
			Self::Bool(v) => write!(f, "{}", v),
			Self::Null => f.write_str("null"),
		}
	}
}

/// An ordered collection of named parameter values with unique names.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
	inner: OrderedMap<SmartString, PValue>,
}

impl Parameters {
	pub fn new() -> Self {
		Self {
			inner: OrderedMap::new(),
		}
	}

	/// Add a parameter; duplicate names are rejected.
	pub fn add<N: Into<SmartString>>(
		&mut self,
		name: N,
		value: PValue,
	) -> Result<(), ParameterError> {
		let name = name.into();
		if self.inner.contains_key(&name) {
			return Err(ParameterError::Duplicate { name });
		}
		self.inner.insert(name, value);
		Ok(())
	}

	pub fn get(&self, name: &str) -> Option<&PValue> {
		self.inner.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.inner.contains_key(name)
	}

	pub fn names(&self) -> Vec<&str> {
		self.inner.keys().map(|k| k.as_str()).collect()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&SmartString, &PValue)> {
		self.inner.iter()
	}

	fn require(&self, name: &str) -> Result<&PValue, ParameterError> {
		self.get(name).ok_or_else(|| ParameterError::NotFound {
			name: name.into(),
		})
	}

	pub fn get_int(&self, name: &str) -> Result<i64, ParameterError> {
		let v = self.require(name)?;
		v.as_int().ok_or_else(|| ParameterError::WrongType {
			name: name.into(),
			expected: "int",
			found: v.type_name(),
		})
	}

	pub fn get_float(&self, name: &str) -> Result<f64, ParameterError> {
		let v = self.require(name)?;
		v.as_float().ok_or_else(|| ParameterError::WrongType {
			name: name.into(),
			expected: "float",
			found: v.type_name(),
		})
	}

	pub fn get_str(&self, name: &str) -> Result<&str, ParameterError> {
		let v = self.require(name)?;
		v.as_str().ok_or_else(|| ParameterError::WrongType {
			name: name.into(),
			expected: "string",
			found: v.type_name(),
		})
	}

	pub fn get_bool(&self, name: &str) -> Result<bool, ParameterError> {
		let v = self.require(name)?;
		v.as_bool().ok_or_else(|| ParameterError::WrongType {
			name: name.into(),
			expected: "bool",
			found: v.type_name(),
		})
	}

	/// Float view of a parameter which may be null (or absent).
	pub fn get_opt_float(&self, name: &str) -> Result<Option<f64>, ParameterError> {
		match self.get(name) {
			None => Ok(None),
			Some(PValue::Null) => Ok(None),
			Some(v) => v
				.as_float()
				.map(Some)
				.ok_or_else(|| ParameterError::WrongType {
					name: name.into(),
					expected: "float",
					found: v.type_name(),
				}),
		}
	}

	pub fn from_json_object(
		object: &serde_json::Map<String, serde_json::Value>,
	) -> Result<Self, ParameterError> {
		let mut parameters = Self::new();
		for (name, value) in object.iter() {
			parameters.add(name.as_str(), PValue::from_json(value)?)?;
		}
		Ok(parameters)
	}

	pub fn to_json_object(&self) -> serde_json::Map<String, serde_json::Value> {
		let mut object = serde_json::Map::new();
		for (name, value) in self.iter() {
			object.insert(name.to_string(), value.to_json());
		}
		object
	}
}

/// Parse CLI-style `KEY=VALUE` strings into name/value pairs.
///
/// The value keeps its string form; type coercion is the template's job.
pub fn parse_string_parameters(
	string_parameters: &[String],
) -> Result<Parameters, ParameterError> {
	let mut parameters = Parameters::new();
	for raw in string_parameters {
		let raw = raw.trim();
		let mut split = raw.splitn(2, '=');
		let key = split.next().unwrap_or("");
		let value = match split.next() {
			Some(v) => v,
			None => {
				return Err(ParameterError::BadKeyValue {
					raw: raw.to_string(),
				})
			}
		};
		if key.is_empty() || value.is_empty() {
			return Err(ParameterError::BadKeyValue {
				raw: raw.to_string(),
			});
		}
		parameters.add(key, PValue::Str(value.to_string()))?;
	}
	Ok(parameters)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_add_rejects_duplicate_names() {
		let mut p = Parameters::new();
		p.add("sample_rate", PValue::Int(128000)).unwrap();
		assert!(matches!(
			p.add("sample_rate", PValue::Int(64000)),
			Err(ParameterError::Duplicate { .. })
		));
	}

	#[test]
	fn test_typed_access() {
		let mut p = Parameters::new();
		p.add("sample_rate", PValue::Int(128000)).unwrap();
		p.add("amplitude", PValue::Float(2.0)).unwrap();
		p.add("window_type", PValue::Str("boxcar".to_string()))
			.unwrap();
		assert_eq!(p.get_int("sample_rate").unwrap(), 128000);
		assert_eq!(p.get_float("amplitude").unwrap(), 2.0);
		// ints widen to floats
		assert_eq!(p.get_float("sample_rate").unwrap(), 128000.0);
		assert_eq!(p.get_str("window_type").unwrap(), "boxcar");
		assert!(matches!(
			p.get_int("window_type"),
			Err(ParameterError::WrongType { .. })
		));
	}

	#[test]
	fn test_opt_float_treats_null_as_absent() {
		let mut p = Parameters::new();
		p.add("time_resolution", PValue::Null).unwrap();
		assert_eq!(p.get_opt_float("time_resolution").unwrap(), None);
		assert_eq!(p.get_opt_float("frequency_resolution").unwrap(), None);
	}

	#[test]
	fn test_json_round_trip() {
		let doc: serde_json::Value = serde_json::from_str(
			r#"{"sample_rate": 128000, "amplitude": 2.0, "window_type": "boxcar", "time_resolution": null}"#,
		)
		.unwrap();
		let object = doc.as_object().unwrap();
		let p = Parameters::from_json_object(object).unwrap();
		assert_eq!(p.get_int("sample_rate").unwrap(), 128000);
		assert!(p.get("time_resolution").unwrap().is_null());
		let back = Parameters::from_json_object(&p.to_json_object()).unwrap();
		assert_eq!(p, back);
	}

	#[test]
	fn test_parse_string_parameters() {
		let raw = vec!["sample_rate=128000".to_string(), "window_type=boxcar".to_string()];
		let p = parse_string_parameters(&raw).unwrap();
		assert_eq!(p.get_str("sample_rate").unwrap(), "128000");
		assert_eq!(p.get_str("window_type").unwrap(), "boxcar");
	}

	#[test]
	fn test_parse_string_parameters_rejects_malformed() {
		for raw in ["sample_rate", "=5", "sample_rate="] {
			let err = parse_string_parameters(&[raw.to_string()]);
			assert!(
				matches!(err, Err(ParameterError::BadKeyValue { .. })),
				"{:?} should be rejected",
				raw
			);
		}
	}
}
