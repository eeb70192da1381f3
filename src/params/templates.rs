use std::error::Error;
use std::fmt;

use smartstring::alias::String as SmartString;

use super::constraints::PConstraint;
use super::orderedmap::OrderedMap;
use super::{pnames, PValue, Parameters};

#[derive(Debug)]
pub enum TemplateError {
	InvalidType {
		name: SmartString,
		reason: String,
	},
	ConstraintViolation {
		name: SmartString,
		constraint: String,
		reason: String,
	},
	MissingParameter {
		name: SmartString,
	},
	DefaultEnforced {
		name: SmartString,
		expected: String,
		got: String,
	},
	UndefinedParameter {
		name: SmartString,
		expected: Vec<String>,
	},
	NoSuchTemplate {
		name: SmartString,
	},
}

impl fmt::Display for TemplateError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidType { name, reason } => {
				write!(f, "parameter {:?} has an invalid type: {}", name, reason)
			}
			Self::ConstraintViolation {
				name,
				constraint,
				reason,
			} => {
				write!(
					f,
					"parameter {:?} violates {}: {}",
					name, constraint, reason
				)
			}
			Self::MissingParameter { name } => {
				write!(
					f,
					"parameter {:?} is required, but no value was given and no default exists",
					name
				)
			}
			Self::DefaultEnforced {
				name,
				expected,
				got,
			} => {
				write!(
					f,
					"parameter {:?} is fixed to its default {} for this mode, got {}",
					name, expected, got
				)
			}
			Self::UndefinedParameter { name, expected } => {
				write!(
					f,
					"parameter {:?} is not part of this template; expected one of [{}]",
					name,
					expected.join(", ")
				)
			}
			Self::NoSuchTemplate { name } => {
				write!(f, "no parameter template named {:?}", name)
			}
		}
	}
}

impl Error for TemplateError {}

/// The type a parameter value is coerced to before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PType {
	Int,
	Float,
	Str,
	Bool,
}

impl PType {
	pub fn name(&self) -> &'static str {
		match self {
			Self::Int => "int",
			Self::Float => "float",
			Self::Str => "string",
			Self::Bool => "bool",
		}
	}

	/// Coerce a value to this type.
	///
	/// Values arriving from the CLI are strings and get parsed; values
	/// arriving from JSON are already typed and only widen or narrow where
	/// that loses nothing.
	pub fn coerce(&self, value: &PValue) -> Result<PValue, String> {
		match (self, value) {
			(Self::Int, PValue::Int(v)) => Ok(PValue::Int(*v)),
			(Self::Int, PValue::Float(v)) => {
				if v.fract() == 0.0 && v.is_finite() {
					Ok(PValue::Int(*v as i64))
				} else {
					Err(format!("{} is not an integer", v))
				}
			}
			(Self::Int, PValue::Str(s)) => s
				.parse::<i64>()
				.map(PValue::Int)
				.map_err(|e| format!("{:?} does not parse as an integer: {}", s, e)),
			(Self::Float, PValue::Float(v)) => Ok(PValue::Float(*v)),
			(Self::Float, PValue::Int(v)) => Ok(PValue::Float(*v as f64)),
			(Self::Float, PValue::Str(s)) => s
				.parse::<f64>()
				.map(PValue::Float)
				.map_err(|e| format!("{:?} does not parse as a float: {}", s, e)),
			(Self::Str, PValue::Str(s)) => Ok(PValue::Str(s.clone())),
			(Self::Str, other) => Ok(PValue::Str(other.to_string())),
			(Self::Bool, PValue::Bool(v)) => Ok(PValue::Bool(*v)),
			(Self::Bool, PValue::Str(s)) => match s.as_str() {
				"true" | "1" => Ok(PValue::Bool(true)),
				"false" | "0" => Ok(PValue::Bool(false)),
				other => Err(format!("{:?} does not parse as a bool", other)),
			},
			(expected, got) => Err(format!(
				"cannot coerce {} to {}",
				got.type_name(),
				expected.name()
			)),
		}
	}
}

/// Shape of a single parameter: type, default, constraints, help.
#[derive(Debug, Clone)]
pub struct PTemplate {
	name: SmartString,
	ptype: PType,
	default: Option<PValue>,
	nullable: bool,
	enforce_default: bool,
	help: String,
	constraints: Vec<PConstraint>,
}

impl PTemplate {
	pub fn new<N: Into<SmartString>, H: Into<String>>(
		name: N,
		ptype: PType,
		default: Option<PValue>,
		help: H,
	) -> Self {
		Self {
			name: name.into(),
			ptype,
			default,
			nullable: false,
			enforce_default: false,
			help: help.into(),
			constraints: Vec::new(),
		}
	}

	pub fn nullable(mut self) -> Self {
		self.nullable = true;
		self
	}

	pub fn with_constraint(mut self, constraint: PConstraint) -> Self {
		self.constraints.push(constraint);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn ptype(&self) -> PType {
		self.ptype
	}

	pub fn default(&self) -> Option<&PValue> {
		self.default.as_ref()
	}

	pub fn help(&self) -> &str {
		&self.help
	}

	pub fn set_default(&mut self, default: PValue) {
		self.default = Some(default);
	}

	pub fn set_enforce_default(&mut self, enforce: bool) {
		self.enforce_default = enforce;
	}

	pub fn add_constraint(&mut self, constraint: PConstraint) {
		self.constraints.push(constraint);
	}

	/// Coerce and validate a single value.
	///
	/// A missing (or null) value falls back to the default; without a
	/// default, nullable parameters become null and anything else is an
	/// error.
	pub fn apply(&self, value: Option<&PValue>) -> Result<PValue, TemplateError> {
		let value = match value {
			None | Some(PValue::Null) => match &self.default {
				Some(default) => default.clone(),
				None if self.nullable => return Ok(PValue::Null),
				None => {
					return Err(TemplateError::MissingParameter {
						name: self.name.clone(),
					})
				}
			},
			Some(value) => value.clone(),
		};

		let coerced = self
			.ptype
			.coerce(&value)
			.map_err(|reason| TemplateError::InvalidType {
				name: self.name.clone(),
				reason,
			})?;

		if self.enforce_default {
			// a parameter with an enforced default always has one
			if let Some(default) = &self.default {
				if &coerced != default {
					return Err(TemplateError::DefaultEnforced {
						name: self.name.clone(),
						expected: default.to_string(),
						got: coerced.to_string(),
					});
				}
			}
		}

		for constraint in self.constraints.iter() {
			constraint
				.check(&coerced)
				.map_err(|reason| TemplateError::ConstraintViolation {
					name: self.name.clone(),
					constraint: constraint.to_string(),
					reason,
				})?;
		}

		Ok(coerced)
	}
}

/// Ordered collection of parameter templates describing one capture mode.
#[derive(Debug, Clone)]
pub struct CaptureTemplate {
	inner: OrderedMap<SmartString, PTemplate>,
}

impl CaptureTemplate {
	pub fn new() -> Self {
		Self {
			inner: OrderedMap::new(),
		}
	}

	pub fn add(&mut self, template: PTemplate) {
		self.inner.insert(template.name.clone(), template);
	}

	pub fn get(&self, name: &str) -> Result<&PTemplate, TemplateError> {
		self.inner
			.get(name)
			.ok_or_else(|| TemplateError::NoSuchTemplate { name: name.into() })
	}

	fn get_mut(&mut self, name: &str) -> Result<&mut PTemplate, TemplateError> {
		self.inner
			.get_mut(name)
			.ok_or_else(|| TemplateError::NoSuchTemplate { name: name.into() })
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

	pub fn set_default(&mut self, name: &str, default: PValue) -> Result<(), TemplateError> {
		self.get_mut(name)?.set_default(default);
		Ok(())
	}

	/// Pin a parameter to its default; deviating values are rejected.
	pub fn enforce_default(&mut self, name: &str) -> Result<(), TemplateError> {
		self.get_mut(name)?.set_enforce_default(true);
		Ok(())
	}

	pub fn add_constraint(
		&mut self,
		name: &str,
		constraint: PConstraint,
	) -> Result<(), TemplateError> {
		self.get_mut(name)?.add_constraint(constraint);
		Ok(())
	}

	/// Merge `other` into this template; entries of `other` win on conflict.
	pub fn extend_overriding(&mut self, other: &CaptureTemplate) {
		for template in other.inner.values() {
			self.add(template.clone());
		}
	}

	/// Validate a parameter set against this template.
	///
	/// Missing names are filled from defaults, every value is coerced and
	/// constrained, and names outside the template are rejected. The input
	/// is left untouched; a fresh, fully validated set comes back.
	pub fn apply_to(&self, parameters: &Parameters) -> Result<Parameters, TemplateError> {
		for (name, _) in parameters.iter() {
			if !self.contains(name) {
				return Err(TemplateError::UndefinedParameter {
					name: name.clone(),
					expected: self.names().iter().map(|s| s.to_string()).collect(),
				});
			}
		}

		let mut validated = Parameters::new();
		for template in self.inner.values() {
			let applied = template.apply(parameters.get(template.name()))?;
			validated
				.add(template.name(), applied)
				.expect("template names are unique");
		}
		Ok(validated)
	}

	pub fn iter(&self) -> impl Iterator<Item = &PTemplate> {
		self.inner.values()
	}
}

/// The base template for a well-known parameter name.
///
/// Modes assemble their capture templates from these and then adjust
/// defaults, enforcement and constraints as needed.
pub fn base_ptemplate(name: &str) -> Result<PTemplate, TemplateError> {
	let template = match name {
		pnames::AMPLITUDE => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(1.0)),
			"Peak amplitude of the synthesised signal.",
		),
		pnames::BANDWIDTH => PTemplate::new(
			name,
			PType::Float,
			None,
			"Bandwidth of the receiver in Hz.",
		)
		.nullable()
		.with_constraint(PConstraint::enforce_positive()),
		pnames::BATCH_SIZE => PTemplate::new(
			name,
			PType::Int,
			Some(PValue::Int(3)),
			"Seconds of I/Q samples per batch file.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::CENTER_FREQUENCY => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(95.8e6)),
			"Center frequency of the receiver in Hz.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::FREQUENCY => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(32000.0)),
			"Frequency of the synthesised signal in Hz.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::FREQUENCY_RESOLUTION => PTemplate::new(
			name,
			PType::Float,
			None,
			"Spectrograms are averaged down to this frequency resolution, in Hz.",
		)
		.nullable()
		.with_constraint(PConstraint::enforce_non_negative()),
		pnames::FREQUENCY_STEP => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(128000.0)),
			"Distance between adjacent sweep steps in Hz.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::INSTRUMENT => PTemplate::new(
			name,
			PType::Str,
			Some(PValue::Str("NOTSET".to_string())),
			"Corresponds to the FITS keyword INSTRUME.",
		),
		pnames::KEEP_SIGNAL => PTemplate::new(
			name,
			PType::Bool,
			Some(PValue::Bool(false)),
			"Keep the raw I/Q files after a spectrogram has been computed.",
		),
		pnames::MAX_FREQUENCY => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(512000.0)),
			"Upper bound of the swept frequency range in Hz.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::MAX_SAMPLES_PER_STEP => PTemplate::new(
			name,
			PType::Int,
			Some(PValue::Int(5000)),
			"Number of samples in the largest step of the staircase.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::MIN_FREQUENCY => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(64000.0)),
			"Lower bound of the swept frequency range in Hz.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::MIN_SAMPLES_PER_STEP => PTemplate::new(
			name,
			PType::Int,
			Some(PValue::Int(4000)),
			"Number of samples in the smallest step of the staircase.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::OBJECT => PTemplate::new(
			name,
			PType::Str,
			Some(PValue::Str("NOTSET".to_string())),
			"Corresponds to the FITS keyword OBJECT.",
		),
		pnames::OBS_ALT => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(0.0)),
			"Corresponds to the FITS keyword OBS_ALT.",
		),
		pnames::OBS_LAT => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(0.0)),
			"Corresponds to the FITS keyword OBS_LAT.",
		),
		pnames::OBS_LON => PTemplate::new(
			name,
			PType::Float,
			Some(PValue::Float(0.0)),
			"Corresponds to the FITS keyword OBS_LON.",
		),
		pnames::ORIGIN => PTemplate::new(
			name,
			PType::Str,
			Some(PValue::Str("spectre".to_string())),
			"Corresponds to the FITS keyword ORIGIN.",
		),
		pnames::SAMPLE_RATE => PTemplate::new(
			name,
			PType::Int,
			Some(PValue::Int(1000000)),
			"Samples per second in Hz.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::SAMPLES_PER_STEP => PTemplate::new(
			name,
			PType::Int,
			Some(PValue::Int(4096)),
			"Number of samples taken at each sweep step.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::TELESCOPE => PTemplate::new(
			name,
			PType::Str,
			Some(PValue::Str("NOTSET".to_string())),
			"Corresponds to the FITS keyword TELESCOP.",
		),
		pnames::TIME_RANGE => PTemplate::new(
			name,
			PType::Float,
			None,
			"Spectrograms are joined until this many seconds have been covered, then flushed.",
		)
		.nullable()
		.with_constraint(PConstraint::enforce_non_negative()),
		pnames::TIME_RESOLUTION => PTemplate::new(
			name,
			PType::Float,
			None,
			"Spectrograms are averaged down to this time resolution, in seconds.",
		)
		.nullable()
		.with_constraint(PConstraint::enforce_non_negative()),
		pnames::WATCH_EXTENSION => PTemplate::new(
			name,
			PType::Str,
			Some(PValue::Str("fc32".to_string())),
			"File extension watched for by the post-processing worker.",
		),
		pnames::WINDOW_HOP => PTemplate::new(
			name,
			PType::Int,
			Some(PValue::Int(512)),
			"How far the window is shifted, in samples, between successive spectrums.",
		)
		.with_constraint(PConstraint::enforce_positive()),
		pnames::WINDOW_SIZE => PTemplate::new(
			name,
			PType::Int,
			Some(PValue::Int(512)),
			"Size of the window, in samples, for the short-time FFT.",
		)
		.with_constraint(PConstraint::enforce_positive())
		.with_constraint(PConstraint::PowerOfTwo),
		pnames::WINDOW_TYPE => PTemplate::new(
			name,
			PType::Str,
			Some(PValue::Str("blackman".to_string())),
			"Window applied before each FFT.",
		)
		.with_constraint(PConstraint::one_of_strs(&["boxcar", "hann", "blackman"])),
		other => {
			return Err(TemplateError::NoSuchTemplate {
				name: other.into(),
			})
		}
	};
	Ok(template)
}

/// Build a capture template from base parameter templates.
pub fn make_base_capture_template(names: &[&str]) -> Result<CaptureTemplate, TemplateError> {
	let mut template = CaptureTemplate::new();
	for name in names {
		template.add(base_ptemplate(name)?);
	}
	Ok(template)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn window_size_template() -> PTemplate {
		base_ptemplate(pnames::WINDOW_SIZE).unwrap()
	}

	#[test]
	fn test_apply_coerces_strings() {
		let t = window_size_template();
		assert_eq!(
			t.apply(Some(&PValue::Str("512".to_string()))).unwrap(),
			PValue::Int(512)
		);
	}

	#[test]
	fn test_apply_rejects_bad_type() {
		let t = window_size_template();
		assert!(matches!(
			t.apply(Some(&PValue::Str("twelve".to_string()))),
			Err(TemplateError::InvalidType { .. })
		));
	}

	#[test]
	fn test_apply_runs_constraints_in_order() {
		let t = window_size_template();
		// fails the positivity bound before the power-of-two check
		match t.apply(Some(&PValue::Int(-2))) {
			Err(TemplateError::ConstraintViolation { constraint, .. }) => {
				assert!(constraint.starts_with("bound"), "got {}", constraint);
			}
			other => panic!("unexpected result: {:?}", other),
		}
		assert!(matches!(
			t.apply(Some(&PValue::Int(500))),
			Err(TemplateError::ConstraintViolation { .. })
		));
	}

	#[test]
	fn test_apply_uses_default_when_missing() {
		let t = window_size_template();
		assert_eq!(t.apply(None).unwrap(), PValue::Int(512));
	}

	#[test]
	fn test_missing_without_default() {
		let mut t = window_size_template();
		t.default = None;
		assert!(matches!(
			t.apply(None),
			Err(TemplateError::MissingParameter { .. })
		));
	}

	#[test]
	fn test_nullable_without_default_becomes_null() {
		let t = base_ptemplate(pnames::TIME_RESOLUTION).unwrap();
		assert_eq!(t.apply(None).unwrap(), PValue::Null);
		assert_eq!(t.apply(Some(&PValue::Null)).unwrap(), PValue::Null);
	}

	#[test]
	fn test_enforce_default() {
		let mut t = base_ptemplate(pnames::WATCH_EXTENSION).unwrap();
		t.set_enforce_default(true);
		assert_eq!(
			t.apply(Some(&PValue::Str("fc32".to_string()))).unwrap(),
			PValue::Str("fc32".to_string())
		);
		assert!(matches!(
			t.apply(Some(&PValue::Str("sc16".to_string()))),
			Err(TemplateError::DefaultEnforced { .. })
		));
	}

	#[test]
	fn test_capture_template_fills_and_validates() {
		let template = make_base_capture_template(&[
			pnames::SAMPLE_RATE,
			pnames::WINDOW_SIZE,
			pnames::WINDOW_TYPE,
		])
		.unwrap();
		let mut given = Parameters::new();
		given
			.add(pnames::SAMPLE_RATE, PValue::Str("128000".to_string()))
			.unwrap();
		let validated = template.apply_to(&given).unwrap();
		assert_eq!(validated.get_int(pnames::SAMPLE_RATE).unwrap(), 128000);
		assert_eq!(validated.get_int(pnames::WINDOW_SIZE).unwrap(), 512);
		assert_eq!(validated.get_str(pnames::WINDOW_TYPE).unwrap(), "blackman");
		assert_eq!(validated.len(), 3);
	}

	#[test]
	fn test_capture_template_rejects_unknown_names() {
		let template = make_base_capture_template(&[pnames::SAMPLE_RATE]).unwrap();
		let mut given = Parameters::new();
		given.add("gain", PValue::Int(20)).unwrap();
		assert!(matches!(
			template.apply_to(&given),
			Err(TemplateError::UndefinedParameter { .. })
		));
	}

	#[test]
	fn test_apply_to_is_idempotent() {
		let template = make_base_capture_template(&[
			pnames::SAMPLE_RATE,
			pnames::WINDOW_SIZE,
			pnames::TIME_RESOLUTION,
		])
		.unwrap();
		let mut given = Parameters::new();
		given
			.add(pnames::WINDOW_SIZE, PValue::Str("1024".to_string()))
			.unwrap();
		let once = template.apply_to(&given).unwrap();
		let twice = template.apply_to(&once).unwrap();
		assert_eq!(once, twice);
	}

	#[test]
	fn test_extend_overriding_prefers_other() {
		let mut a = make_base_capture_template(&[pnames::WINDOW_TYPE]).unwrap();
		let mut b = make_base_capture_template(&[pnames::WINDOW_TYPE]).unwrap();
		b.set_default(pnames::WINDOW_TYPE, PValue::Str("boxcar".to_string()))
			.unwrap();
		a.extend_overriding(&b);
		let validated = a.apply_to(&Parameters::new()).unwrap();
		assert_eq!(validated.get_str(pnames::WINDOW_TYPE).unwrap(), "boxcar");
	}
}
