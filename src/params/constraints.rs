use std::fmt;

use super::PValue;

/// A single check applied to a parameter value after type coercion.
///
/// Constraints compose left-to-right on a template; the first failure wins.
/// The `Err` payload is a human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub enum PConstraint {
	Bound {
		lower: Option<f64>,
		upper: Option<f64>,
		strict_lower: bool,
		strict_upper: bool,
	},
	OneOf(Vec<PValue>),
	PowerOfTwo,
}

impl PConstraint {
	/// Value must be strictly greater than zero.
	pub fn enforce_positive() -> Self {
		Self::Bound {
			lower: Some(0.0),
			upper: None,
			strict_lower: true,
			strict_upper: false,
		}
	}

	/// Value must be zero or greater.
	pub fn enforce_non_negative() -> Self {
		Self::Bound {
			lower: Some(0.0),
			upper: None,
			strict_lower: false,
			strict_upper: false,
		}
	}

	pub fn bound(lower: Option<f64>, upper: Option<f64>) -> Self {
		Self::Bound {
			lower,
			upper,
			strict_lower: false,
			strict_upper: false,
		}
	}

	pub fn one_of_strs(options: &[&str]) -> Self {
		Self::OneOf(
			options
				.iter()
				.map(|s| PValue::Str(s.to_string()))
				.collect(),
		)
	}

	pub fn check(&self, value: &PValue) -> Result<(), String> {
		match self {
			Self::Bound {
				lower,
				upper,
				strict_lower,
				strict_upper,
			} => {
				let v = match value.as_float() {
					Some(v) => v,
					None => {
						return Err(format!(
							"a bound applies to numeric values, got {}",
							value.type_name()
						))
					}
				};
				if let Some(lower) = lower {
					if *strict_lower && v <= *lower {
						return Err(format!(
							"value must be strictly greater than {}, got {}",
							lower, v
						));
					}
					if !*strict_lower && v < *lower {
						return Err(format!(
							"value must be greater than or equal to {}, got {}",
							lower, v
						));
					}
				}
				if let Some(upper) = upper {
					if *strict_upper && v >= *upper {
						return Err(format!(
							"value must be strictly less than {}, got {}",
							upper, v
						));
					}
					if !*strict_upper && v > *upper {
						return Err(format!(
							"value must be less than or equal to {}, got {}",
							upper, v
						));
					}
				}
				Ok(())
			}
			Self::OneOf(options) => {
				if options.iter().any(|o| o == value) {
					Ok(())
				} else {
					let rendered: Vec<String> =
						options.iter().map(|o| o.to_string()).collect();
					Err(format!(
						"value must be one of [{}], got {}",
						rendered.join(", "),
						value
					))
				}
			}
			Self::PowerOfTwo => {
				let v = match value.as_int() {
					Some(v) => v,
					None => {
						return Err(format!(
							"a power-of-two check applies to integers, got {}",
							value.type_name()
						))
					}
				};
				if v <= 0 || (v & (v - 1)) != 0 {
					Err(format!("value must be a power of two, got {}", v))
				} else {
					Ok(())
				}
			}
		}
	}
}

impl fmt::Display for PConstraint {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Bound {
				lower,
				upper,
				strict_lower,
				strict_upper,
			} => {
				f.write_str("bound(")?;
				match lower {
					Some(lower) if *strict_lower => write!(f, "> {}", lower)?,
					Some(lower) => write!(f, ">= {}", lower)?,
					None => (),
				}
				if lower.is_some() && upper.is_some() {
					f.write_str(", ")?;
				}
				match upper {
					Some(upper) if *strict_upper => write!(f, "< {}", upper)?,
					Some(upper) => write!(f, "<= {}", upper)?,
					None => (),
				}
				f.write_str(")")
			}
			Self::OneOf(options) => {
				let rendered: Vec<String> = options.iter().map(|o| o.to_string()).collect();
				write!(f, "one-of([{}])", rendered.join(", "))
			}
			Self::PowerOfTwo => f.write_str("power-of-two"),
		}
	}
}
