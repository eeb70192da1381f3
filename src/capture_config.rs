use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde_derive::{Deserialize, Serialize};

use crate::config::Paths;
use crate::params::{ParameterError, Parameters};

/// Substrings reserved for externally generated batch files.
const RESERVED_TAG_SUBSTRINGS: &[&str] = &["callisto"];

/// The on-disk shape of a capture config document.
#[derive(Debug, Serialize, Deserialize)]
struct Document {
	receiver_name: String,
	receiver_mode: String,
	parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug)]
pub enum ConfigError {
	InvalidTag {
		tag: String,
		reason: String,
	},
	AlreadyExists {
		path: PathBuf,
	},
	NotFound {
		tag: String,
		path: PathBuf,
	},
	Malformed {
		path: PathBuf,
		reason: String,
	},
	Parameter(ParameterError),
	Io(io::Error),
}

impl fmt::Display for ConfigError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidTag { tag, reason } => {
				write!(f, "invalid tag {:?}: {}", tag, reason)
			}
			Self::AlreadyExists { path } => {
				write!(
					f,
					"capture config {:?} already exists (use force to overwrite)",
					path
				)
			}
			Self::NotFound { tag, path } => {
				write!(f, "no capture config for tag {:?} at {:?}", tag, path)
			}
			Self::Malformed { path, reason } => {
				write!(f, "malformed capture config {:?}: {}", path, reason)
			}
			Self::Parameter(e) => write!(f, "{}", e),
			Self::Io(e) => write!(f, "{}", e),
		}
	}
}

impl Error for ConfigError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Parameter(e) => Some(e),
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ConfigError {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<ParameterError> for ConfigError {
	fn from(other: ParameterError) -> Self {
		Self::Parameter(other)
	}
}

/// Check a tag in its stored form.
///
/// The underscore separates the start time from the tag in batch file names,
/// so it can never appear inside a tag; a few substrings are reserved for
/// batch files produced by external instruments.
pub fn validate_tag(tag: &str) -> Result<(), ConfigError> {
	if tag.is_empty() {
		return Err(ConfigError::InvalidTag {
			tag: tag.to_string(),
			reason: "tags cannot be empty".to_string(),
		});
	}
	if tag.contains('_') {
		return Err(ConfigError::InvalidTag {
			tag: tag.to_string(),
			reason: "tags cannot contain an underscore".to_string(),
		});
	}
	for reserved in RESERVED_TAG_SUBSTRINGS {
		if tag.contains(reserved) {
			return Err(ConfigError::InvalidTag {
				tag: tag.to_string(),
				reason: format!("{:?} is a reserved substring", reserved),
			});
		}
	}
	Ok(())
}

/// The persisted document driving one capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
	tag: String,
	receiver_name: String,
	receiver_mode: String,
	parameters: Parameters,
}

impl CaptureConfig {
	pub fn new<T, N, M>(
		tag: T,
		receiver_name: N,
		receiver_mode: M,
		parameters: Parameters,
	) -> Result<Self, ConfigError>
	where
		T: Into<String>,
		N: Into<String>,
		M: Into<String>,
	{
		let tag = tag.into();
		validate_tag(&tag)?;
		Ok(Self {
			tag,
			receiver_name: receiver_name.into(),
			receiver_mode: receiver_mode.into(),
			parameters,
		})
	}

	pub fn tag(&self) -> &str {
		&self.tag
	}

	pub fn receiver_name(&self) -> &str {
		&self.receiver_name
	}

	pub fn receiver_mode(&self) -> &str {
		&self.receiver_mode
	}

	pub fn parameters(&self) -> &Parameters {
		&self.parameters
	}

	/// Persist as JSON under `configs/<tag>.json`.
	pub fn save(&self, paths: &Paths, force: bool) -> Result<PathBuf, ConfigError> {
		let path = paths.config_file(&self.tag);
		if path.exists() && !force {
			return Err(ConfigError::AlreadyExists { path });
		}
		let document = Document {
			receiver_name: self.receiver_name.clone(),
			receiver_mode: self.receiver_mode.clone(),
			parameters: self.parameters.to_json_object(),
		};
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let rendered = serde_json::to_string_pretty(&document)
			.expect("capture config documents always serialise");
		fs::write(&path, rendered)?;
		Ok(path)
	}

	/// Load the config stored under `tag`.
	pub fn load(paths: &Paths, tag: &str) -> Result<Self, ConfigError> {
		validate_tag(tag)?;
		let path = paths.config_file(tag);
		let raw = match fs::read_to_string(&path) {
			Ok(raw) => raw,
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				return Err(ConfigError::NotFound {
					tag: tag.to_string(),
					path,
				})
			}
			Err(e) => return Err(e.into()),
		};
		let document: Document =
			serde_json::from_str(&raw).map_err(|e| ConfigError::Malformed {
				path: path.clone(),
				reason: e.to_string(),
			})?;
		let parameters = Parameters::from_json_object(&document.parameters)?;

		Ok(Self {
			tag: tag.to_string(),
			receiver_name: document.receiver_name,
			receiver_mode: document.receiver_mode,
			parameters,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::params::PValue;

	fn some_parameters() -> Parameters {
		let mut p = Parameters::new();
		p.add("sample_rate", PValue::Int(128000)).unwrap();
		p.add("window_type", PValue::Str("boxcar".to_string()))
			.unwrap();
		p.add("time_resolution", PValue::Null).unwrap();
		p
	}

	#[test]
	fn test_tag_rules() {
		assert!(validate_tag("cosine-wave").is_ok());
		assert!(validate_tag("").is_err());
		assert!(validate_tag("cosine_wave").is_err());
		assert!(validate_tag("my-callisto-feed").is_err());
	}

	#[test]
	fn test_save_load_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();

		let config = CaptureConfig::new(
			"cosine-wave",
			"signal-generator",
			"cosine-wave",
			some_parameters(),
		)
		.unwrap();
		config.save(&paths, false).unwrap();

		let loaded = CaptureConfig::load(&paths, "cosine-wave").unwrap();
		assert_eq!(loaded.receiver_name(), "signal-generator");
		assert_eq!(loaded.receiver_mode(), "cosine-wave");
		assert_eq!(
			loaded.parameters().get_int("sample_rate").unwrap(),
			128000
		);
		assert!(loaded
			.parameters()
			.get("time_resolution")
			.unwrap()
			.is_null());
	}

	#[test]
	fn test_save_refuses_to_overwrite_without_force() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();

		let config = CaptureConfig::new(
			"cosine-wave",
			"signal-generator",
			"cosine-wave",
			some_parameters(),
		)
		.unwrap();
		config.save(&paths, false).unwrap();
		assert!(matches!(
			config.save(&paths, false),
			Err(ConfigError::AlreadyExists { .. })
		));
		assert!(config.save(&paths, true).is_ok());
	}

	#[test]
	fn test_load_missing_config() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		assert!(matches!(
			CaptureConfig::load(&paths, "nope"),
			Err(ConfigError::NotFound { .. })
		));
	}
}
