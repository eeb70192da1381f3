use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDateTime, Timelike, Utc};

use log::info;

use smartstring::alias::String as SmartString;

use crate::capture_config::{CaptureConfig, ConfigError};
use crate::config::Paths;
use crate::jobs::Worker;
use crate::params::{CaptureTemplate, OrderedMap, ParameterError, Parameters, TemplateError};
use crate::postproc::{start_post_processor, HandlerSettings, ProcessingError};

pub mod signal_generator;
pub mod validators;

pub use validators::{PValidator, ValidationError};

#[derive(Debug)]
pub enum ReceiverError {
	ReceiverNotFound {
		name: String,
		expected: Vec<&'static str>,
	},
	ModeNotFound {
		receiver: String,
		mode: String,
		expected: Vec<String>,
	},
	NoActiveMode {
		receiver: String,
	},
	Template(TemplateError),
	Validation(ValidationError),
	Config(ConfigError),
	Processing(ProcessingError),
	Parameter(ParameterError),
	Io(io::Error),
}

impl fmt::Display for ReceiverError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::ReceiverNotFound { name, expected } => {
				write!(
					f,
					"no receiver named {:?}; expected one of [{}]",
					name,
					expected.join(", ")
				)
			}
			Self::ModeNotFound {
				receiver,
				mode,
				expected,
			} => {
				write!(
					f,
					"receiver {:?} has no mode {:?}; expected one of [{}]",
					receiver,
					mode,
					expected.join(", ")
				)
			}
			Self::NoActiveMode { receiver } => {
				write!(f, "receiver {:?} has no active mode set", receiver)
			}
			Self::Template(e) => write!(f, "{}", e),
			Self::Validation(e) => write!(f, "{}", e),
			Self::Config(e) => write!(f, "{}", e),
			Self::Processing(e) => write!(f, "{}", e),
			Self::Parameter(e) => write!(f, "{}", e),
			Self::Io(e) => write!(f, "{}", e),
		}
	}
}

impl Error for ReceiverError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Template(e) => Some(e),
			Self::Validation(e) => Some(e),
			Self::Config(e) => Some(e),
			Self::Processing(e) => Some(e),
			Self::Parameter(e) => Some(e),
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<TemplateError> for ReceiverError {
	fn from(other: TemplateError) -> Self {
		Self::Template(other)
	}
}

impl From<ValidationError> for ReceiverError {
	fn from(other: ValidationError) -> Self {
		Self::Validation(other)
	}
}

impl From<ConfigError> for ReceiverError {
	fn from(other: ConfigError) -> Self {
		Self::Config(other)
	}
}

impl From<ProcessingError> for ReceiverError {
	fn from(other: ProcessingError) -> Self {
		Self::Processing(other)
	}
}

impl From<ParameterError> for ReceiverError {
	fn from(other: ParameterError) -> Self {
		Self::Parameter(other)
	}
}

impl From<io::Error> for ReceiverError {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

/// One producer of batch files.
///
/// A vendor implementation wraps the radio's DSP graph; the built-in signal
/// generator synthesises its samples. Either way, a run consists of writing
/// one closed batch per interval until the surrounding worker is killed.
pub trait Flowgraph: Send {
	/// Seconds of signal covered by each produced batch.
	fn batch_interval(&self) -> Duration;

	/// Produce the batch starting at `start`: write its files and close
	/// them before returning.
	fn write_batch(&mut self, start: NaiveDateTime) -> Result<(), ReceiverError>;
}

type FlowgraphFactory =
	fn(&Paths, &str, &Parameters) -> Result<Box<dyn Flowgraph>, ReceiverError>;

/// Everything a receiver binds to one operating mode.
pub struct Mode {
	name: String,
	/// Swept modes produce a `.hdr` sidecar next to the raw samples.
	swept: bool,
	capture_template: CaptureTemplate,
	pvalidator: PValidator,
	flowgraph_factory: FlowgraphFactory,
}

impl Mode {
	pub fn new<N: Into<String>>(
		name: N,
		swept: bool,
		capture_template: CaptureTemplate,
		pvalidator: PValidator,
		flowgraph_factory: FlowgraphFactory,
	) -> Self {
		Self {
			name: name.into(),
			swept,
			capture_template,
			pvalidator,
			flowgraph_factory,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn capture_template(&self) -> &CaptureTemplate {
		&self.capture_template
	}
}

impl fmt::Debug for Mode {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Mode")
			.field("name", &self.name)
			.field("swept", &self.swept)
			.finish()
	}
}

/// A named set of operating modes plus published operating ranges.
pub struct Receiver {
	name: String,
	modes: OrderedMap<SmartString, Mode>,
	active_mode: Option<String>,
	specs: Vec<(&'static str, f64)>,
}

impl Receiver {
	pub fn new<N: Into<String>>(name: N, specs: Vec<(&'static str, f64)>) -> Self {
		Self {
			name: name.into(),
			modes: OrderedMap::new(),
			active_mode: None,
			specs,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn specs(&self) -> &[(&'static str, f64)] {
		&self.specs
	}

	pub fn get_spec(&self, name: &str) -> Option<f64> {
		self.specs
			.iter()
			.find(|(spec_name, _)| *spec_name == name)
			.map(|(_, value)| *value)
	}

	pub fn add_mode(&mut self, mode: Mode) {
		self.modes.insert(mode.name.as_str().into(), mode);
	}

	pub fn mode_names(&self) -> Vec<&str> {
		self.modes.keys().map(|k| k.as_str()).collect()
	}

	pub fn get_mode(&self, name: &str) -> Result<&Mode, ReceiverError> {
		self.modes
			.get(name)
			.ok_or_else(|| ReceiverError::ModeNotFound {
				receiver: self.name.clone(),
				mode: name.to_string(),
				expected: self.mode_names().iter().map(|s| s.to_string()).collect(),
			})
	}

	pub fn set_active_mode(&mut self, name: &str) -> Result<(), ReceiverError> {
		self.get_mode(name)?;
		self.active_mode = Some(name.to_string());
		Ok(())
	}

	pub fn active_mode(&self) -> Option<&str> {
		self.active_mode.as_deref()
	}

	fn active(&self) -> Result<&Mode, ReceiverError> {
		let name = self
			.active_mode
			.as_deref()
			.ok_or_else(|| ReceiverError::NoActiveMode {
				receiver: self.name.clone(),
			})?;
		self.get_mode(name)
	}

	pub fn capture_template(&self) -> Result<&CaptureTemplate, ReceiverError> {
		Ok(self.active()?.capture_template())
	}

	/// Run the active mode's full validation gauntlet: the capture template
	/// first, the mode's parameter validator second.
	pub fn validate(&self, parameters: &Parameters) -> Result<Parameters, ReceiverError> {
		let mode = self.active()?;
		let validated = mode.capture_template.apply_to(parameters)?;
		(mode.pvalidator)(&validated)?;
		Ok(validated)
	}

	/// Validate and persist a capture config for `tag`.
	pub fn write_config(
		&self,
		paths: &Paths,
		tag: &str,
		parameters: &Parameters,
		force: bool,
	) -> Result<PathBuf, ReceiverError> {
		let mode = self.active()?;
		let validated = self.validate(parameters)?;
		let config = CaptureConfig::new(tag, self.name.as_str(), mode.name.as_str(), validated)?;
		Ok(config.save(paths, force)?)
	}

	pub fn read_config(paths: &Paths, tag: &str) -> Result<CaptureConfig, ReceiverError> {
		Ok(CaptureConfig::load(paths, tag)?)
	}

	fn mode_for_config<'m>(&'m self, config: &CaptureConfig) -> Result<&'m Mode, ReceiverError> {
		if config.receiver_name() != self.name {
			return Err(ReceiverError::ReceiverNotFound {
				name: config.receiver_name().to_string(),
				expected: vec![],
			});
		}
		self.get_mode(config.receiver_mode())
	}

	/// Run the capture side of a session: one batch per interval, forever.
	///
	/// Returns only on error; termination comes from the surrounding worker
	/// being killed.
	pub async fn activate_flowgraph(
		&self,
		paths: &Paths,
		config: &CaptureConfig,
	) -> Result<(), ReceiverError> {
		let mode = self.mode_for_config(config)?;
		let validated = mode.capture_template.apply_to(config.parameters())?;
		let mut flowgraph = (mode.flowgraph_factory)(paths, config.tag(), &validated)?;
		info!(
			"starting capture with receiver {:?} in mode {:?} under tag {:?}",
			self.name,
			mode.name,
			config.tag()
		);
		loop {
			let start = Utc::now()
				.naive_utc()
				.with_nanosecond(0)
				.expect("zero nanoseconds is always valid");
			flowgraph.write_batch(start)?;
			tokio::time::sleep(flowgraph.batch_interval()).await;
		}
	}

	/// Run the post-processing side of a session: watch the batches tree
	/// and turn everything the capture side writes into spectrograms.
	pub async fn activate_post_processing(
		&self,
		paths: &Paths,
		config: &CaptureConfig,
	) -> Result<(), ReceiverError> {
		let mode = self.mode_for_config(config)?;
		let validated = mode.capture_template.apply_to(config.parameters())?;
		let settings = HandlerSettings::from_parameters(config.tag(), &validated, mode.swept)?;
		Ok(start_post_processor(paths.clone(), settings).await?)
	}
}

impl fmt::Debug for Receiver {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Receiver")
			.field("name", &self.name)
			.field("modes", &self.mode_names())
			.field("active_mode", &self.active_mode)
			.finish()
	}
}

pub const RECEIVER_NAMES: &[&str] = &[signal_generator::RECEIVER_NAME];

/// Look a receiver up in the static registry.
pub fn get_receiver(name: &str) -> Result<Receiver, ReceiverError> {
	match name {
		signal_generator::RECEIVER_NAME => Ok(signal_generator::build()),
		other => Err(ReceiverError::ReceiverNotFound {
			name: other.to_string(),
			expected: RECEIVER_NAMES.to_vec(),
		}),
	}
}

/// The capture worker for a tag: loads the config and drives the flowgraph.
pub fn capture_worker(paths: Paths, tag: String) -> Worker {
	Worker::new("capture", move || {
		let paths = paths.clone();
		let tag = tag.clone();
		async move {
			let config = CaptureConfig::load(&paths, &tag)?;
			let receiver = get_receiver(config.receiver_name())?;
			receiver.activate_flowgraph(&paths, &config).await
		}
	})
}

/// The post-processing worker for a tag: loads the config and mounts the
/// filesystem watcher.
pub fn post_processing_worker(paths: Paths, tag: String) -> Worker {
	Worker::new("post_processing", move || {
		let paths = paths.clone();
		let tag = tag.clone();
		async move {
			let config = CaptureConfig::load(&paths, &tag)?;
			let receiver = get_receiver(config.receiver_name())?;
			receiver.activate_post_processing(&paths, &config).await
		}
	})
}
