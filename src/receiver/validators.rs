use std::error::Error;
use std::fmt;

use crate::params::{pnames, ParameterError, Parameters};
use crate::stfft::{make_window, SfftError, WindowKind};

#[derive(Debug)]
pub enum ValidationError {
	Window(SfftError),
	WindowInterval {
		window_interval: f64,
		batch_size: f64,
	},
	NyquistViolation {
		sample_rate: f64,
		bandwidth: f64,
	},
	SweepGeometryInvalid {
		reason: String,
	},
	InvalidSignal {
		reason: String,
	},
	Parameter(ParameterError),
}

impl fmt::Display for ValidationError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Window(e) => write!(f, "{}", e),
			Self::WindowInterval {
				window_interval,
				batch_size,
			} => {
				write!(
					f,
					"the windowing interval of {} [s] exceeds the batch size of {} [s]",
					window_interval, batch_size
				)
			}
			Self::NyquistViolation {
				sample_rate,
				bandwidth,
			} => {
				write!(
					f,
					"Nyquist criterion not satisfied: sample rate {} [Hz] is below the bandwidth {} [Hz]",
					sample_rate, bandwidth
				)
			}
			Self::SweepGeometryInvalid { reason } => {
				write!(f, "invalid sweep geometry: {}", reason)
			}
			Self::InvalidSignal { reason } => {
				write!(f, "invalid signal parameters: {}", reason)
			}
			Self::Parameter(e) => write!(f, "{}", e),
		}
	}
}

impl Error for ValidationError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Window(e) => Some(e),
			Self::Parameter(e) => Some(e),
			_ => None,
		}
	}
}

impl From<SfftError> for ValidationError {
	fn from(other: SfftError) -> Self {
		Self::Window(other)
	}
}

impl From<ParameterError> for ValidationError {
	fn from(other: ParameterError) -> Self {
		Self::Parameter(other)
	}
}

/// A per-mode check run after the capture template has been applied.
pub type PValidator = fn(&Parameters) -> Result<(), ValidationError>;

/// The window must be constructible and fit inside one batch.
pub fn validate_window(parameters: &Parameters) -> Result<(), ValidationError> {
	let window_size = parameters.get_int(pnames::WINDOW_SIZE)? as usize;
	let window_type = parameters.get_str(pnames::WINDOW_TYPE)?;
	let sample_rate = parameters.get_float(pnames::SAMPLE_RATE)?;
	let batch_size = parameters.get_float(pnames::BATCH_SIZE)?;

	let kind = window_type.parse::<WindowKind>()?;
	make_window(kind, window_size)?;

	let window_interval = window_size as f64 / sample_rate;
	if window_interval > batch_size {
		return Err(ValidationError::WindowInterval {
			window_interval,
			batch_size,
		});
	}
	Ok(())
}

/// The sample rate must cover the bandwidth.
pub fn validate_nyquist_criterion(parameters: &Parameters) -> Result<(), ValidationError> {
	let sample_rate = parameters.get_float(pnames::SAMPLE_RATE)?;
	let bandwidth = parameters.get_float(pnames::BANDWIDTH)?;
	if sample_rate < bandwidth {
		return Err(ValidationError::NyquistViolation {
			sample_rate,
			bandwidth,
		});
	}
	Ok(())
}

pub fn num_steps_per_sweep(
	min_frequency: f64,
	max_frequency: f64,
	sample_rate: f64,
	frequency_step: f64,
) -> i64 {
	((max_frequency - min_frequency + sample_rate / 2.0) / frequency_step).floor() as i64
}

/// Geometry checks shared by swept-capture modes: more than one step per
/// sweep, spectrally non-overlapping steps, and a whole sweep fitting into
/// one batch.
pub fn validate_sweep_geometry(parameters: &Parameters) -> Result<(), ValidationError> {
	let min_frequency = parameters.get_float(pnames::MIN_FREQUENCY)?;
	let max_frequency = parameters.get_float(pnames::MAX_FREQUENCY)?;
	let sample_rate = parameters.get_float(pnames::SAMPLE_RATE)?;
	let frequency_step = parameters.get_float(pnames::FREQUENCY_STEP)?;
	let samples_per_step = parameters.get_float(pnames::MAX_SAMPLES_PER_STEP)?;
	let batch_size = parameters.get_float(pnames::BATCH_SIZE)?;
	let window_size = parameters.get_float(pnames::WINDOW_SIZE)?;

	if min_frequency >= max_frequency {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"the minimum frequency {} [Hz] must lie below the maximum {} [Hz]",
				min_frequency, max_frequency
			),
		});
	}

	let num_steps = num_steps_per_sweep(min_frequency, max_frequency, sample_rate, frequency_step);
	if num_steps <= 1 {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!("need strictly more than one step per sweep, computed {}", num_steps),
		});
	}

	if frequency_step < sample_rate {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"steps overlap spectrally: the frequency step {} [Hz] is below the sample rate {} [Hz]",
				frequency_step, sample_rate
			),
		});
	}

	let sweep_interval = num_steps as f64 * samples_per_step / sample_rate;
	if sweep_interval > batch_size {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"a whole sweep takes {} [s], which does not fit the batch size of {} [s]",
				sweep_interval, batch_size
			),
		});
	}

	if window_size >= samples_per_step {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"the window size {} [samples] must be strictly below the samples per step {}",
				window_size, samples_per_step
			),
		});
	}

	Ok(())
}
