use std::f64::consts::PI;
use std::fs;
use std::time::Duration;

use chrono::NaiveDateTime;

use log::{debug, info};

use rustfft::num_complex::Complex;

use crate::batch::{extensions, format_batch_file_name, write_fc32, write_hdr, write_sc16, IQMetadata};
use crate::config::{format_datetime, Paths};
use crate::params::{
	make_base_capture_template, pnames, CaptureTemplate, PValue, Parameters,
};
use crate::spectrogram::{DynamicSpectra, Spectrogram, SpectrumUnit};
use crate::stfft::{fftfreq, fftshift};

use super::validators::{self, ValidationError};
use super::{Flowgraph, Mode, Receiver, ReceiverError};

pub const RECEIVER_NAME: &str = "signal-generator";

pub const COSINE_WAVE_MODE: &str = "cosine-wave";
pub const CONSTANT_STAIRCASE_MODE: &str = "constant-staircase";

/// The parameters every fixed-center-frequency event handler needs.
const EVENT_HANDLER_PNAMES: &[&str] = &[
	pnames::BATCH_SIZE,
	pnames::CENTER_FREQUENCY,
	pnames::SAMPLE_RATE,
	pnames::FREQUENCY_RESOLUTION,
	pnames::TIME_RESOLUTION,
	pnames::TIME_RANGE,
	pnames::WATCH_EXTENSION,
	pnames::WINDOW_HOP,
	pnames::WINDOW_SIZE,
	pnames::WINDOW_TYPE,
	pnames::KEEP_SIGNAL,
	pnames::ORIGIN,
	pnames::TELESCOPE,
	pnames::INSTRUMENT,
	pnames::OBJECT,
	pnames::OBS_ALT,
	pnames::OBS_LAT,
	pnames::OBS_LON,
];

fn event_handler_template(watch_extension: &str) -> CaptureTemplate {
	let mut template = make_base_capture_template(EVENT_HANDLER_PNAMES)
		.expect("the handler parameter names all have base templates");
	template
		.set_default(
			pnames::WATCH_EXTENSION,
			PValue::Str(watch_extension.to_string()),
		)
		.expect("watch_extension is part of the template");
	template
		.enforce_default(pnames::WATCH_EXTENSION)
		.expect("watch_extension is part of the template");
	template
}

/// Flowgraph template first, event-handler template layered over it; the
/// handler's entries win on conflicts.
fn cosine_wave_template() -> CaptureTemplate {
	let mut template = make_base_capture_template(&[pnames::AMPLITUDE, pnames::FREQUENCY])
		.expect("the flowgraph parameter names all have base templates");
	template.extend_overriding(&event_handler_template(extensions::FC32));
	// the analytical solution only exists for an unwindowed transform
	template
		.set_default(pnames::WINDOW_TYPE, PValue::Str("boxcar".to_string()))
		.expect("window_type is part of the template");
	template
		.enforce_default(pnames::WINDOW_TYPE)
		.expect("window_type is part of the template");
	template
}

fn constant_staircase_template() -> CaptureTemplate {
	let mut template = make_base_capture_template(&[
		pnames::MIN_SAMPLES_PER_STEP,
		pnames::MAX_SAMPLES_PER_STEP,
		pnames::FREQUENCY_STEP,
		pnames::MIN_FREQUENCY,
		pnames::MAX_FREQUENCY,
	])
	.expect("the flowgraph parameter names all have base templates");
	template.extend_overriding(&event_handler_template(extensions::SC16));
	template
		.set_default(pnames::WINDOW_TYPE, PValue::Str("boxcar".to_string()))
		.expect("window_type is part of the template");
	template
		.enforce_default(pnames::WINDOW_TYPE)
		.expect("window_type is part of the template");
	template
}

/// The synthesised cosine only has a clean analytical spectrum when the
/// window spans a whole number of cycles.
fn validate_cosine_wave(parameters: &Parameters) -> Result<(), ValidationError> {
	validators::validate_window(parameters)?;

	let sample_rate = parameters.get_int(pnames::SAMPLE_RATE)? as f64;
	let frequency = parameters.get_float(pnames::FREQUENCY)?;
	let window_size = parameters.get_int(pnames::WINDOW_SIZE)? as f64;

	if sample_rate % frequency != 0.0 {
		return Err(ValidationError::InvalidSignal {
			reason: format!(
				"the sample rate {} [Hz] must be an integer multiple of the frequency {} [Hz]",
				sample_rate, frequency
			),
		});
	}
	let a = sample_rate / frequency;
	if a < 2.0 {
		return Err(ValidationError::InvalidSignal {
			reason: format!(
				"the ratio of sample rate over frequency must be at least two, got {}",
				a
			),
		});
	}
	if window_size % a != 0.0 {
		return Err(ValidationError::InvalidSignal {
			reason: format!(
				"the window must span a whole number of cycles, got {} per window",
				window_size / a
			),
		});
	}
	Ok(())
}

fn validate_constant_staircase(parameters: &Parameters) -> Result<(), ValidationError> {
	validators::validate_window(parameters)?;

	let sample_rate = parameters.get_float(pnames::SAMPLE_RATE)?;
	let frequency_step = parameters.get_float(pnames::FREQUENCY_STEP)?;
	let min_samples = parameters.get_int(pnames::MIN_SAMPLES_PER_STEP)?;
	let max_samples = parameters.get_int(pnames::MAX_SAMPLES_PER_STEP)?;
	let window_size = parameters.get_int(pnames::WINDOW_SIZE)?;
	let min_frequency = parameters.get_float(pnames::MIN_FREQUENCY)?;
	let max_frequency = parameters.get_float(pnames::MAX_FREQUENCY)?;

	if frequency_step != sample_rate {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"the frequency step {} [Hz] must equal the sample rate {} [Hz]",
				frequency_step, sample_rate
			),
		});
	}
	if min_samples > max_samples {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"minimum samples per step {} exceeds the maximum {}",
				min_samples, max_samples
			),
		});
	}
	if window_size >= min_samples {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"the window size {} [samples] must be strictly below the smallest step of {}",
				window_size, min_samples
			),
		});
	}
	if min_frequency >= max_frequency {
		return Err(ValidationError::SweepGeometryInvalid {
			reason: format!(
				"the minimum frequency {} [Hz] must lie below the maximum {} [Hz]",
				min_frequency, max_frequency
			),
		});
	}
	Ok(())
}

/// Synthesises `amplitude * cos(2 pi frequency t)` at baseband.
struct CosineWave {
	paths: Paths,
	tag: String,
	amplitude: f64,
	frequency: f64,
	sample_rate: u32,
	batch_size: u64,
}

impl Flowgraph for CosineWave {
	fn batch_interval(&self) -> Duration {
		Duration::from_secs(self.batch_size)
	}

	fn write_batch(&mut self, start: NaiveDateTime) -> Result<(), ReceiverError> {
		let num_samples = self.sample_rate as u64 * self.batch_size;
		let samples: Vec<Complex<f32>> = (0..num_samples)
			.map(|n| {
				let t = n as f64 / self.sample_rate as f64;
				Complex {
					re: (self.amplitude * (2.0 * PI * self.frequency * t).cos()) as f32,
					im: 0.0,
				}
			})
			.collect();

		let parent = self.paths.batch_dir_for_date(start.date());
		fs::create_dir_all(&parent)?;
		let path = parent.join(format_batch_file_name(
			&format_datetime(start),
			&self.tag,
			extensions::FC32,
		));
		debug!("writing {} samples to {:?}", samples.len(), path);
		write_fc32(&path, &samples)?;
		Ok(())
	}
}

fn make_cosine_wave(
	paths: &Paths,
	tag: &str,
	parameters: &Parameters,
) -> Result<Box<dyn Flowgraph>, ReceiverError> {
	Ok(Box::new(CosineWave {
		paths: paths.clone(),
		tag: tag.to_string(),
		amplitude: parameters.get_float(pnames::AMPLITUDE)?,
		frequency: parameters.get_float(pnames::FREQUENCY)?,
		sample_rate: parameters.get_int(pnames::SAMPLE_RATE)? as u32,
		batch_size: parameters.get_int(pnames::BATCH_SIZE)? as u64,
	}))
}

/// Synthesises a staircase of constant-magnitude steps, the magnitude
/// climbing by one per step, together with the swept-capture sidecar.
struct ConstantStaircase {
	paths: Paths,
	tag: String,
	sample_rate: u32,
	batch_size: u64,
	min_samples_per_step: i32,
	max_samples_per_step: i32,
	frequency_step: f64,
	min_frequency: f64,
	max_frequency: f64,
}

impl ConstantStaircase {
	fn sweep(&self) -> (Vec<(i16, i16)>, IQMetadata) {
		let num_steps = validators::num_steps_per_sweep(
			self.min_frequency,
			self.max_frequency,
			self.sample_rate as f64,
			self.frequency_step,
		)
		.max(1) as usize;
		let span = (self.max_samples_per_step - self.min_samples_per_step + 1).max(1);

		let mut samples = Vec::new();
		let mut center_frequencies = Vec::with_capacity(num_steps);
		let mut num_samples = Vec::with_capacity(num_steps);
		for step in 0..num_steps {
			let count = self.min_samples_per_step + (step as i32 % span);
			let magnitude = (step + 1) as i16;
			for _ in 0..count {
				samples.push((magnitude, 0));
			}
			center_frequencies.push((self.min_frequency + step as f64 * self.frequency_step) as f32);
			num_samples.push(count);
		}
		(
			samples,
			IQMetadata {
				center_frequencies,
				num_samples,
			},
		)
	}
}

impl Flowgraph for ConstantStaircase {
	fn batch_interval(&self) -> Duration {
		Duration::from_secs(self.batch_size)
	}

	fn write_batch(&mut self, start: NaiveDateTime) -> Result<(), ReceiverError> {
		let capacity = self.sample_rate as usize * self.batch_size as usize;
		let (sweep_samples, sweep_metadata) = self.sweep();

		// as many whole sweeps as fit the batch, at least one
		let mut samples = sweep_samples.clone();
		let mut metadata = sweep_metadata.clone();
		while samples.len() + sweep_samples.len() <= capacity {
			samples.extend_from_slice(&sweep_samples);
			metadata
				.center_frequencies
				.extend_from_slice(&sweep_metadata.center_frequencies);
			metadata
				.num_samples
				.extend_from_slice(&sweep_metadata.num_samples);
		}

		let parent = self.paths.batch_dir_for_date(start.date());
		fs::create_dir_all(&parent)?;
		let base_time = format_datetime(start);
		// the sidecar goes first so it is in place before the watched file
		// appears
		let hdr_path = parent.join(format_batch_file_name(
			&base_time,
			&self.tag,
			extensions::HDR,
		));
		write_hdr(&hdr_path, &metadata)?;
		let sc16_path = parent.join(format_batch_file_name(
			&base_time,
			&self.tag,
			extensions::SC16,
		));
		debug!("writing {} samples to {:?}", samples.len(), sc16_path);
		write_sc16(&sc16_path, &samples)?;
		Ok(())
	}
}

fn make_constant_staircase(
	paths: &Paths,
	tag: &str,
	parameters: &Parameters,
) -> Result<Box<dyn Flowgraph>, ReceiverError> {
	Ok(Box::new(ConstantStaircase {
		paths: paths.clone(),
		tag: tag.to_string(),
		sample_rate: parameters.get_int(pnames::SAMPLE_RATE)? as u32,
		batch_size: parameters.get_int(pnames::BATCH_SIZE)? as u64,
		min_samples_per_step: parameters.get_int(pnames::MIN_SAMPLES_PER_STEP)? as i32,
		max_samples_per_step: parameters.get_int(pnames::MAX_SAMPLES_PER_STEP)? as i32,
		frequency_step: parameters.get_float(pnames::FREQUENCY_STEP)?,
		min_frequency: parameters.get_float(pnames::MIN_FREQUENCY)?,
		max_frequency: parameters.get_float(pnames::MAX_FREQUENCY)?,
	}))
}

/// The spectrogram a `cosine-wave` session is expected to produce.
///
/// The synthesised cosine spans a whole number of cycles per window, so the
/// transform concentrates `amplitude * window_size / 2` into the two bins at
/// the signal frequency and leaves everything else empty, constant in time.
pub fn cosine_wave_analytical(
	num_spectrums: usize,
	parameters: &Parameters,
	start_datetime: NaiveDateTime,
	tag: &str,
) -> Result<Spectrogram, ReceiverError> {
	let window_size = parameters.get_int(pnames::WINDOW_SIZE)? as usize;
	let window_hop = parameters.get_int(pnames::WINDOW_HOP)? as usize;
	let sample_rate = parameters.get_int(pnames::SAMPLE_RATE)? as u32;
	let frequency = parameters.get_float(pnames::FREQUENCY)?;
	let amplitude = parameters.get_float(pnames::AMPLITUDE)?;
	let center_frequency = parameters.get_float(pnames::CENTER_FREQUENCY)?;

	let a = sample_rate as f64 / frequency;
	let p = (window_size as f64 / a) as usize;
	let spectral_amplitude = (amplitude * window_size as f64 / 2.0) as f32;

	let mut natural = vec![0.0f32; window_size];
	natural[p] = spectral_amplitude;
	natural[window_size - p] = spectral_amplitude;
	let split = (window_size + 1) / 2;
	let mut spectrum = Vec::with_capacity(window_size);
	spectrum.extend_from_slice(&natural[split..]);
	spectrum.extend_from_slice(&natural[..split]);

	let mut dynamic_spectra = DynamicSpectra::zeros(window_size, num_spectrums);
	for time_index in 0..num_spectrums {
		dynamic_spectra.fill_column(time_index, &spectrum);
	}

	let times: Vec<f64> = (0..num_spectrums)
		.map(|k| (k * window_hop) as f64 / sample_rate as f64)
		.collect();
	let frequencies: Vec<f64> = fftshift(&fftfreq(window_size, sample_rate))
		.into_iter()
		.map(|f| f + center_frequency)
		.collect();

	Ok(Spectrogram::new(
		dynamic_spectra,
		times,
		frequencies,
		SpectrumUnit::Amplitude,
		start_datetime,
		tag,
	)
	.map_err(crate::postproc::ProcessingError::Spectrogram)?)
}

/// Build the signal-generator receiver: an entirely software-defined
/// receiver producing deterministic batches for testing the pipeline.
pub fn build() -> Receiver {
	info!("building the {} receiver", RECEIVER_NAME);
	let mut receiver = Receiver::new(
		RECEIVER_NAME,
		vec![
			("min_sample_rate", 8000.0),
			("max_sample_rate", 2000000.0),
			("min_frequency", 1000.0),
			("max_frequency", 1000000.0),
		],
	);
	receiver.add_mode(Mode::new(
		COSINE_WAVE_MODE,
		false,
		cosine_wave_template(),
		validate_cosine_wave,
		make_cosine_wave,
	));
	receiver.add_mode(Mode::new(
		CONSTANT_STAIRCASE_MODE,
		true,
		constant_staircase_template(),
		validate_constant_staircase,
		make_constant_staircase,
	));
	receiver
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::batch::Batches;
	use crate::capture_config::CaptureConfig;
	use crate::config::parse_datetime;
	use crate::jobs::Job;
	use crate::postproc::{EventHandler, HandlerSettings};
	use crate::receiver::get_receiver;

	fn cosine_parameters() -> Parameters {
		let mut p = Parameters::new();
		for (name, value) in [
			(pnames::AMPLITUDE, PValue::Float(2.0)),
			(pnames::FREQUENCY, PValue::Float(32000.0)),
			(pnames::SAMPLE_RATE, PValue::Int(128000)),
			(pnames::WINDOW_SIZE, PValue::Int(512)),
			(pnames::WINDOW_HOP, PValue::Int(512)),
			(pnames::WINDOW_TYPE, PValue::Str("boxcar".to_string())),
			(pnames::BATCH_SIZE, PValue::Int(1)),
			(pnames::CENTER_FREQUENCY, PValue::Float(95.8e6)),
		] {
			p.add(name, value).unwrap();
		}
		p
	}

	fn validated_cosine_parameters() -> Parameters {
		let mut receiver = get_receiver(RECEIVER_NAME).unwrap();
		receiver.set_active_mode(COSINE_WAVE_MODE).unwrap();
		receiver.validate(&cosine_parameters()).unwrap()
	}

	fn with_override(parameters: &Parameters, name: &str, value: PValue) -> Parameters {
		let mut replaced = Parameters::new();
		for (existing, existing_value) in parameters.iter() {
			let v = if existing.as_str() == name {
				value.clone()
			} else {
				existing_value.clone()
			};
			replaced.add(existing.clone(), v).unwrap();
		}
		replaced
	}

	#[test]
	fn test_cosine_template_fills_handler_defaults() {
		let validated = validated_cosine_parameters();
		assert_eq!(validated.get_str(pnames::WATCH_EXTENSION).unwrap(), "fc32");
		assert_eq!(validated.get_str(pnames::WINDOW_TYPE).unwrap(), "boxcar");
		assert_eq!(validated.get_str(pnames::ORIGIN).unwrap(), "spectre");
		assert!(validated.get(pnames::TIME_RANGE).unwrap().is_null());
	}

	#[test]
	fn test_cosine_validator_rejects_fractional_cycles() {
		let mut receiver = get_receiver(RECEIVER_NAME).unwrap();
		receiver.set_active_mode(COSINE_WAVE_MODE).unwrap();
		// 128000 / 33000 is not an integer
		let p = with_override(
			&cosine_parameters(),
			pnames::FREQUENCY,
			PValue::Float(33000.0),
		);
		assert!(matches!(
			receiver.validate(&p),
			Err(ReceiverError::Validation(ValidationError::InvalidSignal { .. }))
		));
	}

	#[test]
	fn test_cosine_mode_pins_the_window_type() {
		let mut receiver = get_receiver(RECEIVER_NAME).unwrap();
		receiver.set_active_mode(COSINE_WAVE_MODE).unwrap();
		let p = with_override(
			&cosine_parameters(),
			pnames::WINDOW_TYPE,
			PValue::Str("hann".to_string()),
		);
		assert!(matches!(
			receiver.validate(&p),
			Err(ReceiverError::Template(_))
		));
	}

	#[test]
	fn test_cosine_flowgraph_writes_a_closed_batch() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();
		let validated = validated_cosine_parameters();
		let mut flowgraph = make_cosine_wave(&paths, "cosine-wave", &validated).unwrap();

		let start = parse_datetime("2025-06-01T00:00:00").unwrap();
		flowgraph.write_batch(start).unwrap();
		assert_eq!(flowgraph.batch_interval(), Duration::from_secs(1));

		let batches = Batches::new(paths, "cosine-wave").unwrap();
		assert_eq!(batches.len(), 1);
		let iq = batches.list()[0].read_iq(extensions::FC32).unwrap();
		assert_eq!(iq.len(), 128000);
		// cos at t = 0
		assert!((iq[0].re - 2.0).abs() < 1e-6);
		assert_eq!(iq[0].im, 0.0);
	}

	#[test]
	fn test_staircase_flowgraph_sidecar_agrees_with_stream() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();
		let mut receiver = get_receiver(RECEIVER_NAME).unwrap();
		receiver.set_active_mode(CONSTANT_STAIRCASE_MODE).unwrap();
		let mut p = Parameters::new();
		p.add(pnames::SAMPLE_RATE, PValue::Int(128000)).unwrap();
		p.add(pnames::FREQUENCY_STEP, PValue::Float(128000.0)).unwrap();
		let validated = receiver.validate(&p).unwrap();
		let mut flowgraph =
			make_constant_staircase(&paths, "staircase", &validated).unwrap();

		let start = parse_datetime("2025-06-01T00:00:00").unwrap();
		flowgraph.write_batch(start).unwrap();

		let batches = Batches::new(paths, "staircase").unwrap();
		let batch = &batches.list()[0];
		let iq = batch.read_iq(extensions::SC16).unwrap();
		let metadata = batch.read_hdr().unwrap();
		assert_eq!(metadata.total_samples(), iq.len() as i64);
		// magnitudes climb by one per step
		assert_eq!(iq[0].re, 1.0);
		let last = iq[iq.len() - 1];
		assert!(last.re >= 1.0);
	}

	#[test]
	fn test_swept_processing_consumes_sidecar() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();
		let mut receiver = get_receiver(RECEIVER_NAME).unwrap();
		receiver.set_active_mode(CONSTANT_STAIRCASE_MODE).unwrap();
		let mut p = Parameters::new();
		p.add(pnames::SAMPLE_RATE, PValue::Int(128000)).unwrap();
		p.add(pnames::FREQUENCY_STEP, PValue::Float(128000.0)).unwrap();
		let validated = receiver.validate(&p).unwrap();
		let mut flowgraph =
			make_constant_staircase(&paths, "staircase", &validated).unwrap();
		let first = parse_datetime("2025-06-01T00:00:00").unwrap();
		let second = parse_datetime("2025-06-01T00:00:03").unwrap();
		flowgraph.write_batch(first).unwrap();
		flowgraph.write_batch(second).unwrap();

		let settings =
			HandlerSettings::from_parameters("staircase", &validated, true).unwrap();
		let mut handler = EventHandler::new(paths.clone(), settings).unwrap();
		let batches = Batches::new(paths.clone(), "staircase").unwrap();
		let first_path = batches.list()[0].file(extensions::SC16).file_path();
		let second_path = batches.list()[1].file(extensions::SC16).file_path();
		handler.on_created(&first_path).unwrap();
		handler.on_created(&second_path).unwrap();

		let batches = Batches::new(paths, "staircase").unwrap();
		let batch = batches.get_by_start_time("2025-06-01T00:00:00").unwrap();
		assert!(batch.spectrogram_file().exists());
		// raw stream and sidecar were consumed
		assert!(!batch.file(extensions::SC16).exists());
		assert!(!batch.hdr_file().exists());
	}

	#[test]
	fn test_analytical_matches_processed_cosine() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();
		let tag = "cosine-wave";
		let validated = validated_cosine_parameters();
		let mut flowgraph = make_cosine_wave(&paths, tag, &validated).unwrap();
		let first = parse_datetime("2025-06-01T00:00:00").unwrap();
		let second = parse_datetime("2025-06-01T00:00:01").unwrap();
		flowgraph.write_batch(first).unwrap();
		flowgraph.write_batch(second).unwrap();

		let settings = HandlerSettings::from_parameters(tag, &validated, false).unwrap();
		let mut handler = EventHandler::new(paths.clone(), settings).unwrap();
		let batches = Batches::new(paths.clone(), tag).unwrap();
		handler
			.on_created(&batches.list()[0].file(extensions::FC32).file_path())
			.unwrap();
		handler
			.on_created(&batches.list()[1].file(extensions::FC32).file_path())
			.unwrap();

		let batches = Batches::new(paths, tag).unwrap();
		let processed = batches
			.get_by_start_time("2025-06-01T00:00:00")
			.unwrap()
			.read_spectrogram()
			.unwrap();
		let expected =
			cosine_wave_analytical(processed.num_times(), &validated, first, tag).unwrap();

		assert_eq!(processed.num_times(), 250);
		assert_eq!(processed.num_frequencies(), 512);
		// times and frequencies pass through 32-bit storage on disk
		for (a, b) in processed.times().iter().zip(expected.times().iter()) {
			assert!((a - b).abs() < 1e-6, "{} vs {}", a, b);
		}
		for (a, b) in processed
			.frequencies()
			.iter()
			.zip(expected.frequencies().iter())
		{
			assert!((a - b).abs() < 20.0, "{} vs {}", a, b);
		}
		for time_index in 0..processed.num_times() {
			for frequency_index in 0..processed.num_frequencies() {
				let got = processed.dynamic_spectra().get(frequency_index, time_index);
				let want = expected.dynamic_spectra().get(frequency_index, time_index);
				assert!(
					(got - want).abs() < 1e-2,
					"mismatch at bin {} spectrum {}: {} vs {}",
					frequency_index,
					time_index,
					got,
					want
				);
			}
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn test_capture_session_end_to_end() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();
		let tag = "cosine-wave";

		let mut receiver = get_receiver(RECEIVER_NAME).unwrap();
		receiver.set_active_mode(COSINE_WAVE_MODE).unwrap();
		receiver
			.write_config(&paths, tag, &cosine_parameters(), false)
			.unwrap();
		let config = CaptureConfig::load(&paths, tag).unwrap();
		assert_eq!(config.receiver_name(), RECEIVER_NAME);

		let mut job = Job::new(vec![
			crate::receiver::post_processing_worker(paths.clone(), tag.to_string()),
			crate::receiver::capture_worker(paths.clone(), tag.to_string()),
		]);
		job.start();
		job.monitor(Duration::from_secs(4), false, 0)
			.await
			.unwrap();

		let batches = Batches::new(paths, tag).unwrap();
		assert!(!batches.is_empty());
		let start = batches.list()[0].start_datetime() - chrono::Duration::seconds(1);
		let end = start + chrono::Duration::seconds(60);
		let spectrogram = batches.get_spectrogram(start, end).unwrap();
		assert_eq!(spectrogram.spectrum_unit(), SpectrumUnit::Amplitude);
		assert_eq!(spectrogram.num_frequencies(), 512);
		assert!(spectrogram.num_times() > 0);

		// the tone sits in the two expected bins of every spectrum
		let expected = cosine_wave_analytical(
			spectrogram.num_times(),
			&validated_cosine_parameters(),
			spectrogram.start_datetime(),
			tag,
		)
		.unwrap();
		for time_index in 0..spectrogram.num_times() {
			for frequency_index in 0..spectrogram.num_frequencies() {
				let got = spectrogram
					.dynamic_spectra()
					.get(frequency_index, time_index);
				let want = expected
					.dynamic_spectra()
					.get(frequency_index, time_index);
				assert!(
					(got - want).abs() < 1e-2,
					"mismatch at bin {} spectrum {}",
					frequency_index,
					time_index
				);
			}
		}
	}
}
