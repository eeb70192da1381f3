use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::batch::{Batch, BatchError};
use crate::config::Paths;
use crate::params::{pnames, ParameterError, Parameters};
use crate::spectrogram::{
	frequency_average, join, time_average, write_fits, FitsError, FitsMetadata, Spectrogram,
	SpectrogramError, SpectrumUnit,
};
use crate::stfft::{
	fftfreq, fftshift, make_window, spectrum_times, SfftError, Stfft, WindowKind,
};

#[derive(Debug)]
pub enum ProcessingError {
	Batch(BatchError),
	Spectrogram(SpectrogramError),
	Fits(FitsError),
	Sfft(SfftError),
	Parameter(ParameterError),
	Io(io::Error),
	MetadataMismatch {
		expected: i64,
		got: usize,
	},
}

impl fmt::Display for ProcessingError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Batch(e) => write!(f, "{}", e),
			Self::Spectrogram(e) => write!(f, "{}", e),
			Self::Fits(e) => write!(f, "{}", e),
			Self::Sfft(e) => write!(f, "{}", e),
			Self::Parameter(e) => write!(f, "{}", e),
			Self::Io(e) => write!(f, "{}", e),
			Self::MetadataMismatch { expected, got } => {
				write!(
					f,
					"the sidecar metadata announces {} samples, the stream holds {}",
					expected, got
				)
			}
		}
	}
}

impl Error for ProcessingError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Batch(e) => Some(e),
			Self::Spectrogram(e) => Some(e),
			Self::Fits(e) => Some(e),
			Self::Sfft(e) => Some(e),
			Self::Parameter(e) => Some(e),
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<BatchError> for ProcessingError {
	fn from(other: BatchError) -> Self {
		Self::Batch(other)
	}
}

impl From<SpectrogramError> for ProcessingError {
	fn from(other: SpectrogramError) -> Self {
		Self::Spectrogram(other)
	}
}

impl From<FitsError> for ProcessingError {
	fn from(other: FitsError) -> Self {
		Self::Fits(other)
	}
}

impl From<SfftError> for ProcessingError {
	fn from(other: SfftError) -> Self {
		Self::Sfft(other)
	}
}

impl From<ParameterError> for ProcessingError {
	fn from(other: ParameterError) -> Self {
		Self::Parameter(other)
	}
}

impl From<io::Error> for ProcessingError {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

/// Everything the event handler needs, unpacked from validated parameters
/// into plain typed fields.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
	pub tag: String,
	pub watch_extension: String,
	pub window_kind: WindowKind,
	pub window_size: usize,
	pub window_hop: usize,
	pub center_frequency: f64,
	pub sample_rate: u32,
	pub time_resolution: Option<f64>,
	pub frequency_resolution: Option<f64>,
	/// Spectrograms are joined until this much time is covered, then
	/// flushed. Zero flushes after every batch.
	pub time_range: f64,
	pub keep_signal: bool,
	/// Swept modes carry a `.hdr` sidecar next to the raw samples.
	pub swept: bool,
	pub metadata: FitsMetadata,
}

impl HandlerSettings {
	/// Unpack validated capture parameters.
	pub fn from_parameters(
		tag: &str,
		parameters: &Parameters,
		swept: bool,
	) -> Result<Self, ProcessingError> {
		let window_kind = parameters
			.get_str(pnames::WINDOW_TYPE)?
			.parse::<WindowKind>()?;
		Ok(Self {
			tag: tag.to_string(),
			watch_extension: parameters.get_str(pnames::WATCH_EXTENSION)?.to_string(),
			window_kind,
			window_size: parameters.get_int(pnames::WINDOW_SIZE)? as usize,
			window_hop: parameters.get_int(pnames::WINDOW_HOP)? as usize,
			center_frequency: parameters.get_float(pnames::CENTER_FREQUENCY)?,
			sample_rate: parameters.get_int(pnames::SAMPLE_RATE)? as u32,
			time_resolution: parameters.get_opt_float(pnames::TIME_RESOLUTION)?,
			frequency_resolution: parameters.get_opt_float(pnames::FREQUENCY_RESOLUTION)?,
			time_range: parameters.get_opt_float(pnames::TIME_RANGE)?.unwrap_or(0.0),
			keep_signal: parameters.get_bool(pnames::KEEP_SIGNAL).unwrap_or(false),
			swept,
			metadata: FitsMetadata {
				origin: parameters.get_str(pnames::ORIGIN)?.to_string(),
				telescope: parameters.get_str(pnames::TELESCOPE)?.to_string(),
				instrument: parameters.get_str(pnames::INSTRUMENT)?.to_string(),
				object: parameters.get_str(pnames::OBJECT)?.to_string(),
				obs_lat: parameters.get_float(pnames::OBS_LAT)?,
				obs_lon: parameters.get_float(pnames::OBS_LON)?,
				obs_alt: parameters.get_float(pnames::OBS_ALT)?,
			},
		})
	}
}

/// The post-processing state machine.
///
/// Batch files are processed one behind the filesystem events: a freshly
/// created file is only queued, and the previously queued file (which the
/// producer is guaranteed to have closed by now) is processed. Finished
/// spectrograms accumulate in a join cache which flushes to FITS whenever
/// the configured time range has been covered.
pub struct EventHandler {
	paths: Paths,
	settings: HandlerSettings,
	window: Vec<f32>,
	// the plan is built on the first processed batch, not at startup
	stfft: Option<Stfft>,
	queued_file: Option<PathBuf>,
	cache: Option<Spectrogram>,
}

impl EventHandler {
	pub fn new(paths: Paths, settings: HandlerSettings) -> Result<Self, ProcessingError> {
		let window = make_window(settings.window_kind, settings.window_size)?;
		Ok(Self {
			paths,
			settings,
			window,
			stfft: None,
			queued_file: None,
			cache: None,
		})
	}

	pub fn queued_file(&self) -> Option<&Path> {
		self.queued_file.as_deref()
	}

	pub fn cached_time_range(&self) -> Option<f64> {
		self.cache.as_ref().map(|s| s.time_range())
	}

	/// Whether a created file belongs to this handler's tag and watched
	/// extension. Sibling extensions (such as the sidecar) and other tags'
	/// files produce events too, and are not ours to process.
	fn matches(&self, path: &Path) -> bool {
		let suffix = format!("_{}.{}", self.settings.tag, self.settings.watch_extension);
		path.to_str().map(|p| p.ends_with(&suffix)).unwrap_or(false)
	}

	/// React to a file-creation event.
	///
	/// The new file is queued and the previously queued one is processed; a
	/// processing failure flushes the cache before propagating so nothing
	/// in memory is lost.
	pub fn on_created(&mut self, path: &Path) -> Result<(), ProcessingError> {
		if !self.matches(path) {
			trace!("ignoring {:?}", path);
			return Ok(());
		}
		info!("noticed {:?}", path);

		if let Some(queued) = self.queued_file.take() {
			if let Err(e) = self.process(&queued) {
				error!("an error occured while processing {:?}: {}", queued, e);
				if let Err(flush_error) = self.flush() {
					error!("flushing the cache also failed: {}", flush_error);
				}
				return Err(e);
			}
		}

		info!("queueing {:?} for post processing", path);
		self.queued_file = Some(path.to_path_buf());
		Ok(())
	}

	/// Turn one batch file into a spectrogram and feed it to the cache.
	fn process(&mut self, path: &Path) -> Result<(), ProcessingError> {
		let (batch, _) = Batch::from_file_path(&self.paths, path)?;

		info!("reading the I/Q samples from {:?}", path);
		let iq = batch.read_iq(&self.settings.watch_extension)?;

		let sidecar = if self.settings.swept {
			info!("reading {:?}", batch.hdr_file().file_path());
			let metadata = batch.read_hdr()?;
			if metadata.total_samples() != iq.len() as i64 {
				return Err(ProcessingError::MetadataMismatch {
					expected: metadata.total_samples(),
					got: iq.len(),
				});
			}
			Some(metadata)
		} else {
			None
		};

		if self.stfft.is_none() {
			info!("creating the FFT plan");
			self.stfft = Some(Stfft::new(self.window.clone(), self.settings.window_hop)?);
		}
		let stfft = self.stfft.as_mut().expect("plan was just created");

		info!("executing the short-time FFT");
		let mut spectra = stfft.process(&iq)?;
		spectra.fftshift_rows();

		let frequencies: Vec<f64> =
			fftshift(&fftfreq(self.settings.window_size, self.settings.sample_rate))
				.into_iter()
				.map(|f| f + self.settings.center_frequency)
				.collect();
		let times = spectrum_times(
			spectra.num_times(),
			self.settings.sample_rate,
			self.settings.window_hop,
		);

		let mut spectrogram = Spectrogram::new(
			spectra,
			times,
			frequencies,
			SpectrumUnit::Amplitude,
			batch.start_datetime(),
			self.settings.tag.as_str(),
		)?;

		if let Some(resolution) = self.settings.time_resolution {
			spectrogram = time_average(&spectrogram, resolution)?;
		}
		if let Some(resolution) = self.settings.frequency_resolution {
			spectrogram = frequency_average(&spectrogram, resolution)?;
		}
		info!("spectrogram created successfully");

		if !self.settings.keep_signal {
			info!("deleting the raw I/Q samples for {:?}", batch.name());
			batch.file(self.settings.watch_extension.as_str()).delete()?;
			if sidecar.is_some() {
				batch.hdr_file().delete()?;
			}
		}

		self.cache_spectrogram(spectrogram)
	}

	/// Append to the join cache, flushing once enough time is covered.
	///
	/// A join failure (out-of-order batches, clock skew) flushes what was
	/// accumulated so far and restarts the cache from the new spectrogram.
	fn cache_spectrogram(&mut self, spectrogram: Spectrogram) -> Result<(), ProcessingError> {
		match self.cache.take() {
			None => {
				self.cache = Some(spectrogram);
			}
			Some(cached) => {
				let pair = [cached, spectrogram];
				match join(&pair) {
					Ok(joined) => {
						self.cache = Some(joined);
					}
					Err(e) => {
						warn!("flushing partial spectrogram: {}", e);
						let [cached, spectrogram] = pair;
						self.cache = Some(cached);
						self.flush()?;
						self.cache = Some(spectrogram);
					}
				}
			}
		}

		let covered = self
			.cache
			.as_ref()
			.map(|s| s.time_range())
			.unwrap_or(0.0);
		if covered >= self.settings.time_range {
			self.flush()?;
		}
		Ok(())
	}

	/// Persist and clear the cache; a no-op when nothing is cached.
	pub fn flush(&mut self) -> Result<Option<PathBuf>, ProcessingError> {
		match self.cache.take() {
			None => Ok(None),
			Some(cached) => {
				info!(
					"flushing spectrogram with start time {}",
					cached.start_time_string()
				);
				let path = write_fits(&cached, &self.settings.metadata, &self.paths)?;
				info!("flush successful, resetting the spectrogram cache");
				Ok(Some(path))
			}
		}
	}
}

fn scan_files(root: &Path, found: &mut Vec<PathBuf>) {
	let entries = match fs::read_dir(root) {
		Ok(entries) => entries,
		Err(_) => return,
	};
	for entry in entries.flatten() {
		let path = entry.path();
		if path.is_dir() {
			scan_files(&path, found);
		} else if path.is_file() {
			found.push(path);
		}
	}
}

/// Watch a directory tree for new files by polling.
///
/// Files already present when the watcher starts are not reported. Newly
/// appeared files go out over a bounded channel in name order, so the
/// consumer sees them in batch start-time order.
pub struct DirWatcher;

impl DirWatcher {
	pub fn spawn(
		root: PathBuf,
		sink: mpsc::Sender<PathBuf>,
		poll_interval: Duration,
	) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut seen: HashSet<PathBuf> = HashSet::new();
			let mut first_scan = true;
			loop {
				let mut current = Vec::new();
				scan_files(&root, &mut current);
				current.sort();
				for path in current {
					if seen.insert(path.clone()) && !first_scan {
						debug!("observed new file {:?}", path);
						if sink.send(path).await.is_err() {
							debug!("watcher exiting, the consumer is gone");
							return;
						}
					}
				}
				first_scan = false;
				tokio::time::sleep(poll_interval).await;
			}
		})
	}
}

/// Run the post-processing loop for one capture tag.
///
/// Mounts a watcher over the batches tree and feeds creation events into an
/// [`EventHandler`] until the watcher dies or processing fails.
pub async fn start_post_processor(
	paths: Paths,
	settings: HandlerSettings,
) -> Result<(), ProcessingError> {
	info!(
		"starting post processing for tag {:?}, watching for .{} files",
		settings.tag, settings.watch_extension
	);
	let mut handler = EventHandler::new(paths.clone(), settings)?;
	let (sender, mut receiver) = mpsc::channel(32);
	let watcher = DirWatcher::spawn(
		paths.batches_dir(),
		sender,
		Duration::from_millis(250),
	);

	while let Some(path) = receiver.recv().await {
		// the FFT and the disk traffic are blocking work
		let (returned, result) = tokio::task::spawn_blocking(move || {
			let result = handler.on_created(&path);
			(handler, result)
		})
		.await
		.expect("the processing task neither panics nor is cancelled");
		handler = returned;
		if let Err(e) = result {
			watcher.abort();
			return Err(e);
		}
	}
	watcher.abort();
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::batch::{write_fc32, Batches};
	use crate::config::parse_datetime;
	use rustfft::num_complex::Complex;

	fn cosine_settings(tag: &str) -> HandlerSettings {
		HandlerSettings {
			tag: tag.to_string(),
			watch_extension: "fc32".to_string(),
			window_kind: WindowKind::Boxcar,
			window_size: 512,
			window_hop: 512,
			center_frequency: 95.8e6,
			sample_rate: 128000,
			time_resolution: None,
			frequency_resolution: None,
			time_range: 0.0,
			keep_signal: false,
			swept: false,
			metadata: FitsMetadata::default(),
		}
	}

	fn write_cosine_batch(paths: &Paths, start_time: &str, tag: &str) -> PathBuf {
		let start = parse_datetime(start_time).unwrap();
		let parent = paths.batch_dir_for_date(start.date());
		fs::create_dir_all(&parent).unwrap();
		let path = parent.join(format!("{}_{}.fc32", start_time, tag));
		let sample_rate = 128000.0f64;
		let samples: Vec<Complex<f32>> = (0..4096)
			.map(|n| {
				let t = n as f64 / sample_rate;
				Complex {
					re: 2.0 * (2.0 * std::f64::consts::PI * 32000.0 * t).cos() as f32,
					im: 0.0,
				}
			})
			.collect();
		write_fc32(&path, &samples).unwrap();
		path
	}

	fn fixture() -> (tempfile::TempDir, Paths) {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		paths.ensure_tree().unwrap();
		(dir, paths)
	}

	#[test]
	fn test_suffix_filter() {
		let (_dir, paths) = fixture();
		let handler = EventHandler::new(paths, cosine_settings("cosine-wave")).unwrap();
		assert!(handler.matches(Path::new(
			"/data/batches/2025/06/01/2025-06-01T00:00:00_cosine-wave.fc32"
		)));
		// sibling extension
		assert!(!handler.matches(Path::new(
			"/data/batches/2025/06/01/2025-06-01T00:00:00_cosine-wave.hdr"
		)));
		// another session's tag
		assert!(!handler.matches(Path::new(
			"/data/batches/2025/06/01/2025-06-01T00:00:00_other.fc32"
		)));
	}

	#[test]
	fn test_first_file_is_only_queued() {
		let (_dir, paths) = fixture();
		let tag = "cosine-wave";
		let first = write_cosine_batch(&paths, "2025-06-01T00:00:00", tag);
		let mut handler =
			EventHandler::new(paths.clone(), cosine_settings(tag)).unwrap();

		handler.on_created(&first).unwrap();
		assert_eq!(handler.queued_file(), Some(first.as_path()));
		// nothing processed yet: the raw file survives and no fits exists
		assert!(first.is_file());
		let batches = Batches::new(paths, tag).unwrap();
		assert!(!batches.list()[0].spectrogram_file().exists());
	}

	#[test]
	fn test_second_event_processes_the_first_file() {
		let (_dir, paths) = fixture();
		let tag = "cosine-wave";
		let first = write_cosine_batch(&paths, "2025-06-01T00:00:00", tag);
		let second = write_cosine_batch(&paths, "2025-06-01T00:00:03", tag);
		let mut handler =
			EventHandler::new(paths.clone(), cosine_settings(tag)).unwrap();

		handler.on_created(&first).unwrap();
		handler.on_created(&second).unwrap();
		assert_eq!(handler.queued_file(), Some(second.as_path()));

		let batches = Batches::new(paths, tag).unwrap();
		let batch = batches.get_by_start_time("2025-06-01T00:00:00").unwrap();
		assert!(batch.spectrogram_file().exists());
		// raw samples were consumed
		assert!(!first.is_file());
		// the queued file is untouched
		assert!(second.is_file());

		let spectrogram = batch.read_spectrogram().unwrap();
		assert_eq!(spectrogram.num_times(), 8);
		assert_eq!(spectrogram.num_frequencies(), 512);
		assert_eq!(spectrogram.spectrum_unit(), SpectrumUnit::Amplitude);
	}

	#[test]
	fn test_keep_signal_preserves_raw_files() {
		let (_dir, paths) = fixture();
		let tag = "cosine-wave";
		let mut settings = cosine_settings(tag);
		settings.keep_signal = true;
		let first = write_cosine_batch(&paths, "2025-06-01T00:00:00", tag);
		let second = write_cosine_batch(&paths, "2025-06-01T00:00:03", tag);
		let mut handler = EventHandler::new(paths, settings).unwrap();

		handler.on_created(&first).unwrap();
		handler.on_created(&second).unwrap();
		assert!(first.is_file());
	}

	#[test]
	fn test_processing_failure_flushes_and_propagates() {
		let (_dir, paths) = fixture();
		let tag = "cosine-wave";
		let mut settings = cosine_settings(tag);
		// keep a spectrogram cached across batches
		settings.time_range = 1000.0;
		let _first = write_cosine_batch(&paths, "2025-06-01T00:00:00", tag);
		let second = write_cosine_batch(&paths, "2025-06-01T00:00:03", tag);
		let third = write_cosine_batch(&paths, "2025-06-01T00:00:06", tag);
		let mut handler = EventHandler::new(paths.clone(), settings).unwrap();

		handler.on_created(&_first).unwrap();
		handler.on_created(&second).unwrap();
		assert!(handler.cached_time_range().is_some());

		// sabotage the queued file, then trigger its processing
		fs::remove_file(&second).unwrap();
		let r = handler.on_created(&third);
		assert!(r.is_err());

		// the cache was flushed before the error propagated
		assert!(handler.cached_time_range().is_none());
		let batches = Batches::new(paths, tag).unwrap();
		let batch = batches.get_by_start_time("2025-06-01T00:00:00").unwrap();
		assert!(batch.spectrogram_file().exists());
	}

	#[test]
	fn test_join_cache_accumulates_until_time_range() {
		let (_dir, paths) = fixture();
		let tag = "cosine-wave";
		let mut settings = cosine_settings(tag);
		// two batches cover ~3.03 s; require more before the flush
		settings.time_range = 4.0;
		let b0 = write_cosine_batch(&paths, "2025-06-01T00:00:00", tag);
		let b1 = write_cosine_batch(&paths, "2025-06-01T00:00:03", tag);
		let b2 = write_cosine_batch(&paths, "2025-06-01T00:00:06", tag);
		let b3 = write_cosine_batch(&paths, "2025-06-01T00:00:09", tag);
		let mut handler = EventHandler::new(paths.clone(), settings).unwrap();

		handler.on_created(&b0).unwrap();
		handler.on_created(&b1).unwrap();
		// one batch cached, below the threshold
		assert!(handler.cached_time_range().unwrap() < 4.0);
		handler.on_created(&b2).unwrap();
		handler.on_created(&b3).unwrap();
		// two joined batches crossed 4 s and were flushed
		assert!(handler.cached_time_range().is_none());

		let batches = Batches::new(paths, tag).unwrap();
		let joined = batches
			.get_by_start_time("2025-06-01T00:00:00")
			.unwrap()
			.read_spectrogram()
			.unwrap();
		assert_eq!(joined.num_times(), 24);
		assert!(joined.time_range() > 6.0);
	}

	#[tokio::test]
	async fn test_watcher_reports_only_new_files() {
		let (_dir, paths) = fixture();
		let tag = "cosine-wave";
		let preexisting = write_cosine_batch(&paths, "2025-06-01T00:00:00", tag);
		let (sender, mut receiver) = mpsc::channel(8);
		let watcher = DirWatcher::spawn(
			paths.batches_dir(),
			sender,
			Duration::from_millis(20),
		);

		// allow the first scan to seed the seen set
		tokio::time::sleep(Duration::from_millis(100)).await;
		let fresh = write_cosine_batch(&paths, "2025-06-01T00:00:03", tag);

		let observed = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
			.await
			.expect("the watcher should report the fresh file")
			.expect("the channel stays open");
		assert_eq!(observed, fresh);
		assert_ne!(observed, preexisting);
		watcher.abort();
	}

	#[test]
	fn test_settings_from_parameters() {
		use crate::params::PValue;
		let mut parameters = Parameters::new();
		for (name, value) in [
			(pnames::WATCH_EXTENSION, PValue::Str("fc32".to_string())),
			(pnames::WINDOW_TYPE, PValue::Str("boxcar".to_string())),
			(pnames::WINDOW_SIZE, PValue::Int(512)),
			(pnames::WINDOW_HOP, PValue::Int(512)),
			(pnames::CENTER_FREQUENCY, PValue::Float(95.8e6)),
			(pnames::SAMPLE_RATE, PValue::Int(128000)),
			(pnames::TIME_RESOLUTION, PValue::Null),
			(pnames::FREQUENCY_RESOLUTION, PValue::Null),
			(pnames::TIME_RANGE, PValue::Null),
			(pnames::KEEP_SIGNAL, PValue::Bool(false)),
			(pnames::ORIGIN, PValue::Str("spectre".to_string())),
			(pnames::TELESCOPE, PValue::Str("NOTSET".to_string())),
			(pnames::INSTRUMENT, PValue::Str("NOTSET".to_string())),
			(pnames::OBJECT, PValue::Str("NOTSET".to_string())),
			(pnames::OBS_LAT, PValue::Float(0.0)),
			(pnames::OBS_LON, PValue::Float(0.0)),
			(pnames::OBS_ALT, PValue::Float(0.0)),
		] {
			parameters.add(name, value).unwrap();
		}
		let settings =
			HandlerSettings::from_parameters("cosine-wave", &parameters, false).unwrap();
		assert_eq!(settings.window_kind, WindowKind::Boxcar);
		assert_eq!(settings.window_size, 512);
		assert_eq!(settings.time_range, 0.0);
		assert_eq!(settings.time_resolution, None);
	}
}
