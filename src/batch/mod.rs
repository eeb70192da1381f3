use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use rustfft::num_complex::Complex;

use crate::config::{self, Paths, PathsError};
use crate::spectrogram::{read_fits, FitsError, Spectrogram, SpectrogramError};

mod batches;
mod iq;

pub use batches::Batches;
pub use iq::{
	read_fc32, read_fc64, read_hdr, read_sc8, read_sc16, write_fc32, write_hdr, write_sc16,
	IQMetadata,
};

/// Extensions a batch of streamed I/Q may carry.
pub mod extensions {
	pub const FITS: &str = "fits";
	pub const FC32: &str = "fc32";
	pub const FC64: &str = "fc64";
	pub const SC8: &str = "sc8";
	pub const SC16: &str = "sc16";
	pub const HDR: &str = "hdr";
}

pub const IQ_EXTENSIONS: &[&str] = &[
	extensions::FC32,
	extensions::FC64,
	extensions::SC8,
	extensions::SC16,
];

#[derive(Debug)]
pub enum BatchError {
	BadBatchName {
		name: String,
		reason: String,
	},
	BatchNotFound {
		start_time: String,
	},
	InvalidRange {
		start: NaiveDateTime,
		end: NaiveDateTime,
	},
	NoData {
		start: NaiveDateTime,
		end: NaiveDateTime,
	},
	UnsupportedExtension {
		extension: String,
	},
	Scan {
		reason: String,
	},
	Paths(PathsError),
	Spectrogram(SpectrogramError),
	Fits(FitsError),
	Io(io::Error),
}

impl fmt::Display for BatchError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::BadBatchName { name, reason } => {
				write!(f, "bad batch file name {:?}: {}", name, reason)
			}
			Self::BatchNotFound { start_time } => {
				write!(f, "no batch with start time {}", start_time)
			}
			Self::InvalidRange { start, end } => {
				write!(f, "invalid time range: {} is not before {}", start, end)
			}
			Self::NoData { start, end } => {
				write!(
					f,
					"no spectrogram data found for the time range {} to {}",
					start, end
				)
			}
			Self::UnsupportedExtension { extension } => {
				write!(f, "unsupported batch file extension {:?}", extension)
			}
			Self::Scan { reason } => {
				write!(f, "failed to scan the batches directory: {}", reason)
			}
			Self::Paths(e) => write!(f, "{}", e),
			Self::Spectrogram(e) => write!(f, "{}", e),
			Self::Fits(e) => write!(f, "{}", e),
			Self::Io(e) => write!(f, "{}", e),
		}
	}
}

impl Error for BatchError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Paths(e) => Some(e),
			Self::Spectrogram(e) => Some(e),
			Self::Fits(e) => Some(e),
			Self::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for BatchError {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<PathsError> for BatchError {
	fn from(other: PathsError) -> Self {
		Self::Paths(other)
	}
}

impl From<SpectrogramError> for BatchError {
	fn from(other: SpectrogramError) -> Self {
		Self::Spectrogram(other)
	}
}

impl From<FitsError> for BatchError {
	fn from(other: FitsError) -> Self {
		Self::Fits(other)
	}
}

/// Split a batch file name into `(start_time, tag, extension)`.
///
/// The name must contain exactly one underscore (separating the start time
/// from the tag) and at most one dot (separating the extension); the start
/// time must parse at seconds precision.
pub fn parse_batch_file_name(name: &str) -> Result<(String, String, String), BatchError> {
	let bad = |reason: &str| BatchError::BadBatchName {
		name: name.to_string(),
		reason: reason.to_string(),
	};

	let mut underscore_split = name.split('_');
	let start_time = underscore_split.next().unwrap_or("");
	let rest = match underscore_split.next() {
		Some(rest) => rest,
		None => return Err(bad("expected exactly one underscore, got none")),
	};
	if underscore_split.next().is_some() {
		return Err(bad("expected exactly one underscore, got more"));
	}

	let mut dot_split = rest.split('.');
	let tag = dot_split.next().unwrap_or("");
	let extension = dot_split.next().unwrap_or("");
	if dot_split.next().is_some() {
		return Err(bad("expected at most one dot, got more"));
	}
	if tag.is_empty() {
		return Err(bad("the tag is empty"));
	}

	if config::parse_datetime(start_time).is_err() {
		return Err(bad("the start time does not parse at seconds precision"));
	}

	Ok((start_time.to_string(), tag.to_string(), extension.to_string()))
}

pub fn format_batch_file_name(start_time: &str, tag: &str, extension: &str) -> String {
	format!("{}_{}.{}", start_time, tag, extension)
}

/// Handle to one file of a batch; the content stays on disk until read.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFile {
	parent_dir: PathBuf,
	base_name: String,
	extension: String,
}

impl BatchFile {
	pub fn new<E: Into<String>>(parent_dir: PathBuf, base_name: String, extension: E) -> Self {
		Self {
			parent_dir,
			base_name,
			extension: extension.into(),
		}
	}

	pub fn extension(&self) -> &str {
		&self.extension
	}

	pub fn file_path(&self) -> PathBuf {
		self.parent_dir
			.join(format!("{}.{}", self.base_name, self.extension))
	}

	pub fn exists(&self) -> bool {
		self.file_path().is_file()
	}

	pub fn delete(&self) -> io::Result<()> {
		fs::remove_file(self.file_path())
	}
}

/// A group of files sharing a `<start_time>_<tag>` base name, one per
/// capture window.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
	start_time: String,
	start_datetime: NaiveDateTime,
	tag: String,
	parent_dir: PathBuf,
}

impl Batch {
	pub fn new(paths: &Paths, start_time: &str, tag: &str) -> Result<Self, BatchError> {
		let start_datetime =
			config::parse_datetime(start_time).map_err(|_| BatchError::BadBatchName {
				name: format!("{}_{}", start_time, tag),
				reason: "the start time does not parse at seconds precision".to_string(),
			})?;
		Ok(Self {
			start_time: start_time.to_string(),
			start_datetime,
			tag: tag.to_string(),
			parent_dir: paths.batch_dir_for_date(start_datetime.date()),
		})
	}

	/// Construct a batch from the path of one of its files.
	pub fn from_file_path(paths: &Paths, path: &Path) -> Result<(Self, String), BatchError> {
		let name = path
			.file_name()
			.and_then(|n| n.to_str())
			.ok_or_else(|| BatchError::BadBatchName {
				name: path.display().to_string(),
				reason: "the path has no usable file name".to_string(),
			})?;
		let (start_time, tag, extension) = parse_batch_file_name(name)?;
		let batch = Self::new(paths, &start_time, &tag)?;
		Ok((batch, extension))
	}

	pub fn start_time(&self) -> &str {
		&self.start_time
	}

	pub fn start_datetime(&self) -> NaiveDateTime {
		self.start_datetime
	}

	pub fn tag(&self) -> &str {
		&self.tag
	}

	pub fn parent_dir(&self) -> &Path {
		&self.parent_dir
	}

	/// The base file name shared by every file in the batch.
	pub fn name(&self) -> String {
		format!("{}_{}", self.start_time, self.tag)
	}

	pub fn file<E: Into<String>>(&self, extension: E) -> BatchFile {
		BatchFile::new(self.parent_dir.clone(), self.name(), extension)
	}

	pub fn spectrogram_file(&self) -> BatchFile {
		self.file(extensions::FITS)
	}

	pub fn hdr_file(&self) -> BatchFile {
		self.file(extensions::HDR)
	}

	/// Decode the I/Q samples stored under the given extension.
	pub fn read_iq(&self, extension: &str) -> Result<Vec<Complex<f32>>, BatchError> {
		let path = self.file(extension).file_path();
		match extension {
			extensions::FC32 => Ok(iq::read_fc32(&path)?),
			extensions::FC64 => Ok(iq::read_fc64(&path)?),
			extensions::SC8 => Ok(iq::read_sc8(&path)?),
			extensions::SC16 => Ok(iq::read_sc16(&path)?),
			other => Err(BatchError::UnsupportedExtension {
				extension: other.to_string(),
			}),
		}
	}

	pub fn read_hdr(&self) -> Result<IQMetadata, BatchError> {
		Ok(iq::read_hdr(&self.hdr_file().file_path())?)
	}

	pub fn read_spectrogram(&self) -> Result<Spectrogram, BatchError> {
		Ok(read_fits(
			&self.spectrogram_file().file_path(),
			&self.tag,
		)?)
	}
}
