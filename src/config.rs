use std::env;
use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Timestamp format used in batch file names and FITS headers, seconds precision.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

pub const DATA_DIR_ENV_VAR: &str = "SPECTRE_DATA_DIR_PATH";

#[derive(Debug)]
pub enum PathsError {
	EnvNotSet {
		var: &'static str,
	},
	InvalidDateFilter {
		reason: &'static str,
	},
}

impl fmt::Display for PathsError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::EnvNotSet { var } => {
				write!(f, "the environment variable {} has not been set", var)
			}
			Self::InvalidDateFilter { reason } => {
				write!(f, "invalid date filter: {}", reason)
			}
		}
	}
}

impl Error for PathsError {}

/// Root of the on-disk data tree.
///
/// All data lives below a single directory: `batches/` for the batched data
/// files, `logs/` for runtime logs and `configs/` for capture configuration
/// documents. The value is constructed once at startup and passed explicitly
/// to everything which touches the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
	data_dir: PathBuf,
}

fn push_date_components(
	mut base: PathBuf,
	year: Option<i32>,
	month: Option<u32>,
	day: Option<u32>,
) -> Result<PathBuf, PathsError> {
	if day.is_some() && (month.is_none() || year.is_none()) {
		return Err(PathsError::InvalidDateFilter {
			reason: "a day requires both a month and a year",
		});
	}
	if month.is_some() && year.is_none() {
		return Err(PathsError::InvalidDateFilter {
			reason: "a month requires a year",
		});
	}
	if let Some(year) = year {
		base.push(format!("{:04}", year));
	}
	if let Some(month) = month {
		base.push(format!("{:02}", month));
	}
	if let Some(day) = day {
		base.push(format!("{:02}", day));
	}
	Ok(base)
}

impl Paths {
	pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
		Self {
			data_dir: data_dir.into(),
		}
	}

	/// Read the data directory from [`DATA_DIR_ENV_VAR`].
	pub fn from_env() -> Result<Self, PathsError> {
		match env::var_os(DATA_DIR_ENV_VAR) {
			Some(v) => Ok(Self::new(PathBuf::from(v))),
			None => Err(PathsError::EnvNotSet {
				var: DATA_DIR_ENV_VAR,
			}),
		}
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	pub fn batches_dir(&self) -> PathBuf {
		self.data_dir.join("batches")
	}

	pub fn logs_dir(&self) -> PathBuf {
		self.data_dir.join("logs")
	}

	pub fn configs_dir(&self) -> PathBuf {
		self.data_dir.join("configs")
	}

	/// Narrow the batches directory by a (partial) numeric date.
	pub fn batches_dir_for(
		&self,
		year: Option<i32>,
		month: Option<u32>,
		day: Option<u32>,
	) -> Result<PathBuf, PathsError> {
		push_date_components(self.batches_dir(), year, month, day)
	}

	pub fn logs_dir_for(
		&self,
		year: Option<i32>,
		month: Option<u32>,
		day: Option<u32>,
	) -> Result<PathBuf, PathsError> {
		push_date_components(self.logs_dir(), year, month, day)
	}

	/// The date-partitioned directory a batch starting at `date` lives in.
	pub fn batch_dir_for_date(&self, date: NaiveDate) -> PathBuf {
		// cannot fail: all three components are given
		push_date_components(
			self.batches_dir(),
			Some(date.year()),
			Some(date.month()),
			Some(date.day()),
		)
		.expect("full date is always a valid filter")
	}

	pub fn config_file(&self, tag: &str) -> PathBuf {
		self.configs_dir().join(format!("{}.json", tag))
	}

	/// Create the three top-level directories if they do not exist yet.
	pub fn ensure_tree(&self) -> io::Result<()> {
		std::fs::create_dir_all(self.batches_dir())?;
		std::fs::create_dir_all(self.logs_dir())?;
		std::fs::create_dir_all(self.configs_dir())?;
		Ok(())
	}
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
	dt.format(DATETIME_FORMAT).to_string()
}

pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, chrono::ParseError> {
	NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_subdirectories_hang_off_the_data_dir() {
		let paths = Paths::new("/data");
		assert_eq!(paths.batches_dir(), PathBuf::from("/data/batches"));
		assert_eq!(paths.logs_dir(), PathBuf::from("/data/logs"));
		assert_eq!(paths.configs_dir(), PathBuf::from("/data/configs"));
	}

	#[test]
	fn test_date_filter_builds_nested_dirs() {
		let paths = Paths::new("/data");
		assert_eq!(
			paths.batches_dir_for(Some(2025), None, None).unwrap(),
			PathBuf::from("/data/batches/2025")
		);
		assert_eq!(
			paths.batches_dir_for(Some(2025), Some(6), None).unwrap(),
			PathBuf::from("/data/batches/2025/06")
		);
		assert_eq!(
			paths.batches_dir_for(Some(2025), Some(6), Some(1)).unwrap(),
			PathBuf::from("/data/batches/2025/06/01")
		);
	}

	#[test]
	fn test_day_requires_month_and_year() {
		let paths = Paths::new("/data");
		assert!(paths.batches_dir_for(None, None, Some(1)).is_err());
		assert!(paths.batches_dir_for(Some(2025), None, Some(1)).is_err());
	}

	#[test]
	fn test_month_requires_year() {
		let paths = Paths::new("/data");
		assert!(paths.batches_dir_for(None, Some(6), None).is_err());
	}

	#[test]
	fn test_batch_dir_for_date() {
		let paths = Paths::new("/data");
		let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
		assert_eq!(
			paths.batch_dir_for_date(date),
			PathBuf::from("/data/batches/2025/06/01")
		);
	}

	#[test]
	fn test_datetime_round_trip() {
		let dt = parse_datetime("2025-06-01T12:30:45").unwrap();
		assert_eq!(format_datetime(dt), "2025-06-01T12:30:45");
	}
}
