use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::{Datelike, Utc};

use env_logger::{Builder, Target};

use crate::config::{format_datetime, Paths};

/// What kind of process a log file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
	/// An interactive invocation.
	User,
	/// A supervised background worker.
	Worker,
}

impl ProcessKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::User => "user",
			Self::Worker => "worker",
		}
	}
}

/// The date-partitioned log file path for a process starting now.
pub fn log_file_path(paths: &Paths, kind: ProcessKind) -> io::Result<PathBuf> {
	let now = Utc::now().naive_utc();
	let dir = paths
		.logs_dir_for(Some(now.year()), Some(now.month()), Some(now.day()))
		.expect("a full date is always a valid filter");
	fs::create_dir_all(&dir)?;
	Ok(dir.join(format!(
		"{}_{}_{}.log",
		format_datetime(now),
		std::process::id(),
		kind.as_str()
	)))
}

/// Route the log facade into a date-partitioned file.
///
/// Returns the file being written. Initialisation is idempotent; a second
/// call leaves the first target in place.
pub fn configure_file_logging(paths: &Paths, kind: ProcessKind) -> io::Result<PathBuf> {
	let path = log_file_path(paths, kind)?;
	let file = fs::File::create(&path)?;
	let _ = Builder::from_default_env()
		.target(Target::Pipe(Box::new(file)))
		.try_init();
	Ok(path)
}

/// Plain stderr logging for interactive use.
pub fn configure_stderr_logging() {
	let _ = Builder::from_default_env().try_init();
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_log_file_path_shape() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		let path = log_file_path(&paths, ProcessKind::Worker).unwrap();
		let name = path.file_name().unwrap().to_str().unwrap();
		assert!(name.ends_with("_worker.log"), "{}", name);
		assert!(name.contains(&format!("_{}_", std::process::id())), "{}", name);
		// nested below logs/YYYY/MM/DD
		let relative = path.strip_prefix(paths.logs_dir()).unwrap();
		assert_eq!(relative.components().count(), 4);
	}

	#[test]
	fn test_configure_creates_the_file() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		let path = configure_file_logging(&paths, ProcessKind::User).unwrap();
		assert!(path.is_file());
	}
}
