use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use log::{trace, warn};

use crate::config::Paths;
use crate::spectrogram::{join, time_chop, Spectrogram};

use super::{parse_batch_file_name, Batch, BatchError};

/// A tag-scoped, chronologically sorted view of the batches on disk.
///
/// The collection holds handles only; file contents are read on demand. A
/// date filter narrows the directory walk (a month needs a year, a day needs
/// both).
#[derive(Debug)]
pub struct Batches {
	paths: Paths,
	tag: String,
	year: Option<i32>,
	month: Option<u32>,
	day: Option<u32>,
	batches: Vec<Batch>,
}

impl Batches {
	pub fn new<T: Into<String>>(paths: Paths, tag: T) -> Result<Self, BatchError> {
		Self::with_date_filter(paths, tag, None, None, None)
	}

	pub fn with_date_filter<T: Into<String>>(
		paths: Paths,
		tag: T,
		year: Option<i32>,
		month: Option<u32>,
		day: Option<u32>,
	) -> Result<Self, BatchError> {
		let mut batches = Self {
			paths,
			tag: tag.into(),
			year,
			month,
			day,
			batches: Vec::new(),
		};
		batches.refresh()?;
		Ok(batches)
	}

	pub fn tag(&self) -> &str {
		&self.tag
	}

	/// Change the date filter and rescan.
	pub fn set_date(
		&mut self,
		year: Option<i32>,
		month: Option<u32>,
		day: Option<u32>,
	) -> Result<(), BatchError> {
		self.year = year;
		self.month = month;
		self.day = day;
		self.refresh()
	}

	/// Walk the (possibly date-narrowed) batches directory and rebuild the
	/// collection from the file names found there.
	pub fn refresh(&mut self) -> Result<(), BatchError> {
		let root = self.paths.batches_dir_for(self.year, self.month, self.day)?;
		let mut found: BTreeMap<String, Batch> = BTreeMap::new();

		if root.is_dir() {
			let pattern = format!("{}/**/*", root.display());
			let entries = glob::glob(&pattern).map_err(|e| BatchError::Scan {
				reason: e.to_string(),
			})?;
			for entry in entries {
				let path = match entry {
					Ok(path) => path,
					Err(e) => {
						warn!("skipping unreadable entry while scanning batches: {}", e);
						continue;
					}
				};
				if !path.is_file() {
					continue;
				}
				let name = match path.file_name().and_then(|n| n.to_str()) {
					Some(name) => name,
					None => continue,
				};
				let (start_time, tag, _) = match parse_batch_file_name(name) {
					Ok(parsed) => parsed,
					Err(_) => {
						trace!("ignoring non-batch file {:?}", name);
						continue;
					}
				};
				if tag != self.tag {
					continue;
				}
				if !found.contains_key(&start_time) {
					found.insert(
						start_time.clone(),
						Batch::new(&self.paths, &start_time, &tag)?,
					);
				}
			}
		}

		// ISO-8601 start times sort lexicographically, which the map already did
		self.batches = found.into_iter().map(|(_, batch)| batch).collect();
		Ok(())
	}

	pub fn list(&self) -> &[Batch] {
		&self.batches
	}

	pub fn start_times(&self) -> Vec<&str> {
		self.batches.iter().map(|b| b.start_time()).collect()
	}

	pub fn len(&self) -> usize {
		self.batches.len()
	}

	pub fn is_empty(&self) -> bool {
		self.batches.is_empty()
	}

	pub fn get_by_start_time(&self, start_time: &str) -> Result<&Batch, BatchError> {
		self.batches
			.iter()
			.find(|b| b.start_time() == start_time)
			.ok_or_else(|| BatchError::BatchNotFound {
				start_time: start_time.to_string(),
			})
	}

	/// Chronological access; index 0 is the oldest batch.
	pub fn get_by_index(&self, index: usize) -> Result<&Batch, BatchError> {
		self.batches
			.get(index)
			.ok_or_else(|| BatchError::BatchNotFound {
				start_time: format!("index {}", index),
			})
	}

	/// The batches whose capture interval intersects `[start, end]`.
	///
	/// A batch covers from its own start time up to the next batch's start;
	/// the final batch has no known end and is kept whenever the query
	/// overlaps anything at or after its start.
	pub fn get_in_range(
		&self,
		start: NaiveDateTime,
		end: NaiveDateTime,
	) -> Result<Vec<&Batch>, BatchError> {
		if start >= end {
			return Err(BatchError::InvalidRange { start, end });
		}
		let mut selected = Vec::new();
		for (index, batch) in self.batches.iter().enumerate() {
			let this_start = batch.start_datetime();
			let next_start = match self.batches.get(index + 1) {
				Some(next) => next.start_datetime(),
				None => NaiveDateTime::MAX,
			};
			if start <= next_start && this_start <= end {
				selected.push(batch);
			}
		}
		Ok(selected)
	}

	/// Stitch a spectrogram covering `[start, end]` from the batches on
	/// disk: select by time range, keep those with a spectrogram file, load,
	/// chop each to the requested range and join the survivors.
	pub fn get_spectrogram(
		&self,
		start: NaiveDateTime,
		end: NaiveDateTime,
	) -> Result<Spectrogram, BatchError> {
		let candidates = self.get_in_range(start, end)?;

		let mut chopped = Vec::new();
		for batch in candidates {
			if !batch.spectrogram_file().exists() {
				continue;
			}
			let spectrogram = batch.read_spectrogram()?;
			let lower = spectrogram.datetime_at(0);
			let upper = spectrogram.datetime_at(spectrogram.num_times() - 1);
			if start <= upper && lower <= end {
				chopped.push(time_chop(&spectrogram, start, end)?);
			}
		}

		if chopped.is_empty() {
			return Err(BatchError::NoData { start, end });
		}
		Ok(join(&chopped)?)
	}
}
