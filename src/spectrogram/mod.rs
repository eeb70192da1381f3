use std::error::Error;
use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDateTime};

mod fits;
mod transform;

pub use fits::{read_fits, write_fits, FitsError, FitsMetadata};
pub use transform::{frequency_average, join, time_average, time_chop};

#[derive(Debug)]
pub enum SpectrogramError {
	InvalidAxes {
		reason: String,
	},
	EmptyChop {
		start: NaiveDateTime,
		end: NaiveDateTime,
	},
	Incompatible {
		reason: String,
	},
}

impl fmt::Display for SpectrogramError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidAxes { reason } => {
				write!(f, "invalid spectrogram axes: {}", reason)
			}
			Self::EmptyChop { start, end } => {
				write!(
					f,
					"no spectrums fall within the range {} to {}",
					start, end
				)
			}
			Self::Incompatible { reason } => {
				write!(f, "spectrograms cannot be joined: {}", reason)
			}
		}
	}
}

impl Error for SpectrogramError {}

/// The physical quantity held by a spectrogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpectrumUnit {
	Amplitude,
	Power,
	Digits,
}

impl SpectrumUnit {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Amplitude => "amplitude",
			Self::Power => "power",
			Self::Digits => "digits",
		}
	}
}

impl fmt::Display for SpectrumUnit {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for SpectrumUnit {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"amplitude" => Ok(Self::Amplitude),
			"power" => Ok(Self::Power),
			"digits" => Ok(Self::Digits),
			other => Err(format!("unknown spectrum unit {:?}", other)),
		}
	}
}

/// Dense 2-D array of spectral values, rows are frequencies and columns are
/// times, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicSpectra {
	num_frequencies: usize,
	num_times: usize,
	data: Vec<f32>,
}

impl DynamicSpectra {
	pub fn zeros(num_frequencies: usize, num_times: usize) -> Self {
		Self {
			num_frequencies,
			num_times,
			data: vec![0.0; num_frequencies * num_times],
		}
	}

	/// Take ownership of a row-major buffer.
	pub fn from_vec(
		num_frequencies: usize,
		num_times: usize,
		data: Vec<f32>,
	) -> Result<Self, SpectrogramError> {
		if data.len() != num_frequencies * num_times {
			return Err(SpectrogramError::InvalidAxes {
				reason: format!(
					"buffer holds {} values, expected {}x{}",
					data.len(),
					num_frequencies,
					num_times
				),
			});
		}
		Ok(Self {
			num_frequencies,
			num_times,
			data,
		})
	}

	pub fn num_frequencies(&self) -> usize {
		self.num_frequencies
	}

	pub fn num_times(&self) -> usize {
		self.num_times
	}

	#[inline]
	pub fn get(&self, frequency_index: usize, time_index: usize) -> f32 {
		self.data[frequency_index * self.num_times + time_index]
	}

	#[inline]
	pub fn set(&mut self, frequency_index: usize, time_index: usize, value: f32) {
		self.data[frequency_index * self.num_times + time_index] = value;
	}

	pub fn row(&self, frequency_index: usize) -> &[f32] {
		let start = frequency_index * self.num_times;
		&self.data[start..start + self.num_times]
	}

	pub fn data(&self) -> &[f32] {
		&self.data
	}

	/// Write one spectrum into column `time_index`.
	pub fn fill_column(&mut self, time_index: usize, spectrum: &[f32]) {
		debug_assert!(spectrum.len() == self.num_frequencies);
		for (frequency_index, v) in spectrum.iter().enumerate() {
			self.set(frequency_index, time_index, *v);
		}
	}

	/// Reorder rows so the zero-frequency row moves to the middle.
	pub fn fftshift_rows(&mut self) {
		let split = (self.num_frequencies + 1) / 2;
		let mut shifted = Vec::with_capacity(self.data.len());
		for frequency_index in split..self.num_frequencies {
			shifted.extend_from_slice(self.row(frequency_index));
		}
		for frequency_index in 0..split {
			shifted.extend_from_slice(self.row(frequency_index));
		}
		self.data = shifted;
	}
}

fn strictly_increasing(values: &[f64]) -> bool {
	values.windows(2).all(|w| w[0] < w[1])
}

/// A time-stamped dynamic spectrum.
///
/// `times` holds seconds relative to `start_datetime` with `times[0] == 0`;
/// `frequencies` holds ascending values in Hz. Construction checks both, so
/// any instance in flight satisfies the invariants.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrogram {
	dynamic_spectra: DynamicSpectra,
	times: Vec<f64>,
	frequencies: Vec<f64>,
	spectrum_unit: SpectrumUnit,
	start_datetime: NaiveDateTime,
	tag: String,
}

impl Spectrogram {
	pub fn new<T: Into<String>>(
		dynamic_spectra: DynamicSpectra,
		times: Vec<f64>,
		frequencies: Vec<f64>,
		spectrum_unit: SpectrumUnit,
		start_datetime: NaiveDateTime,
		tag: T,
	) -> Result<Self, SpectrogramError> {
		if times.is_empty() || frequencies.is_empty() {
			return Err(SpectrogramError::InvalidAxes {
				reason: "both axes must be non-empty".to_string(),
			});
		}
		if times[0] != 0.0 {
			return Err(SpectrogramError::InvalidAxes {
				reason: format!("times must start at zero, got {}", times[0]),
			});
		}
		if !strictly_increasing(&times) {
			return Err(SpectrogramError::InvalidAxes {
				reason: "times must be strictly increasing".to_string(),
			});
		}
		if !strictly_increasing(&frequencies) {
			return Err(SpectrogramError::InvalidAxes {
				reason: "frequencies must be strictly increasing".to_string(),
			});
		}
		if dynamic_spectra.num_frequencies() != frequencies.len()
			|| dynamic_spectra.num_times() != times.len()
		{
			return Err(SpectrogramError::InvalidAxes {
				reason: format!(
					"dynamic spectra shape is {}x{}, axes are {}x{}",
					dynamic_spectra.num_frequencies(),
					dynamic_spectra.num_times(),
					frequencies.len(),
					times.len()
				),
			});
		}
		Ok(Self {
			dynamic_spectra,
			times,
			frequencies,
			spectrum_unit,
			start_datetime,
			tag: tag.into(),
		})
	}

	pub fn dynamic_spectra(&self) -> &DynamicSpectra {
		&self.dynamic_spectra
	}

	pub fn times(&self) -> &[f64] {
		&self.times
	}

	pub fn frequencies(&self) -> &[f64] {
		&self.frequencies
	}

	pub fn spectrum_unit(&self) -> SpectrumUnit {
		self.spectrum_unit
	}

	pub fn start_datetime(&self) -> NaiveDateTime {
		self.start_datetime
	}

	pub fn tag(&self) -> &str {
		&self.tag
	}

	pub fn num_times(&self) -> usize {
		self.times.len()
	}

	pub fn num_frequencies(&self) -> usize {
		self.frequencies.len()
	}

	/// Spacing between the first two spectrums, in seconds.
	pub fn time_resolution(&self) -> f64 {
		if self.times.len() < 2 {
			0.0
		} else {
			self.times[1] - self.times[0]
		}
	}

	/// Spacing between the first two spectral components, in Hz.
	pub fn frequency_resolution(&self) -> f64 {
		if self.frequencies.len() < 2 {
			0.0
		} else {
			self.frequencies[1] - self.frequencies[0]
		}
	}

	/// Seconds covered by the time axis.
	pub fn time_range(&self) -> f64 {
		self.times[self.times.len() - 1] - self.times[0]
	}

	pub fn datetime_at(&self, time_index: usize) -> NaiveDateTime {
		self.start_datetime + Duration::nanoseconds((self.times[time_index] * 1e9).round() as i64)
	}

	pub fn datetimes(&self) -> Vec<NaiveDateTime> {
		(0..self.times.len()).map(|i| self.datetime_at(i)).collect()
	}

	pub fn start_time_string(&self) -> String {
		crate::config::format_datetime(self.start_datetime)
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::parse_datetime;

	#[test]
	fn test_new_rejects_nonzero_time_origin() {
		let ds = DynamicSpectra::zeros(2, 2);
		let r = Spectrogram::new(
			ds,
			vec![1.0, 2.0],
			vec![1.0, 2.0],
			SpectrumUnit::Amplitude,
			parse_datetime("2000-01-01T00:00:00").unwrap(),
			"tag",
		);
		assert!(matches!(r, Err(SpectrogramError::InvalidAxes { .. })));
	}

	#[test]
	fn test_new_rejects_shape_mismatch() {
		let ds = DynamicSpectra::zeros(3, 2);
		let r = Spectrogram::new(
			ds,
			vec![0.0, 1.0],
			vec![1.0, 2.0],
			SpectrumUnit::Amplitude,
			parse_datetime("2000-01-01T00:00:00").unwrap(),
			"tag",
		);
		assert!(matches!(r, Err(SpectrogramError::InvalidAxes { .. })));
	}

	#[test]
	fn test_new_rejects_descending_frequencies() {
		let ds = DynamicSpectra::zeros(2, 2);
		let r = Spectrogram::new(
			ds,
			vec![0.0, 1.0],
			vec![2.0, 1.0],
			SpectrumUnit::Amplitude,
			parse_datetime("2000-01-01T00:00:00").unwrap(),
			"tag",
		);
		assert!(matches!(r, Err(SpectrogramError::InvalidAxes { .. })));
	}

	#[test]
	fn test_resolutions_and_range() {
		let start = parse_datetime("2000-01-01T00:00:00").unwrap();
		let s = testutil::quarter_second_spectrogram(
			start,
			"tag",
			&[&[0.0, 1.0], &[2.0, 3.0], &[4.0, 5.0], &[6.0, 7.0]],
		);
		assert_eq!(s.time_resolution(), 0.25);
		assert_eq!(s.frequency_resolution(), 1e6);
		assert_eq!(s.time_range(), 0.75);
	}

	#[test]
	fn test_datetimes_offset_from_start() {
		let start = parse_datetime("2000-01-01T00:00:00").unwrap();
		let s = testutil::quarter_second_spectrogram(start, "tag", &[&[0.0], &[1.0]]);
		assert_eq!(s.datetime_at(0), start);
		let s2 = testutil::quarter_second_spectrogram(
			start,
			"tag",
			&[&[0.0, 0.0], &[0.0, 0.0]],
		);
		assert_eq!(
			s2.datetime_at(1),
			start + Duration::milliseconds(250)
		);
	}

	#[test]
	fn test_fftshift_rows_even() {
		let mut ds = DynamicSpectra::from_vec(4, 1, vec![0.0, 1.0, 2.0, 3.0]).unwrap();
		ds.fftshift_rows();
		assert_eq!(ds.data(), &[2.0, 3.0, 0.0, 1.0]);
	}

	#[test]
	fn test_fftshift_rows_odd() {
		let mut ds = DynamicSpectra::from_vec(5, 1, vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
		ds.fftshift_rows();
		assert_eq!(ds.data(), &[3.0, 4.0, 0.0, 1.0, 2.0]);
	}
}
