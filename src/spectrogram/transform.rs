use chrono::Duration;

use super::{DynamicSpectra, Spectrogram, SpectrogramError};

/// Absolute tolerance for frequency-axis agreement when joining.
const FREQUENCY_ATOL: f64 = 1e-5;

fn block_size_for(resolution: f64, existing_resolution: f64, axis_len: usize) -> usize {
	if resolution <= 0.0 || existing_resolution <= 0.0 {
		return 1;
	}
	let block = (resolution / existing_resolution).floor() as usize;
	// averaging the whole axis into one block is the coarsest we go
	block.max(1).min(axis_len)
}

/// Average contiguous spectrums down to the requested time resolution.
///
/// Full blocks are averaged element-wise, the trailing partial block is
/// dropped, and each averaged spectrum takes the midpoint of its block's
/// times. The time axis is then re-baselined so it starts at zero again,
/// advancing `start_datetime` by the same amount. A resolution of zero or
/// one finer than the existing one leaves the input untouched.
pub fn time_average(
	spectrogram: &Spectrogram,
	resolution: f64,
) -> Result<Spectrogram, SpectrogramError> {
	let block = block_size_for(resolution, spectrogram.time_resolution(), spectrogram.num_times());
	if block <= 1 {
		return Ok(spectrogram.clone());
	}

	let num_blocks = spectrogram.num_times() / block;
	let num_frequencies = spectrogram.num_frequencies();
	let mut averaged = DynamicSpectra::zeros(num_frequencies, num_blocks);
	for frequency_index in 0..num_frequencies {
		let row = spectrogram.dynamic_spectra().row(frequency_index);
		for block_index in 0..num_blocks {
			let chunk = &row[block_index * block..(block_index + 1) * block];
			let mean = chunk.iter().sum::<f32>() / block as f32;
			averaged.set(frequency_index, block_index, mean);
		}
	}

	let old_times = spectrogram.times();
	let mut midpoints = Vec::with_capacity(num_blocks);
	for block_index in 0..num_blocks {
		let chunk = &old_times[block_index * block..(block_index + 1) * block];
		midpoints.push(chunk.iter().sum::<f64>() / block as f64);
	}
	let offset = midpoints[0];
	let times: Vec<f64> = midpoints.iter().map(|t| t - offset).collect();
	let start_datetime =
		spectrogram.start_datetime() + Duration::nanoseconds((offset * 1e9).round() as i64);

	Spectrogram::new(
		averaged,
		times,
		spectrogram.frequencies().to_vec(),
		spectrogram.spectrum_unit(),
		start_datetime,
		spectrogram.tag(),
	)
}

/// Average adjacent spectral components down to the requested frequency
/// resolution; the analogue of [`time_average`] along the other axis.
pub fn frequency_average(
	spectrogram: &Spectrogram,
	resolution: f64,
) -> Result<Spectrogram, SpectrogramError> {
	let block = block_size_for(
		resolution,
		spectrogram.frequency_resolution(),
		spectrogram.num_frequencies(),
	);
	if block <= 1 {
		return Ok(spectrogram.clone());
	}

	let num_blocks = spectrogram.num_frequencies() / block;
	let num_times = spectrogram.num_times();
	let mut averaged = DynamicSpectra::zeros(num_blocks, num_times);
	for block_index in 0..num_blocks {
		for time_index in 0..num_times {
			let mut sum = 0.0f32;
			for offset in 0..block {
				sum += spectrogram
					.dynamic_spectra()
					.get(block_index * block + offset, time_index);
			}
			averaged.set(block_index, time_index, sum / block as f32);
		}
	}

	let old_frequencies = spectrogram.frequencies();
	let mut frequencies = Vec::with_capacity(num_blocks);
	for block_index in 0..num_blocks {
		let chunk = &old_frequencies[block_index * block..(block_index + 1) * block];
		frequencies.push(chunk.iter().sum::<f64>() / block as f64);
	}

	Spectrogram::new(
		averaged,
		spectrogram.times().to_vec(),
		frequencies,
		spectrogram.spectrum_unit(),
		spectrogram.start_datetime(),
		spectrogram.tag(),
	)
}

/// Cut the sub-spectrogram whose datetimes fall within `[start, end]`.
///
/// The result is re-baselined so its time axis starts at zero. An input
/// fully contained in the range comes back unchanged.
pub fn time_chop(
	spectrogram: &Spectrogram,
	start: chrono::NaiveDateTime,
	end: chrono::NaiveDateTime,
) -> Result<Spectrogram, SpectrogramError> {
	let datetimes = spectrogram.datetimes();
	let keep: Vec<usize> = (0..datetimes.len())
		.filter(|i| start <= datetimes[*i] && datetimes[*i] <= end)
		.collect();

	if keep.is_empty() {
		return Err(SpectrogramError::EmptyChop { start, end });
	}
	if keep.len() == spectrogram.num_times() {
		return Ok(spectrogram.clone());
	}

	let first = keep[0];
	let last = keep[keep.len() - 1];
	let num_times = last - first + 1;
	let num_frequencies = spectrogram.num_frequencies();
	let mut chopped = DynamicSpectra::zeros(num_frequencies, num_times);
	for frequency_index in 0..num_frequencies {
		for (new_index, time_index) in (first..=last).enumerate() {
			chopped.set(
				frequency_index,
				new_index,
				spectrogram.dynamic_spectra().get(frequency_index, time_index),
			);
		}
	}

	let old_times = spectrogram.times();
	let offset = old_times[first];
	let times: Vec<f64> = (first..=last).map(|i| old_times[i] - offset).collect();

	Spectrogram::new(
		chopped,
		times,
		spectrogram.frequencies().to_vec(),
		spectrogram.spectrum_unit(),
		datetimes[first],
		spectrogram.tag(),
	)
}

fn frequencies_close(a: &[f64], b: &[f64]) -> bool {
	a.len() == b.len()
		&& a.iter()
			.zip(b.iter())
			.all(|(x, y)| (x - y).abs() <= FREQUENCY_ATOL)
}

/// Concatenate spectrograms along the time axis.
///
/// Inputs must agree on the frequency axis, the spectrum unit and the tag,
/// and must be strictly ordered and non-overlapping in datetime. The result
/// starts at the first input's `start_datetime`.
pub fn join(spectrograms: &[Spectrogram]) -> Result<Spectrogram, SpectrogramError> {
	let first = match spectrograms.first() {
		Some(first) => first,
		None => {
			return Err(SpectrogramError::Incompatible {
				reason: "nothing to join".to_string(),
			})
		}
	};
	if spectrograms.len() == 1 {
		return Ok(first.clone());
	}

	for s in &spectrograms[1..] {
		if !frequencies_close(first.frequencies(), s.frequencies()) {
			return Err(SpectrogramError::Incompatible {
				reason: "frequency axes differ".to_string(),
			});
		}
		if s.spectrum_unit() != first.spectrum_unit() {
			return Err(SpectrogramError::Incompatible {
				reason: format!(
					"spectrum units differ: {} vs {}",
					first.spectrum_unit(),
					s.spectrum_unit()
				),
			});
		}
		if s.tag() != first.tag() {
			return Err(SpectrogramError::Incompatible {
				reason: format!("tags differ: {:?} vs {:?}", first.tag(), s.tag()),
			});
		}
	}
	for pair in spectrograms.windows(2) {
		let previous_end = pair[0].datetime_at(pair[0].num_times() - 1);
		let next_start = pair[1].datetime_at(0);
		if previous_end >= next_start {
			return Err(SpectrogramError::Incompatible {
				reason: format!(
					"spectrograms overlap in time ({} >= {})",
					previous_end, next_start
				),
			});
		}
	}

	let num_frequencies = first.num_frequencies();
	let num_times: usize = spectrograms.iter().map(|s| s.num_times()).sum();
	let mut joined = DynamicSpectra::zeros(num_frequencies, num_times);
	let mut times = Vec::with_capacity(num_times);
	let start_datetime = first.start_datetime();

	let mut column = 0usize;
	for s in spectrograms {
		let offset = (s.start_datetime() - start_datetime)
			.num_nanoseconds()
			.map(|ns| ns as f64 / 1e9)
			.unwrap_or_else(|| {
				(s.start_datetime() - start_datetime).num_microseconds().unwrap_or(0) as f64 / 1e6
			});
		for time_index in 0..s.num_times() {
			times.push(offset + s.times()[time_index]);
			for frequency_index in 0..num_frequencies {
				joined.set(
					frequency_index,
					column,
					s.dynamic_spectra().get(frequency_index, time_index),
				);
			}
			column += 1;
		}
	}

	Spectrogram::new(
		joined,
		times,
		first.frequencies().to_vec(),
		first.spectrum_unit(),
		start_datetime,
		first.tag(),
	)
}
