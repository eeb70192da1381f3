use std::error::Error;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use num_traits::Zero;

use rustfft::{num_complex::Complex, Fft as FftImpl, FftPlanner};

use crate::spectrogram::DynamicSpectra;

#[derive(Debug)]
pub enum SfftError {
	UnsupportedWindow {
		name: String,
	},
	InvalidWindowSize {
		size: usize,
	},
	InvalidHop {
		hop: usize,
	},
	InvalidShape {
		reason: String,
	},
}

impl fmt::Display for SfftError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::UnsupportedWindow { name } => {
				write!(f, "unsupported window {:?}", name)
			}
			Self::InvalidWindowSize { size } => {
				write!(f, "invalid window size {}", size)
			}
			Self::InvalidHop { hop } => {
				write!(f, "invalid window hop {}", hop)
			}
			Self::InvalidShape { reason } => {
				write!(f, "invalid output shape: {}", reason)
			}
		}
	}
}

impl Error for SfftError {}

/// The window functions applied before each FFT.
///
/// Coefficients are the periodic ("fftbins") variants, matching what the
/// usual signal-processing toolkits hand out by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
	Boxcar,
	Hann,
	Blackman,
}

impl WindowKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Boxcar => "boxcar",
			Self::Hann => "hann",
			Self::Blackman => "blackman",
		}
	}
}

impl FromStr for WindowKind {
	type Err = SfftError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"boxcar" => Ok(Self::Boxcar),
			"hann" => Ok(Self::Hann),
			"blackman" => Ok(Self::Blackman),
			other => Err(SfftError::UnsupportedWindow {
				name: other.to_string(),
			}),
		}
	}
}

impl fmt::Display for WindowKind {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Compute the window coefficients for `size` samples.
pub fn make_window(kind: WindowKind, size: usize) -> Result<Vec<f32>, SfftError> {
	if size < 1 {
		return Err(SfftError::InvalidWindowSize { size });
	}
	let n = size as f64;
	let values = (0..size).map(|i| {
		let x = 2.0 * PI * (i as f64) / n;
		match kind {
			WindowKind::Boxcar => 1.0,
			WindowKind::Hann => 0.5 - 0.5 * x.cos(),
			WindowKind::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
		}
	});
	Ok(values.map(|v| v as f32).collect())
}

/// How many spectrums a signal of `num_samples` yields.
///
/// A signal shorter than the window is zero-padded into a single spectrum.
pub fn num_spectrums(num_samples: usize, window_size: usize, hop: usize) -> usize {
	if window_size > num_samples {
		1
	} else {
		((num_samples - window_size) / hop + 1).max(1)
	}
}

/// The physical time assigned to each spectrum, in seconds.
pub fn spectrum_times(num_spectrums: usize, sample_rate: u32, hop: usize) -> Vec<f64> {
	(0..num_spectrums)
		.map(|k| (k * hop) as f64 / sample_rate as f64)
		.collect()
}

/// Sample frequencies of a `size`-point FFT at `sample_rate`, natural order
/// (zero first, negative frequencies in the upper half).
pub fn fftfreq(size: usize, sample_rate: u32) -> Vec<f64> {
	let step = sample_rate as f64 / size as f64;
	let positive = (size + 1) / 2;
	let mut frequencies = Vec::with_capacity(size);
	for k in 0..positive {
		frequencies.push(k as f64 * step);
	}
	for k in 0..size - positive {
		frequencies.push((k as i64 - (size / 2) as i64) as f64 * step);
	}
	frequencies
}

/// Reorder a natural-order axis so the zero-frequency entry sits in the
/// middle.
pub fn fftshift(values: &[f64]) -> Vec<f64> {
	let split = (values.len() + 1) / 2;
	let mut shifted = Vec::with_capacity(values.len());
	shifted.extend_from_slice(&values[split..]);
	shifted.extend_from_slice(&values[..split]);
	shifted
}

/// A pre-planned short-time FFT.
///
/// The plan, window and scratch buffers are allocated once and reused across
/// batches; only the signal changes from call to call.
pub struct Stfft {
	fft: Arc<dyn FftImpl<f32>>,
	window: Vec<f32>,
	hop: usize,
	buffer: Vec<Complex<f32>>,
	scratch: Vec<Complex<f32>>,
}

impl Stfft {
	pub fn new(window: Vec<f32>, hop: usize) -> Result<Self, SfftError> {
		if window.is_empty() {
			return Err(SfftError::InvalidWindowSize { size: 0 });
		}
		if hop < 1 {
			return Err(SfftError::InvalidHop { hop });
		}
		let fft = FftPlanner::new().plan_fft_forward(window.len());
		let mut scratch = Vec::new();
		scratch.resize(fft.get_inplace_scratch_len(), Complex::zero());
		let buffer = vec![Complex::zero(); window.len()];
		Ok(Self {
			fft,
			window,
			hop,
			buffer,
			scratch,
		})
	}

	pub fn window_size(&self) -> usize {
		self.window.len()
	}

	pub fn hop(&self) -> usize {
		self.hop
	}

	/// Run the short-time FFT over `signal`.
	///
	/// Each hop copies a window-sized slice into the buffer (zero-padding
	/// the tail when the signal runs out), applies the window, executes the
	/// FFT in place and stores the amplitude spectrum as one column of the
	/// result, which is `window_size x num_spectrums` in natural frequency
	/// order.
	pub fn process(&mut self, signal: &[Complex<f32>]) -> Result<DynamicSpectra, SfftError> {
		let window_size = self.window.len();
		let count = num_spectrums(signal.len(), window_size, self.hop);
		window_size
			.checked_mul(count)
			.ok_or_else(|| SfftError::InvalidShape {
				reason: format!("{} spectrums of {} bins overflow", count, window_size),
			})?;

		let mut spectra = DynamicSpectra::zeros(window_size, count);
		let mut amplitudes = vec![0.0f32; window_size];
		for k in 0..count {
			let offset = k * self.hop;
			let available = signal.len().saturating_sub(offset).min(window_size);
			self.buffer[..available].copy_from_slice(&signal[offset..offset + available]);
			for slot in self.buffer[available..].iter_mut() {
				*slot = Complex::zero();
			}
			for (slot, w) in self.buffer.iter_mut().zip(self.window.iter()) {
				*slot = *slot * *w;
			}
			self.fft
				.process_with_scratch(&mut self.buffer, &mut self.scratch);
			for (amplitude, bin) in amplitudes.iter_mut().zip(self.buffer.iter()) {
				*amplitude = bin.norm();
			}
			spectra.fill_column(k, &amplitudes);
		}
		Ok(spectra)
	}
}
