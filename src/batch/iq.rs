use std::fs;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use rustfft::num_complex::Complex;

/// Sidecar metadata for swept capture: the center frequency of each sweep
/// step and the number of I/Q samples taken there.
#[derive(Debug, Clone, PartialEq)]
pub struct IQMetadata {
	pub center_frequencies: Vec<f32>,
	pub num_samples: Vec<i32>,
}

impl IQMetadata {
	pub fn total_samples(&self) -> i64 {
		self.num_samples.iter().map(|n| *n as i64).sum()
	}
}

fn at_eof<R: Read>(reader: &mut BufReader<R>) -> io::Result<bool> {
	use std::io::BufRead;
	Ok(reader.fill_buf()?.is_empty())
}

/// Interleaved single-precision I/Q.
pub fn read_fc32(path: &Path) -> io::Result<Vec<Complex<f32>>> {
	let mut reader = BufReader::new(fs::File::open(path)?);
	let mut samples = Vec::new();
	while !at_eof(&mut reader)? {
		let re = reader.read_f32::<LittleEndian>()?;
		let im = reader.read_f32::<LittleEndian>()?;
		samples.push(Complex { re, im });
	}
	Ok(samples)
}

/// Interleaved double-precision I/Q, narrowed on read.
pub fn read_fc64(path: &Path) -> io::Result<Vec<Complex<f32>>> {
	let mut reader = BufReader::new(fs::File::open(path)?);
	let mut samples = Vec::new();
	while !at_eof(&mut reader)? {
		let re = reader.read_f64::<LittleEndian>()?;
		let im = reader.read_f64::<LittleEndian>()?;
		samples.push(Complex {
			re: re as f32,
			im: im as f32,
		});
	}
	Ok(samples)
}

/// Interleaved signed 8-bit I/Q, promoted on read.
pub fn read_sc8(path: &Path) -> io::Result<Vec<Complex<f32>>> {
	let mut reader = BufReader::new(fs::File::open(path)?);
	let mut samples = Vec::new();
	while !at_eof(&mut reader)? {
		let re = reader.read_i8()?;
		let im = reader.read_i8()?;
		samples.push(Complex {
			re: re as f32,
			im: im as f32,
		});
	}
	Ok(samples)
}

/// Interleaved signed 16-bit I/Q, promoted on read.
pub fn read_sc16(path: &Path) -> io::Result<Vec<Complex<f32>>> {
	let mut reader = BufReader::new(fs::File::open(path)?);
	let mut samples = Vec::new();
	while !at_eof(&mut reader)? {
		let re = reader.read_i16::<LittleEndian>()?;
		let im = reader.read_i16::<LittleEndian>()?;
		samples.push(Complex {
			re: re as f32,
			im: im as f32,
		});
	}
	Ok(samples)
}

/// Interleaved (center frequency, sample count) pairs.
pub fn read_hdr(path: &Path) -> io::Result<IQMetadata> {
	let mut reader = BufReader::new(fs::File::open(path)?);
	let mut center_frequencies = Vec::new();
	let mut num_samples = Vec::new();
	while !at_eof(&mut reader)? {
		center_frequencies.push(reader.read_f32::<LittleEndian>()?);
		num_samples.push(reader.read_i32::<LittleEndian>()?);
	}
	Ok(IQMetadata {
		center_frequencies,
		num_samples,
	})
}

pub fn write_fc32(path: &Path, samples: &[Complex<f32>]) -> io::Result<()> {
	let f = fs::File::create(path)?;
	let mut writer = BufWriter::new(f);
	for sample in samples {
		writer.write_f32::<LittleEndian>(sample.re)?;
		writer.write_f32::<LittleEndian>(sample.im)?;
	}
	writer.flush()?;
	writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}

pub fn write_sc16(path: &Path, samples: &[(i16, i16)]) -> io::Result<()> {
	let f = fs::File::create(path)?;
	let mut writer = BufWriter::new(f);
	for (re, im) in samples {
		writer.write_i16::<LittleEndian>(*re)?;
		writer.write_i16::<LittleEndian>(*im)?;
	}
	writer.flush()?;
	writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}

pub fn write_hdr(path: &Path, metadata: &IQMetadata) -> io::Result<()> {
	debug_assert!(metadata.center_frequencies.len() == metadata.num_samples.len());
	let f = fs::File::create(path)?;
	let mut writer = BufWriter::new(f);
	for (center_frequency, count) in metadata
		.center_frequencies
		.iter()
		.zip(metadata.num_samples.iter())
	{
		writer.write_f32::<LittleEndian>(*center_frequency)?;
		writer.write_i32::<LittleEndian>(*count)?;
	}
	writer.flush()?;
	writer.into_inner().map_err(|e| e.into_error())?.sync_all()
}
