use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::NaiveDateTime;

use crate::config::{self, Paths};

use super::{DynamicSpectra, Spectrogram, SpectrogramError, SpectrumUnit};

/// FITS files are sequences of 2880-byte blocks; headers are 80-byte cards.
const BLOCK_SIZE: usize = 2880;
const CARD_SIZE: usize = 80;

#[derive(Debug)]
pub enum FitsError {
	Io(io::Error),
	Malformed {
		reason: String,
	},
	Spectrogram(SpectrogramError),
}

impl fmt::Display for FitsError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Io(e) => write!(f, "{}", e),
			Self::Malformed { reason } => write!(f, "malformed FITS file: {}", reason),
			Self::Spectrogram(e) => write!(f, "{}", e),
		}
	}
}

impl Error for FitsError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Io(e) => Some(e),
			Self::Spectrogram(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for FitsError {
	fn from(other: io::Error) -> Self {
		Self::Io(other)
	}
}

impl From<SpectrogramError> for FitsError {
	fn from(other: SpectrogramError) -> Self {
		Self::Spectrogram(other)
	}
}

/// Observatory metadata carried in the primary header.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsMetadata {
	pub origin: String,
	pub telescope: String,
	pub instrument: String,
	pub object: String,
	pub obs_lat: f64,
	pub obs_lon: f64,
	pub obs_alt: f64,
}

impl Default for FitsMetadata {
	fn default() -> Self {
		Self {
			origin: "spectre".to_string(),
			telescope: "NOTSET".to_string(),
			instrument: "NOTSET".to_string(),
			object: "NOTSET".to_string(),
			obs_lat: 0.0,
			obs_lon: 0.0,
			obs_alt: 0.0,
		}
	}
}

struct HeaderBuilder {
	cards: Vec<u8>,
}

impl HeaderBuilder {
	fn new() -> Self {
		Self { cards: Vec::new() }
	}

	fn push_card(&mut self, card: String) {
		debug_assert!(card.len() <= CARD_SIZE);
		let mut bytes = card.into_bytes();
		bytes.resize(CARD_SIZE, b' ');
		self.cards.extend_from_slice(&bytes);
	}

	fn logical(&mut self, keyword: &str, value: bool) {
		self.push_card(format!(
			"{:<8}= {:>20}",
			keyword,
			if value { "T" } else { "F" }
		));
	}

	fn integer(&mut self, keyword: &str, value: i64) {
		self.push_card(format!("{:<8}= {:>20}", keyword, value));
	}

	fn float(&mut self, keyword: &str, value: f64) {
		self.push_card(format!("{:<8}= {:>20}", keyword, format!("{:.6E}", value)));
	}

	fn string(&mut self, keyword: &str, value: &str) {
		let escaped = value.replace('\'', "''");
		self.push_card(format!("{:<8}= '{:<8}'", keyword, escaped));
	}

	fn end(mut self) -> Vec<u8> {
		self.push_card("END".to_string());
		pad_to_block(&mut self.cards, b' ');
		self.cards
	}
}

fn pad_to_block(buffer: &mut Vec<u8>, fill: u8) {
	let remainder = buffer.len() % BLOCK_SIZE;
	if remainder != 0 {
		buffer.resize(buffer.len() + BLOCK_SIZE - remainder, fill);
	}
}

/// Serialise a spectrogram into the FITS layout: a primary image HDU with
/// the dynamic spectra and one bintable HDU carrying the TIME and FREQUENCY
/// columns (frequencies leave in MHz).
fn encode(spectrogram: &Spectrogram, metadata: &FitsMetadata) -> Vec<u8> {
	let num_times = spectrogram.num_times();
	let num_frequencies = spectrogram.num_frequencies();

	let mut header = HeaderBuilder::new();
	header.logical("SIMPLE", true);
	header.integer("BITPIX", -32);
	header.integer("NAXIS", 2);
	header.integer("NAXIS1", num_times as i64);
	header.integer("NAXIS2", num_frequencies as i64);
	header.string("ORIGIN", &metadata.origin);
	header.string("TELESCOP", &metadata.telescope);
	header.string("INSTRUME", &metadata.instrument);
	header.string("OBJECT", &metadata.object);
	header.float("OBS_LAT", metadata.obs_lat);
	header.float("OBS_LON", metadata.obs_lon);
	header.float("OBS_ALT", metadata.obs_alt);
	header.string("BUNIT", spectrogram.spectrum_unit().as_str());
	header.string(
		"DATE-OBS",
		&spectrogram
			.start_datetime()
			.format(config::DATE_FORMAT)
			.to_string(),
	);
	header.string(
		"TIME-OBS",
		&spectrogram
			.start_datetime()
			.format(config::TIME_FORMAT)
			.to_string(),
	);
	let mut out = header.end();

	for value in spectrogram.dynamic_spectra().data() {
		out.write_f32::<BigEndian>(*value)
			.expect("writes to a vector cannot fail");
	}
	pad_to_block(&mut out, 0);

	let row_width = 4 * (num_times + num_frequencies);
	let mut table = HeaderBuilder::new();
	table.string("XTENSION", "BINTABLE");
	table.integer("BITPIX", 8);
	table.integer("NAXIS", 2);
	table.integer("NAXIS1", row_width as i64);
	table.integer("NAXIS2", 1);
	table.integer("PCOUNT", 0);
	table.integer("GCOUNT", 1);
	table.integer("TFIELDS", 2);
	table.string("TTYPE1", "TIME");
	table.string("TFORM1", &format!("{}E", num_times));
	table.string("TUNIT1", "s");
	table.string("TTYPE2", "FREQUENCY");
	table.string("TFORM2", &format!("{}E", num_frequencies));
	table.string("TUNIT2", "MHz");
	out.extend_from_slice(&table.end());

	for t in spectrogram.times() {
		out.write_f32::<BigEndian>(*t as f32)
			.expect("writes to a vector cannot fail");
	}
	for frequency in spectrogram.frequencies() {
		out.write_f32::<BigEndian>((*frequency / 1e6) as f32)
			.expect("writes to a vector cannot fail");
	}
	pad_to_block(&mut out, 0);
	out
}

/// Write `spectrogram` into the date-partitioned batches tree, named
/// `<start_time>_<tag>.fits`. Returns the path written.
pub fn write_fits(
	spectrogram: &Spectrogram,
	metadata: &FitsMetadata,
	paths: &Paths,
) -> Result<PathBuf, FitsError> {
	let parent = paths.batch_dir_for_date(spectrogram.start_datetime().date());
	fs::create_dir_all(&parent)?;
	let path = parent.join(format!(
		"{}_{}.fits",
		spectrogram.start_time_string(),
		spectrogram.tag()
	));
	let encoded = encode(spectrogram, metadata);
	let mut f = fs::File::create(&path)?;
	f.write_all(&encoded)?;
	f.sync_all()?;
	Ok(path)
}

struct Header {
	cards: Vec<(String, String)>,
	blocks: usize,
}

impl Header {
	fn get(&self, keyword: &str) -> Result<&str, FitsError> {
		self.cards
			.iter()
			.find(|(k, _)| k == keyword)
			.map(|(_, v)| v.as_str())
			.ok_or_else(|| FitsError::Malformed {
				reason: format!("missing keyword {}", keyword),
			})
	}

	fn get_integer(&self, keyword: &str) -> Result<i64, FitsError> {
		let raw = self.get(keyword)?;
		i64::from_str(raw).map_err(|_| FitsError::Malformed {
			reason: format!("keyword {} is not an integer: {:?}", keyword, raw),
		})
	}

	fn get_string(&self, keyword: &str) -> Result<String, FitsError> {
		let raw = self.get(keyword)?;
		if raw.len() < 2 || !raw.starts_with('\'') || !raw.ends_with('\'') {
			return Err(FitsError::Malformed {
				reason: format!("keyword {} is not a string: {:?}", keyword, raw),
			});
		}
		Ok(raw[1..raw.len() - 1].trim_end().replace("''", "'"))
	}
}

fn parse_header<R: Read>(reader: &mut R) -> Result<Header, FitsError> {
	let mut cards = Vec::new();
	let mut blocks = 0usize;
	loop {
		let mut block = [0u8; BLOCK_SIZE];
		reader.read_exact(&mut block)?;
		blocks += 1;
		let mut done = false;
		for card in block.chunks(CARD_SIZE) {
			let card = String::from_utf8_lossy(card);
			let keyword = card[..8].trim_end();
			if keyword == "END" {
				done = true;
				break;
			}
			if keyword.is_empty() || &card[8..10] != "= " {
				continue;
			}
			// strip any trailing comment outside of a quoted string
			let raw = card[10..].trim();
			let value = if raw.starts_with('\'') {
				match raw[1..].find('\'') {
					Some(closing) => &raw[..closing + 2],
					None => raw,
				}
			} else {
				raw.split('/').next().unwrap_or("").trim()
			};
			cards.push((keyword.to_string(), value.trim().to_string()));
		}
		if done {
			return Ok(Header { cards, blocks });
		}
	}
}

fn read_data<R: Read>(reader: &mut R, count: usize) -> Result<Vec<f32>, FitsError> {
	let mut values = Vec::with_capacity(count);
	for _ in 0..count {
		values.push(reader.read_f32::<BigEndian>()?);
	}
	// consume the block padding
	let consumed = count * 4;
	let remainder = consumed % BLOCK_SIZE;
	if remainder != 0 {
		let mut padding = vec![0u8; BLOCK_SIZE - remainder];
		reader.read_exact(&mut padding)?;
	}
	Ok(values)
}

fn parse_tform_count(tform: &str) -> Result<usize, FitsError> {
	let digits: String = tform.chars().take_while(|c| c.is_ascii_digit()).collect();
	if !tform[digits.len()..].starts_with('E') {
		return Err(FitsError::Malformed {
			reason: format!("unsupported column format {:?}", tform),
		});
	}
	digits.parse::<usize>().map_err(|_| FitsError::Malformed {
		reason: format!("unsupported column format {:?}", tform),
	})
}

/// Read a spectrogram back from a FITS file written by [`write_fits`].
pub fn read_fits(path: &Path, tag: &str) -> Result<Spectrogram, FitsError> {
	let mut reader = io::BufReader::new(fs::File::open(path)?);

	let primary = parse_header(&mut reader)?;
	let num_times = primary.get_integer("NAXIS1")? as usize;
	let num_frequencies = primary.get_integer("NAXIS2")? as usize;
	let bunit = primary.get_string("BUNIT")?;
	let spectrum_unit =
		SpectrumUnit::from_str(&bunit).map_err(|reason| FitsError::Malformed { reason })?;
	let date_obs = primary.get_string("DATE-OBS")?;
	let time_obs = primary.get_string("TIME-OBS")?;
	let start_datetime = config::parse_datetime(&format!("{}T{}", date_obs, time_obs))
		.map_err(|e| FitsError::Malformed {
			reason: format!("bad DATE-OBS/TIME-OBS: {}", e),
		})?;

	let data = read_data(&mut reader, num_times * num_frequencies)?;
	let dynamic_spectra = DynamicSpectra::from_vec(num_frequencies, num_times, data)?;

	let table = parse_header(&mut reader)?;
	let time_count = parse_tform_count(&table.get_string("TFORM1")?)?;
	let frequency_count = parse_tform_count(&table.get_string("TFORM2")?)?;
	if time_count != num_times || frequency_count != num_frequencies {
		return Err(FitsError::Malformed {
			reason: format!(
				"axis table is {}x{}, image is {}x{}",
				frequency_count, time_count, num_frequencies, num_times
			),
		});
	}
	let mut axes = read_data(&mut reader, time_count + frequency_count)?;
	let frequencies: Vec<f64> = axes
		.split_off(time_count)
		.into_iter()
		.map(|v| v as f64 * 1e6)
		.collect();
	let times: Vec<f64> = axes.into_iter().map(|v| v as f64).collect();

	Ok(Spectrogram::new(
		dynamic_spectra,
		times,
		frequencies,
		spectrum_unit,
		start_datetime,
		tag,
	)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::parse_datetime;
	use crate::spectrogram::testutil::quarter_second_spectrogram;

	fn fixture() -> Spectrogram {
		quarter_second_spectrogram(
			parse_datetime("2025-06-01T12:00:00").unwrap(),
			"cosine-wave",
			&[
				&[0.0, 4.0, 8.0, 12.0],
				&[1.0, 5.0, 9.0, 13.0],
				&[2.0, 6.0, 10.0, 14.0],
				&[3.0, 7.0, 11.0, 15.0],
			],
		)
	}

	#[test]
	fn test_encoded_size_is_block_aligned() {
		let encoded = encode(&fixture(), &FitsMetadata::default());
		assert_eq!(encoded.len() % BLOCK_SIZE, 0);
		// primary header, data, table header, table data
		assert_eq!(encoded.len(), 4 * BLOCK_SIZE);
	}

	#[test]
	fn test_write_read_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		let spectrogram = fixture();

		let path = write_fits(&spectrogram, &FitsMetadata::default(), &paths).unwrap();
		assert_eq!(
			path.file_name().unwrap().to_str().unwrap(),
			"2025-06-01T12:00:00_cosine-wave.fits"
		);
		assert!(path.starts_with(paths.batches_dir().join("2025/06/01")));

		let loaded = read_fits(&path, "cosine-wave").unwrap();
		assert_eq!(loaded.start_datetime(), spectrogram.start_datetime());
		assert_eq!(loaded.spectrum_unit(), spectrogram.spectrum_unit());
		assert_eq!(loaded.dynamic_spectra(), spectrogram.dynamic_spectra());
		assert_eq!(loaded.times(), spectrogram.times());
		for (a, b) in loaded
			.frequencies()
			.iter()
			.zip(spectrogram.frequencies().iter())
		{
			assert!((a - b).abs() < 1.0, "{} vs {}", a, b);
		}
	}

	#[test]
	fn test_metadata_survives_in_header() {
		let dir = tempfile::tempdir().unwrap();
		let paths = Paths::new(dir.path());
		let metadata = FitsMetadata {
			origin: "spectre".to_string(),
			telescope: "LOFAR".to_string(),
			instrument: "HBA".to_string(),
			object: "SUN".to_string(),
			obs_lat: 52.9,
			obs_lon: 6.87,
			obs_alt: 15.0,
		};
		let path = write_fits(&fixture(), &metadata, &paths).unwrap();

		let mut reader = io::BufReader::new(fs::File::open(&path).unwrap());
		let header = parse_header(&mut reader).unwrap();
		assert_eq!(header.get_string("TELESCOP").unwrap(), "LOFAR");
		assert_eq!(header.get_string("INSTRUME").unwrap(), "HBA");
		assert_eq!(header.get_string("OBJECT").unwrap(), "SUN");
		assert_eq!(header.get_string("BUNIT").unwrap(), "amplitude");
		assert_eq!(header.get_string("DATE-OBS").unwrap(), "2025-06-01");
		assert_eq!(header.get_string("TIME-OBS").unwrap(), "12:00:00");
	}

	#[test]
	fn test_read_rejects_truncated_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("broken.fits");
		fs::write(&path, b"SIMPLE  =").unwrap();
		assert!(read_fits(&path, "tag").is_err());
	}
}
