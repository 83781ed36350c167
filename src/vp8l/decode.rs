/*!
# Wepfli: Decoder.

A straightforward VP8L decoder, used to verify the encoder's output. It
accepts anything a conforming encoder could produce (not just what this
crate writes), and rejects anything malformed rather than guessing.
*/

use super::{
	BitReader,
	CACHE_OFFSET,
	CL_CODE_ORDER,
	ColorCache,
	DIMENSION_BITS,
	is_complete,
	MAX_CACHE_BITS,
	MAX_CODE_LENGTH,
	Multipliers,
	NUM_CL_CODES,
	NUM_DISTANCE_CODES,
	NUM_LITERAL_CODES,
	packing_bits,
	PlaneCodes,
	PrefixCode,
	RIFF_HEADER_SIZE,
	subsample,
	TransformSpec,
	undelta_palette,
	VP8L_SIGNATURE,
	VP8L_VERSION,
	WepfliError,
};



#[derive(Debug, Clone)]
/// # Decoded Image.
pub(crate) struct Decoded {
	/// # Width.
	pub(crate) width: usize,

	/// # Height.
	pub(crate) height: usize,

	/// # Pixels.
	pub(crate) argb: Vec<u32>,
}

/// # Decode.
///
/// Parse a RIFF-wrapped VP8L image.
///
/// ## Errors
///
/// Returns `Malformed` for anything that isn't a valid lossless WebP.
pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded, WepfliError> {
	let payload = unwrap_riff(bytes)?;
	let mut r = BitReader::new(payload);

	if r.read_bits(8)? != u32::from(VP8L_SIGNATURE) {
		return Err(WepfliError::Malformed("bad VP8L signature"));
	}
	let width = r.read_bits(DIMENSION_BITS)? as usize + 1;
	let height = r.read_bits(DIMENSION_BITS)? as usize + 1;
	let _alpha = r.read_bit()?;
	if r.read_bits(3)? != VP8L_VERSION {
		return Err(WepfliError::Malformed("unsupported VP8L version"));
	}

	// Transforms, each remembered alongside the width it applied to.
	let mut transforms: Vec<(TransformSpec, usize)> = Vec::new();
	let mut seen = [false; 4];
	let mut xsize = width;
	while r.read_bit()? {
		let kind = r.read_bits(2)? as usize;
		if seen[kind] { return Err(WepfliError::Malformed("repeated transform")); }
		seen[kind] = true;

		let spec = match kind {
			0 | 1 => {
				let bits = r.read_bits(3)? as u8 + 2;
				let sub = decode_image(
					&mut r,
					subsample(xsize, bits),
					subsample(height, bits),
					false,
				)?;
				if kind == 0 {
					let modes = sub.iter().map(|&px| (px >> 8) as u8).collect();
					TransformSpec::Predictor { bits, modes }
				}
				else {
					let multipliers = sub.into_iter().map(Multipliers::from_argb).collect();
					TransformSpec::CrossColor { bits, multipliers }
				}
			},
			2 => TransformSpec::SubtractGreen,
			_ => {
				let size = r.read_bits(8)? as usize + 1;
				let mut colors = decode_image(&mut r, size, 1, false)?;
				undelta_palette(&mut colors);
				TransformSpec::Palette { colors }
			},
		};

		let before = xsize;
		if let TransformSpec::Palette { colors } = &spec {
			xsize = subsample(xsize, packing_bits(colors.len()));
		}
		transforms.push((spec, before));
	}

	let mut argb = decode_image(&mut r, xsize, height, true)?;
	for (spec, w) in transforms.iter().rev() {
		spec.invert(&mut argb, *w, height)?;
	}

	Ok(Decoded { width, height, argb })
}

/// # Unwrap RIFF.
///
/// Return the VP8L chunk payload.
fn unwrap_riff(bytes: &[u8]) -> Result<&[u8], WepfliError> {
	if bytes.len() < RIFF_HEADER_SIZE || &bytes[..4] != b"RIFF" || &bytes[8..12] != b"WEBP" {
		return Err(WepfliError::Malformed("not a RIFF/WEBP file"));
	}
	if &bytes[12..16] != b"VP8L" {
		return Err(WepfliError::Malformed("not a lossless WebP"));
	}

	let riff_size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
	let chunk_size = u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]) as usize;
	if riff_size < chunk_size + 12 || bytes.len() < riff_size + 8 {
		return Err(WepfliError::Malformed("truncated RIFF"));
	}

	bytes.get(RIFF_HEADER_SIZE..RIFF_HEADER_SIZE + chunk_size)
		.ok_or(WepfliError::Malformed("truncated VP8L chunk"))
}



/// # Decode Entropy-Coded Image.
///
/// Only the main image may carry an entropy (meta prefix) image.
fn decode_image(r: &mut BitReader<'_>, width: usize, height: usize, main: bool)
-> Result<Vec<u32>, WepfliError> {
	let cache_bits =
		if r.read_bit()? {
			let bits = r.read_bits(4)? as u8;
			if bits == 0 || MAX_CACHE_BITS < bits {
				return Err(WepfliError::Malformed("invalid color cache size"));
			}
			bits
		}
		else { 0 };

	// The entropy image, if any.
	let meta =
		if main && r.read_bit()? {
			let bits = r.read_bits(3)? as u8 + 2;
			let map: Vec<usize> = decode_image(r, subsample(width, bits), subsample(height, bits), false)?
				.into_iter()
				.map(|px| ((px >> 8) & 0xffff) as usize)
				.collect();
			Some((bits, map))
		}
		else { None };

	let num_groups = meta.as_ref()
		.and_then(|(_, map)| map.iter().max())
		.map_or(1, |&m| m + 1);

	let green_size = CACHE_OFFSET + if cache_bits == 0 { 0 } else { 1 << cache_bits };
	let mut groups = Vec::with_capacity(num_groups);
	for _ in 0..num_groups {
		groups.push([
			PrefixDecoder::parse(r, green_size)?,
			PrefixDecoder::parse(r, NUM_LITERAL_CODES)?,
			PrefixDecoder::parse(r, NUM_LITERAL_CODES)?,
			PrefixDecoder::parse(r, NUM_LITERAL_CODES)?,
			PrefixDecoder::parse(r, NUM_DISTANCE_CODES)?,
		]);
	}

	let planes = PlaneCodes::new(width);
	let total = width * height;
	let mut cache = ColorCache::new(cache_bits);
	let mut cached = 0;
	let mut out: Vec<u32> = Vec::with_capacity(total);
	while out.len() < total {
		let pos = out.len();
		let group = match &meta {
			Some((bits, map)) => {
				let tile = ((pos / width) >> bits) * subsample(width, *bits) + ((pos % width) >> bits);
				&groups[map[tile]]
			},
			None => &groups[0],
		};
		let [green, red, blue, alpha, dist] = group;

		let g = green.read(r)?;
		if g < NUM_LITERAL_CODES {
			let rr = red.read(r)? as u32;
			let bb = blue.read(r)? as u32;
			let aa = alpha.read(r)? as u32;
			out.push(aa << 24 | rr << 16 | (g as u32) << 8 | bb);
		}
		else if g < CACHE_OFFSET {
			let length = read_prefixed(r, g - NUM_LITERAL_CODES)? as usize;
			let sym = dist.read(r)?;
			let code = read_prefixed(r, sym)?;
			let distance = planes.distance(code)
				.ok_or(WepfliError::Malformed("invalid distance"))?;
			if pos < distance || total - pos < length {
				return Err(WepfliError::Malformed("backward reference out of bounds"));
			}
			for i in pos..pos + length { out.push(out[i - distance]); }
		}
		else {
			let px = cache.as_ref()
				.and_then(|c| c.get(g - CACHE_OFFSET))
				.ok_or(WepfliError::Malformed("invalid color cache index"))?;
			out.push(px);
		}

		if let Some(c) = cache.as_mut() {
			for &px in &out[cached..] { c.insert(px); }
			cached = out.len();
		}
	}

	Ok(out)
}

#[allow(clippy::cast_possible_truncation, reason = "Prefix symbols are below 40.")]
/// # Read Prefix-Coded Value.
fn read_prefixed(r: &mut BitReader<'_>, symbol: usize) -> Result<u32, WepfliError> {
	let code = symbol as u8;
	let extra = r.read_bits(PrefixCode::extra_bits(code))?;
	Ok(PrefixCode::decode(code, extra))
}



#[derive(Debug, Clone)]
/// # Prefix Decoder.
///
/// Canonical decoding by length counts, one bit at a time.
struct PrefixDecoder {
	/// # Codes Per Length.
	counts: [u32; MAX_CODE_LENGTH as usize + 1],

	/// # Symbols in Canonical Order.
	symbols: Vec<usize>,
}

impl PrefixDecoder {
	/// # Parse Code.
	fn parse(r: &mut BitReader<'_>, alphabet: usize) -> Result<Self, WepfliError> {
		let mut lengths = vec![0_u8; alphabet];

		// Simple.
		if r.read_bit()? {
			let count = r.read_bits(1)? as usize + 1;
			let first_bits = if r.read_bit()? { 8 } else { 1 };
			let mut symbols = [r.read_bits(first_bits)? as usize, 0];
			if count == 2 { symbols[1] = r.read_bits(8)? as usize; }
			for &s in &symbols[..count] {
				*lengths.get_mut(s).ok_or(WepfliError::Malformed("invalid simple code"))? = 1;
			}
			return Self::from_lengths(&lengths);
		}

		// Normal.
		let mut cl_lengths = [0_u8; NUM_CL_CODES];
		let stored = r.read_bits(4)? as usize + 4;
		for &idx in &CL_CODE_ORDER[..stored] {
			cl_lengths[idx] = r.read_bits(3)? as u8;
		}
		let cl_code = Self::from_lengths(&cl_lengths)?;

		let mut max_symbol =
			if r.read_bit()? {
				let nbits = 2 + 2 * r.read_bits(3)? as u8;
				let max = 2 + r.read_bits(nbits)? as usize;
				if alphabet < max { return Err(WepfliError::Malformed("invalid code length count")); }
				max
			}
			else { alphabet };

		let mut symbol = 0;
		let mut prev = 8_u8;
		while symbol < alphabet {
			if max_symbol == 0 { break; }
			max_symbol -= 1;

			let len = cl_code.read(r)?;
			if len < 16 {
				lengths[symbol] = len as u8;
				symbol += 1;
				if len != 0 { prev = len as u8; }
			}
			else {
				let (extra, offset, value) = match len {
					16 => (2, 3, prev),
					17 => (3, 3, 0),
					_ => (7, 11, 0),
				};
				let repeat = r.read_bits(extra)? as usize + offset;
				if alphabet < symbol + repeat {
					return Err(WepfliError::Malformed("code lengths overflow alphabet"));
				}
				lengths[symbol..symbol + repeat].fill(value);
				symbol += repeat;
			}
		}

		Self::from_lengths(&lengths)
	}

	/// # From Lengths.
	///
	/// The lengths must form a complete code unless only one symbol is
	/// used.
	fn from_lengths(lengths: &[u8]) -> Result<Self, WepfliError> {
		let mut counts = [0_u32; MAX_CODE_LENGTH as usize + 1];
		for &l in lengths {
			let slot = counts.get_mut(usize::from(l))
				.ok_or(WepfliError::Malformed("code length too long"))?;
			*slot += 1;
		}
		counts[0] = 0;

		let used: u32 = counts.iter().sum();
		if used == 0 || (1 < used && ! is_complete(&counts)) {
			return Err(WepfliError::Malformed("invalid prefix code"));
		}

		let mut symbols = Vec::with_capacity(used as usize);
		for len in 1..=MAX_CODE_LENGTH {
			symbols.extend(
				lengths.iter().enumerate().filter(|(_, &l)| l == len).map(|(s, _)| s)
			);
		}

		Ok(Self { counts, symbols })
	}

	/// # Read Symbol.
	fn read(&self, r: &mut BitReader<'_>) -> Result<usize, WepfliError> {
		// Single-symbol codes take no bits.
		if self.symbols.len() == 1 { return Ok(self.symbols[0]); }

		let mut code = 0_u32;
		let mut first = 0_u32;
		let mut index = 0_usize;
		for &count in &self.counts[1..] {
			code |= u32::from(r.read_bit()?);
			if code < first + count {
				return Ok(self.symbols[index + (code - first) as usize]);
			}
			index += count as usize;
			first = (first + count) << 1;
			code <<= 1;
		}

		Err(WepfliError::Malformed("invalid prefix code"))
	}
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::vp8l::{
		BitWriter,
		HuffmanCode,
	};

	#[test]
	fn t_prefix_decoder() {
		let freqs = [40, 0, 3, 3, 9, 0, 0, 1, 12, 5];
		let code = HuffmanCode::new(&freqs, 15).expect("Code failed.");

		let mut out = BitWriter::new();
		code.store(&mut out).expect("Store failed.");
		let message = [0, 4, 8, 7, 2, 9, 0, 3];
		for &s in &message { code.write_symbol(&mut out, s); }
		let bytes = out.finish();

		let mut r = BitReader::new(&bytes);
		let dec = PrefixDecoder::parse(&mut r, freqs.len()).expect("Read failed.");
		for &s in &message { assert_eq!(dec.read(&mut r), Ok(s)); }
	}

	#[test]
	fn t_prefix_decoder_small() {
		// Single symbol, both simple (< 256) and full (>= 256) forms.
		for symbol in [3, 290] {
			let mut freqs = vec![0_u32; 300];
			freqs[symbol] = 10;
			let code = HuffmanCode::new(&freqs, 15).expect("Code failed.");
			let mut out = BitWriter::new();
			code.store(&mut out).expect("Store failed.");
			let stored = out.bit_len();
			code.write_symbol(&mut out, symbol);
			assert_eq!(out.bit_len(), stored);
			let bytes = out.finish();

			let mut r = BitReader::new(&bytes);
			let dec = PrefixDecoder::parse(&mut r, 300).expect("Read failed.");
			assert_eq!(dec.read(&mut r), Ok(symbol));
		}

		// Nothing at all still decodes to something.
		let code = HuffmanCode::new(&[0; 40], 15).expect("Code failed.");
		let mut out = BitWriter::new();
		code.store(&mut out).expect("Store failed.");
		let bytes = out.finish();
		let dec = PrefixDecoder::parse(&mut BitReader::new(&bytes), 40).expect("Read failed.");
		assert_eq!(dec.symbols, [0]);
	}

	#[test]
	fn t_incomplete() {
		assert!(PrefixDecoder::from_lengths(&[1, 2, 0, 0]).is_err());
		assert!(PrefixDecoder::from_lengths(&[0, 0, 0]).is_err());
		assert!(PrefixDecoder::from_lengths(&[0, 5, 0]).is_ok());
		assert!(PrefixDecoder::from_lengths(&[1, 2, 2]).is_ok());
	}

	#[test]
	fn t_malformed() {
		assert!(matches!(decode(b""), Err(WepfliError::Malformed(_))));
		assert!(matches!(
			decode(b"RIFF\x0c\0\0\0WEBPVP8 \0\0\0\0"),
			Err(WepfliError::Malformed(_)),
		));

		// Truncated chunk.
		let mut bad = b"RIFF\x10\0\0\0WEBPVP8L\x04\0\0\0".to_vec();
		assert!(matches!(decode(&bad), Err(WepfliError::Malformed(_))));

		// Bad signature.
		bad.extend_from_slice(&[0x2e, 0, 0, 0]);
		assert!(matches!(decode(&bad), Err(WepfliError::Malformed(_))));
	}
}
