/*!
# Wepfli: Bitstream Writer.

This module serializes a chosen plan and its tokens: the RIFF wrapper, the
VP8L header, the transforms and their sub-images, and the main
entropy-coded image.
*/

use dactyl::traits::SaturatingFrom;
use super::{
	BitWriter,
	CACHE_OFFSET,
	EntropyImage,
	Histogram,
	HuffmanCode,
	MAX_CODE_LENGTH,
	NUM_LITERAL_CODES,
	PlaneCodes,
	PrefixCode,
	subsample,
	Symbol,
	tokenize_plain,
	TokenStream,
	TransformSpec,
	wepfli_bug,
	WepfliError,
};



/// # VP8L Signature.
pub(crate) const VP8L_SIGNATURE: u8 = 0x2f;

/// # VP8L Version.
pub(crate) const VP8L_VERSION: u32 = 0;

/// # Bits for Width/Height.
pub(crate) const DIMENSION_BITS: u8 = 14;

/// # RIFF Header Size (Through the Chunk Size).
pub(crate) const RIFF_HEADER_SIZE: usize = 20;



#[derive(Debug, Clone)]
/// # Prefix Code Group.
///
/// The five codes (green, red, blue, alpha, distance) for one histogram.
pub(crate) struct HuffmanGroup([HuffmanCode; 5]);

impl HuffmanGroup {
	/// # New.
	///
	/// ## Errors
	///
	/// Bubbles up any Huffman construction errors.
	pub(crate) fn new(histogram: &Histogram) -> Result<Self, WepfliError> {
		let [g, r, b, a, d] = histogram.alphabets();
		Ok(Self([
			HuffmanCode::new(g, MAX_CODE_LENGTH)?,
			HuffmanCode::new(r, MAX_CODE_LENGTH)?,
			HuffmanCode::new(b, MAX_CODE_LENGTH)?,
			HuffmanCode::new(a, MAX_CODE_LENGTH)?,
			HuffmanCode::new(d, MAX_CODE_LENGTH)?,
		]))
	}

	/// # Store Codes.
	///
	/// ## Errors
	///
	/// Bubbles up any Huffman serialization errors.
	pub(crate) fn store(&self, out: &mut BitWriter) -> Result<(), WepfliError> {
		for code in &self.0 { code.store(out)?; }
		Ok(())
	}

	#[cfg(test)]
	/// # Codes.
	pub(crate) const fn codes(&self) -> &[HuffmanCode; 5] { &self.0 }

	/// # Write Symbol.
	pub(crate) fn write(&self, out: &mut BitWriter, symbol: Symbol, planes: &PlaneCodes) {
		let [green, red, blue, alpha, dist] = &self.0;
		match symbol {
			Symbol::Literal(px) => {
				green.write_symbol(out, ((px >> 8) & 0xff) as usize);
				red.write_symbol(out, ((px >> 16) & 0xff) as usize);
				blue.write_symbol(out, (px & 0xff) as usize);
				alpha.write_symbol(out, (px >> 24) as usize);
			},
			Symbol::CacheIndex(slot) => {
				green.write_symbol(out, CACHE_OFFSET + usize::from(slot));
			},
			Symbol::BackwardReference { length, distance } => {
				let l = PrefixCode::encode(u32::from(length));
				green.write_symbol(out, NUM_LITERAL_CODES + usize::from(l.code));
				out.put_bits(l.extra_value, l.extra_bits);

				let d = PrefixCode::encode(planes.code(distance as usize));
				dist.write_symbol(out, usize::from(d.code));
				out.put_bits(d.extra_value, d.extra_bits);
			},
		}
	}
}



/// # Write Header.
///
/// The signature byte, dimensions, alpha hint and version.
pub(crate) fn write_header(out: &mut BitWriter, width: usize, height: usize, alpha: bool) {
	out.put_bits(u32::from(VP8L_SIGNATURE), 8);
	out.put_bits(u32::saturating_from(width - 1), DIMENSION_BITS);
	out.put_bits(u32::saturating_from(height - 1), DIMENSION_BITS);
	out.put_bit(alpha);
	out.put_bits(VP8L_VERSION, 3);
}

/// # Write Transforms.
///
/// Each transform is flagged with a one bit, followed by its kind and
/// data. A zero bit ends the list.
///
/// ## Errors
///
/// Returns an invariant violation if a transform's data doesn't fit the
/// format.
pub(crate) fn write_transforms(
	out: &mut BitWriter,
	transforms: &[TransformSpec],
	width: usize,
) -> Result<(), WepfliError> {
	for spec in transforms {
		out.put_bit(true);
		out.put_bits(u32::from(spec.kind()), 2);

		match spec {
			TransformSpec::Predictor { bits, .. } | TransformSpec::CrossColor { bits, .. } => {
				if ! (2..=9).contains(bits) { return Err(wepfli_bug!()); }
				out.put_bits(u32::from(*bits - 2), 3);
			},
			TransformSpec::Palette { colors } => {
				if colors.is_empty() || 256 < colors.len() { return Err(wepfli_bug!()); }
				out.put_bits(u32::saturating_from(colors.len() - 1), 8);
			},
			TransformSpec::SubtractGreen => {},
		}

		if let Some((sub, sub_w)) = spec.sub_image(width) {
			write_sub_image(out, &sub, sub_w)?;
		}
	}

	out.put_bit(false);
	Ok(())
}

/// # Write Sub-Image.
///
/// Sub-images have no color cache, no entropy image, and a single prefix
/// code group.
///
/// ## Errors
///
/// Returns an invariant violation if tokenization or coding goes wrong.
pub(crate) fn write_sub_image(out: &mut BitWriter, argb: &[u32], width: usize)
-> Result<(), WepfliError> {
	let planes = PlaneCodes::new(width);
	let tokens = tokenize_plain(argb, &planes)?;
	let histogram = Histogram::from_tokens(&tokens, 0, &planes)?;
	let group = HuffmanGroup::new(&histogram)?;

	out.put_bit(false);
	group.store(out)?;
	for &s in &tokens { group.write(out, s, &planes); }
	Ok(())
}

/// # Write Main Image.
///
/// ## Errors
///
/// Returns an invariant violation if coding goes wrong.
pub(crate) fn write_main_image(
	out: &mut BitWriter,
	tokens: &TokenStream,
	cache_bits: u8,
	entropy: &EntropyImage,
	width: usize,
) -> Result<(), WepfliError> {
	let planes = PlaneCodes::new(width);

	// Color cache.
	if cache_bits == 0 { out.put_bit(false); }
	else {
		out.put_bit(true);
		out.put_bits(u32::from(cache_bits), 4);
	}

	// Entropy image.
	let groups = entropy.groups();
	if groups.len() == 1 { out.put_bit(false); }
	else {
		out.put_bit(true);
		out.put_bits(u32::from(entropy.bits() - 2), 3);
		write_sub_image(out, &entropy.sub_image(), subsample(width, entropy.bits()))?;
	}

	let groups = groups.iter()
		.map(HuffmanGroup::new)
		.collect::<Result<Vec<_>, _>>()?;
	for g in &groups { g.store(out)?; }

	let mut pos = 0;
	for &s in tokens {
		let group = groups.get(entropy.group_at(pos, width)).ok_or_else(|| wepfli_bug!())?;
		group.write(out, s, &planes);
		pos += s.len();
	}

	Ok(())
}

/// # Wrap in RIFF.
///
/// Prepend the RIFF/WEBP/VP8L headers, padding the payload to an even
/// length.
pub(crate) fn riff(payload: &[u8]) -> Vec<u8> {
	let padded = payload.len() + (payload.len() & 1);
	let mut out = Vec::with_capacity(RIFF_HEADER_SIZE + padded);
	out.extend_from_slice(b"RIFF");
	out.extend_from_slice(&u32::saturating_from(padded + 12).to_le_bytes());
	out.extend_from_slice(b"WEBP");
	out.extend_from_slice(b"VP8L");
	out.extend_from_slice(&u32::saturating_from(payload.len()).to_le_bytes());
	out.extend_from_slice(payload);
	if payload.len() & 1 == 1 { out.push(0); }
	out
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::vp8l::BitReader;

	#[test]
	fn t_header() {
		let mut out = BitWriter::new();
		write_header(&mut out, 4, 3, true);
		assert_eq!(out.bit_len(), 40);

		let bytes = out.finish();
		let mut r = BitReader::new(&bytes);
		assert_eq!(r.read_bits(8), Ok(0x2f));
		assert_eq!(r.read_bits(14), Ok(3));
		assert_eq!(r.read_bits(14), Ok(2));
		assert_eq!(r.read_bit(), Ok(true));
		assert_eq!(r.read_bits(3), Ok(0));
	}

	#[test]
	fn t_riff() {
		let out = riff(&[1, 2, 3]);
		assert_eq!(out.len(), 24);
		assert_eq!(&out[..4], b"RIFF");
		assert_eq!(u32::from_le_bytes([out[4], out[5], out[6], out[7]]), 16);
		assert_eq!(&out[8..16], b"WEBPVP8L");
		assert_eq!(u32::from_le_bytes([out[16], out[17], out[18], out[19]]), 3);
		assert_eq!(&out[20..], &[1, 2, 3, 0]);

		let out = riff(&[1, 2]);
		assert_eq!(out.len(), 22);
		assert_eq!(u32::from_le_bytes([out[4], out[5], out[6], out[7]]), 14);
	}

	#[test]
	fn t_empty_transforms() {
		let mut out = BitWriter::new();
		write_transforms(&mut out, &[], 4).expect("Write failed.");
		assert_eq!(out.bit_len(), 1);

		let mut out = BitWriter::new();
		write_transforms(&mut out, &[TransformSpec::SubtractGreen], 4).expect("Write failed.");
		assert_eq!(out.finish(), [0b0000_0101]);
	}
}
