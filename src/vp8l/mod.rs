/*!
# Wepfli: VP8L!

The `encode` method in this module turns a pixel buffer into a lossless
WebP (a VP8L bitstream in a RIFF container). The pipeline runs in a fixed
order:

1. Pick the cheapest combination of image transforms;
2. Tokenize the transformed pixels into literals, color cache hits and
   backward references;
3. Group the entropy tiles' histograms into prefix code groups;
4. Build length-limited prefix codes for each group;
5. Write it all out.

`decode` is the structural inverse, used to verify round trips.
*/

mod bits;
mod cache;
mod cluster;
mod decode;
mod hash;
mod kat;
mod select;
mod stats;
mod symbols;
mod transform;
mod writer;

use bits::{
	BitReader,
	BitWriter,
};
use cache::ColorCache;
use cluster::EntropyImage;
pub(crate) use decode::Decoded;
use crate::{
	config::{
		Effort,
		MAX_CACHE_BITS,
	},
	EncoderConfig,
	error::wepfli_bug,
	PixelBuffer,
	WepfliError,
};
use hash::{
	tokenize,
	tokenize_plain,
	Tokenized,
};
use kat::{
	CL_CODE_ORDER,
	HuffmanCode,
	is_complete,
	MAX_CODE_LENGTH,
	NUM_CL_CODES,
};
use stats::{
	CACHE_OFFSET,
	CostModel,
	Histogram,
	shannon_bits,
};
use symbols::{
	PlaneCodes,
	PrefixCode,
	Symbol,
	TokenStream,
};
use select::Plan;
use tracing::debug;
use transform::{
	choose_multipliers,
	choose_predictors,
	collect_palette,
	MAX_PALETTE,
	Multipliers,
	packing_bits,
	TransformSpec,
	undelta_palette,
};
use writer::{
	DIMENSION_BITS,
	riff,
	RIFF_HEADER_SIZE,
	VP8L_SIGNATURE,
	VP8L_VERSION,
	write_header,
	write_main_image,
	write_transforms,
};



/// # Literal Alphabet Size.
const NUM_LITERAL_CODES: usize = 256;

/// # Length Prefix Codes.
const NUM_LENGTH_CODES: usize = 24;

/// # Distance Prefix Codes.
const NUM_DISTANCE_CODES: usize = 40;

/// # Neighbourhood Distance Codes.
const NUM_PLANE_CODES: usize = 120;

/// # Maximum Backward Reference Length.
const MAX_LENGTH: usize = 4096;

/// # Maximum Backward Reference Distance.
pub(crate) const WINDOW_SIZE: usize = (1 << 20) - NUM_PLANE_CODES;

/// # Entropy Tile Bits (Minimum).
const MIN_HUFFMAN_BITS: u8 = 2;

/// # Entropy Tile Bits (Maximum).
const MAX_HUFFMAN_BITS: u8 = 9;

/// # Maximum Entropy Image Size.
const MAX_HUFF_IMAGE_SIZE: usize = 2600;



/// # Encode.
///
/// ## Errors
///
/// Returns an error if the configuration is invalid, a palette is forced
/// on an image with too many colors, or something impossible happens along
/// the way.
pub(crate) fn encode(pixels: &PixelBuffer, config: &EncoderConfig) -> Result<Vec<u8>, WepfliError> {
	let Prepared { plan, tokenized, entropy } = prepare(pixels, config)?;
	let width = pixels.width() as usize;
	let height = pixels.height() as usize;

	let mut out = BitWriter::new();
	write_header(&mut out, width, height, pixels.has_alpha());
	write_transforms(&mut out, &plan.transforms, width)?;
	write_main_image(&mut out, &tokenized.tokens, tokenized.cache_bits, &entropy, plan.width)?;
	let out = riff(&out.finish());

	debug!(
		width,
		height,
		tokens = tokenized.tokens.len(),
		cache_bits = tokenized.cache_bits,
		groups = entropy.groups().len(),
		bytes = out.len(),
		"encoded VP8L image",
	);

	Ok(out)
}

/// # Prepared Image.
///
/// Everything `encode` decides before it starts writing.
struct Prepared {
	/// # Transform Plan.
	plan: Plan,

	/// # Main Image Tokens.
	tokenized: Tokenized,

	/// # Entropy Image.
	entropy: EntropyImage,
}

/// # Prepare.
///
/// Choose the transforms, tokenize the result, and group the tiles.
///
/// ## Errors
///
/// Same as `encode`.
fn prepare(pixels: &PixelBuffer, config: &EncoderConfig) -> Result<Prepared, WepfliError> {
	config.validate()?;

	let height = pixels.height() as usize;
	let effort = config.effort();
	let max_cache_bits = config.max_cache_bits();

	let plan = select::choose(
		pixels.argb(),
		pixels.width() as usize,
		height,
		&effort,
		max_cache_bits,
		config.force_palette(),
	)?;

	// The real thing.
	let planes = PlaneCodes::new(plan.width);
	let tokenized = tokenize(&plan.argb, &planes, &effort, max_cache_bits, false)?;
	let entropy = EntropyImage::build(
		&tokenized.tokens,
		plan.width,
		height,
		histo_bits(effort.method(), plan.width, height, plan.has_palette()),
		tokenized.cache_bits,
		&planes,
		&effort,
	)?;

	Ok(Prepared { plan, tokenized, entropy })
}

/// # Decode.
///
/// ## Errors
///
/// Returns `Malformed` if the data isn't a valid lossless WebP.
pub(crate) fn decode(bytes: &[u8]) -> Result<Decoded, WepfliError> {
	let out = decode::decode(bytes)?;
	debug!(width = out.width, height = out.height, "decoded VP8L image");
	Ok(out)
}



#[inline]
/// # Subsample Size.
///
/// The number of `1 << bits` tiles needed to cover `size` pixels.
pub(crate) const fn subsample(size: usize, bits: u8) -> usize {
	(size + (1 << bits) - 1) >> bits
}

/// # Entropy Tile Bits.
///
/// Higher effort means smaller tiles (palettes start bigger), bounded so
/// the entropy image has at most `MAX_HUFF_IMAGE_SIZE` tiles.
fn histo_bits(method: u8, width: usize, height: usize, palette: bool) -> u8 {
	let base: u8 = if palette { 9 } else { 7 };
	clamp_bits(width, height, base.saturating_sub(method), MIN_HUFFMAN_BITS, MAX_HUFFMAN_BITS)
}

/// # Transform Tile Bits.
///
/// Predictor and cross-color tiles follow the entropy tiles, capped by
/// effort.
const fn transform_bits(method: u8, histo_bits: u8) -> u8 {
	let max =
		if method < 4 { 6 }
		else if method == 4 { 5 }
		else { 4 };

	if histo_bits < MIN_HUFFMAN_BITS { MIN_HUFFMAN_BITS }
	else if max < histo_bits { max }
	else { histo_bits }
}

/// # Clamp Bits.
///
/// Grow the tiles until the tile count is small enough, then shrink them
/// again if a single tile would do at a smaller size.
fn clamp_bits(width: usize, height: usize, bits: u8, min: u8, max: u8) -> u8 {
	let mut bits = bits.clamp(min, max);
	let size = |b: u8| subsample(width, b) * subsample(height, b);

	while bits < max && MAX_HUFF_IMAGE_SIZE < size(bits) { bits += 1; }
	while min < bits && size(bits - 1) == 1 { bits -= 1; }

	bits
}



#[cfg(test)]
mod test {
	use super::*;
	use writer::HuffmanGroup;

	/// # Xorshift Noise.
	fn noise(len: usize, mut seed: u32) -> Vec<u32> {
		(0..len)
			.map(|_| {
				seed ^= seed << 13;
				seed ^= seed >> 17;
				seed ^= seed << 5;
				seed
			})
			.collect()
	}

	#[test]
	fn t_black_square() {
		let pixels = PixelBuffer::new(4, 4, vec![0xff00_0000; 16]).expect("Buffer failed.");
		let prepared = prepare(&pixels, &EncoderConfig::default()).expect("Prepare failed.");
		assert!(prepared.plan.transforms.is_empty());

		// One symbol for the first pixel, one reference for the rest.
		let tokens: Vec<Symbol> = prepared.tokenized.tokens.iter().copied().collect();
		assert_eq!(tokens.len(), 2);
		assert!(matches!(tokens[0], Symbol::Literal(0xff00_0000) | Symbol::CacheIndex(_)));
		assert_eq!(tokens[1], Symbol::BackwardReference { length: 15, distance: 1 });
	}

	#[test]
	fn t_single_color_codes() {
		let pixels = PixelBuffer::new(97, 33, vec![0x80c0_ffee; 97 * 33]).expect("Buffer failed.");
		let prepared = prepare(&pixels, &EncoderConfig::default()).expect("Prepare failed.");
		let groups = prepared.entropy.groups();
		assert_eq!(groups.len(), 1);

		// Red, blue, alpha and distance each see a single symbol.
		let group = HuffmanGroup::new(&groups[0]).expect("Group failed.");
		let [green, rest @ ..] = group.codes();
		assert!(green.is_valid());
		for code in rest {
			assert_eq!(code.used(), 1);
			assert!(code.is_valid());
		}

		// So only green and the extra bits cost anything.
		let planes = PlaneCodes::new(prepared.plan.width);
		let green_bits = |sym: usize|
			if green.used() == 1 { 0 }
			else { usize::from(green.lengths()[sym]) };
		let mut out = BitWriter::new();
		let mut expected = 0;
		for &s in &prepared.tokenized.tokens {
			group.write(&mut out, s, &planes);
			match s {
				Symbol::Literal(px) => { expected += green_bits(((px >> 8) & 0xff) as usize); },
				Symbol::CacheIndex(slot) => { expected += green_bits(CACHE_OFFSET + usize::from(slot)); },
				Symbol::BackwardReference { length, distance } => {
					let l = PrefixCode::encode(u32::from(length));
					let d = PrefixCode::encode(planes.code(distance as usize));
					expected += green_bits(NUM_LITERAL_CODES + usize::from(l.code));
					expected += usize::from(l.extra_bits) + usize::from(d.extra_bits);
				},
			}
		}
		assert_eq!(out.bit_len(), expected);
	}

	#[test]
	fn t_huffman_validity() {
		// Opaque noise on top, fully random noise below. The alpha channels
		// alone keep the halves from sharing a group.
		let (width, height) = (256, 256);
		let mut argb = noise(width * height, 0x2545_f491);
		for px in &mut argb[..width * height / 2] { *px |= 0xff00_0000; }
		let pixels = PixelBuffer::new(256, 256, argb).expect("Buffer failed.");

		let config = EncoderConfig::new().with_quality(0);
		let prepared = prepare(&pixels, &config).expect("Prepare failed.");
		let groups = prepared.entropy.groups();
		assert!(1 < groups.len(), "Expected several groups.");
		assert!(groups.len() <= MAX_HUFF_IMAGE_SIZE);

		for histogram in groups {
			let group = HuffmanGroup::new(histogram).expect("Group failed.");
			for code in group.codes() { assert!(code.is_valid()); }
		}

		// And it still comes back.
		let webp = encode(&pixels, &config).expect("Encode failed.");
		let back = decode(&webp).expect("Decode failed.");
		assert_eq!(back.argb, pixels.argb());
	}

	#[test]
	fn t_subsample() {
		assert_eq!(subsample(1, 2), 1);
		assert_eq!(subsample(4, 2), 1);
		assert_eq!(subsample(5, 2), 2);
		assert_eq!(subsample(16384, 9), 32);
	}

	#[test]
	fn t_histo_bits() {
		// Tiny images shrink down to the minimum.
		assert_eq!(histo_bits(0, 4, 4, false), 2);
		assert_eq!(histo_bits(6, 1, 1, true), 2);

		// Huge images grow until the tile count fits.
		assert_eq!(histo_bits(6, 16384, 16384, false), 9);
		assert_eq!(histo_bits(6, 1000, 1000, false), 5);
		assert!(subsample(1000, 5) * subsample(1000, 5) <= MAX_HUFF_IMAGE_SIZE);

		assert_eq!(transform_bits(0, 9), 6);
		assert_eq!(transform_bits(4, 9), 5);
		assert_eq!(transform_bits(6, 3), 3);
	}
}
