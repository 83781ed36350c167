/*!
# Wepfli

Wepfli is a brute-force lossless WebP encoder. It takes a fully decoded
ARGB pixel buffer and squeezes it into the smallest VP8L bitstream it can
find, trying every reasonable combination of image transforms, color cache
sizes and prefix code groupings along the way.

A matching decoder is included, mostly so the output can be checked.

## Examples

```
use wepfli::{EncoderConfig, PixelBuffer};

let pixels = PixelBuffer::new(4, 4, vec![0xff00_0000; 16]).unwrap();
let webp = wepfli::encode(&pixels, &EncoderConfig::default()).unwrap();
assert_eq!(&webp[..4], b"RIFF");

let back = wepfli::decode(&webp).unwrap();
assert_eq!(back, pixels);
```
*/

#![deny(unsafe_code)]

#![warn(
	clippy::filetype_is_file,
	clippy::integer_division,
	clippy::needless_borrow,
	clippy::nursery,
	clippy::pedantic,
	clippy::perf,
	clippy::suboptimal_flops,
	clippy::unneeded_field_pattern,
	macro_use_extern_crate,
	missing_copy_implementations,
	missing_debug_implementations,
	missing_docs,
	non_ascii_idents,
	trivial_casts,
	trivial_numeric_casts,
	unreachable_pub,
	unused_crate_dependencies,
	unused_extern_crates,
	unused_import_braces,
)]

#![allow(
	clippy::module_name_repetitions,
	clippy::redundant_pub_crate,
)]

mod config;
mod error;
mod pixels;
mod vp8l;

pub use config::EncoderConfig;
pub use error::{
	Bug,
	WepfliError,
};
pub use pixels::PixelBuffer;

#[cfg(test)] use brunch as _;
#[cfg(test)] use image_webp as _;



/// # Encode.
///
/// Losslessly encode the pixels as a WebP image (a VP8L bitstream wrapped
/// in a RIFF container).
///
/// Output is deterministic: the same pixels and configuration always
/// produce the same bytes, regardless of thread count.
///
/// ## Errors
///
/// Returns `UnsupportedConfiguration` if the configuration is out of range
/// or forces a palette on an image with more than 256 colors. An
/// `InternalInvariantViolation` indicates a bug in this crate.
pub fn encode(pixels: &PixelBuffer, config: &EncoderConfig) -> Result<Vec<u8>, WepfliError> {
	vp8l::encode(pixels, config)
}

/// # Decode.
///
/// Decode a lossless WebP image back into pixels.
///
/// ## Errors
///
/// Returns `Malformed` if the data is not a valid RIFF-wrapped VP8L image.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, WepfliError> {
	let out = vp8l::decode(bytes)?;
	PixelBuffer::new(
		u32::try_from(out.width).map_err(|_| WepfliError::Malformed("width"))?,
		u32::try_from(out.height).map_err(|_| WepfliError::Malformed("height"))?,
		out.argb,
	)
		.map_err(|_| WepfliError::Malformed("pixel count does not match dimensions"))
}



#[cfg(test)]
mod test {
	use super::*;

	/// # Round Trip.
	fn round_trip(pixels: &PixelBuffer, config: &EncoderConfig) -> Vec<u8> {
		let webp = encode(pixels, config).expect("Encode failed.");
		let back = decode(&webp).expect("Decode failed.");
		assert_eq!(&back, pixels, "Round trip mismatch.");
		webp
	}

	/// # Test Image.
	///
	/// A smooth-ish gradient with a few hard edges and some transparency.
	fn sample(width: u32, height: u32) -> PixelBuffer {
		let argb = (0..width * height)
			.map(|i| {
				let (x, y) = (i % width, i / width);
				let a = if (x / 8 + y / 8) % 5 == 0 { 0x80 } else { 0xff };
				let r = (x * 255 / width.max(1)) & 0xff;
				let g = (y * 255 / height.max(1)) & 0xff;
				let b = if x < width / 2 { 0x20 } else { 0xd0 };
				a << 24 | r << 16 | g << 8 | b
			})
			.collect();
		PixelBuffer::new(width, height, argb).expect("Buffer failed.")
	}

	#[test]
	fn t_black_square() {
		let pixels = PixelBuffer::new(4, 4, vec![0xff00_0000; 16]).expect("Buffer failed.");
		let webp = round_trip(&pixels, &EncoderConfig::default());

		// Header: 4x4, no alpha, version zero, no transforms.
		assert_eq!(webp[20], 0x2f);
		let head = u32::from_le_bytes([webp[21], webp[22], webp[23], webp[24]]);
		assert_eq!(head & 0x3fff, 3);
		assert_eq!((head >> 14) & 0x3fff, 3);
		assert_eq!((head >> 28) & 1, 0);
		assert_eq!(head >> 29, 0);
		assert_eq!(webp[25] & 1, 0);
		assert_eq!(webp.len() % 2, 0);
	}

	#[test]
	fn t_one_pixel() {
		for px in [0, 0xff00_0000, 0x1234_5678, u32::MAX] {
			let pixels = PixelBuffer::new(1, 1, vec![px]).expect("Buffer failed.");
			round_trip(&pixels, &EncoderConfig::default());
			round_trip(&pixels, &EncoderConfig::new().with_quality(0).with_max_cache_bits(0));
		}
	}

	#[test]
	fn t_single_color() {
		let pixels = PixelBuffer::new(97, 33, vec![0x80c0_ffee; 97 * 33]).expect("Buffer failed.");
		let webp = round_trip(&pixels, &EncoderConfig::default());
		assert!(webp.len() < 100);
	}

	#[test]
	fn t_qualities() {
		let pixels = sample(67, 45);
		let mut sizes = Vec::new();
		for quality in [0, 30, 75, 100] {
			for cache in [0, 5, 10] {
				let config = EncoderConfig::new().with_quality(quality).with_max_cache_bits(cache);
				sizes.push(round_trip(&pixels, &config).len());
			}
		}
		assert!(sizes.iter().all(|&s| s < 67 * 45 * 4));
	}

	#[test]
	fn t_palette() {
		let colors = [0xff00_0000, 0xffff_ffff, 0xff80_4020, 0x0000_0000, 0x7f7f_7f7f];
		let argb: Vec<u32> = (0..50_u32 * 21)
			.map(|i| colors[(i * 7 / 5 + i / 50) as usize % colors.len()])
			.collect();
		let pixels = PixelBuffer::new(50, 21, argb).expect("Buffer failed.");
		round_trip(&pixels, &EncoderConfig::default());
		round_trip(&pixels, &EncoderConfig::new().with_force_palette(true));

		// Two colors pack eight to a pixel.
		let argb: Vec<u32> = (0..13_u32 * 5).map(|i| colors[(i % 3 == 0) as usize]).collect();
		let pixels = PixelBuffer::new(13, 5, argb).expect("Buffer failed.");
		round_trip(&pixels, &EncoderConfig::new().with_force_palette(true));
	}

	#[test]
	fn t_palette_overflow() {
		let argb: Vec<u32> = (0..300).map(|i| 0xff00_0000 | i).collect();
		let pixels = PixelBuffer::new(20, 15, argb).expect("Buffer failed.");
		assert!(matches!(
			encode(&pixels, &EncoderConfig::new().with_force_palette(true)),
			Err(WepfliError::UnsupportedConfiguration(_)),
		));
		round_trip(&pixels, &EncoderConfig::default());
	}

	#[test]
	fn t_bad_config() {
		let pixels = PixelBuffer::new(1, 1, vec![0]).expect("Buffer failed.");
		assert!(matches!(
			encode(&pixels, &EncoderConfig::new().with_quality(101)),
			Err(WepfliError::UnsupportedConfiguration(_)),
		));
		assert!(matches!(
			encode(&pixels, &EncoderConfig::new().with_max_cache_bits(12)),
			Err(WepfliError::UnsupportedConfiguration(_)),
		));
	}

	#[test]
	fn t_zero_dimensions() {
		assert!(matches!(PixelBuffer::new(0, 4, Vec::new()), Err(WepfliError::InvalidInput(_))));
		assert!(matches!(PixelBuffer::new(4, 0, Vec::new()), Err(WepfliError::InvalidInput(_))));
	}

	#[test]
	fn t_deterministic() {
		let pixels = sample(40, 40);
		let config = EncoderConfig::new().with_quality(90);
		let a = encode(&pixels, &config).expect("Encode failed.");
		let b = encode(&pixels, &config).expect("Encode failed.");
		assert_eq!(a, b);
	}

	#[test]
	fn t_noise() {
		// Cheap LCG noise, mostly unmatched, in a long thin strip.
		let mut seed = 0x2545_f491_u32;
		let argb: Vec<u32> = (0..700 * 3)
			.map(|i| {
				seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
				if i % 7 == 0 { 0xff00_00ff } else { seed | 0xff00_0000 }
			})
			.collect();
		let pixels = PixelBuffer::new(700, 3, argb).expect("Buffer failed.");
		round_trip(&pixels, &EncoderConfig::default());
		round_trip(&pixels, &EncoderConfig::new().with_quality(100).with_max_cache_bits(11));
	}

	#[test]
	fn t_rgba8() {
		let rgba: Vec<u8> = (0..32 * 9 * 4_u32).map(|i| (i / 5).to_le_bytes()[0]).collect();
		let pixels = PixelBuffer::from_rgba8(32, 9, &rgba).expect("Buffer failed.");
		let webp = round_trip(&pixels, &EncoderConfig::new().with_quality(50));
		let back = decode(&webp).expect("Decode failed.");
		assert_eq!(back.to_rgba8(), rgba);
	}

	#[test]
	fn t_malformed() {
		let pixels = sample(16, 16);
		let webp = encode(&pixels, &EncoderConfig::default()).expect("Encode failed.");

		// Chop it.
		for len in [0, 10, 21, webp.len() / 2] {
			assert!(matches!(decode(&webp[..len]), Err(WepfliError::Malformed(_))));
		}

		// Break the version.
		let mut bad = webp.clone();
		bad[24] |= 0b1110_0000;
		assert!(matches!(decode(&bad), Err(WepfliError::Malformed(_))));
	}
}
