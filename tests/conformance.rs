/*!
# Wepfli: Conformance.

Everything written here must be readable by an independent WebP decoder,
not just our own.
*/

use image_webp::WebPDecoder;
use std::io::Cursor;
use wepfli::{
	EncoderConfig,
	PixelBuffer,
};



/// # Decode With `image-webp`.
///
/// Return the pixels as RGBA8, filling in opaque alpha if the decoder
/// handed back RGB.
fn decode_rgba(webp: &[u8]) -> (u32, u32, Vec<u8>) {
	let mut decoder = WebPDecoder::new(Cursor::new(webp)).expect("Header failed.");
	let (width, height) = decoder.dimensions();
	let alpha = decoder.has_alpha();
	let mut buf = vec![0_u8; decoder.output_buffer_size().expect("Buffer size failed.")];
	decoder.read_image(&mut buf).expect("Decode failed.");

	let rgba =
		if alpha { buf }
		else {
			buf.chunks_exact(3)
				.flat_map(|px| [px[0], px[1], px[2], 255])
				.collect()
		};
	(width, height, rgba)
}

/// # Check One.
fn check(pixels: &PixelBuffer, config: &EncoderConfig) {
	let webp = wepfli::encode(pixels, config).expect("Encode failed.");
	let (width, height, rgba) = decode_rgba(&webp);
	assert_eq!(width, pixels.width());
	assert_eq!(height, pixels.height());
	assert!(rgba == pixels.to_rgba8(), "Pixel mismatch.");
}

/// # Test Images.
fn images() -> Vec<PixelBuffer> {
	let mut out = Vec::new();

	// Flat.
	out.push(PixelBuffer::new(31, 17, vec![0xff33_6699; 31 * 17]).expect("Buffer failed."));

	// Gradient with transparent stripes.
	let argb = (0..64_u32 * 48)
		.map(|i| {
			let (x, y) = (i % 64, i / 64);
			let a = if y % 9 < 2 { 0x40 } else { 0xff };
			a << 24 | (x * 4) << 16 | (y * 5) << 8 | ((x + y) & 0xff)
		})
		.collect();
	out.push(PixelBuffer::new(64, 48, argb).expect("Buffer failed."));

	// Xorshift noise.
	let mut seed = 0x9e37_79b9_u32;
	let argb = (0..45 * 45)
		.map(|_| {
			seed ^= seed << 13;
			seed ^= seed >> 17;
			seed ^= seed << 5;
			seed | 0xff00_0000
		})
		.collect();
	out.push(PixelBuffer::new(45, 45, argb).expect("Buffer failed."));

	// A handful of colors.
	let colors = [0xff00_0000, 0xffff_ffff, 0xffd0_2020, 0x8020_d020];
	let argb = (0..40 * 40).map(|i| colors[(i / 3 + i / 40) % 4]).collect();
	out.push(PixelBuffer::new(40, 40, argb).expect("Buffer failed."));

	out
}

#[test]
fn t_conformance() {
	for pixels in images() {
		for quality in [0, 50, 100] {
			for cache in [0, 4, 11] {
				let config = EncoderConfig::new()
					.with_quality(quality)
					.with_max_cache_bits(cache);
				check(&pixels, &config);
			}
		}
	}
}

#[test]
fn t_conformance_palette() {
	let colors = [0xff00_0000, 0xffff_ffff, 0x7f10_2030];
	for (width, height) in [(13, 5), (40, 7)] {
		let argb = (0..width * height).map(|i| colors[(i * 5 / 3) as usize % 3]).collect();
		let pixels = PixelBuffer::new(width, height, argb).expect("Buffer failed.");
		check(&pixels, &EncoderConfig::new().with_force_palette(true));
	}
}
