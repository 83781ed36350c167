/*!
# Benchmark: Encoding
*/

use brunch::{
	Bench,
	Benches,
};
use std::hint::black_box;
use wepfli::{
	EncoderConfig,
	PixelBuffer,
};



/// # Test Image.
///
/// A gradient with a few blocky edges, roughly photo-ish.
fn gradient(width: u32, height: u32) -> PixelBuffer {
	let argb = (0..width * height)
		.map(|i| {
			let (x, y) = (i % width, i / width);
			let r = (x * 255 / width) & 0xff;
			let g = (y * 255 / height) & 0xff;
			let b = ((x / 16) ^ (y / 16)) * 40 & 0xff;
			0xff00_0000 | r << 16 | g << 8 | b
		})
		.collect();
	PixelBuffer::new(width, height, argb).expect("Buffer failed.")
}

/// # Palette Image.
fn checkers(width: u32, height: u32) -> PixelBuffer {
	let argb = (0..width * height)
		.map(|i| {
			let (x, y) = (i % width, i / width);
			if (x / 8 + y / 8) % 2 == 0 { 0xff20_4060 } else { 0x0000_0000 }
		})
		.collect();
	PixelBuffer::new(width, height, argb).expect("Buffer failed.")
}

fn main() {
	let photo = gradient(256, 256);
	let flat = checkers(256, 256);
	let encoded = wepfli::encode(&photo, &EncoderConfig::default()).expect("Encode failed.");

	let mut benches = Benches::default();
	benches.extend([
		Bench::new("wepfli::encode(gradient, q0)")
			.run(|| wepfli::encode(black_box(&photo), &EncoderConfig::new().with_quality(0))),
		Bench::new("wepfli::encode(gradient, q75)")
			.run(|| wepfli::encode(black_box(&photo), &EncoderConfig::default())),
		Bench::new("wepfli::encode(gradient, q100)")
			.run(|| wepfli::encode(black_box(&photo), &EncoderConfig::new().with_quality(100))),
		Bench::spacer(),
		Bench::new("wepfli::encode(checkers, q75)")
			.run(|| wepfli::encode(black_box(&flat), &EncoderConfig::default())),
		Bench::spacer(),
		Bench::new("wepfli::decode(gradient)")
			.run(|| wepfli::decode(black_box(&encoded))),
	]);
	benches.finish();
}
