/*!
# Wepfli: Round Trips.
*/

use wepfli::{
	EncoderConfig,
	PixelBuffer,
	WepfliError,
};



/// # Photo-ish Test Image.
fn photo(width: u32, height: u32) -> PixelBuffer {
	let argb = (0..width * height)
		.map(|i| {
			let (x, y) = (i % width, i / width);
			let r = (x * 3 + y) & 0xff;
			let g = ((x ^ y) * 5) & 0xff;
			let b = (y * 7 / 3) & 0xff;
			0xff00_0000 | r << 16 | g << 8 | b
		})
		.collect();
	PixelBuffer::new(width, height, argb).expect("Buffer failed.")
}

/// # Encode and Decode.
fn round_trip(pixels: &PixelBuffer, config: &EncoderConfig) -> usize {
	let webp = wepfli::encode(pixels, config).expect("Encode failed.");
	assert_eq!(&webp[..4], b"RIFF");
	assert_eq!(&webp[8..16], b"WEBPVP8L");
	assert_eq!(webp.len() % 2, 0);

	let back = wepfli::decode(&webp).expect("Decode failed.");
	assert_eq!(&back, pixels);
	webp.len()
}

#[test]
fn t_photo() {
	let pixels = photo(129, 77);
	for quality in [0, 50, 100] {
		let len = round_trip(&pixels, &EncoderConfig::new().with_quality(quality));
		assert!(len < 129 * 77 * 4);
	}
}

#[test]
fn t_odd_shapes() {
	for (w, h) in [(1, 300), (300, 1), (2, 2), (17, 3), (5, 65)] {
		round_trip(&photo(w, h), &EncoderConfig::default());
	}
}

#[test]
fn t_transparency() {
	let argb: Vec<u32> = (0..40 * 40)
		.map(|i: u32| if i % 13 < 4 { 0 } else { (i % 251) << 24 | 0x00a0_b0c0 })
		.collect();
	let pixels = PixelBuffer::new(40, 40, argb).expect("Buffer failed.");
	round_trip(&pixels, &EncoderConfig::default());
	round_trip(&pixels, &EncoderConfig::new().with_max_cache_bits(0));
}

#[test]
fn t_forced_palette() {
	let colors = [0xff11_2233, 0xff44_5566, 0x8077_8899];
	let argb: Vec<u32> = (0..33 * 10).map(|i| colors[i % 3]).collect();
	let pixels = PixelBuffer::new(33, 10, argb).expect("Buffer failed.");
	round_trip(&pixels, &EncoderConfig::new().with_force_palette(true));

	let pixels = photo(64, 64);
	assert!(matches!(
		wepfli::encode(&pixels, &EncoderConfig::new().with_force_palette(true)),
		Err(WepfliError::UnsupportedConfiguration(_)),
	));
}

#[test]
fn t_garbage() {
	assert!(matches!(wepfli::decode(b""), Err(WepfliError::Malformed(_))));
	assert!(matches!(
		wepfli::decode(b"RIFF\x0c\0\0\0WEBPVP8 \0\0\0\0"),
		Err(WepfliError::Malformed(_)),
	));
}
