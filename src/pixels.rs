/*!
# Wepfli: Pixel Buffers.
*/

use crate::WepfliError;



/// # Maximum Dimension.
///
/// VP8L stores `width - 1` and `height - 1` in fourteen bits apiece.
pub(crate) const MAX_DIMENSION: u32 = 1 << 14;



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Pixel Buffer.
///
/// A `width × height` grid of `0xAARRGGBB` pixels in row-major order. This
/// is the canonical form the encoder works on; pixel-format conversion is
/// left to whatever hands the data over.
///
/// Construction validates the dimensions, so any instance that exists is
/// encodable.
///
/// ## Examples
///
/// ```
/// use wepfli::PixelBuffer;
///
/// let buf = PixelBuffer::from_rgba8(1, 2, &[255, 0, 0, 255, 0, 0, 255, 128]).unwrap();
/// assert_eq!(buf.argb(), &[0xff_ff_00_00, 0x80_00_00_ff]);
/// assert!(PixelBuffer::new(0, 1, Vec::new()).is_err());
/// ```
pub struct PixelBuffer {
	/// # Width.
	width: u32,

	/// # Height.
	height: u32,

	/// # Pixels.
	argb: Vec<u32>,
}

impl PixelBuffer {
	/// # New (ARGB).
	///
	/// ## Errors
	///
	/// Returns `InvalidInput` if either dimension is zero or larger than
	/// 16384, or if the pixel count doesn't match.
	pub fn new(width: u32, height: u32, argb: Vec<u32>) -> Result<Self, WepfliError> {
		let len = check_dimensions(width, height)?;
		if argb.len() == len { Ok(Self { width, height, argb }) }
		else { Err(WepfliError::InvalidInput("pixel count does not match dimensions")) }
	}

	/// # From RGBA8.
	///
	/// Build a buffer from tightly packed 8-bit `R, G, B, A` samples.
	///
	/// ## Errors
	///
	/// Returns `InvalidInput` for bad dimensions or a slice that isn't
	/// exactly four bytes per pixel.
	pub fn from_rgba8(width: u32, height: u32, rgba: &[u8]) -> Result<Self, WepfliError> {
		let len = check_dimensions(width, height)?;
		if rgba.len() != len * 4 {
			return Err(WepfliError::InvalidInput("expected four 8-bit channels per pixel"));
		}

		let argb = rgba.chunks_exact(4)
			.map(|px| u32::from_be_bytes([px[3], px[0], px[1], px[2]]))
			.collect();

		Ok(Self { width, height, argb })
	}

	#[must_use]
	/// # To RGBA8.
	pub fn to_rgba8(&self) -> Vec<u8> {
		let mut out = Vec::with_capacity(self.argb.len() * 4);
		for px in &self.argb {
			let [a, r, g, b] = px.to_be_bytes();
			out.extend_from_slice(&[r, g, b, a]);
		}
		out
	}
}

impl PixelBuffer {
	#[must_use]
	/// # Width.
	pub const fn width(&self) -> u32 { self.width }

	#[must_use]
	/// # Height.
	pub const fn height(&self) -> u32 { self.height }

	#[must_use]
	/// # Pixels.
	pub fn argb(&self) -> &[u32] { &self.argb }

	#[must_use]
	/// # Into Pixels.
	pub fn into_argb(self) -> Vec<u32> { self.argb }

	/// # Any Transparency?
	pub(crate) fn has_alpha(&self) -> bool {
		self.argb.iter().any(|&px| px >> 24 != 0xff)
	}
}



/// # Check Dimensions.
///
/// Return the pixel count if the dimensions are encodable.
pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<usize, WepfliError> {
	if width == 0 || height == 0 {
		Err(WepfliError::InvalidInput("width and height must be non-zero"))
	}
	else if MAX_DIMENSION < width || MAX_DIMENSION < height {
		Err(WepfliError::InvalidInput("width and height must not exceed 16384"))
	}
	else { Ok(width as usize * height as usize) }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_dimensions() {
		assert_eq!(check_dimensions(1, 1), Ok(1));
		assert_eq!(check_dimensions(16_384, 2), Ok(32_768));
		for (w, h) in [(0, 1), (1, 0), (0, 0), (16_385, 1), (1, 16_385)] {
			assert!(matches!(
				check_dimensions(w, h),
				Err(WepfliError::InvalidInput(_)),
			));
		}
	}

	#[test]
	fn t_new() {
		assert!(PixelBuffer::new(2, 2, vec![0; 4]).is_ok());
		assert!(matches!(
			PixelBuffer::new(2, 2, vec![0; 3]),
			Err(WepfliError::InvalidInput(_)),
		));
		assert!(matches!(
			PixelBuffer::from_rgba8(2, 1, &[0; 7]),
			Err(WepfliError::InvalidInput(_)),
		));
	}

	#[test]
	fn t_rgba() {
		let rgba = [1, 2, 3, 4, 250, 251, 252, 253];
		let buf = PixelBuffer::from_rgba8(2, 1, &rgba).expect("Buffer failed.");
		assert_eq!(buf.argb(), &[0x04_01_02_03, 0xfd_fa_fb_fc]);
		assert_eq!(buf.to_rgba8(), rgba);
		assert!(buf.has_alpha());

		let buf = PixelBuffer::new(1, 1, vec![0xff_00_00_00]).expect("Buffer failed.");
		assert!(! buf.has_alpha());
	}
}
