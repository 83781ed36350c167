/*!
# Wepfli: Encoder Configuration.
*/

use crate::WepfliError;



/// # Maximum Color Cache Bits.
pub(crate) const MAX_CACHE_BITS: u8 = 11;

/// # Default Quality.
const DEFAULT_QUALITY: u8 = 75;

/// # Default Color Cache Bits.
const DEFAULT_CACHE_BITS: u8 = 10;



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Encoder Configuration.
///
/// This holds the handful of knobs the encoder exposes. Everything is
/// lossless regardless of the settings; `quality` only trades speed for
/// size.
///
/// ## Examples
///
/// ```
/// use wepfli::EncoderConfig;
///
/// let config = EncoderConfig::new()
///     .with_quality(90)
///     .with_max_cache_bits(8);
///
/// assert_eq!(config.quality(), 90);
/// assert!(config.validate().is_ok());
/// ```
pub struct EncoderConfig {
	/// # Quality (Effort).
	quality: u8,

	/// # Force Palette.
	force_palette: bool,

	/// # Maximum Color Cache Bits.
	max_cache_bits: u8,

	/// # Lossless Only.
	lossless_only: bool,
}

impl Default for EncoderConfig {
	#[inline]
	fn default() -> Self { Self::new() }
}

impl EncoderConfig {
	#[must_use]
	/// # New.
	pub const fn new() -> Self {
		Self {
			quality: DEFAULT_QUALITY,
			force_palette: false,
			max_cache_bits: DEFAULT_CACHE_BITS,
			lossless_only: true,
		}
	}

	#[must_use]
	/// # With Quality.
	///
	/// Set the effort level, `0..=100`. Higher values search harder and try
	/// more transforms.
	pub const fn with_quality(mut self, quality: u8) -> Self {
		self.quality = quality;
		self
	}

	#[must_use]
	/// # With Force Palette.
	///
	/// When `true`, the color-indexing transform is used unconditionally.
	/// Images with more than 256 distinct colors will then fail to encode.
	pub const fn with_force_palette(mut self, force: bool) -> Self {
		self.force_palette = force;
		self
	}

	#[must_use]
	/// # With Max Cache Bits.
	///
	/// Set the largest color cache (as a power of two) the encoder may
	/// consider, `0..=11`. Zero disables the cache.
	pub const fn with_max_cache_bits(mut self, bits: u8) -> Self {
		self.max_cache_bits = bits;
		self
	}

	#[must_use]
	/// # With Lossless Only.
	pub const fn with_lossless_only(mut self, lossless: bool) -> Self {
		self.lossless_only = lossless;
		self
	}
}

impl EncoderConfig {
	#[must_use]
	/// # Quality.
	pub const fn quality(&self) -> u8 { self.quality }

	#[must_use]
	/// # Force Palette?
	pub const fn force_palette(&self) -> bool { self.force_palette }

	#[must_use]
	/// # Max Cache Bits.
	pub const fn max_cache_bits(&self) -> u8 { self.max_cache_bits }

	#[must_use]
	/// # Lossless Only?
	///
	/// There is no lossy path, so this is always honored.
	pub const fn lossless_only(&self) -> bool { self.lossless_only }

	/// # Validate.
	///
	/// ## Errors
	///
	/// Returns `UnsupportedConfiguration` if the quality exceeds 100 or the
	/// cache bits exceed what VP8L can signal.
	pub const fn validate(&self) -> Result<(), WepfliError> {
		if 100 < self.quality {
			Err(WepfliError::UnsupportedConfiguration("quality must be 0..=100"))
		}
		else if MAX_CACHE_BITS < self.max_cache_bits {
			Err(WepfliError::UnsupportedConfiguration("color cache bits must be 0..=11"))
		}
		else { Ok(()) }
	}

	/// # Effort.
	pub(crate) const fn effort(&self) -> Effort { Effort::new(self.quality) }
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Effort.
///
/// The concrete search settings derived from a quality value.
pub(crate) struct Effort {
	/// # Method (0..=6).
	method: u8,

	/// # Hash Chain Depth.
	chain_depth: usize,

	/// # Hash Chain Depth (Candidate Scoring).
	quick_depth: usize,

	/// # Window Rows (None for the full window).
	window_rows: Option<usize>,

	/// # Cost-Driven Second Pass?
	second_pass: bool,

	/// # Extra Predictor Tile Sizes.
	predictor_sizes: u8,

	/// # Combiner Window.
	combine_window: usize,

	/// # Combiner Passes.
	combine_passes: usize,
}

impl Effort {
	#[allow(clippy::integer_division, reason = "Deliberate.")]
	/// # New.
	const fn new(quality: u8) -> Self {
		let q = (if 100 < quality { 100 } else { quality }) as usize;
		let method = ((q * 6 + 50) / 100) as u8;
		let chain_depth = 8 + q * q / 128;

		Self {
			method,
			chain_depth,
			quick_depth: 4 + chain_depth / 4,
			window_rows:
				if 75 < q { None }
				else if 50 < q { Some(256) }
				else if 25 < q { Some(64) }
				else { Some(16) },
			second_pass: 25 <= q,
			predictor_sizes: if 50 <= q { 2 } else { 1 },
			combine_window: 1 + q / 10,
			combine_passes: if 50 <= q { 2 } else { 1 },
		}
	}

	/// # Method.
	pub(crate) const fn method(&self) -> u8 { self.method }

	/// # Chain Depth.
	///
	/// The maximum number of hash-chain candidates to inspect per position.
	/// A shallower depth is used when merely scoring transform candidates.
	pub(crate) const fn chain_depth(&self, quick: bool) -> usize {
		if quick { self.quick_depth }
		else { self.chain_depth }
	}

	/// # Window (Pixels).
	pub(crate) const fn window(&self, width: usize) -> usize {
		let full = crate::vp8l::WINDOW_SIZE;
		match self.window_rows {
			Some(rows) => {
				let w = width.saturating_mul(rows);
				if w < full { w } else { full }
			},
			None => full,
		}
	}

	/// # Second Pass?
	pub(crate) const fn second_pass(&self) -> bool { self.second_pass }

	/// # Predictor Tile Sizes.
	pub(crate) const fn predictor_sizes(&self) -> u8 { self.predictor_sizes }

	/// # Combiner Window.
	pub(crate) const fn combine_window(&self) -> usize { self.combine_window }

	/// # Combiner Passes.
	pub(crate) const fn combine_passes(&self) -> usize { self.combine_passes }
}
