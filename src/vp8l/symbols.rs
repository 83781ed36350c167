/*!
# Wepfli: Symbols.

This module defines the token stream produced by the matcher, along with
the prefix and plane-code mappings shared by the cost model, writer and
decoder.
*/

use super::{
	MAX_LENGTH,
	NUM_PLANE_CODES,
	WINDOW_SIZE,
	wepfli_bug,
	WepfliError,
};



/// # Neighbourhood Offsets.
///
/// Short distance codes `1..=120` map to these `(x, y)` offsets, nearest
/// first. The resulting linear distance is `x + y * width`, floored at one.
const PLANE_OFFSETS: [(i8, i8); NUM_PLANE_CODES] = [
	(0, 1), (1, 0), (1, 1), (-1, 1), (0, 2), (2, 0), (1, 2), (-1, 2),
	(2, 1), (-2, 1), (2, 2), (-2, 2), (0, 3), (3, 0), (1, 3), (-1, 3),
	(3, 1), (-3, 1), (2, 3), (-2, 3), (3, 2), (-3, 2), (0, 4), (4, 0),
	(1, 4), (-1, 4), (4, 1), (-4, 1), (3, 3), (-3, 3), (2, 4), (-2, 4),
	(4, 2), (-4, 2), (0, 5), (3, 4), (-3, 4), (4, 3), (-4, 3), (5, 0),
	(1, 5), (-1, 5), (5, 1), (-5, 1), (2, 5), (-2, 5), (5, 2), (-5, 2),
	(4, 4), (-4, 4), (3, 5), (-3, 5), (5, 3), (-5, 3), (0, 6), (6, 0),
	(1, 6), (-1, 6), (6, 1), (-6, 1), (2, 6), (-2, 6), (6, 2), (-6, 2),
	(4, 5), (-4, 5), (5, 4), (-5, 4), (3, 6), (-3, 6), (6, 3), (-6, 3),
	(0, 7), (7, 0), (1, 7), (-1, 7), (5, 5), (-5, 5), (7, 1), (-7, 1),
	(4, 6), (-4, 6), (6, 4), (-6, 4), (2, 7), (-2, 7), (7, 2), (-7, 2),
	(3, 7), (-3, 7), (7, 3), (-7, 3), (5, 6), (-5, 6), (6, 5), (-6, 5),
	(8, 0), (4, 7), (-4, 7), (7, 4), (-7, 4), (8, 1), (8, 2), (6, 6),
	(-6, 6), (8, 3), (5, 7), (-5, 7), (7, 5), (-7, 5), (8, 4), (6, 7),
	(-6, 7), (7, 6), (-7, 6), (8, 5), (7, 7), (-7, 7), (8, 6), (8, 7),
];



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Symbol.
///
/// One token of an entropy-coded image.
pub(crate) enum Symbol {
	/// # Literal ARGB Pixel.
	Literal(u32),

	/// # Color Cache Slot.
	CacheIndex(u16),

	/// # Backward Reference.
	///
	/// Repeat the `length` pixels starting `distance` pixels back.
	BackwardReference {
		length: u16,
		distance: u32,
	},
}

impl Symbol {
	#[inline]
	/// # Pixels Covered.
	pub(crate) const fn len(self) -> usize {
		match self {
			Self::Literal(_) | Self::CacheIndex(_) => 1,
			Self::BackwardReference { length, .. } => length as usize,
		}
	}

	#[allow(clippy::cast_possible_truncation, reason = "Checked by caller.")]
	/// # New Backward Reference.
	pub(crate) const fn reference(length: usize, distance: usize) -> Self {
		debug_assert!(2 <= length && length <= MAX_LENGTH);
		debug_assert!(1 <= distance && distance <= WINDOW_SIZE);
		Self::BackwardReference { length: length as u16, distance: distance as u32 }
	}
}



#[derive(Debug, Clone, Default, Eq, PartialEq)]
/// # Token Stream.
pub(crate) struct TokenStream(Vec<Symbol>);

impl TokenStream {
	/// # With Capacity.
	pub(crate) fn with_capacity(cap: usize) -> Self { Self(Vec::with_capacity(cap)) }

	#[inline]
	/// # Push.
	pub(crate) fn push(&mut self, symbol: Symbol) { self.0.push(symbol); }

	/// # Number of Tokens.
	pub(crate) fn len(&self) -> usize { self.0.len() }

	/// # Iterator.
	pub(crate) fn iter(&self) -> std::slice::Iter<'_, Symbol> { self.0.iter() }

	#[cfg(test)]
	/// # Pixels Covered.
	pub(crate) fn covered(&self) -> usize { self.0.iter().map(|s| s.len()).sum() }

	/// # Verify Coverage.
	///
	/// Tokens are consumed strictly in order, so as long as the total matches
	/// the pixel count, every pixel is covered exactly once. Backward
	/// references must also point somewhere that already exists.
	///
	/// ## Errors
	///
	/// Returns an invariant violation if anything doesn't line up.
	pub(crate) fn verify(&self, pixels: usize) -> Result<(), WepfliError> {
		let mut pos = 0_usize;
		for s in &self.0 {
			if let Symbol::BackwardReference { length, distance } = *s {
				if length == 0 || distance == 0 || pos < distance as usize {
					return Err(wepfli_bug!());
				}
			}
			pos += s.len();
		}

		if pos == pixels { Ok(()) }
		else { Err(wepfli_bug!()) }
	}
}

impl<'a> IntoIterator for &'a TokenStream {
	type Item = &'a Symbol;
	type IntoIter = std::slice::Iter<'a, Symbol>;

	fn into_iter(self) -> Self::IntoIter { self.iter() }
}

impl FromIterator<Symbol> for TokenStream {
	fn from_iter<I: IntoIterator<Item = Symbol>>(iter: I) -> Self {
		Self(iter.into_iter().collect())
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Prefix-Coded Value.
///
/// Lengths and distance codes are split into a prefix symbol and a run of
/// raw extra bits.
pub(crate) struct PrefixCode {
	/// # Symbol.
	pub(crate) code: u8,

	/// # Extra Bit Count.
	pub(crate) extra_bits: u8,

	/// # Extra Bit Value.
	pub(crate) extra_value: u32,
}

impl PrefixCode {
	#[allow(clippy::cast_possible_truncation, reason = "Values are at most 20 bits.")]
	/// # Encode.
	///
	/// Split a value (`1..=1 << 20`) into its prefix parts.
	pub(crate) const fn encode(value: u32) -> Self {
		debug_assert!(value != 0);
		let n = value - 1;
		if n < 4 {
			Self { code: n as u8, extra_bits: 0, extra_value: 0 }
		}
		else {
			let high = 31 - n.leading_zeros();
			let second = (n >> (high - 1)) & 1;
			let extra_bits = high - 1;
			Self {
				code: (2 * high + second) as u8,
				extra_bits: extra_bits as u8,
				extra_value: n & ((1 << extra_bits) - 1),
			}
		}
	}

	/// # Extra Bits for Code.
	pub(crate) const fn extra_bits(code: u8) -> u8 {
		if code < 4 { 0 }
		else { (code - 2) >> 1 }
	}

	/// # Decode.
	///
	/// Rebuild the value from a prefix symbol and its extra bits.
	pub(crate) const fn decode(code: u8, extra_value: u32) -> u32 {
		if code < 4 { code as u32 + 1 }
		else {
			let extra_bits = Self::extra_bits(code);
			let offset = (2 + (code as u32 & 1)) << extra_bits;
			offset + extra_value + 1
		}
	}
}



#[derive(Debug, Clone)]
/// # Plane Codes.
///
/// VP8L distances are transmitted as "plane codes": either one of the 120
/// neighbourhood shortcuts or the linear distance plus 120. This keeps a
/// lookup of the cheapest shortcut for every short distance given an image
/// width.
pub(crate) struct PlaneCodes {
	/// # Shortcut by Distance (zero for none).
	lut: Vec<u8>,

	/// # Image Width.
	width: usize,
}

impl PlaneCodes {
	#[allow(clippy::cast_possible_truncation, reason = "There are only 120.")]
	/// # New.
	pub(crate) fn new(width: usize) -> Self {
		let width = width.max(1);
		let mut lut = vec![0_u8; 7 * width + 9];

		// Walk backwards so the lowest index wins any ties.
		for (idx, &(x, y)) in PLANE_OFFSETS.iter().enumerate().rev() {
			let dist = offset_distance(x, y, width);
			if let Some(slot) = lut.get_mut(dist) { *slot = idx as u8 + 1; }
		}

		Self { lut, width }
	}

	/// # Width.
	pub(crate) const fn width(&self) -> usize { self.width }

	#[allow(clippy::cast_possible_truncation, reason = "Distances fit in 20 bits.")]
	#[inline]
	/// # Plane Code for Distance.
	pub(crate) fn code(&self, distance: usize) -> u32 {
		match self.lut.get(distance) {
			Some(&c) if c != 0 => u32::from(c),
			_ => (distance + NUM_PLANE_CODES) as u32,
		}
	}

	/// # Distance for Plane Code.
	///
	/// Returns `None` for code zero, which isn't a thing.
	pub(crate) fn distance(&self, code: u32) -> Option<usize> {
		let code = code as usize;
		if code == 0 { None }
		else if NUM_PLANE_CODES < code { Some(code - NUM_PLANE_CODES) }
		else {
			let (x, y) = PLANE_OFFSETS[code - 1];
			Some(offset_distance(x, y, self.width))
		}
	}
}

#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, reason = "Widths are small.")]
/// # Offset to Linear Distance.
fn offset_distance(x: i8, y: i8, width: usize) -> usize {
	let dist = isize::from(x) + isize::from(y) * width as isize;
	if dist < 1 { 1 }
	else { dist as usize }
}
