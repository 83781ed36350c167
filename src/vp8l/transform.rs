/*!
# Wepfli: Transforms.

The four reversible VP8L image transforms (predictor, cross-color,
subtract-green and color-indexing), their inverses, and the per-tile
searches that parameterize them.
*/

use ahash::{
	AHashMap,
	AHashSet,
};
use dactyl::traits::SaturatingFrom;
use rayon::prelude::*;
use super::{
	shannon_bits,
	subsample,
	wepfli_bug,
	WepfliError,
};



/// # Opaque Black.
pub(crate) const ARGB_BLACK: u32 = 0xff00_0000;

/// # Number of Predictor Modes.
pub(crate) const NUM_PREDICTORS: u8 = 14;

/// # Mode Switch Penalty (Bits).
///
/// Added to a tile's cost when its predictor differs from its left
/// neighbour's, nudging the mode image towards runs.
const MODE_SWITCH_BITS: f64 = 16.0;

/// # Palette Limit.
pub(crate) const MAX_PALETTE: usize = 256;



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Transform.
///
/// One step of a transform plan, with everything needed to write (or undo)
/// it.
pub(crate) enum TransformSpec {
	/// # Subtract Green.
	SubtractGreen,

	/// # Spatial Prediction.
	Predictor {
		bits: u8,
		modes: Vec<u8>,
	},

	/// # Cross-Color.
	CrossColor {
		bits: u8,
		multipliers: Vec<Multipliers>,
	},

	/// # Color Indexing.
	Palette {
		colors: Vec<u32>,
	},
}

impl TransformSpec {
	/// # Kind (Two-Bit Code).
	pub(crate) const fn kind(&self) -> u8 {
		match self {
			Self::Predictor { .. } => 0,
			Self::CrossColor { .. } => 1,
			Self::SubtractGreen => 2,
			Self::Palette { .. } => 3,
		}
	}

	/// # Sub-Image.
	///
	/// Return the transform data as ARGB pixels along with its width, or
	/// `None` if there isn't any.
	pub(crate) fn sub_image(&self, width: usize) -> Option<(Vec<u32>, usize)> {
		match self {
			Self::SubtractGreen => None,
			Self::Predictor { bits, modes } => Some((
				modes.iter().map(|&m| ARGB_BLACK | u32::from(m) << 8).collect(),
				subsample(width, *bits),
			)),
			Self::CrossColor { bits, multipliers } => Some((
				multipliers.iter().map(|m| m.to_argb()).collect(),
				subsample(width, *bits),
			)),
			Self::Palette { colors } => Some((delta_palette(colors), colors.len())),
		}
	}

	/// # Apply.
	///
	/// Transform the image, returning the new pixels and width. Only the
	/// palette changes the width.
	///
	/// ## Errors
	///
	/// Returns an invariant violation if a pixel is missing from the
	/// palette or the parameters don't fit the image.
	pub(crate) fn apply(&self, argb: &[u32], width: usize, height: usize)
	-> Result<(Vec<u32>, usize), WepfliError> {
		match self {
			Self::SubtractGreen => Ok((argb.iter().map(|&px| subtract_green(px)).collect(), width)),
			Self::Predictor { bits, modes } => {
				check_tiles(modes.len(), width, height, *bits)?;
				Ok((apply_predictor(argb, width, *bits, modes), width))
			},
			Self::CrossColor { bits, multipliers } => {
				check_tiles(multipliers.len(), width, height, *bits)?;
				Ok((apply_cross_color(argb, width, *bits, multipliers), width))
			},
			Self::Palette { colors } => apply_palette(argb, width, colors),
		}
	}

	/// # Invert.
	///
	/// Undo the transform in place. `width` is the width of the image
	/// before the transform was applied; for a palette, `argb` holds the
	/// packed indices and is replaced by the expanded colors.
	///
	/// ## Errors
	///
	/// Returns `Malformed` if the parameters don't fit the image.
	pub(crate) fn invert(&self, argb: &mut Vec<u32>, width: usize, height: usize)
	-> Result<(), WepfliError> {
		match self {
			Self::SubtractGreen => for px in argb.iter_mut() { *px = add_green(*px); },
			Self::Predictor { bits, modes } => {
				check_tiles(modes.len(), width, height, *bits)
					.map_err(|_| WepfliError::Malformed("predictor image size"))?;
				invert_predictor(argb, width, *bits, modes);
			},
			Self::CrossColor { bits, multipliers } => {
				check_tiles(multipliers.len(), width, height, *bits)
					.map_err(|_| WepfliError::Malformed("cross-color image size"))?;
				invert_cross_color(argb, width, *bits, multipliers);
			},
			Self::Palette { colors } => {
				*argb = invert_palette(argb, width, height, colors)?;
			},
		}
		Ok(())
	}
}

/// # Check Tile Count.
fn check_tiles(len: usize, width: usize, height: usize, bits: u8) -> Result<(), WepfliError> {
	if len == subsample(width, bits) * subsample(height, bits) { Ok(()) }
	else { Err(wepfli_bug!()) }
}



#[inline]
/// # Per-Channel Subtraction.
pub(crate) const fn sub_pixels(a: u32, b: u32) -> u32 {
	let ag = 0x00ff_00ff_u32.wrapping_add(a & 0xff00_ff00).wrapping_sub(b & 0xff00_ff00);
	let rb = 0xff00_ff00_u32.wrapping_add(a & 0x00ff_00ff).wrapping_sub(b & 0x00ff_00ff);
	(ag & 0xff00_ff00) | (rb & 0x00ff_00ff)
}

#[inline]
/// # Per-Channel Addition.
pub(crate) const fn add_pixels(a: u32, b: u32) -> u32 {
	let ag = (a & 0xff00_ff00).wrapping_add(b & 0xff00_ff00);
	let rb = (a & 0x00ff_00ff).wrapping_add(b & 0x00ff_00ff);
	(ag & 0xff00_ff00) | (rb & 0x00ff_00ff)
}

#[inline]
/// # Subtract Green.
const fn subtract_green(px: u32) -> u32 {
	let g = (px >> 8) & 0xff;
	let rb = ((px & 0x00ff_00ff) + 0x0100_0100 - (g << 16 | g)) & 0x00ff_00ff;
	(px & 0xff00_ff00) | rb
}

#[inline]
/// # Add Green.
const fn add_green(px: u32) -> u32 {
	let g = (px >> 8) & 0xff;
	let rb = ((px & 0x00ff_00ff) + (g << 16 | g)) & 0x00ff_00ff;
	(px & 0xff00_ff00) | rb
}



#[inline]
/// # Average of Two.
const fn average2(a: u32, b: u32) -> u32 {
	(((a ^ b) & 0xfefe_fefe) >> 1).wrapping_add(a & b)
}

#[inline]
/// # Channel.
const fn channel(px: u32, shift: u32) -> i32 { ((px >> shift) & 0xff) as i32 }

#[inline]
/// # Clamp to a Byte.
const fn clamp255(v: i32) -> u32 {
	if v < 0 { 0 }
	else if 255 < v { 255 }
	else { v as u32 }
}

/// # Select.
///
/// Pick whichever of `top` or `left` lies in the direction of the smaller
/// gradient.
const fn select(top: u32, left: u32, top_left: u32) -> u32 {
	let mut score = 0;
	let mut shift = 0;
	while shift < 32 {
		let tl = channel(top_left, shift);
		score += (channel(left, shift) - tl).abs() - (channel(top, shift) - tl).abs();
		shift += 8;
	}
	if score <= 0 { top } else { left }
}

/// # Clamped Add/Subtract (Full).
const fn clamp_add_sub_full(a: u32, b: u32, c: u32) -> u32 {
	let mut out = 0;
	let mut shift = 0;
	while shift < 32 {
		let v = channel(a, shift) + channel(b, shift) - channel(c, shift);
		out |= clamp255(v) << shift;
		shift += 8;
	}
	out
}

/// # Clamped Add/Subtract (Half).
const fn clamp_add_sub_half(a: u32, b: u32) -> u32 {
	let mut out = 0;
	let mut shift = 0;
	while shift < 32 {
		let a0 = channel(a, shift);
		let v = a0 + (a0 - channel(b, shift)) / 2;
		out |= clamp255(v) << shift;
		shift += 8;
	}
	out
}

/// # Predict.
///
/// Return the predicted value for the pixel at `pos` using the
/// already-known pixels before it. The first pixel is always predicted as
/// opaque black, the rest of the first row from the left, and the rest of
/// the first column from above; `mode` applies everywhere else.
pub(crate) fn predict(mode: u8, argb: &[u32], width: usize, pos: usize) -> u32 {
	if pos == 0 { return ARGB_BLACK; }
	if pos < width { return argb[pos - 1]; }
	if pos % width == 0 { return argb[pos - width]; }

	let l = argb[pos - 1];
	let t = argb[pos - width];
	let tl = argb[pos - width - 1];
	let tr = argb[pos - width + 1];
	match mode {
		1 => l,
		2 => t,
		3 => tr,
		4 => tl,
		5 => average2(average2(l, tr), t),
		6 => average2(l, tl),
		7 => average2(l, t),
		8 => average2(tl, t),
		9 => average2(t, tr),
		10 => average2(average2(l, tl), average2(t, tr)),
		11 => select(t, l, tl),
		12 => clamp_add_sub_full(l, t, tl),
		13 => clamp_add_sub_half(average2(l, t), tl),
		_ => ARGB_BLACK,
	}
}

/// # Apply Predictor.
fn apply_predictor(argb: &[u32], width: usize, bits: u8, modes: &[u8]) -> Vec<u32> {
	let tiles_w = subsample(width, bits);
	argb.iter()
		.enumerate()
		.map(|(pos, &px)| {
			let (x, y) = (pos % width, pos / width);
			let mode = modes[(y >> bits) * tiles_w + (x >> bits)];
			sub_pixels(px, predict(mode, argb, width, pos))
		})
		.collect()
}

/// # Invert Predictor.
fn invert_predictor(argb: &mut [u32], width: usize, bits: u8, modes: &[u8]) {
	let tiles_w = subsample(width, bits);
	for pos in 0..argb.len() {
		let (x, y) = (pos % width, pos / width);
		let mode = modes[(y >> bits) * tiles_w + (x >> bits)];
		argb[pos] = add_pixels(argb[pos], predict(mode, argb, width, pos));
	}
}

/// # Choose Predictor Modes.
///
/// For each tile, pick the mode whose residuals have the lowest combined
/// channel entropy, with a penalty for changing modes mid-row. Tile rows
/// are independent and are processed in parallel.
pub(crate) fn choose_predictors(argb: &[u32], width: usize, height: usize, bits: u8) -> Vec<u8> {
	let tiles_w = subsample(width, bits);
	let tiles_h = subsample(height, bits);
	let size = 1_usize << bits;

	(0..tiles_h).into_par_iter()
		.flat_map_iter(|ty| {
			let mut row = Vec::with_capacity(tiles_w);
			let mut left: Option<u8> = None;
			for tx in 0..tiles_w {
				let x_end = ((tx + 1) * size).min(width);
				let y_end = ((ty + 1) * size).min(height);

				let mut best = (f64::MAX, 0_u8);
				for mode in 0..NUM_PREDICTORS {
					let mut histo = [[0_u32; 256]; 4];
					for y in ty * size..y_end {
						for x in tx * size..x_end {
							let pos = y * width + x;
							let res = sub_pixels(argb[pos], predict(mode, argb, width, pos));
							for (c, h) in histo.iter_mut().enumerate() {
								h[((res >> (c * 8)) & 0xff) as usize] += 1;
							}
						}
					}

					let mut cost: f64 = histo.iter().map(|h| shannon_bits(h)).sum();
					if left.is_some_and(|l| l != mode) { cost += MODE_SWITCH_BITS; }
					if cost < best.0 { best = (cost, mode); }
				}

				left.replace(best.1);
				row.push(best.1);
			}
			row
		})
		.collect()
}



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Cross-Color Multipliers.
pub(crate) struct Multipliers {
	/// # Green to Red.
	pub(crate) green_to_red: u8,

	/// # Green to Blue.
	pub(crate) green_to_blue: u8,

	/// # Red to Blue.
	pub(crate) red_to_blue: u8,
}

impl Multipliers {
	/// # From Sub-Image Pixel.
	pub(crate) const fn from_argb(px: u32) -> Self {
		Self {
			green_to_red: px as u8,
			green_to_blue: (px >> 8) as u8,
			red_to_blue: (px >> 16) as u8,
		}
	}

	/// # To Sub-Image Pixel.
	pub(crate) const fn to_argb(self) -> u32 {
		ARGB_BLACK |
		(self.red_to_blue as u32) << 16 |
		(self.green_to_blue as u32) << 8 |
		self.green_to_red as u32
	}

	#[inline]
	/// # Forward.
	const fn forward(self, px: u32) -> u32 {
		let green = (px >> 8) as u8;
		let red = (px >> 16) as u8;
		let new_red = (red as i32 - delta(self.green_to_red, green)) & 0xff;
		let new_blue = (
			(px & 0xff) as i32 -
			delta(self.green_to_blue, green) -
			delta(self.red_to_blue, red)
		) & 0xff;
		(px & 0xff00_ff00) | (new_red as u32) << 16 | new_blue as u32
	}

	#[inline]
	/// # Inverse.
	const fn inverse(self, px: u32) -> u32 {
		let green = (px >> 8) as u8;
		let new_red = (((px >> 16) & 0xff) as i32 + delta(self.green_to_red, green)) & 0xff;
		let new_blue = (
			(px & 0xff) as i32 +
			delta(self.green_to_blue, green) +
			delta(self.red_to_blue, new_red as u8)
		) & 0xff;
		(px & 0xff00_ff00) | (new_red as u32) << 16 | new_blue as u32
	}
}

#[inline]
/// # Color Transform Delta.
///
/// Both values are reinterpreted as signed 3.5 fixed-point bytes.
const fn delta(multiplier: u8, color: u8) -> i32 {
	((multiplier as i8 as i32) * (color as i8 as i32)) >> 5
}

/// # Apply Cross-Color.
fn apply_cross_color(argb: &[u32], width: usize, bits: u8, multipliers: &[Multipliers]) -> Vec<u32> {
	let tiles_w = subsample(width, bits);
	argb.iter()
		.enumerate()
		.map(|(pos, &px)| {
			let (x, y) = (pos % width, pos / width);
			multipliers[(y >> bits) * tiles_w + (x >> bits)].forward(px)
		})
		.collect()
}

/// # Invert Cross-Color.
fn invert_cross_color(argb: &mut [u32], width: usize, bits: u8, multipliers: &[Multipliers]) {
	let tiles_w = subsample(width, bits);
	for (pos, px) in argb.iter_mut().enumerate() {
		let (x, y) = (pos % width, pos / width);
		*px = multipliers[(y >> bits) * tiles_w + (x >> bits)].inverse(*px);
	}
}

/// # Choose Cross-Color Multipliers.
///
/// Each tile gets a small coordinate search: `green_to_red` against the
/// red channel's entropy, then `green_to_blue` and `red_to_blue` against
/// the blue channel's.
pub(crate) fn choose_multipliers(argb: &[u32], width: usize, height: usize, bits: u8)
-> Vec<Multipliers> {
	let tiles_w = subsample(width, bits);
	let tiles_h = subsample(height, bits);
	let size = 1_usize << bits;

	(0..tiles_w * tiles_h).into_par_iter()
		.map(|tile| {
			let (tx, ty) = (tile % tiles_w, tile / tiles_w);
			let x_end = ((tx + 1) * size).min(width);
			let y_end = ((ty + 1) * size).min(height);
			let tile_px: Vec<u32> = (ty * size..y_end)
				.flat_map(|y| argb[y * width + tx * size..y * width + x_end].iter().copied())
				.collect();

			let mut m = Multipliers::default();
			m.green_to_red = search(|g2r| {
				let t = Multipliers { green_to_red: g2r, ..m };
				channel_cost(&tile_px, t, 16)
			});
			m.green_to_blue = search(|g2b| {
				let t = Multipliers { green_to_blue: g2b, ..m };
				channel_cost(&tile_px, t, 0)
			});
			m.red_to_blue = search(|r2b| {
				let t = Multipliers { red_to_blue: r2b, ..m };
				channel_cost(&tile_px, t, 0)
			});
			m
		})
		.collect()
}

/// # Channel Cost.
fn channel_cost(tile: &[u32], m: Multipliers, shift: u32) -> f64 {
	let mut histo = [0_u32; 256];
	for &px in tile { histo[((m.forward(px) >> shift) & 0xff) as usize] += 1; }
	shannon_bits(&histo)
}

#[allow(clippy::cast_sign_loss, reason = "Deliberate reinterpretation.")]
/// # Halving Search.
///
/// Starting from zero, step either way by a halving delta, keeping any
/// strict improvement.
fn search<F: Fn(u8) -> f64>(cost: F) -> u8 {
	let mut best: i8 = 0;
	let mut best_cost = cost(0);
	let mut step: i8 = 32;
	while 0 < step {
		for cand in [best.wrapping_sub(step), best.wrapping_add(step)] {
			let c = cost(cand as u8);
			if c < best_cost {
				best = cand;
				best_cost = c;
			}
		}
		step /= 2;
	}
	best as u8
}



/// # Collect Palette.
///
/// Return the distinct colors in first-seen order, or `None` if there are
/// more than 256.
pub(crate) fn collect_palette(argb: &[u32]) -> Option<Vec<u32>> {
	let mut seen = AHashSet::with_capacity(MAX_PALETTE);
	let mut colors = Vec::new();
	let mut last = None;
	for &px in argb {
		if last == Some(px) { continue; }
		last = Some(px);
		if seen.insert(px) {
			if colors.len() == MAX_PALETTE { return None; }
			colors.push(px);
		}
	}
	Some(colors)
}

/// # Palette Packing Bits.
///
/// The log2 of the number of indices packed into each pixel.
pub(crate) const fn packing_bits(colors: usize) -> u8 {
	if colors <= 2 { 3 }
	else if colors <= 4 { 2 }
	else if colors <= 16 { 1 }
	else { 0 }
}

/// # Delta-Coded Palette.
///
/// Palettes are stored as differences from the previous entry.
fn delta_palette(colors: &[u32]) -> Vec<u32> {
	let mut prev = 0;
	colors.iter()
		.map(|&c| {
			let out = sub_pixels(c, prev);
			prev = c;
			out
		})
		.collect()
}

/// # Undo Delta Coding.
pub(crate) fn undelta_palette(deltas: &mut [u32]) {
	for i in 1..deltas.len() { deltas[i] = add_pixels(deltas[i], deltas[i - 1]); }
}

/// # Apply Palette.
///
/// Replace each pixel with its index (in the green channel), packing
/// several indices per pixel for small palettes.
fn apply_palette(argb: &[u32], width: usize, colors: &[u32])
-> Result<(Vec<u32>, usize), WepfliError> {
	if colors.is_empty() || MAX_PALETTE < colors.len() { return Err(wepfli_bug!()); }

	let lookup: AHashMap<u32, u8> = colors.iter()
		.enumerate()
		.map(|(i, &c)| (c, u8::saturating_from(i)))
		.collect();

	let bits = packing_bits(colors.len());
	let packed_width = subsample(width, bits);
	let mask = (1_usize << bits) - 1;
	let idx_bits = 8_usize >> bits;

	let mut out = Vec::with_capacity(packed_width * argb.len() / width);
	for row in argb.chunks_exact(width) {
		let start = out.len();
		out.resize(start + packed_width, ARGB_BLACK);
		for (x, px) in row.iter().enumerate() {
			let idx = lookup.get(px).copied().ok_or_else(|| wepfli_bug!())?;
			out[start + (x >> bits)] |= u32::from(idx) << (8 + (x & mask) * idx_bits);
		}
	}
	Ok((out, packed_width))
}

/// # Invert Palette.
///
/// Indices past the end of the palette decode as transparent black.
fn invert_palette(packed: &[u32], width: usize, height: usize, colors: &[u32])
-> Result<Vec<u32>, WepfliError> {
	if colors.is_empty() || MAX_PALETTE < colors.len() {
		return Err(WepfliError::Malformed("palette size"));
	}
	let bits = packing_bits(colors.len());
	let packed_width = subsample(width, bits);
	if packed.len() != packed_width * height {
		return Err(WepfliError::Malformed("palette image size"));
	}

	let mask = (1_usize << bits) - 1;
	let idx_bits = 8_usize >> bits;
	let idx_mask = (1_u32 << idx_bits) - 1;

	let mut out = Vec::with_capacity(width * height);
	for row in packed.chunks_exact(packed_width) {
		for x in 0..width {
			let idx = (row[x >> bits] >> (8 + (x & mask) * idx_bits)) & idx_mask;
			out.push(colors.get(idx as usize).copied().unwrap_or(0));
		}
	}
	Ok(out)
}
