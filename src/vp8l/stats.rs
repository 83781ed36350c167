/*!
# Wepfli: Histograms and Cost Estimation.

This module holds the per-alphabet symbol statistics along with the cheap
bit-cost approximations used to steer every irreversible decision the
encoder makes: transform choice, cache size, reference-vs-literal and
histogram clustering.
*/

use super::{
	NUM_DISTANCE_CODES,
	NUM_LENGTH_CODES,
	NUM_LITERAL_CODES,
	PlaneCodes,
	PrefixCode,
	Symbol,
	TokenStream,
	wepfli_bug,
	WepfliError,
};



/// # Code Length Codes.
const CODE_LENGTH_CODES: u32 = 19;

/// # Offset of the Cache Symbols in the Green Alphabet.
pub(crate) const CACHE_OFFSET: usize = NUM_LITERAL_CODES + NUM_LENGTH_CODES;



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Histogram.
///
/// Symbol frequencies for the five VP8L alphabets: green (plus lengths and
/// cache slots), red, blue, alpha and distance.
pub(crate) struct Histogram {
	/// # Green, Length Prefixes, Cache Slots.
	green: Vec<u32>,

	/// # Red.
	red: [u32; NUM_LITERAL_CODES],

	/// # Blue.
	blue: [u32; NUM_LITERAL_CODES],

	/// # Alpha.
	alpha: [u32; NUM_LITERAL_CODES],

	/// # Distance Prefixes.
	distance: [u32; NUM_DISTANCE_CODES],
}

impl Histogram {
	/// # New.
	pub(crate) fn new(cache_bits: u8) -> Self {
		let cache_size = if cache_bits == 0 { 0 } else { 1_usize << cache_bits };
		Self {
			green: vec![0; CACHE_OFFSET + cache_size],
			red: [0; NUM_LITERAL_CODES],
			blue: [0; NUM_LITERAL_CODES],
			alpha: [0; NUM_LITERAL_CODES],
			distance: [0; NUM_DISTANCE_CODES],
		}
	}

	/// # From Tokens.
	///
	/// ## Errors
	///
	/// Returns an invariant violation if any token couldn't be counted,
	/// e.g. a cache index with no cache.
	pub(crate) fn from_tokens(tokens: &TokenStream, cache_bits: u8, planes: &PlaneCodes)
	-> Result<Self, WepfliError> {
		let mut out = Self::new(cache_bits);
		for s in tokens { out.add(*s, planes); }

		if out.tokens() == tokens.len() as u64 { Ok(out) }
		else { Err(wepfli_bug!()) }
	}

	/// # From Literals.
	///
	/// Count raw pixels as if they were all emitted as literals. This is used
	/// to approximate the cost of small sub-images.
	pub(crate) fn from_literals(argb: &[u32]) -> Self {
		let mut out = Self::new(0);
		for &px in argb { out.add_literal(px); }
		out
	}

	#[inline]
	/// # Add Literal.
	pub(crate) fn add_literal(&mut self, argb: u32) {
		self.alpha[(argb >> 24) as usize] += 1;
		self.red[((argb >> 16) & 0xff) as usize] += 1;
		self.green[((argb >> 8) & 0xff) as usize] += 1;
		self.blue[(argb & 0xff) as usize] += 1;
	}

	/// # Add Symbol.
	///
	/// Cache indices beyond the alphabet are ignored, which
	/// `Histogram::from_tokens` then reports.
	pub(crate) fn add(&mut self, symbol: Symbol, planes: &PlaneCodes) {
		match symbol {
			Symbol::Literal(argb) => { self.add_literal(argb); },
			Symbol::CacheIndex(slot) => {
				if let Some(c) = self.green.get_mut(CACHE_OFFSET + usize::from(slot)) {
					*c += 1;
				}
			},
			Symbol::BackwardReference { length, distance } => {
				let l = PrefixCode::encode(u32::from(length));
				let d = PrefixCode::encode(planes.code(distance as usize));
				self.green[NUM_LITERAL_CODES + usize::from(l.code)] += 1;
				self.distance[usize::from(d.code)] += 1;
			},
		}
	}

	/// # Merge.
	///
	/// Add the other histogram's counts to this one. Both must share the
	/// same cache size.
	pub(crate) fn merge(&mut self, other: &Self) {
		debug_assert_eq!(self.green.len(), other.green.len());
		for (a, b) in self.green.iter_mut().zip(&other.green) { *a += b; }
		for (a, b) in self.red.iter_mut().zip(&other.red) { *a += b; }
		for (a, b) in self.blue.iter_mut().zip(&other.blue) { *a += b; }
		for (a, b) in self.alpha.iter_mut().zip(&other.alpha) { *a += b; }
		for (a, b) in self.distance.iter_mut().zip(&other.distance) { *a += b; }
	}

	#[must_use]
	/// # Merged.
	pub(crate) fn merged(&self, other: &Self) -> Self {
		let mut out = self.clone();
		out.merge(other);
		out
	}
}

impl Histogram {
	/// # Token Count.
	///
	/// Every token contributes exactly one green-alphabet symbol.
	pub(crate) fn tokens(&self) -> u64 {
		self.green.iter().copied().map(u64::from).sum()
	}

	/// # Is Empty?
	pub(crate) fn is_empty(&self) -> bool { self.green.iter().all(|&c| c == 0) }

	/// # Alphabets.
	///
	/// Return the frequency tables in stream order: green, red, blue, alpha,
	/// distance.
	pub(crate) fn alphabets(&self) -> [&[u32]; 5] {
		[
			self.green.as_slice(),
			self.red.as_slice(),
			self.blue.as_slice(),
			self.alpha.as_slice(),
			self.distance.as_slice(),
		]
	}

	/// # Estimated Cost (Bits).
	///
	/// Sum the population cost of each alphabet along with the raw extra
	/// bits the length and distance prefixes will need.
	pub(crate) fn cost(&self) -> f64 {
		let mut cost: f64 = self.alphabets().into_iter().map(population_cost).sum();

		for (code, &count) in (0_u8..).zip(&self.green[NUM_LITERAL_CODES..CACHE_OFFSET]) {
			cost += f64::from(count) * f64::from(PrefixCode::extra_bits(code));
		}
		for (code, &count) in (0_u8..).zip(&self.distance) {
			cost += f64::from(count) * f64::from(PrefixCode::extra_bits(code));
		}

		cost
	}
}



#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
/// # Streaks.
///
/// Run statistics for a frequency table, scanned in symbol order. Index
/// zero of each pair refers to zero-frequency entries, index one to
/// non-zero entries.
pub(crate) struct Streaks {
	/// # Entries by Class.
	counts: [u32; 2],

	/// # Runs by Class: `[short (< 3), long (>= 3)]`.
	streaks: [[u32; 2]; 2],
}

impl Streaks {
	/// # New.
	pub(crate) fn new(freqs: &[u32]) -> Self {
		let mut out = Self::default();
		let mut iter = freqs.iter().map(|&f| usize::from(f != 0));
		let Some(mut class) = iter.next() else { return out; };
		let mut run = 1_u32;
		out.counts[class] += 1;

		for next in iter {
			out.counts[next] += 1;
			if next == class { run += 1; }
			else {
				out.close(class, run);
				class = next;
				run = 1;
			}
		}

		out.close(class, run);
		out
	}

	/// # Close Run.
	fn close(&mut self, class: usize, run: u32) {
		self.streaks[class][usize::from(3 <= run)] += 1;
	}

	/// # Final Huffman Cost.
	///
	/// An empirical estimate of what the code-length table for this
	/// alphabet will cost to store. The constants were tuned by hand long
	/// ago and are kept as-is.
	pub(crate) fn final_huffman_cost(&self) -> f64 {
		// The code-length code itself, less a small bias since it is rarely
		// stored in full.
		let mut cost = f64::from(CODE_LENGTH_CODES * 3) - 9.1;

		cost += f64::from(self.counts[0]).mul_add(1.5625, 0.234_375 * f64::from(self.streaks[0][1]));
		cost += f64::from(self.counts[1]).mul_add(2.578_125, 0.703_125 * f64::from(self.streaks[1][1]));
		cost += 1.796_875 * f64::from(self.streaks[0][0]);
		cost += 3.281_25 * f64::from(self.streaks[1][0]);

		cost
	}
}



#[derive(Debug, Clone, Copy, Default)]
/// # Bit Entropy.
struct BitEntropy {
	/// # Shannon Entropy (Total Bits).
	entropy: f64,

	/// # Sum of Frequencies.
	sum: f64,

	/// # Non-Zero Entries.
	nonzeros: u32,

	/// # Largest Frequency.
	max: f64,
}

impl BitEntropy {
	/// # New.
	fn new(freqs: &[u32]) -> Self {
		let mut out = Self::default();
		for &f in freqs {
			if f != 0 {
				let f = f64::from(f);
				out.sum += f;
				out.nonzeros += 1;
				out.entropy -= xlog2(f);
				if out.max < f { out.max = f; }
			}
		}
		out.entropy += xlog2(out.sum);
		out
	}

	/// # Refine.
	///
	/// Shannon entropy is a lower bound Huffman coding can't always reach,
	/// particularly for tiny alphabets, so this mixes in the best a prefix
	/// code could actually manage.
	fn refine(&self) -> f64 {
		let mix: f64 = match self.nonzeros {
			0 | 1 => return 0.0,
			2 => return 0.99_f64.mul_add(self.sum, 0.01 * self.entropy),
			3 => 0.95,
			4 => 0.7,
			_ => 0.627,
		};

		let min_limit = 2.0_f64.mul_add(self.sum, -self.max);
		let min_limit = mix.mul_add(min_limit, (1.0 - mix) * self.entropy);
		if self.entropy < min_limit { min_limit }
		else { self.entropy }
	}
}

#[inline]
/// # `v * log2(v)`.
fn xlog2(v: f64) -> f64 {
	if v == 0.0 { 0.0 }
	else { v * v.log2() }
}

/// # Population Cost.
///
/// The estimated cost of an alphabet: its (refined) entropy plus an
/// approximation of its code-length table.
pub(crate) fn population_cost(freqs: &[u32]) -> f64 {
	BitEntropy::new(freqs).refine() + Streaks::new(freqs).final_huffman_cost()
}

/// # Shannon Bits.
///
/// The raw entropy of a frequency table, in total bits.
pub(crate) fn shannon_bits(freqs: &[u32]) -> f64 { BitEntropy::new(freqs).entropy }



#[derive(Debug, Clone)]
/// # Cost Model.
///
/// Per-symbol bit estimates derived from a histogram, used by the matcher
/// to weigh references against literals.
pub(crate) struct CostModel {
	/// # Green, Length Prefixes, Cache Slots.
	green: Vec<f64>,

	/// # Red.
	red: Vec<f64>,

	/// # Blue.
	blue: Vec<f64>,

	/// # Alpha.
	alpha: Vec<f64>,

	/// # Distance Prefixes.
	distance: Vec<f64>,
}

impl CostModel {
	/// # New.
	pub(crate) fn new(histogram: &Histogram) -> Self {
		let [green, red, blue, alpha, distance] = histogram.alphabets().map(bit_estimates);
		Self { green, red, blue, alpha, distance }
	}

	#[inline]
	/// # Literal Cost.
	pub(crate) fn literal(&self, argb: u32) -> f64 {
		self.alpha[(argb >> 24) as usize] +
		self.red[((argb >> 16) & 0xff) as usize] +
		self.green[((argb >> 8) & 0xff) as usize] +
		self.blue[(argb & 0xff) as usize]
	}

	#[inline]
	/// # Cache Index Cost.
	pub(crate) fn cache(&self, slot: u16) -> f64 {
		self.green.get(CACHE_OFFSET + usize::from(slot)).copied().unwrap_or(f64::MAX)
	}

	#[allow(clippy::cast_possible_truncation, reason = "Lengths are at most 4096.")]
	#[inline]
	/// # Backward Reference Cost.
	pub(crate) fn reference(&self, length: usize, plane_code: u32) -> f64 {
		let l = PrefixCode::encode(length as u32);
		let d = PrefixCode::encode(plane_code);
		self.green[NUM_LITERAL_CODES + usize::from(l.code)] +
		f64::from(l.extra_bits) +
		self.distance[usize::from(d.code)] +
		f64::from(d.extra_bits)
	}
}

#[allow(clippy::cast_precision_loss, reason = "Close enough.")]
/// # Bit Estimates.
///
/// Turn frequencies into `log2(sum) - log2(count)` bit costs. Unused symbols
/// are priced like a symbol seen once.
fn bit_estimates(freqs: &[u32]) -> Vec<f64> {
	let sum: u64 = freqs.iter().copied().map(u64::from).sum();
	let nonzeros = freqs.iter().filter(|&&f| f != 0).count();
	if nonzeros <= 1 { return vec![0.0; freqs.len()]; }

	let log2sum = (sum as f64).log2();
	freqs.iter()
		.map(|&f|
			if f == 0 { log2sum }
			else { log2sum - f64::from(f).log2() }
		)
		.collect()
}
