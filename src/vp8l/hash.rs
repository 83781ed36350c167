/*!
# Wepfli: Matches and Hashes.

This module contains the backward-reference matcher: a hash chain over
pixel pairs, a greedy (lazy) pass, a cost-driven second pass, and the
color-cache replay used to pick the cache size.
*/

use rayon::prelude::*;
use super::{
	ColorCache,
	CostModel,
	Effort,
	Histogram,
	MAX_LENGTH,
	PlaneCodes,
	Symbol,
	TokenStream,
	WepfliError,
};



/// # Hash Bits.
const HASH_BITS: u32 = 18;

/// # Hash Table Size.
const HASH_SIZE: usize = 1 << HASH_BITS;

/// # Minimum Match Length.
const MIN_MATCH: usize = 2;

/// # Lazy Matching Limit.
///
/// Matches at least this long are taken without peeking ahead.
const LAZY_LIMIT: usize = 64;

/// # Sub-Image Chain Depth.
const PLAIN_DEPTH: usize = 16;

/// # No Previous Position.
const NONE: u32 = u32::MAX;



/// # Hash Chain.
///
/// For each position, the previous position whose two-pixel window hashed
/// the same.
pub(crate) struct HashChain {
	prev: Vec<u32>,
}

impl HashChain {
	#[allow(clippy::cast_possible_truncation, reason = "Images have fewer than 2^28 pixels.")]
	/// # New.
	pub(crate) fn new(argb: &[u32]) -> Self {
		let mut head = vec![NONE; HASH_SIZE];
		let mut prev = vec![NONE; argb.len()];
		for (i, pair) in argb.windows(2).enumerate() {
			let h = pair_hash(pair[0], pair[1]);
			prev[i] = head[h];
			head[h] = i as u32;
		}
		Self { prev }
	}

	#[inline]
	/// # Previous Position.
	fn prev(&self, pos: usize) -> Option<usize> {
		match self.prev.get(pos) {
			Some(&p) if p != NONE => Some(p as usize),
			_ => None,
		}
	}
}

#[inline]
/// # Pair Hash.
const fn pair_hash(a: u32, b: u32) -> usize {
	let key = b.wrapping_mul(0xc6a4_a793).wrapping_add(a.wrapping_mul(0x5bd1_e996));
	(key >> (32 - HASH_BITS)) as usize
}



/// # Matcher.
///
/// The per-pass matching context. It borrows the pixels and owns its hash
/// chain; nothing here is shared between passes or threads.
pub(crate) struct Matcher<'a> {
	/// # Pixels.
	argb: &'a [u32],

	/// # Image Width.
	width: usize,

	/// # Hash Chain.
	chain: HashChain,

	/// # Chain Depth.
	depth: usize,

	/// # Window.
	window: usize,

	/// # Plane Codes.
	planes: &'a PlaneCodes,
}

impl<'a> Matcher<'a> {
	/// # New.
	pub(crate) fn new(argb: &'a [u32], depth: usize, window: usize, planes: &'a PlaneCodes) -> Self {
		Self {
			argb,
			width: planes.width(),
			chain: HashChain::new(argb),
			depth: depth.max(1),
			window: window.clamp(1, super::WINDOW_SIZE),
			planes,
		}
	}

	/// # Longest Match.
	///
	/// Return the length and distance of the longest match for the pixels
	/// starting at `pos`, or zeroes if there's nothing worth having. Ties go
	/// to the nearest candidate.
	fn longest(&self, pos: usize) -> (usize, usize) {
		let max_len = (self.argb.len() - pos).min(MAX_LENGTH);
		if max_len < MIN_MATCH || pos == 0 { return (0, 0); }

		let window = self.window.min(pos);
		let mut best = (0, 0);

		// The immediate neighbours are by far the most common.
		for dist in [1, self.width] {
			if dist <= window { self.try_candidate(pos, pos - dist, max_len, &mut best); }
		}

		let mut left = self.depth;
		let mut cand = self.chain.prev(pos);
		while let Some(c) = cand {
			if best.0 == max_len || left == 0 || window < pos - c { break; }
			left -= 1;
			self.try_candidate(pos, c, max_len, &mut best);
			cand = self.chain.prev(c);
		}

		if best.0 < MIN_MATCH { (0, 0) }
		else { best }
	}

	#[inline]
	/// # Try Candidate.
	fn try_candidate(&self, pos: usize, cand: usize, max_len: usize, best: &mut (usize, usize)) {
		// Can't beat it, or can't beat it here.
		if max_len <= best.0 { return; }
		if best.0 != 0 && self.argb[cand + best.0] != self.argb[pos + best.0] { return; }

		let len = self.argb[cand..cand + max_len].iter()
			.zip(&self.argb[pos..pos + max_len])
			.take_while(|(a, b)| a == b)
			.count();
		if best.0 < len { *best = (len, pos - cand); }
	}

	/// # Greedy Pass.
	///
	/// Take the longest match at each position, unless the next position
	/// has a notably longer one. No color cache is used.
	pub(crate) fn greedy(&self) -> TokenStream {
		let n = self.argb.len();
		let mut out = TokenStream::with_capacity(n / 4 + 1);
		let mut ahead: Option<(usize, usize)> = None;
		let mut i = 0;
		while i < n {
			let (len, dist) = ahead.take().unwrap_or_else(|| self.longest(i));
			if len < MIN_MATCH {
				out.push(Symbol::Literal(self.argb[i]));
				i += 1;
				continue;
			}

			// Peek.
			if len < LAZY_LIMIT && i + 1 < n {
				let next = self.longest(i + 1);
				if len + 1 < next.0 {
					out.push(Symbol::Literal(self.argb[i]));
					ahead.replace(next);
					i += 1;
					continue;
				}
			}

			out.push(Symbol::reference(len, dist));
			i += len;
		}
		out
	}

	/// # Cost-Driven Pass.
	///
	/// Like `Matcher::greedy`, but a reference is only taken when the model
	/// says it is cheaper than spelling the same pixels out. The color cache
	/// is live, so literals already in it are emitted as cache indices when
	/// that's cheaper.
	pub(crate) fn costed(&self, model: &CostModel, cache_bits: u8) -> TokenStream {
		let n = self.argb.len();
		let mut cache = ColorCache::new(cache_bits);
		let mut out = TokenStream::with_capacity(n / 4 + 1);
		let mut i = 0;
		while i < n {
			let (len, dist) = self.longest(i);
			let step =
				if MIN_MATCH <= len && self.reference_pays(i, len, dist, model, cache.as_ref()) {
					out.push(Symbol::reference(len, dist));
					len
				}
				else {
					out.push(literal_or_cache(self.argb[i], model, cache.as_ref()));
					1
				};

			if let Some(c) = cache.as_mut() {
				for &px in &self.argb[i..i + step] { c.insert(px); }
			}
			i += step;
		}
		out
	}

	/// # Reference Pays?
	///
	/// Compare the reference against the literals it would replace, bailing
	/// as soon as the literals cost more.
	fn reference_pays(
		&self,
		pos: usize,
		len: usize,
		dist: usize,
		model: &CostModel,
		cache: Option<&ColorCache>,
	) -> bool {
		let budget = model.reference(len, self.planes.code(dist));
		let mut literals = 0.0;
		for &px in &self.argb[pos..pos + len] {
			literals += literal_cost(px, model, cache);
			if budget < literals { return true; }
		}
		false
	}
}

/// # Literal Cost.
fn literal_cost(px: u32, model: &CostModel, cache: Option<&ColorCache>) -> f64 {
	let lit = model.literal(px);
	match cache.and_then(|c| c.lookup(px)) {
		Some(slot) => lit.min(model.cache(slot)),
		None => lit,
	}
}

/// # Literal or Cache Index.
fn literal_or_cache(px: u32, model: &CostModel, cache: Option<&ColorCache>) -> Symbol {
	if let Some(slot) = cache.and_then(|c| c.lookup(px)) {
		if model.cache(slot) < model.literal(px) { return Symbol::CacheIndex(slot); }
	}
	Symbol::Literal(px)
}



#[derive(Debug, Clone)]
/// # Tokenized Image.
pub(crate) struct Tokenized {
	/// # Tokens.
	pub(crate) tokens: TokenStream,

	/// # Color Cache Bits.
	pub(crate) cache_bits: u8,

	/// # Estimated Cost.
	pub(crate) cost: f64,
}

/// # Tokenize.
///
/// Run the matcher over an image, choose the color cache size, and (when
/// effort allows) try a second, cost-driven pass, keeping whichever stream
/// is estimated to be smaller.
///
/// `quick` is used when merely scoring transform candidates: the chain
/// depth is reduced and the second pass skipped.
///
/// ## Errors
///
/// Returns an invariant violation if the token stream comes out wrong.
pub(crate) fn tokenize(
	argb: &[u32],
	planes: &PlaneCodes,
	effort: &Effort,
	max_cache_bits: u8,
	quick: bool,
) -> Result<Tokenized, WepfliError> {
	let matcher = Matcher::new(
		argb,
		effort.chain_depth(quick),
		effort.window(planes.width()),
		planes,
	);
	let greedy = matcher.greedy();
	let cache_bits = best_cache_bits(argb, &greedy, max_cache_bits, planes)?;
	let mut tokens = apply_cache(argb, &greedy, cache_bits);
	let histogram = Histogram::from_tokens(&tokens, cache_bits, planes)?;
	let mut cost = histogram.cost();

	if ! quick && effort.second_pass() {
		let model = CostModel::new(&histogram);
		let second = matcher.costed(&model, cache_bits);
		let cost2 = Histogram::from_tokens(&second, cache_bits, planes)?.cost();
		if cost2 < cost {
			tokens = second;
			cost = cost2;
		}
	}

	tokens.verify(argb.len())?;
	Ok(Tokenized { tokens, cache_bits, cost })
}

/// # Tokenize (Plain).
///
/// A cacheless greedy pass for the small sub-images (transform data,
/// palettes, entropy maps).
///
/// ## Errors
///
/// Returns an invariant violation if the token stream comes out wrong.
pub(crate) fn tokenize_plain(argb: &[u32], planes: &PlaneCodes)
-> Result<TokenStream, WepfliError> {
	let tokens = Matcher::new(argb, PLAIN_DEPTH, super::WINDOW_SIZE, planes).greedy();
	tokens.verify(argb.len())?;
	Ok(tokens)
}

/// # Best Cache Bits.
///
/// Replay a cacheless stream with each cache size and return the one with
/// the lowest estimated cost. Ties go to the smaller cache.
fn best_cache_bits(argb: &[u32], tokens: &TokenStream, max_bits: u8, planes: &PlaneCodes)
-> Result<u8, WepfliError> {
	let costs: Vec<Result<f64, WepfliError>> = (0..=max_bits).into_par_iter()
		.map(|bits| {
			let mut h = Histogram::new(bits);
			replay(argb, tokens, bits, |s| h.add(s, planes));
			if h.tokens() == tokens.len() as u64 { Ok(h.cost()) }
			else { Err(super::wepfli_bug!()) }
		})
		.collect();

	let mut best = (0, f64::MAX);
	for (bits, cost) in (0..=max_bits).zip(costs) {
		let cost = cost?;
		if cost < best.1 { best = (bits, cost); }
	}
	Ok(best.0)
}

/// # Apply Cache.
///
/// Rewrite a cacheless stream, turning literals that hit the cache into
/// cache indices.
pub(crate) fn apply_cache(argb: &[u32], tokens: &TokenStream, bits: u8) -> TokenStream {
	let mut out = TokenStream::with_capacity(tokens.len());
	replay(argb, tokens, bits, |s| out.push(s));
	out
}

/// # Replay.
///
/// Walk the tokens with a live cache, passing each (possibly rewritten)
/// symbol to the callback. Every covered pixel is inserted into the cache,
/// exactly as a decoder would.
fn replay<F: FnMut(Symbol)>(argb: &[u32], tokens: &TokenStream, bits: u8, mut cb: F) {
	let mut cache = ColorCache::new(bits);
	let mut pos = 0;
	for &s in tokens {
		let len = s.len();
		match (s, cache.as_mut()) {
			(Symbol::Literal(px), Some(c)) => cb(c.lookup(px).map_or(s, Symbol::CacheIndex)),
			_ => cb(s),
		}

		if let Some(c) = cache.as_mut() {
			for &px in argb.get(pos..pos + len).unwrap_or_default() { c.insert(px); }
		}
		pos += len;
	}
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::EncoderConfig;

	/// # Noisy Test Image.
	fn noisy(width: usize, height: usize) -> Vec<u32> {
		let mut state = 0x1234_5678_u32;
		(0..width * height)
			.map(|i| {
				state ^= state << 13;
				state ^= state >> 17;
				state ^= state << 5;
				// Mostly a few repeating colors, with some noise thrown in.
				if state % 5 == 0 { 0xff00_0000 | state >> 8 }
				else { 0xff00_0000 | ((i % 7) as u32 * 0x0011_2233) }
			})
			.collect()
	}

	#[test]
	fn t_all_black() {
		let argb = vec![0xff00_0000; 16];
		let planes = PlaneCodes::new(4);
		let effort = EncoderConfig::new().effort();
		let out = tokenize(&argb, &planes, &effort, 10, false).expect("Tokenize failed.");
		let tokens: Vec<Symbol> = out.tokens.iter().copied().collect();
		assert_eq!(tokens.len(), 2);
		assert!(matches!(tokens[0], Symbol::Literal(0xff00_0000) | Symbol::CacheIndex(_)));
		assert_eq!(tokens[1], Symbol::BackwardReference { length: 15, distance: 1 });
	}

	#[test]
	fn t_flat_is_linear() {
		// A big flat image should collapse into max-length references.
		let argb = vec![0xff12_3456; 512 * 512];
		let planes = PlaneCodes::new(512);
		let matcher = Matcher::new(&argb, 1000, super::super::WINDOW_SIZE, &planes);
		let tokens = matcher.greedy();
		assert!(tokens.verify(argb.len()).is_ok());
		assert_eq!(tokens.len(), 1 + (512_usize * 512 - 1).div_ceil(MAX_LENGTH));
	}

	#[test]
	fn t_coverage() {
		let argb = noisy(37, 23);
		let planes = PlaneCodes::new(37);
		for quality in [0, 50, 100] {
			let effort = EncoderConfig::new().with_quality(quality).effort();
			for max_bits in [0, 4, 11] {
				let out = tokenize(&argb, &planes, &effort, max_bits, false)
					.expect("Tokenize failed.");
				assert_eq!(out.tokens.covered(), argb.len());
				assert!(out.cache_bits <= max_bits);

				// References must copy identical pixels.
				let mut pos = 0;
				for s in &out.tokens {
					if let Symbol::BackwardReference { length, distance } = *s {
						let (l, d) = (usize::from(length), distance as usize);
						assert_eq!(argb[pos..pos + l], argb[pos - d..pos - d + l]);
					}
					pos += s.len();
				}
			}
		}
	}

	#[test]
	fn t_apply_cache() {
		// Two alternating colors: after the first appearance, each should
		// come straight out of the cache.
		let argb: Vec<u32> = (0..8).map(|i| if i % 3 == 0 { 0xff11_2233 } else { 0xff44_5566 }).collect();
		let tokens: TokenStream = argb.iter().copied().map(Symbol::Literal).collect();
		let cached = apply_cache(&argb, &tokens, 3);
		let hits = cached.iter().filter(|s| matches!(s, Symbol::CacheIndex(_))).count();
		assert_eq!(hits, 6);
		assert_eq!(apply_cache(&argb, &tokens, 0), tokens);
	}

	#[test]
	fn t_costed_valid() {
		let argb = noisy(64, 16);
		let planes = PlaneCodes::new(64);
		let matcher = Matcher::new(&argb, 50, 1 << 16, &planes);
		let greedy = matcher.greedy();
		let cached = apply_cache(&argb, &greedy, 6);
		let h = Histogram::from_tokens(&cached, 6, &planes).expect("Histogram failed.");
		let tokens = matcher.costed(&CostModel::new(&h), 6);
		assert!(tokens.verify(argb.len()).is_ok());
		assert!(Histogram::from_tokens(&tokens, 6, &planes).is_ok());
	}
}
