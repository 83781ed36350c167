/*!
# Wepfli: Katajainen and Prefix-Code Business.

This module contains the Katajainen boundary package-merge logic used to
build minimum-redundancy length-limited codes, along with the canonical
code assignment and the VP8L code-length (meta-Huffman) serialization.
*/

use std::num::NonZeroU32;
use super::{
	BitWriter,
	wepfli_bug,
	WepfliError,
};



/// # Maximum Code Length.
pub(crate) const MAX_CODE_LENGTH: u8 = 15;

/// # Maximum Code-Length Code Length.
const MAX_CL_CODE_LENGTH: u8 = 7;

/// # Number of Code-Length Codes.
pub(crate) const NUM_CL_CODES: usize = 19;

/// # Code-Length Code Order.
///
/// The code-length code lengths are stored in this jumbled order so the
/// usually-empty ones can be trimmed from the end.
pub(crate) const CL_CODE_ORDER: [usize; NUM_CL_CODES] = [
	17, 18, 0, 1, 2, 3, 4, 5, 16, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// # Repeat Previous (Non-Zero) Length.
const CL_REPEAT: u8 = 16;

/// # Short Zero Run.
const CL_ZEROS: u8 = 17;

/// # Long Zero Run.
const CL_ZEROS_LONG: u8 = 18;



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Prefix Code.
///
/// Canonical code lengths and their (bit-reversed) codes for one alphabet.
pub(crate) struct HuffmanCode {
	/// # Lengths.
	lengths: Vec<u8>,

	/// # Codes (Reversed).
	codes: Vec<u16>,

	/// # Used Symbols.
	used: usize,
}

impl HuffmanCode {
	/// # New.
	///
	/// Build a length-limited canonical code for the frequencies.
	///
	/// ## Errors
	///
	/// Returns an invariant violation if the lengths come out wrong, which
	/// shouldn't happen.
	pub(crate) fn new(freqs: &[u32], max_bits: u8) -> Result<Self, WepfliError> {
		let lengths = length_limited_code_lengths(freqs, max_bits)?;
		Self::from_lengths(lengths)
	}

	/// # From Lengths.
	///
	/// Assign canonical codes: shorter codes first, then by symbol.
	///
	/// ## Errors
	///
	/// Returns an invariant violation if the lengths don't form a complete
	/// prefix code (single-symbol codes excepted).
	pub(crate) fn from_lengths(lengths: Vec<u8>) -> Result<Self, WepfliError> {
		let mut counts = [0_u32; MAX_CODE_LENGTH as usize + 1];
		for &l in &lengths {
			if MAX_CODE_LENGTH < l { return Err(wepfli_bug!()); }
			counts[usize::from(l)] += 1;
		}
		counts[0] = 0;

		let used = counts.iter().sum::<u32>() as usize;
		if 1 < used && ! is_complete(&counts) { return Err(wepfli_bug!()); }

		// The first code of each length.
		let mut next = [0_u32; MAX_CODE_LENGTH as usize + 1];
		let mut code = 0;
		for bits in 1..next.len() {
			code = (code + counts[bits - 1]) << 1;
			next[bits] = code;
		}

		let codes = lengths.iter()
			.map(|&l|
				if l == 0 { 0 }
				else {
					let c = next[usize::from(l)];
					next[usize::from(l)] += 1;
					reverse_bits(c, l)
				}
			)
			.collect();

		Ok(Self { lengths, codes, used })
	}

	#[cfg(test)]
	/// # Lengths.
	pub(crate) fn lengths(&self) -> &[u8] { &self.lengths }

	#[cfg(test)]
	/// # Used Symbols.
	pub(crate) const fn used(&self) -> usize { self.used }

	#[cfg(test)]
	/// # Valid?
	///
	/// The code must be complete (unless it has a single symbol) and
	/// canonical: ordered by length then symbol, each code follows directly
	/// from the one before.
	pub(crate) fn is_valid(&self) -> bool {
		let used: Vec<usize> = (0..self.lengths.len()).filter(|&i| self.lengths[i] != 0).collect();
		if used.len() != self.used { return false; }
		if self.used <= 1 {
			return used.iter().all(|&i| self.lengths[i] == 1);
		}

		let kraft: u32 = used.iter()
			.map(|&i| 1_u32 << (MAX_CODE_LENGTH - self.lengths[i]))
			.sum();
		if kraft != 1 << MAX_CODE_LENGTH { return false; }

		let mut order = used;
		order.sort_by_key(|&i| (self.lengths[i], i));
		let mut prev: Option<(u32, u8)> = None;
		for i in order {
			let len = self.lengths[i];
			let code = u32::from(self.codes[i].reverse_bits() >> (16 - len));
			let expected = prev.map_or(0, |(c, l)| (c + 1) << (len - l));
			if code != expected { return false; }
			prev = Some((code, len));
		}
		true
	}

	#[inline]
	/// # Write Symbol.
	pub(crate) fn write_symbol(&self, out: &mut BitWriter, symbol: usize) {
		if 1 < self.used {
			debug_assert!(self.lengths[symbol] != 0, "Unused symbol written.");
			out.put_code(self.codes[symbol], self.lengths[symbol]);
		}
	}
}

impl HuffmanCode {
	#[allow(clippy::cast_possible_truncation, reason = "Symbols are checked.")]
	/// # Store.
	///
	/// Write the code to the output so a decoder can rebuild it. Codes with
	/// at most two symbols, both below 256, use the compact "simple" form;
	/// everything else is written as run-length tokens, themselves prefix
	/// coded.
	///
	/// ## Errors
	///
	/// Returns an invariant violation if the code-length code can't be
	/// built.
	pub(crate) fn store(&self, out: &mut BitWriter) -> Result<(), WepfliError> {
		let mut symbols = [0_usize; 2];
		let mut count = 0;
		for (idx, _) in self.lengths.iter().enumerate().filter(|(_, &l)| l != 0) {
			if count < 2 { symbols[count] = idx; }
			count += 1;
			if 2 < count { break; }
		}

		// Nothing at all. This is written as a single zero symbol.
		if count == 0 {
			out.put_bits(0b0001, 4);
			Ok(())
		}
		else if count <= 2 && symbols[0] < 256 && symbols[1] < 256 {
			out.put_bit(true);
			out.put_bits(count as u32 - 1, 1);
			if symbols[0] <= 1 {
				out.put_bit(false);
				out.put_bits(symbols[0] as u32, 1);
			}
			else {
				out.put_bit(true);
				out.put_bits(symbols[0] as u32, 8);
			}
			if count == 2 { out.put_bits(symbols[1] as u32, 8); }
			Ok(())
		}
		else {
			out.put_bit(false);
			self.store_full(out)
		}
	}

	#[allow(clippy::cast_possible_truncation, reason = "Values are small.")]
	/// # Store Full Code.
	fn store_full(&self, out: &mut BitWriter) -> Result<(), WepfliError> {
		let tokens = length_tokens(&self.lengths);

		// Build the code-length code.
		let mut cl_counts = [0_u32; NUM_CL_CODES];
		for t in &tokens { cl_counts[usize::from(t.code)] += 1; }
		let cl_code = Self::new(&cl_counts, MAX_CL_CODE_LENGTH)?;

		// Trim trailing zeros from the storage order, but keep at least four.
		let mut codes_to_store = NUM_CL_CODES;
		while 4 < codes_to_store && cl_code.lengths[CL_CODE_ORDER[codes_to_store - 1]] == 0 {
			codes_to_store -= 1;
		}
		out.put_bits(codes_to_store as u32 - 4, 4);
		for &idx in &CL_CODE_ORDER[..codes_to_store] {
			out.put_bits(u32::from(cl_code.lengths[idx]), 3);
		}

		// Trailing zero tokens can be dropped if it saves enough to pay for
		// writing the length.
		let mut trimmed = tokens.len();
		let mut trailing_bits = 0_u32;
		for t in tokens.iter().rev() {
			match t.code {
				0 => { trailing_bits += u32::from(cl_code.lengths[0]); },
				CL_ZEROS => { trailing_bits += u32::from(cl_code.lengths[17]) + 3; },
				CL_ZEROS_LONG => { trailing_bits += u32::from(cl_code.lengths[18]) + 7; },
				_ => break,
			}
			trimmed -= 1;
		}

		let write_trimmed = 1 < trimmed && 12 < trailing_bits;
		out.put_bit(write_trimmed);
		let length =
			if write_trimmed {
				if trimmed == 2 { out.put_bits(0, 3 + 2); }
				else {
					let nbits = 31 - (trimmed as u32 - 2).leading_zeros();
					let nbitpairs = nbits / 2 + 1;
					out.put_bits(nbitpairs - 1, 3);
					out.put_bits(trimmed as u32 - 2, (nbitpairs * 2) as u8);
				}
				trimmed
			}
			else { tokens.len() };

		for t in &tokens[..length] {
			cl_code.write_symbol(out, usize::from(t.code));
			match t.code {
				CL_REPEAT => { out.put_bits(u32::from(t.extra), 2); },
				CL_ZEROS => { out.put_bits(u32::from(t.extra), 3); },
				CL_ZEROS_LONG => { out.put_bits(u32::from(t.extra), 7); },
				_ => {},
			}
		}

		Ok(())
	}
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Code-Length Token.
pub(crate) struct LengthToken {
	/// # Symbol (0..=18).
	pub(crate) code: u8,

	/// # Extra Bits Value.
	pub(crate) extra: u8,
}

impl LengthToken {
	/// # New.
	const fn new(code: u8, extra: u8) -> Self { Self { code, extra } }
}

/// # Code-Length Tokens.
///
/// Run-length encode a list of code lengths using the repeat and zero-run
/// codes.
pub(crate) fn length_tokens(lengths: &[u8]) -> Vec<LengthToken> {
	let mut out = Vec::with_capacity(lengths.len());
	let mut prev = 8;
	let mut i = 0;
	while i < lengths.len() {
		let value = lengths[i];
		let runs = lengths[i..].iter().take_while(|&&l| l == value).count();
		if value == 0 { repeated_zeros(runs, &mut out); }
		else {
			repeated_values(runs, value, prev, &mut out);
			prev = value;
		}
		i += runs;
	}
	out
}

#[allow(clippy::cast_possible_truncation, reason = "Runs are bounded.")]
/// # Repeated Zeros.
fn repeated_zeros(mut reps: usize, out: &mut Vec<LengthToken>) {
	while 0 < reps {
		if reps < 3 {
			for _ in 0..reps { out.push(LengthToken::new(0, 0)); }
			break;
		}
		else if reps < 11 {
			out.push(LengthToken::new(CL_ZEROS, (reps - 3) as u8));
			break;
		}
		else if reps < 139 {
			out.push(LengthToken::new(CL_ZEROS_LONG, (reps - 11) as u8));
			break;
		}
		out.push(LengthToken::new(CL_ZEROS_LONG, 0x7f));
		reps -= 138;
	}
}

#[allow(clippy::cast_possible_truncation, reason = "Runs are bounded.")]
/// # Repeated Values.
fn repeated_values(mut reps: usize, value: u8, prev: u8, out: &mut Vec<LengthToken>) {
	// A change of value must be spelled out first.
	if value != prev {
		out.push(LengthToken::new(value, 0));
		reps -= 1;
	}

	while 0 < reps {
		if reps < 3 {
			for _ in 0..reps { out.push(LengthToken::new(value, 0)); }
			break;
		}
		else if reps < 7 {
			out.push(LengthToken::new(CL_REPEAT, (reps - 3) as u8));
			break;
		}
		out.push(LengthToken::new(CL_REPEAT, 3));
		reps -= 6;
	}
}



#[derive(Debug, Clone, Copy)]
/// # Leaf.
///
/// A non-zero frequency and the symbol it belongs to.
struct Leaf {
	frequency: NonZeroU32,
	symbol: usize,
}

#[derive(Debug, Clone, Copy)]
/// # Node.
///
/// Nodes live in a flat arena; `tail` indexes into it.
struct Node {
	weight: u64,
	count: usize,
	tail: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
/// # List.
///
/// This struct holds a pair of lookahead chains (arena indices).
struct List {
	lookahead0: usize,
	lookahead1: usize,
}

/// # Node Arena.
struct Arena(Vec<Node>);

impl Arena {
	/// # Push.
	fn push(&mut self, node: Node) -> usize {
		self.0.push(node);
		self.0.len() - 1
	}

	#[inline]
	/// # Get.
	fn get(&self, idx: usize) -> Node { self.0[idx] }

	/// # Weight Sum.
	fn weight_sum(&self, list: List) -> u64 {
		self.0[list.lookahead0].weight + self.0[list.lookahead1].weight
	}
}

/// # Length Limited Code Lengths.
///
/// Compute minimum-redundancy code lengths no longer than `max_bits` for the
/// given frequencies. Zero frequencies get zero lengths; a lone symbol gets
/// length one.
///
/// ## Errors
///
/// Returns an invariant violation if there are more symbols than the limit
/// can accommodate.
pub(crate) fn length_limited_code_lengths(freqs: &[u32], max_bits: u8)
-> Result<Vec<u8>, WepfliError> {
	let mut lengths = vec![0_u8; freqs.len()];

	let mut leaves: Vec<Leaf> = freqs.iter()
		.enumerate()
		.filter_map(|(symbol, &f)|
			NonZeroU32::new(f).map(|frequency| Leaf { frequency, symbol })
		)
		.collect();

	// Shortcut: weighting only applies when there are more than two leaves.
	if leaves.len() <= 2 {
		for leaf in leaves { lengths[leaf.symbol] = 1; }
		return Ok(lengths);
	}

	if (1_usize << max_bits) < leaves.len() { return Err(wepfli_bug!()); }

	// Stable, so equal frequencies stay in symbol order.
	leaves.sort_by_key(|l| l.frequency);
	llcl(&leaves, usize::from(max_bits), &mut lengths)?;
	Ok(lengths)
}

/// # Crunch the Code Lengths.
fn llcl(leaves: &[Leaf], max_bits: usize, lengths: &mut [u8])
-> Result<(), WepfliError> {
	let mut arena = Arena(Vec::with_capacity(leaves.len() * max_bits * 2));

	// Two starting nodes.
	let lookahead0 = arena.push(Node {
		weight: u64::from(leaves[0].frequency.get()),
		count: 1,
		tail: None,
	});
	let lookahead1 = arena.push(Node {
		weight: u64::from(leaves[1].frequency.get()),
		count: 2,
		tail: None,
	});

	let mut lists = vec![List { lookahead0, lookahead1 }; max_bits.min(leaves.len() - 1)];

	// In the last list, (2 * len_leaves - 2) active chains need to be
	// created. We have two already from initialization; each boundary_pm run
	// will give us another.
	for _ in 0..2 * leaves.len() - 5 {
		boundary_pm(leaves, &mut lists, &mut arena)?;
	}

	// Add the last chain and write the results!
	let [.., list_y, list_z] = lists.as_slice() else { return Err(wepfli_bug!()); };
	let node = finish(*list_y, *list_z, leaves, &arena);
	write_lengths(node, leaves, &arena, max_bits, lengths)
}

/// # Boundary Package-Merge Step.
///
/// Add a new chain to the list, using either a leaf or combination of two
/// chains from the previous list.
fn boundary_pm(leaves: &[Leaf], lists: &mut [List], arena: &mut Arena)
-> Result<(), WepfliError> {
	let Some((current, rest)) = lists.split_last_mut() else { return Err(wepfli_bug!()); };
	let last_count = arena.get(current.lookahead1).count;

	// We're at the beginning, which is the end since we're iterating in
	// reverse.
	if rest.is_empty() {
		if let Some(leaf) = leaves.get(last_count) {
			current.lookahead0 = current.lookahead1;
			current.lookahead1 = arena.push(Node {
				weight: u64::from(leaf.frequency.get()),
				count: last_count + 1,
				tail: arena.get(current.lookahead0).tail,
			});
		}
		return Ok(());
	}

	// Shift the lookahead.
	current.lookahead0 = current.lookahead1;

	let previous = rest[rest.len() - 1];
	let weight_sum = arena.weight_sum(previous);

	// Add a leaf and increment the count.
	if let Some(leaf) = leaves.get(last_count) {
		let weight = u64::from(leaf.frequency.get());
		if weight < weight_sum {
			current.lookahead1 = arena.push(Node {
				weight,
				count: last_count + 1,
				tail: arena.get(current.lookahead0).tail,
			});
			return Ok(());
		}
	}

	// Update the tail.
	current.lookahead1 = arena.push(Node {
		weight: weight_sum,
		count: last_count,
		tail: Some(previous.lookahead1),
	});

	// Replace the used-up lookahead chains by recursing twice.
	boundary_pm(leaves, rest, arena)?;
	boundary_pm(leaves, rest, arena)
}

/// # Finish Last Node!
///
/// This establishes the final tail that the length writing starts from.
fn finish(list_y: List, list_z: List, leaves: &[Leaf], arena: &Arena) -> Node {
	let z = arena.get(list_z.lookahead1);
	let weight_sum = arena.weight_sum(list_y);
	if z.count < leaves.len() && u64::from(leaves[z.count].frequency.get()) < weight_sum {
		Node { weight: 0, count: z.count + 1, tail: z.tail }
	}
	else {
		Node { weight: 0, count: z.count, tail: Some(list_y.lookahead1) }
	}
}

#[allow(clippy::cast_possible_truncation, reason = "Lengths are at most 15.")]
/// # Write Code Lengths!
fn write_lengths(
	mut node: Node,
	leaves: &[Leaf],
	arena: &Arena,
	max_bits: usize,
	lengths: &mut [u8],
) -> Result<(), WepfliError> {
	let mut last_count = node.count;
	if leaves.len() < last_count { return Err(wepfli_bug!()); }

	// The most frequent leaves get the shortest lengths.
	let mut writer = leaves[..last_count].iter().rev();
	for value in 1..=max_bits {
		if let Some(tail) = node.tail.map(|t| arena.get(t)) {
			// Wait for a change in counts to write the values.
			if tail.count < last_count {
				for leaf in writer.by_ref().take(last_count - tail.count) {
					lengths[leaf.symbol] = value as u8;
				}
				last_count = tail.count;
			}
			node = tail;
		}
		// Write the remaining entries and quit!
		else {
			for leaf in writer { lengths[leaf.symbol] = value as u8; }
			return Ok(());
		}
	}

	// This shouldn't be reachable.
	Err(wepfli_bug!())
}

/// # Kraft Complete?
///
/// True if the length counts sum to exactly one in the Kraft sense.
pub(crate) fn is_complete(counts: &[u32]) -> bool {
	let mut left = 1_i64;
	for &c in counts.iter().skip(1) {
		left <<= 1;
		left -= i64::from(c);
		if left < 0 { return false; }
	}
	left == 0
}

/// # Reverse Bits.
const fn reverse_bits(code: u32, len: u8) -> u16 {
	((code as u16).reverse_bits()) >> (16 - len)
}
