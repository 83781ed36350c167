/*!
# Wepfli: Bit I/O.

VP8L packs everything least-significant-bit first. Prefix codes are the
one exception: their bits are stored most-significant first, so the codes
handed to `BitWriter::put_code` are expected to have been reversed ahead
of time.
*/

use crate::WepfliError;



#[derive(Debug, Default)]
/// # Bit Writer.
///
/// This accumulates bits into a 64-bit scratch and flushes whole bytes to
/// the output buffer as they fill up.
pub(crate) struct BitWriter {
	/// # Output.
	buf: Vec<u8>,

	/// # Pending Bits.
	acc: u64,

	/// # Number of Pending Bits.
	used: u8,
}

impl BitWriter {
	/// # New.
	pub(crate) const fn new() -> Self {
		Self {
			buf: Vec::new(),
			acc: 0,
			used: 0,
		}
	}

	#[cfg(test)]
	/// # Bits Written.
	pub(crate) const fn bit_len(&self) -> usize {
		self.buf.len() * 8 + self.used as usize
	}

	#[inline]
	/// # Add Bit.
	pub(crate) fn put_bit(&mut self, bit: bool) { self.put_bits(u32::from(bit), 1); }

	#[allow(clippy::cast_possible_truncation, reason = "Deliberate.")]
	#[inline]
	/// # Add Bits.
	///
	/// Append the lowest `n` bits of `value`, `n <= 32`.
	pub(crate) fn put_bits(&mut self, value: u32, n: u8) {
		debug_assert!(n <= 32, "Too many bits.");
		if n == 0 { return; }

		let mask = (1_u64 << n) - 1;
		self.acc |= (u64::from(value) & mask) << self.used;
		self.used += n;
		while 8 <= self.used {
			self.buf.push(self.acc as u8);
			self.acc >>= 8;
			self.used -= 8;
		}
	}

	#[inline]
	/// # Add Prefix Code.
	///
	/// The code should already be bit-reversed. Zero-length codes write
	/// nothing.
	pub(crate) fn put_code(&mut self, code: u16, len: u8) {
		self.put_bits(u32::from(code), len);
	}

	#[allow(clippy::cast_possible_truncation, reason = "Deliberate.")]
	/// # Finish.
	///
	/// Flush any partial byte (zero-padded) and return the buffer.
	pub(crate) fn finish(mut self) -> Vec<u8> {
		if self.used != 0 { self.buf.push(self.acc as u8); }
		self.buf
	}
}



#[derive(Debug, Clone, Copy)]
/// # Bit Reader.
pub(crate) struct BitReader<'a> {
	/// # Data.
	data: &'a [u8],

	/// # Bit Position.
	pos: usize,
}

impl<'a> BitReader<'a> {
	/// # New.
	pub(crate) const fn new(data: &'a [u8]) -> Self {
		Self { data, pos: 0 }
	}

	/// # Read Bit.
	///
	/// ## Errors
	///
	/// Returns `Malformed` if the data runs out.
	pub(crate) fn read_bit(&mut self) -> Result<bool, WepfliError> {
		let byte = self.data.get(self.pos >> 3)
			.ok_or(WepfliError::Malformed("unexpected end of data"))?;
		let bit = (byte >> (self.pos & 7)) & 1;
		self.pos += 1;
		Ok(bit == 1)
	}

	/// # Read Bits.
	///
	/// Read an `n`-bit little-endian value, `n <= 32`.
	///
	/// ## Errors
	///
	/// Returns `Malformed` if the data runs out.
	pub(crate) fn read_bits(&mut self, n: u8) -> Result<u32, WepfliError> {
		debug_assert!(n <= 32, "Too many bits.");
		let mut out = 0_u32;
		for i in 0..n {
			if self.read_bit()? { out |= 1 << i; }
		}
		Ok(out)
	}
}
