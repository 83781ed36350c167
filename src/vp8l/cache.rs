/*!
# Wepfli: Color Cache.
*/

use super::MAX_CACHE_BITS;



/// # Hash Multiplier.
const HASH_MUL: u32 = 0x1e35_a7bd;



#[derive(Debug, Clone)]
/// # Color Cache.
///
/// A small direct-mapped table of recent colors. Collisions simply overwrite
/// whatever was there; all that matters is that the decoder can rebuild the
/// exact same table from the token stream, which it does by inserting every
/// pixel in order.
pub(crate) struct ColorCache {
	/// # Slots.
	colors: Vec<u32>,

	/// # Hash Shift (`32 - bits`).
	shift: u32,
}

impl ColorCache {
	/// # New.
	///
	/// Returns `None` if `bits` is zero or too big.
	pub(crate) fn new(bits: u8) -> Option<Self> {
		if bits == 0 || MAX_CACHE_BITS < bits { None }
		else {
			Some(Self {
				colors: vec![0; 1 << bits],
				shift: 32 - u32::from(bits),
			})
		}
	}

	#[inline]
	/// # Slot for Color.
	pub(crate) const fn key(&self, argb: u32) -> usize {
		(argb.wrapping_mul(HASH_MUL) >> self.shift) as usize
	}

	#[inline]
	/// # Insert.
	///
	/// Store the color in its slot and return the slot.
	pub(crate) fn insert(&mut self, argb: u32) -> usize {
		let key = self.key(argb);
		self.colors[key] = argb;
		key
	}

	#[allow(clippy::cast_possible_truncation, reason = "Slots fit in 11 bits.")]
	#[inline]
	/// # Lookup.
	///
	/// Return the slot holding this color, if any.
	pub(crate) fn lookup(&self, argb: u32) -> Option<u16> {
		let key = self.key(argb);
		if self.colors[key] == argb { Some(key as u16) }
		else { None }
	}

	#[inline]
	/// # Get Slot.
	pub(crate) fn get(&self, key: usize) -> Option<u32> { self.colors.get(key).copied() }
}



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_bounds() {
		assert!(ColorCache::new(0).is_none());
		assert!(ColorCache::new(12).is_none());
		for bits in 1..=11 {
			let cache = ColorCache::new(bits).expect("Cache failed.");
			assert_eq!(cache.colors.len(), 1 << bits);
			assert!(cache.key(u32::MAX) < 1 << bits);
		}
	}

	#[test]
	fn t_insert_lookup() {
		let mut cache = ColorCache::new(4).expect("Cache failed.");
		let red = 0xff_ff_00_00;
		assert_eq!(cache.lookup(red), None);

		let slot = cache.insert(red);
		assert_eq!(cache.lookup(red), Some(slot as u16));
		assert_eq!(cache.get(slot), Some(red));

		// Find something that collides and make sure it evicts.
		let other = (0..u32::MAX)
			.map(|n| n | 0xff_00_00_00)
			.find(|&c| c != red && cache.key(c) == slot)
			.expect("No collision.");
		cache.insert(other);
		assert_eq!(cache.lookup(red), None);
		assert_eq!(cache.lookup(other), Some(slot as u16));
	}
}
