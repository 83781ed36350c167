/*!
# Wepfli: Histogram Clustering.

Each entropy tile starts with its own histogram; this module greedily
merges them into a smaller set of prefix code groups wherever doing so is
estimated to save space.
*/

use rayon::prelude::*;
use super::{
	Effort,
	Histogram,
	PlaneCodes,
	subsample,
	TokenStream,
	wepfli_bug,
	WepfliError,
};



/// # Cluster Overhead (Bits).
///
/// The estimated fixed cost of an additional prefix code group beyond its
/// code-length tables, which the histogram cost already covers.
pub(crate) const CLUSTER_OVERHEAD: f64 = 24.0;



#[derive(Debug, Clone)]
/// # Histogram Cluster.
pub(crate) struct HistogramCluster {
	/// # Combined Histogram.
	histogram: Histogram,

	/// # Member Tiles.
	members: Vec<usize>,

	/// # Cached Cost.
	cost: Option<f64>,
}

impl HistogramCluster {
	/// # New.
	fn new(tile: usize, histogram: Histogram) -> Self {
		Self { histogram, members: vec![tile], cost: None }
	}

	/// # Cost.
	fn cost(&mut self) -> f64 {
		*self.cost.get_or_insert_with(|| self.histogram.cost())
	}

	/// # Known Cost.
	///
	/// Same as `HistogramCluster::cost`, but without caching.
	fn known_cost(&self) -> f64 {
		self.cost.unwrap_or_else(|| self.histogram.cost())
	}

	/// # Absorb.
	fn absorb(&mut self, other: Self) {
		self.histogram.merge(&other.histogram);
		self.members.extend(other.members);
		self.cost = None;
	}
}



#[derive(Debug, Clone)]
/// # Entropy Image.
///
/// The mapping from entropy tiles to prefix code groups, plus the group
/// histograms themselves.
pub(crate) struct EntropyImage {
	/// # Tile Bits.
	bits: u8,

	/// # Tiles Per Row.
	tiles_w: usize,

	/// # Group Per Tile.
	map: Vec<usize>,

	/// # Group Histograms.
	groups: Vec<Histogram>,
}

impl EntropyImage {
	/// # Build.
	///
	/// Histogram the tokens by tile (each token belongs to the tile holding
	/// its first pixel), then merge the tiles into groups.
	///
	/// ## Errors
	///
	/// Returns an invariant violation if the tokens don't fit the image.
	pub(crate) fn build(
		tokens: &TokenStream,
		width: usize,
		height: usize,
		bits: u8,
		cache_bits: u8,
		planes: &PlaneCodes,
		effort: &Effort,
	) -> Result<Self, WepfliError> {
		let tiles_w = subsample(width, bits);
		let tiles = tiles_w * subsample(height, bits);
		let mut histos = vec![Histogram::new(cache_bits); tiles];

		let mut pos = 0;
		for &s in tokens {
			let tile = tile_index(pos, width, bits, tiles_w);
			histos.get_mut(tile).ok_or_else(|| wepfli_bug!())?.add(s, planes);
			pos += s.len();
		}
		if pos != width * height { return Err(wepfli_bug!()); }

		let mut clusters: Vec<HistogramCluster> = histos.into_iter()
			.enumerate()
			.filter(|(_, h)| ! h.is_empty())
			.map(|(tile, h)| HistogramCluster::new(tile, h))
			.collect();
		clusters.par_iter_mut().for_each(|c| { c.cost(); });

		combine(&mut clusters, effort.combine_window(), effort.combine_passes());

		let mut map = vec![0; tiles];
		let mut groups = Vec::with_capacity(clusters.len());
		for (group, c) in clusters.into_iter().enumerate() {
			for &tile in &c.members { map[tile] = group; }
			groups.push(c.histogram);
		}

		// An image always needs at least one group.
		if groups.is_empty() { groups.push(Histogram::new(cache_bits)); }

		Ok(Self { bits, tiles_w, map, groups })
	}

	/// # Tile Bits.
	pub(crate) const fn bits(&self) -> u8 { self.bits }

	/// # Groups.
	pub(crate) fn groups(&self) -> &[Histogram] { &self.groups }

	/// # Group for Pixel.
	pub(crate) fn group_at(&self, pos: usize, width: usize) -> usize {
		self.map[tile_index(pos, width, self.bits, self.tiles_w)]
	}

	#[allow(clippy::cast_possible_truncation, reason = "At most 2600 groups.")]
	/// # As Sub-Image.
	///
	/// The group index goes in the red and green channels.
	pub(crate) fn sub_image(&self) -> Vec<u32> {
		self.map.iter().map(|&g| (g as u32) << 8).collect()
	}
}

#[inline]
/// # Tile Index.
const fn tile_index(pos: usize, width: usize, bits: u8, tiles_w: usize) -> usize {
	let (x, y) = (pos % width, pos / width);
	(y >> bits) * tiles_w + (x >> bits)
}



/// # Combine.
///
/// For each cluster in order, look ahead up to `window` clusters and merge
/// the first whose union is cheaper than the pair kept apart (with
/// overhead). The same cluster is retried until nothing merges. The whole
/// sweep repeats up to `passes` times or until a sweep changes nothing.
///
/// Every accepted merge strictly lowers the total estimated cost
/// (including overhead), so this always terminates. There is no separate
/// cluster cap: the input has one cluster per tile, and `histo_bits` keeps
/// the tile count within `MAX_HUFF_IMAGE_SIZE`.
pub(crate) fn combine(clusters: &mut Vec<HistogramCluster>, window: usize, passes: usize) {
	let window = window.max(1);
	for _ in 0..passes {
		let mut changed = false;
		let mut i = 0;
		while i < clusters.len() {
			loop {
				let end = clusters.len().min(i + 1 + window);
				if end <= i + 1 { break; }

				let base = clusters[i].cost();
				let a = &clusters[i].histogram;
				let found: Vec<bool> = clusters[i + 1..end].par_iter()
					.map(|b| a.merged(&b.histogram).cost() < base + b.known_cost() + CLUSTER_OVERHEAD)
					.collect();

				match found.iter().position(|&f| f) {
					Some(k) => {
						let other = clusters.remove(i + 1 + k);
						clusters[i].absorb(other);
						changed = true;
					},
					None => break,
				}
			}
			i += 1;
		}
		if ! changed { break; }
	}
}
