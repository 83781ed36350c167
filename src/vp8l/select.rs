/*!
# Wepfli: Transform Selection.
*/

use rayon::prelude::*;
use super::{
	choose_multipliers,
	choose_predictors,
	collect_palette,
	Effort,
	Histogram,
	histo_bits,
	MAX_PALETTE,
	packing_bits,
	PlaneCodes,
	tokenize,
	transform_bits,
	TransformSpec,
	WepfliError,
};
use tracing::{debug, trace};



#[derive(Debug, Clone, Eq, PartialEq)]
/// # Candidate.
///
/// The transform combinations worth trying, in tie-break order.
enum Candidate {
	/// # Nothing.
	None,

	/// # Subtract Green.
	SubtractGreen,

	/// # Predictor.
	Predictor(u8),

	/// # Subtract Green + Predictor.
	GreenPredictor(u8),

	/// # Subtract Green + Predictor + Cross-Color.
	GreenPredictorCross(u8),

	/// # Palette.
	Palette(Vec<u32>),
}



#[derive(Debug, Clone)]
/// # Transform Plan.
///
/// The transforms to write, in application order, along with the image
/// that results from applying them.
pub(crate) struct Plan {
	/// # Transforms.
	pub(crate) transforms: Vec<TransformSpec>,

	/// # Transformed Pixels.
	pub(crate) argb: Vec<u32>,

	/// # Transformed Width.
	///
	/// This only differs from the source width for packed palettes.
	pub(crate) width: usize,

	/// # Estimated Cost.
	pub(crate) cost: f64,
}

impl Plan {
	/// # New (Untransformed).
	fn new(argb: &[u32], width: usize) -> Self {
		Self {
			transforms: Vec::new(),
			argb: argb.to_vec(),
			width,
			cost: 0.0,
		}
	}

	/// # With Transform.
	fn with(mut self, spec: TransformSpec, height: usize) -> Result<Self, WepfliError> {
		let (argb, width) = spec.apply(&self.argb, self.width, height)?;
		self.argb = argb;
		self.width = width;
		self.transforms.push(spec);
		Ok(self)
	}

	/// # Has Palette?
	pub(crate) fn has_palette(&self) -> bool {
		self.transforms.iter().any(|t| matches!(t, TransformSpec::Palette { .. }))
	}
}



/// # Choose Transforms.
///
/// Build every candidate plan, score each with a quick tokenization, and
/// return the cheapest. Candidates are evaluated in parallel; ties go to
/// the earliest candidate.
///
/// ## Errors
///
/// Returns `UnsupportedConfiguration` if a palette is forced on an image
/// with too many colors, or an invariant violation if any candidate goes
/// wrong.
pub(crate) fn choose(
	argb: &[u32],
	width: usize,
	height: usize,
	effort: &Effort,
	max_cache_bits: u8,
	force_palette: bool,
) -> Result<Plan, WepfliError> {
	let candidates = candidates(argb, width, height, effort, force_palette)?;

	let plans: Vec<Result<Plan, WepfliError>> = candidates.par_iter()
		.map(|c| evaluate(c, argb, width, height, effort, max_cache_bits))
		.collect();

	let mut best: Option<Plan> = None;
	for (idx, plan) in plans.into_iter().enumerate() {
		let plan = plan?;
		trace!(candidate = idx, transforms = plan.transforms.len(), cost = plan.cost, "scored transform candidate");
		if best.as_ref().map_or(true, |b| plan.cost < b.cost) { best.replace(plan); }
	}

	let best = best.ok_or_else(|| super::wepfli_bug!())?;
	debug!(
		transforms = ?best.transforms.iter().map(TransformSpec::kind).collect::<Vec<_>>(),
		cost = best.cost,
		"chose transforms",
	);
	Ok(best)
}

/// # Candidates.
fn candidates(argb: &[u32], width: usize, height: usize, effort: &Effort, force_palette: bool)
-> Result<Vec<Candidate>, WepfliError> {
	let palette = collect_palette(argb);
	if force_palette {
		return palette.map(|p| vec![Candidate::Palette(p)])
			.ok_or(WepfliError::UnsupportedConfiguration("too many colors for a palette"));
	}

	let method = effort.method();
	let largest = transform_bits(method, histo_bits(method, width, height, false));
	let mut sizes = vec![largest];
	for i in 1..effort.predictor_sizes() {
		if 2 + i <= largest { sizes.push(largest - i); }
	}

	let mut out = vec![Candidate::None, Candidate::SubtractGreen];
	out.extend(sizes.iter().map(|&b| Candidate::Predictor(b)));
	out.extend(sizes.iter().map(|&b| Candidate::GreenPredictor(b)));
	out.push(Candidate::GreenPredictorCross(largest));

	if let Some(p) = palette {
		if palette_pays(argb, p.len()) { out.push(Candidate::Palette(p)); }
	}

	Ok(out)
}

/// # Palette Worth Trying?
///
/// Indexing only makes sense if the packed index is narrower than the
/// channels it replaces.
fn palette_pays(argb: &[u32], colors: usize) -> bool {
	if colors == 0 || MAX_PALETTE < colors { return false; }

	let first = argb.first().copied().unwrap_or(0);
	let diff = argb.iter().fold(0, |acc, &px| acc | (px ^ first));
	let varying = (0..4).filter(|c| (diff >> (c * 8)) & 0xff != 0).count();

	(8 >> packing_bits(colors)) < 8 * varying
}

/// # Evaluate Candidate.
fn evaluate(
	candidate: &Candidate,
	argb: &[u32],
	width: usize,
	height: usize,
	effort: &Effort,
	max_cache_bits: u8,
) -> Result<Plan, WepfliError> {
	let mut plan = Plan::new(argb, width);
	match candidate {
		Candidate::None => {},
		Candidate::SubtractGreen => {
			plan = plan.with(TransformSpec::SubtractGreen, height)?;
		},
		Candidate::Predictor(bits) => {
			plan = with_predictor(plan, *bits, height)?;
		},
		Candidate::GreenPredictor(bits) => {
			plan = plan.with(TransformSpec::SubtractGreen, height)?;
			plan = with_predictor(plan, *bits, height)?;
		},
		Candidate::GreenPredictorCross(bits) => {
			plan = plan.with(TransformSpec::SubtractGreen, height)?;
			plan = with_predictor(plan, *bits, height)?;
			let multipliers = choose_multipliers(&plan.argb, plan.width, height, *bits);
			plan = plan.with(TransformSpec::CrossColor { bits: *bits, multipliers }, height)?;
		},
		Candidate::Palette(colors) => {
			plan = plan.with(TransformSpec::Palette { colors: colors.clone() }, height)?;
		},
	}

	let planes = PlaneCodes::new(plan.width);
	let mut cost = tokenize(&plan.argb, &planes, effort, max_cache_bits, true)?.cost;
	for spec in &plan.transforms {
		if let Some((sub, _)) = spec.sub_image(width) {
			cost += Histogram::from_literals(&sub).cost();
		}
	}

	plan.cost = cost;
	Ok(plan)
}

/// # Add Predictor.
fn with_predictor(plan: Plan, bits: u8, height: usize) -> Result<Plan, WepfliError> {
	let modes = choose_predictors(&plan.argb, plan.width, height, bits);
	plan.with(TransformSpec::Predictor { bits, modes }, height)
}



#[cfg(test)]
mod test {
	use super::*;
	use crate::EncoderConfig;

	#[test]
	fn t_black_square() {
		// Subtract-green ties with nothing on a black square and the rest
		// cost more, so nothing wins.
		let argb = vec![0xff00_0000; 16];
		let effort = EncoderConfig::new().effort();
		let plan = choose(&argb, 4, 4, &effort, 10, false).expect("Choose failed.");
		assert!(plan.transforms.is_empty());
		assert_eq!(plan.argb, argb);
		assert_eq!(plan.width, 4);
	}

	#[test]
	fn t_candidates() {
		let effort = EncoderConfig::new().with_quality(100).effort();

		// A black square has no varying channels, so no palette.
		let black = vec![0xff00_0000; 64];
		let c = candidates(&black, 8, 8, &effort, false).expect("Candidates failed.");
		assert_eq!(c[0], Candidate::None);
		assert_eq!(c[1], Candidate::SubtractGreen);
		assert!(! c.iter().any(|c| matches!(c, Candidate::Palette(_))));

		// Two colors varying in one channel: one bit beats eight.
		let two: Vec<u32> = (0..64).map(|i| 0xff00_0000 | (i & 1)).collect();
		let c = candidates(&two, 8, 8, &effort, false).expect("Candidates failed.");
		assert!(matches!(c.last(), Some(Candidate::Palette(p)) if p.len() == 2));

		// Forced.
		let c = candidates(&two, 8, 8, &effort, true).expect("Candidates failed.");
		assert_eq!(c, [Candidate::Palette(vec![0xff00_0000, 0xff00_0001])]);

		let many: Vec<u32> = (0..300).collect();
		assert!(matches!(
			candidates(&many, 300, 1, &effort, true),
			Err(WepfliError::UnsupportedConfiguration(_)),
		));
	}

	#[test]
	fn t_palette_pays() {
		// 256 colors in a single channel: eight bits either way.
		let gray: Vec<u32> = (0..256).map(|i| 0xff00_0000 | i).collect();
		assert!(! palette_pays(&gray, 256));

		// The same colors spread over two channels.
		let two: Vec<u32> = (0..256).map(|i| 0xff00_0000 | i << 8 | (255 - i)).collect();
		assert!(palette_pays(&two, 256));
	}

	#[test]
	fn t_plan_apply() {
		let argb: Vec<u32> = (0..12 * 9).map(|i| 0xff00_0000 | (i * 0x0001_0203)).collect();
		let effort = EncoderConfig::new().with_quality(100).effort();
		let plan = evaluate(&Candidate::GreenPredictorCross(2), &argb, 12, 9, &effort, 4)
			.expect("Evaluate failed.");
		assert_eq!(plan.transforms.iter().map(TransformSpec::kind).collect::<Vec<_>>(), [2, 0, 1]);
		assert!(0.0 < plan.cost);

		// Undo it.
		let mut out = plan.argb.clone();
		for spec in plan.transforms.iter().rev() {
			spec.invert(&mut out, 12, 9).expect("Invert failed.");
		}
		assert_eq!(out, argb);
	}
}
