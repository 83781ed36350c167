/*!
# Wepfli: Errors.
*/

use std::fmt;



#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
/// # Wepfli Error.
///
/// Every failure surfaced by [`encode`](crate::encode) or
/// [`decode`](crate::decode). No partial output accompanies an error.
pub enum WepfliError {
	#[error("invalid input: {0}")]
	/// # Invalid Input.
	///
	/// The pixel buffer is empty, too large, or its length does not agree
	/// with its dimensions.
	InvalidInput(&'static str),

	#[error("unsupported configuration: {0}")]
	/// # Unsupported Configuration.
	///
	/// The requested settings cannot be expressed in a VP8L stream.
	UnsupportedConfiguration(&'static str),

	#[error("{0}")]
	/// # Internal Invariant Violation.
	///
	/// A programming defect was caught before it could produce a corrupt
	/// stream.
	InternalInvariantViolation(Bug),

	#[error("malformed stream: {0}")]
	/// # Malformed Stream.
	///
	/// The decoder was handed something that isn't a valid VP8L image.
	Malformed(&'static str),
}

impl From<Bug> for WepfliError {
	#[inline]
	fn from(err: Bug) -> Self { Self::InternalInvariantViolation(err) }
}



#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// # Bug.
///
/// This is used for logical failings within the encoder. It shouldn't ever
/// be instantiated in practice…
///
/// When compiled with `debug-assertions = true`, the offending source file
/// and line number are recorded to aid investigation. Otherwise it is just a
/// flag telling the caller to give up on the image.
///
/// The macro `wepfli_bug!` populates the appropriate details or not.
pub struct Bug {
	#[cfg(debug_assertions)] file: &'static str,
	#[cfg(debug_assertions)] line: u32,
}

impl Bug {
	#[cfg(debug_assertions)]
	/// # New.
	pub(crate) const fn new(file: &'static str, line: u32) -> Self {
		Self { file, line }
	}
}

impl fmt::Display for Bug {
	#[cfg(debug_assertions)]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_fmt(format_args!(
			"internal invariant violated at {}:{}",
			self.file,
			self.line,
		))
	}

	#[cfg(not(debug_assertions))]
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("internal invariant violated")
	}
}



#[cfg(debug_assertions)]
/// # Bug Macro.
///
/// Initialize a new invariant error with the appropriate environmental
/// argument(s) according to `debug-assertions`.
macro_rules! wepfli_bug {
	() => (
		$crate::WepfliError::InternalInvariantViolation(
			$crate::Bug::new(file!(), line!())
		)
	);
}

#[cfg(not(debug_assertions))]
/// # Bug Macro.
///
/// Initialize a new invariant error with the appropriate environmental
/// argument(s) according to `debug-assertions`.
macro_rules! wepfli_bug {
	() => (
		$crate::WepfliError::InternalInvariantViolation($crate::Bug {})
	);
}

/// # Expose it to the rest of the crate.
pub(crate) use wepfli_bug;



#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn t_bug_display() {
		let err = wepfli_bug!();
		assert!(matches!(err, WepfliError::InternalInvariantViolation(_)));
		assert!(err.to_string().starts_with("internal invariant violated"));

		let err = WepfliError::InvalidInput("zero width");
		assert_eq!(err.to_string(), "invalid input: zero width");
	}
}
