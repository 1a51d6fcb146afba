//! Methods to transform values and literal meanings through an integer view.

use std::ops::{Add, Neg};

use crate::{lit::LitMeaning, IntVal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// The affine map applied by a view onto a stored integer variable.
///
/// The transformation takes a value `x` of the underlying variable to
/// `offset - x` when `negate` is set, and to `x + offset` otherwise. Unlike a
/// general scaling, it is always invertible over the integers, so reversing a
/// transformation never loses information.
pub(crate) struct ViewTransform {
	/// Whether the underlying value is negated before the offset is added.
	pub(crate) negate: bool,
	/// The additive offset.
	pub(crate) offset: IntVal,
}

impl ViewTransform {
	/// Creates a transformation that only adds `offset`.
	pub(crate) fn offset(offset: IntVal) -> Self {
		Self {
			negate: false,
			offset,
		}
	}

	/// Creates the transformation `x ↦ -x`.
	pub(crate) fn negated() -> Self {
		Self {
			negate: true,
			offset: 0,
		}
	}

	/// Whether the transformation maps every value to itself.
	pub(crate) fn is_identity(&self) -> bool {
		!self.negate && self.offset == 0
	}

	/// Map a value of the underlying variable to the value of the view.
	pub(crate) fn transform(&self, val: IntVal) -> IntVal {
		if self.negate {
			self.offset - val
		} else {
			val + self.offset
		}
	}

	/// Map a value of the view back to the value of the underlying variable.
	pub(crate) fn rev_transform(&self, val: IntVal) -> IntVal {
		if self.negate {
			self.offset - val
		} else {
			val - self.offset
		}
	}

	/// Map a literal meaning about the underlying variable to the equivalent
	/// meaning about the view.
	pub(crate) fn transform_meaning(&self, meaning: LitMeaning) -> LitMeaning {
		use LitMeaning::*;

		if self.negate {
			match meaning {
				Eq(i) => Eq(self.offset - i),
				NotEq(i) => NotEq(self.offset - i),
				// x >= i becomes view <= offset - i
				GreaterEq(i) => Less(self.offset - i + 1),
				// x < i becomes view > offset - i
				Less(i) => GreaterEq(self.offset - i + 1),
			}
		} else {
			match meaning {
				Eq(i) => Eq(i + self.offset),
				NotEq(i) => NotEq(i + self.offset),
				GreaterEq(i) => GreaterEq(i + self.offset),
				Less(i) => Less(i + self.offset),
			}
		}
	}

	/// Map a literal meaning about the view to the equivalent meaning about the
	/// underlying variable.
	pub(crate) fn rev_transform_meaning(&self, meaning: LitMeaning) -> LitMeaning {
		use LitMeaning::*;

		if self.negate {
			match meaning {
				Eq(i) => Eq(self.offset - i),
				NotEq(i) => NotEq(self.offset - i),
				// view >= i holds iff x <= offset - i
				GreaterEq(i) => Less(self.offset - i + 1),
				// view < i holds iff x > offset - i
				Less(i) => GreaterEq(self.offset - i + 1),
			}
		} else {
			match meaning {
				Eq(i) => Eq(i - self.offset),
				NotEq(i) => NotEq(i - self.offset),
				GreaterEq(i) => GreaterEq(i - self.offset),
				Less(i) => Less(i - self.offset),
			}
		}
	}
}

impl Add<IntVal> for ViewTransform {
	type Output = ViewTransform;

	fn add(self, rhs: IntVal) -> Self::Output {
		ViewTransform {
			negate: self.negate,
			offset: self.offset + rhs,
		}
	}
}

impl Neg for ViewTransform {
	type Output = ViewTransform;

	fn neg(self) -> Self::Output {
		ViewTransform {
			negate: !self.negate,
			offset: -self.offset,
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::{helpers::view_transform::ViewTransform, lit::LitMeaning};

	#[test]
	fn test_transform_value() {
		let t = ViewTransform::offset(3);
		assert_eq!(t.transform(4), 7);
		assert_eq!(t.rev_transform(7), 4);

		let t = -ViewTransform::offset(0);
		assert_eq!(t.transform(4), -4);
		assert_eq!(t.rev_transform(-4), 4);

		let t = ViewTransform::negated() + 2;
		assert_eq!(t.transform(5), -3);
		assert_eq!(t.rev_transform(-3), 5);
	}

	#[test]
	fn test_transform_meaning_roundtrip() {
		let transforms = [
			ViewTransform::offset(0),
			ViewTransform::offset(7),
			ViewTransform::offset(-2),
			ViewTransform::negated(),
			ViewTransform::negated() + 5,
		];
		let meanings = [
			LitMeaning::Eq(3),
			LitMeaning::NotEq(-1),
			LitMeaning::GreaterEq(4),
			LitMeaning::Less(0),
		];
		for t in transforms {
			for m in meanings.clone() {
				assert_eq!(t.rev_transform_meaning(t.transform_meaning(m.clone())), m);
			}
		}
	}

	#[test]
	fn test_negated_meaning() {
		// view = -x: view >= 2 iff x <= -2 iff x < -1
		let t = ViewTransform::negated();
		assert_eq!(
			t.rev_transform_meaning(LitMeaning::GreaterEq(2)),
			LitMeaning::Less(-1)
		);
		assert_eq!(
			t.rev_transform_meaning(LitMeaning::Less(2)),
			LitMeaning::GreaterEq(-1)
		);
		assert_eq!(t.rev_transform_meaning(LitMeaning::Eq(2)), LitMeaning::Eq(-2));
	}
}
