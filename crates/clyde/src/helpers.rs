//! Module containing general, e.g. purely numeric, structures used in
//! multiple places in the library and not exposed to the user.

pub(crate) mod view_transform;

use crate::{IntVal, NonZeroIntVal};

/// Integer division rounding towards negative infinity.
///
/// Euclidean division already rounds down for positive divisors; a negative
/// divisor needs one step of correction whenever the division is inexact.
pub(crate) fn div_floor(a: IntVal, b: NonZeroIntVal) -> IntVal {
	let quotient = a.div_euclid(b.get());
	if b.get() < 0 && a.rem_euclid(b.get()) != 0 {
		quotient - 1
	} else {
		quotient
	}
}

#[inline]
/// Integer division rounding towards positive infinity.
///
/// The mirror image of [`div_floor`]: negating the numerator flips the
/// rounding direction.
pub(crate) fn div_ceil(a: IntVal, b: NonZeroIntVal) -> IntVal {
	-div_floor(-a, b)
}

#[cfg(test)]
mod tests {
	use crate::{
		helpers::{div_ceil, div_floor},
		NonZeroIntVal,
	};

	#[test]
	fn test_rounding_for_bound_tightening() {
		// the rounding directions the linear propagator relies on: slack
		// divided by a positive coefficient rounds down to a valid upper
		// bound, by a negative coefficient rounds up to a valid lower bound
		let cases = [
			// (slack, coefficient, floor, ceil)
			(7, 2, 3, 4),
			(-7, 2, -4, -3),
			(7, -2, -4, -3),
			(-7, -2, 3, 4),
			(9, 3, 3, 3),
			(-9, 3, -3, -3),
			(0, 5, 0, 0),
			(1, 7, 0, 1),
			(-1, 7, -1, 0),
		];
		for (a, b, floor, ceil) in cases {
			let b = NonZeroIntVal::new(b).unwrap();
			assert_eq!(div_floor(a, b), floor, "floor of {a} / {b}");
			assert_eq!(div_ceil(a, b), ceil, "ceil of {a} / {b}");
		}
	}

	#[test]
	fn test_floor_and_ceil_bracket_the_quotient() {
		for a in -9..=9 {
			for b in [-4, -3, -1, 1, 3, 4] {
				let b = NonZeroIntVal::new(b).unwrap();
				let floor = div_floor(a, b);
				let ceil = div_ceil(a, b);
				assert!(floor <= ceil && ceil - floor <= 1);
				if b.get() > 0 {
					assert!(floor * b.get() <= a && (floor + 1) * b.get() > a);
					assert!(ceil * b.get() >= a && (ceil - 1) * b.get() < a);
				} else {
					assert!(floor * b.get() >= a && (floor + 1) * b.get() < a);
					assert!(ceil * b.get() <= a && (ceil - 1) * b.get() > a);
				}
			}
		}
	}
}
