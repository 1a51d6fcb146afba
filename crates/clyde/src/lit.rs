//! Literal meanings, variable conditions and literals: the atomic facts that
//! the engine manipulates about integer variables.

use std::{
	fmt::{self, Display},
	ops::Not,
};

use crate::{state::IntVarRef, IntVal, IntView, IntViewInner};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// The meaning of a condition on an integer variable `x`.
pub enum LitMeaning {
	/// The condition `x = i`.
	Eq(IntVal),
	/// The condition `x ≠ i`.
	NotEq(IntVal),
	/// The condition `x ≥ i`.
	GreaterEq(IntVal),
	/// The condition `x < i`.
	Less(IntVal),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A condition stating that a variable compares against a constant.
pub struct Condition<V> {
	/// The variable the condition ranges over.
	pub var: V,
	/// The comparison made against the constant.
	pub meaning: LitMeaning,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A literal: a condition on an integer view, or a constant truth value.
pub enum Lit {
	/// A condition on an integer view.
	Cond(Condition<IntView>),
	/// The literal that always holds.
	True,
	/// The literal that never holds.
	False,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A literal resolved against the store: either decided by the shape of the
/// view alone, or a condition on a stored variable.
pub(crate) enum SimpleLit {
	/// The condition is always true.
	True,
	/// The condition is always false.
	False,
	/// A condition on a stored variable.
	Cond(Condition<IntVarRef>),
}

impl Not for LitMeaning {
	type Output = LitMeaning;

	fn not(self) -> Self::Output {
		match self {
			LitMeaning::Eq(i) => LitMeaning::NotEq(i),
			LitMeaning::NotEq(i) => LitMeaning::Eq(i),
			LitMeaning::GreaterEq(i) => LitMeaning::Less(i),
			LitMeaning::Less(i) => LitMeaning::GreaterEq(i),
		}
	}
}

impl<V> Not for Condition<V> {
	type Output = Condition<V>;

	fn not(self) -> Self::Output {
		Condition {
			var: self.var,
			meaning: !self.meaning,
		}
	}
}

impl Not for Lit {
	type Output = Lit;

	fn not(self) -> Self::Output {
		match self {
			Lit::Cond(c) => Lit::Cond(!c),
			Lit::True => Lit::False,
			Lit::False => Lit::True,
		}
	}
}

impl From<Condition<IntView>> for Lit {
	fn from(value: Condition<IntView>) -> Self {
		Lit::Cond(value)
	}
}

impl From<bool> for Lit {
	fn from(value: bool) -> Self {
		if value {
			Lit::True
		} else {
			Lit::False
		}
	}
}

impl Lit {
	/// Resolve the literal against the shape of its view: conditions on
	/// constants become truth values and conditions on views are rewritten
	/// onto the underlying stored variable.
	pub(crate) fn simplify(&self) -> SimpleLit {
		match self {
			Lit::True => SimpleLit::True,
			Lit::False => SimpleLit::False,
			Lit::Cond(cond) => simplify_condition(cond),
		}
	}
}

/// Rewrite a condition on an integer view into a condition on the stored
/// variable underneath it, or a truth value when the view is a constant.
pub(crate) fn simplify_condition(cond: &Condition<IntView>) -> SimpleLit {
	match cond.var.0 {
		IntViewInner::VarRef(var) => SimpleLit::Cond(Condition {
			var,
			meaning: cond.meaning.clone(),
		}),
		IntViewInner::Const(c) => {
			let holds = match cond.meaning {
				LitMeaning::Eq(i) => c == i,
				LitMeaning::NotEq(i) => c != i,
				LitMeaning::GreaterEq(i) => c >= i,
				LitMeaning::Less(i) => c < i,
			};
			if holds {
				SimpleLit::True
			} else {
				SimpleLit::False
			}
		}
		IntViewInner::Offset { transform, var } => SimpleLit::Cond(Condition {
			var,
			meaning: transform.rev_transform_meaning(cond.meaning.clone()),
		}),
	}
}

impl Display for LitMeaning {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LitMeaning::Eq(i) => write!(f, "= {i}"),
			LitMeaning::NotEq(i) => write!(f, "!= {i}"),
			LitMeaning::GreaterEq(i) => write!(f, ">= {i}"),
			LitMeaning::Less(i) => write!(f, "< {i}"),
		}
	}
}

impl Display for Lit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Lit::True => write!(f, "true"),
			Lit::False => write!(f, "false"),
			Lit::Cond(cond) => {
				match cond.var.0 {
					IntViewInner::VarRef(v) => write!(f, "i{}", usize::from(v))?,
					IntViewInner::Const(c) => write!(f, "{c}")?,
					IntViewInner::Offset { transform, var } => {
						if transform.negate {
							write!(f, "-")?;
						}
						write!(f, "i{}", usize::from(var))?;
						if transform.offset != 0 {
							write!(f, "{:+}", transform.offset)?;
						}
					}
				}
				write!(f, " {}", cond.meaning)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		lit::{simplify_condition, LitMeaning, SimpleLit},
		Lit, Problem,
	};

	#[test]
	fn test_negation() {
		assert_eq!(!LitMeaning::Eq(3), LitMeaning::NotEq(3));
		assert_eq!(!LitMeaning::GreaterEq(3), LitMeaning::Less(3));
		assert_eq!(!Lit::True, Lit::False);
		assert_eq!(!!LitMeaning::Less(0), LitMeaning::Less(0));
	}

	#[test]
	fn test_condition_builders() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(1, 10);

		assert_eq!(!x.geq(5), x.lt(5));
		assert_eq!(x.gt(4), x.geq(5));
		assert_eq!(x.leq(4), x.lt(5));
		assert_eq!(!x.eq(7), x.ne(7));
	}

	#[test]
	fn test_simplify_through_view() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(1, 10);

		// (x + 1) >= 5 simplifies to x >= 4
		let Lit::Cond(cond) = (x + 1).geq(5) else {
			panic!("expected a condition")
		};
		let SimpleLit::Cond(simple) = simplify_condition(&cond) else {
			panic!("expected a stored-variable condition")
		};
		assert_eq!(simple.meaning, LitMeaning::GreaterEq(4));

		// (-x + 1) < -2 simplifies to x >= 4
		let Lit::Cond(cond) = (-x + 1).lt(-2) else {
			panic!("expected a condition")
		};
		let SimpleLit::Cond(simple) = simplify_condition(&cond) else {
			panic!("expected a stored-variable condition")
		};
		assert_eq!(simple.meaning, LitMeaning::GreaterEq(4));
	}

	#[test]
	fn test_constant_views_fold_to_truth_values() {
		let c = crate::IntView::constant(3);
		assert_eq!(c.geq(2), Lit::True);
		assert_eq!(c.geq(4), Lit::False);
		assert_eq!(c.eq(3), Lit::True);
		assert_eq!(c.ne(3), Lit::False);
	}
}
