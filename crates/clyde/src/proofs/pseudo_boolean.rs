//! In-memory shapes of the pseudo-Boolean expressions that get written to the
//! model file and the proof log.
//!
//! Expressions are held in less-or-equal form and converted to the `>=` form
//! the files use at emission time. A term can be a literal, a proof flag, or
//! an integer variable that will be decomposed into its encoding.

use crate::{
	lit::Condition,
	proofs::encoding::{ProofFlag, ProofVarRef},
	IntVal, IntView, Lit,
};

#[derive(Clone, Debug, PartialEq, Eq)]
/// A single unweighted pseudo-Boolean term.
pub enum PbTerm {
	/// A literal over the model's views.
	Lit(Lit),
	/// A condition on a proof-only integer variable.
	ProofCond(Condition<ProofVarRef>),
	/// A proof flag.
	Flag(ProofFlag),
	/// An integer view, decomposed into its variable encoding.
	Int(IntView),
	/// A proof-only integer variable, decomposed into its encoding.
	ProofInt(ProofVarRef),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// A weighted sum of pseudo-Boolean terms.
pub struct PbSum(pub Vec<(IntVal, PbTerm)>);

#[derive(Clone, Debug, PartialEq, Eq)]
/// The constraint `sum ≤ rhs`.
pub struct PbLeq {
	/// The left-hand side.
	pub sum: PbSum,
	/// The right-hand side.
	pub rhs: IntVal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The constraint `sum = rhs`, written as a pair of `>=` lines.
pub struct PbEq {
	/// The left-hand side.
	pub sum: PbSum,
	/// The right-hand side.
	pub rhs: IntVal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A term a constraint can be half-reified on.
pub enum ReifTerm {
	/// A literal over the model's views.
	Lit(Lit),
	/// A proof flag.
	Flag(ProofFlag),
}

impl PbSum {
	/// The sum with no terms.
	pub fn new() -> Self {
		Self::default()
	}

	/// Append a weighted term.
	pub fn plus(mut self, weight: IntVal, term: impl Into<PbTerm>) -> Self {
		self.0.push((weight, term.into()));
		self
	}

	/// Constrain the sum to be at most `rhs`.
	pub fn leq(self, rhs: IntVal) -> PbLeq {
		PbLeq { sum: self, rhs }
	}

	/// Constrain the sum to be at least `rhs`.
	pub fn geq(self, rhs: IntVal) -> PbLeq {
		PbLeq {
			sum: PbSum(self.0.into_iter().map(|(w, t)| (-w, t)).collect()),
			rhs: -rhs,
		}
	}

	/// Constrain the sum to equal `rhs`.
	pub fn eq(self, rhs: IntVal) -> PbEq {
		PbEq { sum: self, rhs }
	}
}

impl FromIterator<(IntVal, PbTerm)> for PbSum {
	fn from_iter<T: IntoIterator<Item = (IntVal, PbTerm)>>(iter: T) -> Self {
		PbSum(iter.into_iter().collect())
	}
}

impl From<Lit> for PbTerm {
	fn from(value: Lit) -> Self {
		PbTerm::Lit(value)
	}
}

impl From<IntView> for PbTerm {
	fn from(value: IntView) -> Self {
		PbTerm::Int(value)
	}
}

impl From<ProofFlag> for PbTerm {
	fn from(value: ProofFlag) -> Self {
		PbTerm::Flag(value)
	}
}

impl From<Lit> for ReifTerm {
	fn from(value: Lit) -> Self {
		ReifTerm::Lit(value)
	}
}

impl From<ProofFlag> for ReifTerm {
	fn from(value: ProofFlag) -> Self {
		ReifTerm::Flag(value)
	}
}

/// Normalise a less-or-equal expression in place.
///
/// Zero-weight terms are dropped, constant literals are folded into the
/// right-hand side. Returns false when the constraint has become trivially
/// satisfied and should not be emitted at all.
pub(crate) fn sanitise(ineq: &mut PbLeq) -> bool {
	let rhs = &mut ineq.rhs;
	ineq.sum.0.retain(|(w, term)| {
		if *w == 0 {
			return false;
		}
		match term {
			PbTerm::Lit(lit) => match lit.simplify() {
				crate::lit::SimpleLit::True => {
					*rhs -= *w;
					false
				}
				crate::lit::SimpleLit::False => false,
				crate::lit::SimpleLit::Cond(_) => true,
			},
			_ => true,
		}
	});
	!(ineq.sum.0.is_empty() && *rhs >= 0)
}

#[cfg(test)]
mod tests {
	use crate::{
		proofs::pseudo_boolean::{sanitise, PbSum, PbTerm},
		IntView, Lit,
	};

	#[test]
	fn test_geq_negates_into_leq() {
		let x = IntView::constant(0);
		let ineq = PbSum::new().plus(2, x).plus(-1, x).geq(3);
		assert_eq!(ineq.rhs, -3);
		assert_eq!(ineq.sum.0[0].0, -2);
		assert_eq!(ineq.sum.0[1].0, 1);
	}

	#[test]
	fn test_sanitise_folds_constants() {
		let mut ineq = PbSum::new()
			.plus(2, Lit::True)
			.plus(3, Lit::False)
			.plus(0, Lit::True)
			.leq(5);
		assert!(sanitise(&mut ineq));
		assert!(ineq.sum.0.is_empty());
		// the True term always contributes 2, so the slack shrinks
		assert_eq!(ineq.rhs, 3);

		let mut trivial = PbSum::new().plus(1, Lit::False).leq(0);
		assert!(!sanitise(&mut trivial));
	}

	#[test]
	fn test_sanitise_keeps_conditions() {
		let c = IntView::constant(7);
		// a condition on a constant view folds to a truth value
		let mut ineq = PbSum::new().plus(1, PbTerm::Lit(c.geq(5))).leq(0);
		assert!(sanitise(&mut ineq));
		assert_eq!(ineq.rhs, -1);
	}
}
