//! Integer linear sums: normalisation, bounds-consistent propagation, and
//! the model definitions that mirror them into the proof.

use crate::{
	helpers::{div_ceil, div_floor},
	inference::{Failure, InferenceTracker, Justification},
	propagators::{PropagatorState, Triggers},
	proofs::pseudo_boolean::{PbSum, PbTerm},
	state::IntVarRef,
	Constraint, InstallContext, IntVal, IntView, IntViewInner, Lit, ModelError, NonZeroIntVal,
};

/// A weighted sum of integer views.
pub type Linear = Vec<(IntVal, IntView)>;

/// Normalise a weighted sum of views onto stored variables.
///
/// Constants and view offsets are folded into the returned modifier so that
/// `Σ terms ≤ v` holds exactly when `Σ sanitised ≤ v + modifier`. Duplicate
/// variables are combined and zero-coefficient terms are removed.
pub(crate) fn sanitise_linear(terms: &Linear) -> (Vec<(IntVal, IntVarRef)>, IntVal) {
	let mut result: Vec<(IntVal, IntVarRef)> = Vec::with_capacity(terms.len());
	let mut modifier = 0;
	for &(w, view) in terms {
		match view.0 {
			IntViewInner::Const(c) => modifier -= w * c,
			IntViewInner::VarRef(v) => result.push((w, v)),
			IntViewInner::Offset { transform, var } => {
				let coeff = if transform.negate { -w } else { w };
				result.push((coeff, var));
				modifier -= w * transform.offset;
			}
		}
	}

	result.sort_by_key(|&(_, v)| v);
	let mut combined: Vec<(IntVal, IntVarRef)> = Vec::with_capacity(result.len());
	for (w, v) in result {
		match combined.last_mut() {
			Some(last) if last.1 == v => last.0 += w,
			_ => combined.push((w, v)),
		}
	}
	combined.retain(|&(w, _)| w != 0);
	(combined, modifier)
}

/// One round of bounds-consistent propagation of `Σ c_i x_i ≤ rhs`.
///
/// Each variable is pushed towards the bound implied by giving every other
/// variable its best value; the reason cites those best-value bound
/// literals.
pub(crate) fn propagate_linear_leq(
	tracker: &mut InferenceTracker<'_>,
	terms: &[(IntVal, IntVarRef)],
	rhs: IntVal,
) -> Result<(), Failure> {
	// the slack left once every variable contributes as little as it can
	let mut slack = rhs;
	for &(c, v) in terms {
		let var = IntView::from_ref(v);
		slack -= if c > 0 {
			c * tracker.lower_bound(var)
		} else {
			c * tracker.upper_bound(var)
		};
	}

	let bound_reason = |skip: Option<IntVarRef>| {
		let terms = terms.to_vec();
		move |state: &crate::State| {
			terms
				.iter()
				.filter(|&&(_, v)| Some(v) != skip)
				.map(|&(c, v)| {
					let var = IntView::from_ref(v);
					if c > 0 {
						var.geq(state.lower_bound(var))
					} else {
						var.leq(state.upper_bound(var))
					}
				})
				.collect::<Vec<Lit>>()
		}
	};

	if slack < 0 {
		return Err(tracker.infer_false(Justification::Rup, bound_reason(None)));
	}

	for &(c, v) in terms {
		let var = IntView::from_ref(v);
		let coeff = NonZeroIntVal::new(c).expect("zero coefficients are sanitised away");
		if c > 0 {
			let bound = div_floor(slack + c * tracker.lower_bound(var), coeff);
			if bound < tracker.upper_bound(var) {
				tracker.infer_less_than(
					var,
					bound + 1,
					Justification::Rup,
					bound_reason(Some(v)),
				)?;
			}
		} else {
			let bound = div_ceil(slack + c * tracker.upper_bound(var), coeff);
			if bound > tracker.lower_bound(var) {
				tracker.infer_greater_eq(var, bound, Justification::Rup, bound_reason(Some(v)))?;
			}
		}
	}
	Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The constraint `Σ c_i x_i ≤ rhs`.
pub struct LinearLeq {
	/// The weighted sum.
	pub terms: Linear,
	/// Its upper bound.
	pub rhs: IntVal,
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The constraint `Σ c_i x_i = rhs`.
pub struct LinearEq {
	/// The weighted sum.
	pub terms: Linear,
	/// The value the sum must take.
	pub rhs: IntVal,
}

/// The model-definition contribution of a linear (in)equality.
pub(crate) fn linear_sum(terms: &Linear) -> PbSum {
	terms
		.iter()
		.map(|&(w, view)| (w, PbTerm::Int(view)))
		.collect()
}

impl Constraint for LinearLeq {
	fn install(self: Box<Self>, ctx: &mut InstallContext<'_>) -> Result<(), ModelError> {
		let _ = ctx.define_linear_leq(&self.terms, self.rhs);
		let (terms, modifier) = sanitise_linear(&self.terms);
		let rhs = self.rhs + modifier;
		if terms.is_empty() {
			if rhs < 0 {
				ctx.model_contradiction("linear_leq is trivially false");
			}
			return Ok(());
		}
		let vars: Vec<IntView> = terms.iter().map(|&(_, v)| IntView::from_ref(v)).collect();
		let _ = ctx.install_propagator(
			Box::new(move |t| {
				propagate_linear_leq(t, &terms, rhs)?;
				Ok(PropagatorState::Enable)
			}),
			Triggers::on_bounds(vars),
			"linear_leq",
		);
		Ok(())
	}
}

impl Constraint for LinearEq {
	fn install(self: Box<Self>, ctx: &mut InstallContext<'_>) -> Result<(), ModelError> {
		let _ = ctx.define_linear_eq(&self.terms, self.rhs);
		let (terms, modifier) = sanitise_linear(&self.terms);
		let rhs = self.rhs + modifier;
		if terms.is_empty() {
			if rhs != 0 {
				ctx.model_contradiction("linear_eq is trivially false");
			}
			return Ok(());
		}
		let negated: Vec<(IntVal, IntVarRef)> = terms.iter().map(|&(c, v)| (-c, v)).collect();
		let vars: Vec<IntView> = terms.iter().map(|&(_, v)| IntView::from_ref(v)).collect();
		let _ = ctx.install_propagator(
			Box::new(move |t| {
				propagate_linear_leq(t, &terms, rhs)?;
				propagate_linear_leq(t, &negated, -rhs)?;
				Ok(PropagatorState::Enable)
			}),
			Triggers::on_bounds(vars),
			"linear_eq",
		);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use crate::{linear::sanitise_linear, Problem};

	#[test]
	fn test_sanitise_folds_views_and_constants() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(0, 10);
		let y = prb.new_int_var(0, 10);

		// 2x + (y + 3) + 4 - x  ==>  x + y, modifier -7
		let terms = vec![(2, x), (1, y + 3), (4, crate::IntView::constant(1)), (-1, x)];
		let (sanitised, modifier) = sanitise_linear(&terms);
		assert_eq!(modifier, -7);
		assert_eq!(sanitised.len(), 2);
		assert_eq!(sanitised[0].0, 1);
		assert_eq!(sanitised[1].0, 1);
	}

	#[test]
	fn test_sanitise_cancels_to_nothing() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(0, 10);
		let (sanitised, modifier) = sanitise_linear(&vec![(1, x), (-1, x)]);
		assert!(sanitised.is_empty());
		assert_eq!(modifier, 0);
	}

	#[test]
	fn test_sanitise_negated_view() {
		let mut prb = Problem::new();
		let x = prb.new_int_var(0, 10);
		// 3·(-x + 2) ==> -3x, modifier -6
		let (sanitised, modifier) = sanitise_linear(&vec![(3, -x + 2)]);
		assert_eq!(sanitised[0].0, -3);
		assert_eq!(modifier, -6);
	}
}
