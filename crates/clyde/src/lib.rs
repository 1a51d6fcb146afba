//! # Clyde — a certifying finite-domain constraint solver
//!
//! Clyde solves finite-domain integer problems by propagation and
//! depth-first search, and can simultaneously write a machine-checkable
//! certificate of its reasoning in the cutting-planes pseudo-Boolean proof
//! format. Every inference made during search is mirrored by a proof step,
//! with the Boolean variables the proof needs (order literals, value
//! literals, bit encodings) introduced lazily the first time a step mentions
//! them.
//!
//! The crate deliberately knows nothing about concrete constraints: a
//! constraint is a [`Constraint`] implementation that contributes a
//! definition to the proof model and installs propagators through an
//! [`InstallContext`]. The engine supplies the trailed domain store, the
//! propagation fixed point, the proof machinery, and the search driver.

mod helpers;
pub mod inference;
pub mod interval_set;
pub mod linear;
pub mod lit;
pub mod propagators;
pub mod proofs;
pub mod search;
pub mod state;
#[cfg(test)]
pub(crate) mod tests;

use std::{
	num::NonZeroI64,
	ops::{Add, Neg, Sub},
	sync::atomic::AtomicBool,
	time::Instant,
};

use rangelist::RangeList;
use thiserror::Error;
use tracing::debug;

use crate::{
	helpers::view_transform::ViewTransform,
	interval_set::IntervalSet,
	proofs::{
		encoding::{ProofFlag, ProofVarRef, TrackedVar},
		pseudo_boolean::{PbEq, PbLeq, ReifTerm},
		Proof,
	},
	search::SearchContext,
	state::IntVarRef,
};
pub use crate::{
	inference::{Failure, InferenceTracker, Justification, Reason, ReasonBuilder},
	lit::{Condition, Lit, LitMeaning},
	propagators::{PropRef, PropagationFunction, PropagatorState, Propagators, Triggers},
	proofs::{
		ProofError, ProofGranularity, ProofLevel, ProofLine, ProofOptions, ProofRepresentation,
	},
	search::{SolveCallbacks, Stats},
	state::{DomainChange, LitTruth, State, Timestamp},
};

/// Type alias for an integer value; wide enough to hold products of domain
/// bounds, with overflow being a programming error.
pub type IntVal = i64;

/// Type alias for a non-zero integer value.
pub type NonZeroIntVal = NonZeroI64;

/// Type alias for a set of integers, the input shape of a domain.
pub type IntSetVal = RangeList<IntVal>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A reference to an integer quantity the engine can reason about.
pub struct IntView(pub(crate) IntViewInner);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// The internal representation of an [`IntView`].
pub(crate) enum IntViewInner {
	/// A stored variable.
	VarRef(IntVarRef),
	/// A constant masquerading as a variable.
	Const(IntVal),
	/// An affine view (optional negation, then an offset) of a stored
	/// variable, used for negation and shift without copying state.
	Offset {
		/// The affine map applied to the variable.
		transform: ViewTransform,
		/// The stored variable underneath.
		var: IntVarRef,
	},
}

#[derive(Debug, Error)]
/// An error raised while a constraint is installed.
pub enum ModelError {
	/// The constraint was given arguments it cannot work with.
	#[error("constraint installed with invalid arguments: {0}")]
	Misuse(String),
	/// Proof output failed.
	#[error(transparent)]
	Proof(#[from] ProofError),
}

/// A constraint, as seen by the engine: something that contributes its
/// definition to the proof model and installs propagators.
pub trait Constraint {
	/// Install the constraint into the problem.
	fn install(self: Box<Self>, ctx: &mut InstallContext<'_>) -> Result<(), ModelError>;
}

/// The capabilities handed to a [`Constraint`] while it is installed.
#[derive(Debug)]
pub struct InstallContext<'a> {
	/// The search state, holding the initial domains.
	state: &'a mut State,
	/// The propagator registry.
	propagators: &'a mut Propagators,
	/// The proof being written, if any.
	proof: Option<&'a mut Proof>,
	/// Set when the model has been found contradictory.
	model_failed: &'a mut bool,
}

#[derive(Debug, Default)]
/// A problem instance: variables, constraints, and optionally a proof.
///
/// The `Problem` is the single owner of all solver state for the duration of
/// a solve; one `Problem` supports one call to [`Problem::solve`] or
/// [`Problem::solve_with`].
pub struct Problem {
	/// The search state.
	state: State,
	/// The propagator registry.
	propagators: Propagators,
	/// The proof, when proof logging was requested.
	proof: Option<Proof>,
	/// The view to minimise, if any.
	objective: Option<IntView>,
	/// Set when the model is known contradictory before search.
	model_failed: bool,
}

impl IntView {
	/// A view of a stored variable.
	pub(crate) fn from_ref(var: IntVarRef) -> Self {
		IntView(IntViewInner::VarRef(var))
	}

	/// A constant masquerading as a variable.
	pub fn constant(value: IntVal) -> Self {
		IntView(IntViewInner::Const(value))
	}

	/// The literal `self = v`.
	pub fn eq(&self, v: IntVal) -> Lit {
		match self.0 {
			IntViewInner::Const(c) => (c == v).into(),
			_ => Lit::Cond(Condition {
				var: *self,
				meaning: LitMeaning::Eq(v),
			}),
		}
	}

	/// The literal `self ≠ v`.
	pub fn ne(&self, v: IntVal) -> Lit {
		!self.eq(v)
	}

	/// The literal `self ≥ v`.
	pub fn geq(&self, v: IntVal) -> Lit {
		match self.0 {
			IntViewInner::Const(c) => (c >= v).into(),
			_ => Lit::Cond(Condition {
				var: *self,
				meaning: LitMeaning::GreaterEq(v),
			}),
		}
	}

	/// The literal `self > v`.
	pub fn gt(&self, v: IntVal) -> Lit {
		self.geq(v + 1)
	}

	/// The literal `self < v`.
	pub fn lt(&self, v: IntVal) -> Lit {
		!self.geq(v)
	}

	/// The literal `self ≤ v`.
	pub fn leq(&self, v: IntVal) -> Lit {
		self.lt(v + 1)
	}
}

impl Add<IntVal> for IntView {
	type Output = IntView;

	fn add(self, rhs: IntVal) -> Self::Output {
		if rhs == 0 {
			return self;
		}
		IntView(match self.0 {
			IntViewInner::VarRef(var) => IntViewInner::Offset {
				transform: ViewTransform::offset(rhs),
				var,
			},
			IntViewInner::Const(c) => IntViewInner::Const(c + rhs),
			IntViewInner::Offset { transform, var } => {
				let transform = transform + rhs;
				if transform.is_identity() {
					IntViewInner::VarRef(var)
				} else {
					IntViewInner::Offset { transform, var }
				}
			}
		})
	}
}

impl Sub<IntVal> for IntView {
	type Output = IntView;

	fn sub(self, rhs: IntVal) -> Self::Output {
		self + -rhs
	}
}

impl Neg for IntView {
	type Output = IntView;

	fn neg(self) -> Self::Output {
		IntView(match self.0 {
			IntViewInner::VarRef(var) => IntViewInner::Offset {
				transform: ViewTransform::negated(),
				var,
			},
			IntViewInner::Const(c) => IntViewInner::Const(-c),
			IntViewInner::Offset { transform, var } => {
				let transform = -transform;
				if transform.is_identity() {
					IntViewInner::VarRef(var)
				} else {
					IntViewInner::Offset { transform, var }
				}
			}
		})
	}
}

impl<'a> InstallContext<'a> {
	/// Read-only access to the search state and its initial domains.
	pub fn state(&self) -> &State {
		self.state
	}

	/// Whether a proof is being written.
	pub fn proving(&self) -> bool {
		self.proof.is_some()
	}

	/// Install a propagator with the given triggers; returns its index.
	pub fn install_propagator(
		&mut self,
		func: PropagationFunction,
		triggers: Triggers,
		name: &str,
	) -> PropRef {
		self.propagators.install(func, triggers, name)
	}

	/// Install a function that runs exactly once at proof start.
	pub fn install_initialiser(&mut self, func: PropagationFunction) {
		self.propagators.install_initialiser(func);
	}

	/// Contribute a pseudo-Boolean `≤` constraint to the proof model.
	pub fn define_pb_leq(&mut self, posting: &str, ineq: PbLeq) -> Option<ProofLine> {
		let proof = self.proof.as_deref_mut()?;
		proof.posting(posting);
		let line = proof.add_ineq(ineq, None);
		*self.model_failed |= proof.model_failed();
		line
	}

	/// Contribute a half-reified pseudo-Boolean `≤` constraint to the proof
	/// model: only the implication `reif → constraint` is defined.
	pub fn define_pb_leq_reif(
		&mut self,
		posting: &str,
		ineq: PbLeq,
		reif: &[ReifTerm],
	) -> Option<ProofLine> {
		let proof = self.proof.as_deref_mut()?;
		proof.posting(posting);
		proof.add_ineq(ineq, Some(reif))
	}

	/// Contribute a pseudo-Boolean equality (a pair of `≥` lines) to the
	/// proof model.
	pub fn define_pb_eq(
		&mut self,
		posting: &str,
		eq: PbEq,
	) -> (Option<ProofLine>, Option<ProofLine>) {
		let Some(proof) = self.proof.as_deref_mut() else {
			return (None, None);
		};
		proof.posting(posting);
		let lines = proof.add_eq(eq, None);
		*self.model_failed |= proof.model_failed();
		lines
	}

	/// Contribute an integer linear `≤` constraint to the proof model.
	pub fn define_linear_leq(&mut self, terms: &linear::Linear, rhs: IntVal) -> Option<ProofLine> {
		self.define_pb_leq(
			&format!("linear_leq {rhs}"),
			linear::linear_sum(terms).leq(rhs),
		)
	}

	/// Contribute an integer linear equality (a pair of `≥` lines) to the
	/// proof model.
	pub fn define_linear_eq(
		&mut self,
		terms: &linear::Linear,
		rhs: IntVal,
	) -> (Option<ProofLine>, Option<ProofLine>) {
		self.define_pb_eq(&format!("linear_eq {rhs}"), linear::linear_sum(terms).eq(rhs))
	}

	/// Contribute a clause to the proof model.
	pub fn define_cnf(&mut self, posting: &str, clause: &[Lit]) -> Option<ProofLine> {
		let proof = self.proof.as_deref_mut()?;
		proof.posting(posting);
		proof.add_cnf(clause)
	}

	/// Contribute an at-most-one constraint to the proof model.
	pub fn define_at_most_one(&mut self, posting: &str, lits: &[Lit]) -> Option<ProofLine> {
		let proof = self.proof.as_deref_mut()?;
		proof.posting(posting);
		proof.add_at_most_one(lits)
	}

	/// Record that the model is contradictory as stated.
	pub fn model_contradiction(&mut self, reason: &str) {
		debug!(reason, "model contradiction");
		*self.model_failed = true;
		if let Some(proof) = self.proof.as_deref_mut() {
			proof.add_model_contradiction(reason);
		}
	}

	/// Tighten a variable's lower bound at model time, contributing the bound
	/// to the proof model.
	pub fn trim_lower_bound(&mut self, var: IntView, val: IntVal, posting: &str) {
		if self.state.lower_bound(var) >= val {
			return;
		}
		let _ = self.define_cnf(posting, &[var.geq(val)]);
		if self.state.infer_lit(&var.geq(val)).is_err() {
			self.model_contradiction(posting);
		}
	}

	/// Tighten a variable's upper bound at model time, contributing the bound
	/// to the proof model.
	pub fn trim_upper_bound(&mut self, var: IntView, val: IntVal, posting: &str) {
		if self.state.upper_bound(var) <= val {
			return;
		}
		let _ = self.define_cnf(posting, &[var.leq(val)]);
		if self.state.infer_lit(&var.leq(val)).is_err() {
			self.model_contradiction(posting);
		}
	}

	/// Require the constraint saying a variable takes at least one of its
	/// values, introducing it (and any value literals it needs) on first use.
	///
	/// Returns the constraint's line, or `None` when no proof is being
	/// written or the view is a constant. Asking twice yields the same line.
	pub fn need_at_least_one(&mut self, var: IntView) -> Option<ProofLine> {
		let proof = self.proof.as_deref_mut()?;
		match var.0 {
			IntViewInner::Const(_) => None,
			IntViewInner::VarRef(v) | IntViewInner::Offset { var: v, .. } => {
				Some(proof.need_at_least_one(TrackedVar::Stored(v)))
			}
		}
	}

	/// Create a proof flag; returns `None` when no proof is being written.
	pub fn new_proof_flag(&mut self, name: Option<&str>) -> Option<ProofFlag> {
		Some(self.proof.as_deref_mut()?.new_flag(name))
	}

	/// Create an integer variable that exists only in the proof; returns
	/// `None` when no proof is being written.
	pub fn new_proof_only_var(
		&mut self,
		lb: IntVal,
		ub: IntVal,
		name: Option<&str>,
	) -> Option<ProofVarRef> {
		Some(self.proof.as_deref_mut()?.create_proof_only_var(
			lb,
			ub,
			name.map(str::to_owned),
		))
	}

	/// Create an auxiliary stored variable for the constraint's own use.
	pub fn new_auxiliary_var(&mut self, lb: IntVal, ub: IntVal, name: &str) -> IntView {
		let set = IntervalSet::new(lb, ub);
		let var = self.state.new_var(set.clone());
		if let Some(proof) = self.proof.as_deref_mut() {
			proof.track_new_var(var, &set, Some(name.to_owned()));
		}
		IntView::from_ref(var)
	}
}

impl Problem {
	/// An empty problem without proof logging.
	pub fn new() -> Self {
		Self::default()
	}

	/// An empty problem that writes a model file and a proof log.
	pub fn with_proof(options: ProofOptions) -> Result<Self, ProofError> {
		Ok(Self {
			proof: Some(Proof::new(options)?),
			..Self::default()
		})
	}

	/// Create an integer variable with the contiguous domain `[lb, ub]`.
	pub fn new_int_var(&mut self, lb: IntVal, ub: IntVal) -> IntView {
		self.new_var_inner(IntervalSet::new(lb, ub), None)
	}

	/// Create a named integer variable with the contiguous domain `[lb, ub]`.
	pub fn new_int_var_named(&mut self, lb: IntVal, ub: IntVal, name: &str) -> IntView {
		self.new_var_inner(IntervalSet::new(lb, ub), Some(name.to_owned()))
	}

	/// Create an integer variable with the given (possibly holey) domain.
	pub fn new_int_var_with_domain(&mut self, domain: &IntSetVal) -> IntView {
		self.new_var_inner(IntervalSet::from_ranges(domain), None)
	}

	/// Create a named integer variable with the given domain.
	pub fn new_int_var_with_domain_named(&mut self, domain: &IntSetVal, name: &str) -> IntView {
		self.new_var_inner(IntervalSet::from_ranges(domain), Some(name.to_owned()))
	}

	/// Create a variable, handling the empty-domain contradiction.
	fn new_var_inner(&mut self, set: IntervalSet, name: Option<String>) -> IntView {
		let set = if set.is_empty() {
			// an empty initial domain is a model-time contradiction; the
			// variable is given a placeholder domain so the rest of the
			// model can still be stated
			self.model_failed = true;
			if let Some(proof) = self.proof.as_mut() {
				proof.add_model_contradiction("variable with an empty domain");
			}
			IntervalSet::new(0, 0)
		} else {
			set
		};
		let var = self.state.new_var(set.clone());
		if let Some(proof) = self.proof.as_mut() {
			proof.track_new_var(var, &set, name);
		}
		IntView::from_ref(var)
	}

	/// Install a constraint.
	pub fn post(&mut self, constraint: impl Constraint + 'static) -> Result<(), ModelError> {
		let mut ctx = InstallContext {
			state: &mut self.state,
			propagators: &mut self.propagators,
			proof: self.proof.as_mut(),
			model_failed: &mut self.model_failed,
		};
		Box::new(constraint).install(&mut ctx)
	}

	/// Declare the view to minimise; each improving solution tightens the
	/// bound on it during the remaining search.
	pub fn minimise(&mut self, objective: IntView) {
		self.objective = Some(objective);
		if let Some(proof) = self.proof.as_mut() {
			proof.minimise(objective);
		}
	}

	/// Read-only access to the search state.
	pub fn state(&self) -> &State {
		&self.state
	}

	/// Solve, calling back on every solution; returning false from the
	/// callback stops the search.
	pub fn solve(
		&mut self,
		callback: impl FnMut(&State) -> bool + 'static,
	) -> Result<Stats, ProofError> {
		self.solve_with(
			SolveCallbacks {
				solution: Some(Box::new(callback)),
				..SolveCallbacks::default()
			},
			None,
		)
	}

	/// Solve with full control over callbacks, plus an optional cancellation
	/// flag polled between branches and before each propagator.
	pub fn solve_with(
		&mut self,
		mut callbacks: SolveCallbacks,
		abort: Option<&AtomicBool>,
	) -> Result<Stats, ProofError> {
		let start = Instant::now();
		let deadline = callbacks.timeout.map(|limit| start + limit);
		let mut stats = Stats {
			propagators: self.propagators.count(),
			..Stats::default()
		};

		let model_failed =
			self.model_failed || self.proof.as_ref().is_some_and(Proof::model_failed);

		if let Some(proof) = self.proof.as_mut() {
			proof.start_proof()?;
		}

		if model_failed {
			debug!("model is contradictory before search");
			if let Some(proof) = self.proof.as_mut() {
				proof.conclude_unsatisfiable()?;
			}
			stats.solve_time = start.elapsed();
			return Ok(stats);
		}

		if let Some(proof) = self.proof.as_mut() {
			if !self
				.propagators
				.run_initialisers(&mut self.state, Some(proof))?
			{
				proof.conclude_unsatisfiable()?;
				stats.solve_time = start.elapsed();
				return Ok(stats);
			}
			if let Some(after) = &mut callbacks.after_proof_started {
				after(&self.state);
			}
		}

		let mut ctx = SearchContext {
			state: &mut self.state,
			propagators: &mut self.propagators,
			proof: self.proof.as_mut(),
			callbacks: &mut callbacks,
			objective: self.objective,
			best: None,
			stats,
			abort,
			deadline,
			interrupted: false,
		};
		let completed = ctx.recurse(0)?;
		let best = ctx.best;
		let interrupted = ctx.interrupted;
		stats = ctx.stats;

		if let Some(proof) = self.proof.as_mut() {
			if interrupted {
				match (self.objective, best) {
					(Some(obj), Some(best)) => {
						proof.conclude_bounds(self.state.lower_bound(obj), best)?;
					}
					_ => proof.conclude_none()?,
				}
			} else if completed {
				if stats.solutions == 0 {
					proof.conclude_unsatisfiable()?;
				} else if let Some(best) = best.filter(|_| self.objective.is_some()) {
					proof.conclude_optimality(best)?;
				} else {
					proof.conclude_satisfiable()?;
				}
			} else {
				// the search was stopped by a callback
				match (self.objective, best) {
					(Some(obj), Some(best)) => {
						proof.conclude_bounds(self.state.lower_bound(obj), best)?;
					}
					_ => proof.conclude_satisfiable()?,
				}
			}
		}

		stats.propagations = self.propagators.propagation_count();
		stats.solve_time = start.elapsed();
		Ok(stats)
	}

	/// Direct access to the propagator registry, for tests that drive the
	/// fixed point by hand.
	#[cfg(test)]
	pub(crate) fn propagators_mut(&mut self) -> &mut Propagators {
		&mut self.propagators
	}

	/// Split the problem into the pieces the scheduler needs, for tests.
	#[cfg(test)]
	pub(crate) fn parts_for_test(&mut self) -> (&mut Propagators, &mut State) {
		(&mut self.propagators, &mut self.state)
	}

	/// Split the problem including the proof, for tests that drive the
	/// fixed point by hand while logging.
	#[cfg(test)]
	pub(crate) fn proof_parts_for_test(
		&mut self,
	) -> (&mut Propagators, &mut State, Option<&mut Proof>) {
		(&mut self.propagators, &mut self.state, self.proof.as_mut())
	}

	/// Finalise the model and write the proof header, for tests that inspect
	/// proof output without running a full solve.
	#[cfg(test)]
	pub(crate) fn start_proof_for_test(&mut self) -> Result<(), ProofError> {
		if let Some(proof) = self.proof.as_mut() {
			proof.start_proof()?;
		}
		Ok(())
	}

	/// The proof text buffered so far, for tests.
	#[cfg(test)]
	pub(crate) fn proof_text_for_test(&self) -> Option<String> {
		self.proof
			.as_ref()
			.map(|p| p.logger.buffered_text().to_owned())
	}

	/// Whether every proof line above the root level has been deleted.
	#[cfg(test)]
	pub(crate) fn proof_levels_clean_for_test(&self) -> bool {
		self.proof
			.as_ref()
			.is_none_or(|p| p.logger.levels_above_root_clean())
	}
}
