//! The plumbing between propagators, the domain store, and the proof log.
//!
//! Every inference a propagator makes goes through an [`InferenceTracker`],
//! which applies it to the [`State`] and, when a proof is being produced,
//! makes sure a matching proof step is emitted (or buffered, in the lazy
//! flavour). Propagators signal contradiction by returning [`Failure`],
//! which unwinds to the scheduler through the ordinary `?` channel.

use std::fmt;

use delegate::delegate;
use thiserror::Error;
use tracing::trace;

use crate::{
	proofs::{encoding::EncodingTracker, logger::ProofLogger, Proof, ProofError, ProofGranularity},
	state::{DomainChange, EmptyDomain, LitTruth, State},
	IntVal, IntView, Lit,
};

/// A closure that writes arbitrary supporting proof steps for an inference.
///
/// The closure receives the proof logger and the encoding tracker, and may
/// emit any derivation it likes before the logger writes the concluding step.
pub type ExplicitJustification =
	Box<dyn FnOnce(&mut ProofLogger, &mut EncodingTracker) -> Result<(), ProofError>>;

/// How an inference is to be justified in the proof log.
pub enum Justification {
	/// The fact follows from the model alone; no proof step is written.
	NoJustificationNeeded,
	/// The verifier reconstructs the inference by reverse unit propagation
	/// over the accumulated constraints.
	Rup,
	/// Like [`Justification::Rup`], but marked as self-evident from the
	/// arithmetic encoding.
	Assertion,
	/// The propagator supplies the supporting derivation itself; the
	/// supporting lines are treated as scratch work and deleted once the
	/// conclusion is in place.
	Explicit(ExplicitJustification),
	/// Explicit supporting lines that remain live at the current proof
	/// level, followed by a reverse-unit-propagation conclusion.
	ExplicitThenRup(ExplicitJustification),
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// The set of literals that, together with the constraint, forces an
/// inference.
pub enum Reason {
	/// A single literal.
	Simple(Lit),
	/// A conjunction of literals.
	Eager(Box<[Lit]>),
	/// Use the guess stack at the moment the proof step is written.
	Guesses,
}

/// A value that can lazily produce a [`Reason`].
///
/// Trackers only invoke [`ReasonBuilder::build_reason`] when a proof step is
/// actually going to be written, so propagators can pass closures whose work
/// is skipped entirely when proofs are off.
pub trait ReasonBuilder {
	/// Construct the reason against the current state.
	fn build_reason(self, state: &State) -> Reason;
}

#[derive(Debug, Error)]
/// The error channel through which propagation unwinds.
pub enum Failure {
	/// A propagator inferred false; the search should backtrack.
	#[error("propagation failed")]
	Conflict,
	/// Something went wrong writing the proof; the solve is abandoned.
	#[error(transparent)]
	Proof(#[from] ProofError),
}

/// A proof step buffered by the lazy proof-generation flavour.
///
/// The step is only written if the branch it belongs to ends in a
/// contradiction; backtracking discards it.
pub(crate) struct PendingStep {
	/// The literal that was inferred.
	pub(crate) lit: Lit,
	/// How the inference is to be justified.
	pub(crate) why: Justification,
	/// The reason literals for the inference.
	pub(crate) reason: Reason,
}

#[derive(Debug)]
/// The adapter handed to every propagator invocation.
///
/// Routes each inference to the domain store and, when proving, to the proof
/// logger with the correct justification and reason. Which of the four
/// flavours is active follows from the proof configuration: no proof at all
/// (simple), log with the guess stack as reason, log with the supplied
/// reason, or buffer for lazy emission.
pub struct InferenceTracker<'a> {
	/// The search state being strengthened.
	pub(crate) state: &'a mut State,
	/// The proof being written, if any.
	pub(crate) proof: Option<&'a mut Proof>,
}

impl fmt::Debug for Justification {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Justification::NoJustificationNeeded => write!(f, "NoJustificationNeeded"),
			Justification::Rup => write!(f, "Rup"),
			Justification::Assertion => write!(f, "Assertion"),
			Justification::Explicit(_) => write!(f, "Explicit(..)"),
			Justification::ExplicitThenRup(_) => write!(f, "ExplicitThenRup(..)"),
		}
	}
}

impl fmt::Debug for PendingStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PendingStep")
			.field("lit", &self.lit)
			.field("why", &self.why)
			.field("reason", &self.reason)
			.finish()
	}
}

impl Reason {
	/// The reason with no literals at all: the inference follows from the
	/// constraints alone.
	pub fn empty() -> Reason {
		Reason::Eager(Box::new([]))
	}

	/// Resolve the reason to its literals against the given state.
	pub(crate) fn to_lits(&self, state: &State) -> Vec<Lit> {
		match self {
			Reason::Simple(lit) => vec![lit.clone()],
			Reason::Eager(lits) => lits.to_vec(),
			Reason::Guesses => state.guesses().to_vec(),
		}
	}
}

impl ReasonBuilder for Reason {
	fn build_reason(self, _: &State) -> Reason {
		self
	}
}

impl ReasonBuilder for Lit {
	fn build_reason(self, _: &State) -> Reason {
		Reason::Simple(self)
	}
}

impl ReasonBuilder for Vec<Lit> {
	fn build_reason(self, _: &State) -> Reason {
		Reason::Eager(self.into_boxed_slice())
	}
}

impl ReasonBuilder for &[Lit] {
	fn build_reason(self, _: &State) -> Reason {
		Reason::Eager(self.into())
	}
}

impl<F, I> ReasonBuilder for F
where
	F: FnOnce(&State) -> I,
	I: IntoIterator<Item = Lit>,
{
	fn build_reason(self, state: &State) -> Reason {
		Reason::Eager(self(state).into_iter().collect())
	}
}

impl<'a> InferenceTracker<'a> {
	/// Create a tracker over the given state and optional proof.
	pub(crate) fn new(state: &'a mut State, proof: Option<&'a mut Proof>) -> Self {
		Self { state, proof }
	}

	delegate! {
		to self.state {
			/// The smallest value the view can still take.
			pub fn lower_bound(&self, var: IntView) -> IntVal;
			/// The largest value the view can still take.
			pub fn upper_bound(&self, var: IntView) -> IntVal;
			/// Both bounds of the view.
			pub fn bounds(&self, var: IntView) -> (IntVal, IntVal);
			/// Whether the view can still take the value `val`.
			pub fn in_domain(&self, var: IntView, val: IntVal) -> bool;
			/// The number of values the view can still take.
			pub fn domain_size(&self, var: IntView) -> IntVal;
			/// Whether the view's domain has holes.
			pub fn domain_has_holes(&self, var: IntView) -> bool;
			/// The unique remaining value of the view, if fixed.
			pub fn optional_single_value(&self, var: IntView) -> Option<IntVal>;
			/// Whether the view has been fixed to a single value.
			pub fn has_single_value(&self, var: IntView) -> bool;
			/// What the current domain says about the truth of a literal.
			pub fn test_literal(&self, lit: &Lit) -> LitTruth;
			/// Whether the literal could still hold under the current domains.
			pub fn literal_is_nonfalsified(&self, lit: &Lit) -> bool;
			/// Call `f` for every value of the view, in increasing order.
			pub fn for_each_value(&self, var: IntView, f: impl FnMut(IntVal));
			/// Early-exit value enumeration; returns whether it completed.
			pub fn for_each_value_while(&self, var: IntView, f: impl FnMut(IntVal) -> bool) -> bool;
		}
	}

	/// Read-only access to the full search state.
	pub fn state(&self) -> &State {
		self.state
	}

	/// Infer an arbitrary literal.
	pub fn infer(
		&mut self,
		lit: Lit,
		why: Justification,
		reason: impl ReasonBuilder,
	) -> Result<(), Failure> {
		let result = self.state.infer_lit(&lit);
		self.track(lit, result, why, reason)
	}

	/// Infer that a view takes the value `val`.
	pub fn infer_equal(
		&mut self,
		var: IntView,
		val: IntVal,
		why: Justification,
		reason: impl ReasonBuilder,
	) -> Result<(), Failure> {
		self.infer(var.eq(val), why, reason)
	}

	/// Infer that a view cannot take the value `val`.
	pub fn infer_not_equal(
		&mut self,
		var: IntView,
		val: IntVal,
		why: Justification,
		reason: impl ReasonBuilder,
	) -> Result<(), Failure> {
		self.infer(var.ne(val), why, reason)
	}

	/// Infer that a view is at least `val`.
	pub fn infer_greater_eq(
		&mut self,
		var: IntView,
		val: IntVal,
		why: Justification,
		reason: impl ReasonBuilder,
	) -> Result<(), Failure> {
		self.infer(var.geq(val), why, reason)
	}

	/// Infer that a view is strictly below `val`.
	pub fn infer_less_than(
		&mut self,
		var: IntView,
		val: IntVal,
		why: Justification,
		reason: impl ReasonBuilder,
	) -> Result<(), Failure> {
		self.infer(var.lt(val), why, reason)
	}

	/// Infer a set of literals sharing one justification.
	///
	/// An explicit justification is only written for the first literal; the
	/// remaining literals are concluded by reverse unit propagation against
	/// it.
	pub fn infer_all(
		&mut self,
		lits: Vec<Lit>,
		why: Justification,
		reason: impl ReasonBuilder + Clone,
	) -> Result<(), Failure> {
		// an explicit derivation is only written once; the remaining
		// literals follow from it by reverse unit propagation
		let rest = match &why {
			Justification::NoJustificationNeeded => Justification::NoJustificationNeeded,
			Justification::Assertion => Justification::Assertion,
			Justification::Rup
			| Justification::Explicit(_)
			| Justification::ExplicitThenRup(_) => Justification::Rup,
		};
		let mut first = Some(why);
		for lit in lits {
			let w = match first.take() {
				Some(w) => w,
				None => match &rest {
					Justification::NoJustificationNeeded => Justification::NoJustificationNeeded,
					Justification::Assertion => Justification::Assertion,
					_ => Justification::Rup,
				},
			};
			self.infer(lit, w, reason.clone())?;
		}
		Ok(())
	}

	/// Record that the propagator has derived false, and return the failure
	/// to unwind with.
	pub fn infer_false(&mut self, why: Justification, reason: impl ReasonBuilder) -> Failure {
		trace!("inferred false");
		match self.log(true, Lit::False, why, reason) {
			Ok(()) => Failure::Conflict,
			Err(e) => Failure::Proof(e),
		}
	}

	/// Route the outcome of a store update to the proof.
	fn track(
		&mut self,
		lit: Lit,
		result: Result<DomainChange, EmptyDomain>,
		why: Justification,
		reason: impl ReasonBuilder,
	) -> Result<(), Failure> {
		match result {
			Ok(DomainChange::Unchanged) => Ok(()),
			Ok(how) => {
				trace!(lit = %lit, ?how, "inferred");
				self.log(false, lit, why, reason)?;
				Ok(())
			}
			Err(EmptyDomain) => {
				trace!(lit = %lit, "inference wiped domain");
				self.log(true, lit, why, reason)?;
				Err(Failure::Conflict)
			}
		}
	}

	/// Write (or buffer) the proof step for an inference.
	fn log(
		&mut self,
		contradicting: bool,
		lit: Lit,
		why: Justification,
		reason: impl ReasonBuilder,
	) -> Result<(), ProofError> {
		let Some(proof) = self.proof.as_deref_mut() else {
			return Ok(());
		};
		match proof.granularity() {
			ProofGranularity::Guesses => {
				proof.log_inference(self.state, contradicting, &lit, why, &Reason::Guesses)
			}
			ProofGranularity::Reasons => {
				let reason = reason.build_reason(self.state);
				proof.log_inference(self.state, contradicting, &lit, why, &reason)
			}
			ProofGranularity::Lazy => {
				let reason = reason.build_reason(self.state);
				if contradicting {
					// the branch is used in a contradiction, so the buffered
					// steps become part of the proof
					let pending = std::mem::take(&mut self.state.pending);
					for step in pending {
						proof.log_inference(self.state, false, &step.lit, step.why, &step.reason)?;
					}
					proof.log_inference(self.state, true, &lit, why, &reason)
				} else {
					self.state.pending.push(PendingStep { lit, why, reason });
					Ok(())
				}
			}
		}
	}
}
