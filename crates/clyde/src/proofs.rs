//! Proof logging in the cutting-planes pseudo-Boolean format.
//!
//! A solve that proves its work writes two files: the model (`.opb`), holding
//! the variable encodings and user constraints, and the proof log (`.pbp`),
//! holding one step per inference made during search plus the concluding
//! section. The [`Proof`] bundle owns the three cooperating pieces: the
//! [`encoding::EncodingTracker`] (the shared dictionary of raw literals), the
//! [`model::ProofModel`], and the [`logger::ProofLogger`]. The tracker is the
//! one shared object; the model and logger borrow it per call, so no
//! back-pointer cycles exist.

pub mod encoding;
pub mod logger;
pub mod model;
pub mod pseudo_boolean;

use std::{fmt::Write as _, path::PathBuf};

use itertools::Itertools;
use thiserror::Error;
use tracing::debug;

use crate::{
	inference::{Justification, Reason},
	interval_set::IntervalSet,
	proofs::{
		encoding::{EncodingTracker, ProofFlag, ProofSink, ProofVarRef, TrackedVar},
		logger::ProofLogger,
		model::ProofModel,
		pseudo_boolean::{sanitise, PbLeq, PbSum, PbTerm, ReifTerm},
	},
	state::{IntVarRef, State},
	IntVal, IntView, IntViewInner, Lit,
};

/// Identifies one line of the proof; model constraints occupy `1..=M` and
/// proof steps continue from `M + 1`.
pub type ProofLine = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Where a proof line lives in the deletion hierarchy.
pub enum ProofLevel {
	/// Never deleted.
	Top,
	/// Tagged at the level the logger is currently in.
	Current,
	/// Tagged at a specific search depth.
	At(usize),
	/// Scratch, deleted at the next opportunity.
	Temporary,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// How eagerly inferences are mirrored into the proof.
pub enum ProofGranularity {
	/// Log each inference with the current guess stack as its reason.
	Guesses,
	#[default]
	/// Log each inference with the reason supplied by its propagator.
	Reasons,
	/// Buffer steps and emit them only if the branch ends in contradiction.
	Lazy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
/// How an integer variable is represented in the proof files.
pub enum ProofRepresentation {
	#[default]
	/// A binary decomposition with positional coefficients.
	Bits,
	/// One 0/1 variable per domain value, with at-most-one and at-least-one
	/// constraints.
	DirectOnly,
}

#[derive(Clone, Debug)]
/// Configuration of proof output.
pub struct ProofOptions {
	/// Path prefix of the output files; `.opb` and `.pbp` are appended.
	pub name: PathBuf,
	/// Derive proof literal names from user variable names.
	pub use_friendly_names: bool,
	/// Force the direct (one literal per value) encoding for every variable.
	pub always_use_full_encoding: bool,
	/// How eagerly inferences are logged.
	pub granularity: ProofGranularity,
}

#[derive(Debug, Error)]
/// Things that can go wrong while producing a proof.
pub enum ProofError {
	/// The model or proof file could not be written.
	#[error("failed to write proof output: {0}")]
	Io(#[from] std::io::Error),
	/// A proof literal was requested that was never introduced.
	#[error("no proof literal has been introduced for `{0}`")]
	UnknownCondition(String),
}

#[derive(Debug)]
/// Everything proof-related, bundled under a single owner.
pub struct Proof {
	/// The proof configuration.
	options: ProofOptions,
	/// The shared dictionary of raw proof literals.
	pub(crate) tracker: EncodingTracker,
	/// The buffered model file.
	pub(crate) model: ProofModel,
	/// The proof log writer.
	pub(crate) logger: ProofLogger,
	/// Whether [`Proof::start_proof`] has run.
	started: bool,
	/// Set when the model itself has been found contradictory.
	model_contradiction: bool,
	/// Where the model file is written.
	opb_path: PathBuf,
}

impl ProofOptions {
	/// Options writing `<prefix>.opb` and `<prefix>.pbp`, with raw literal
	/// names, the bits encoding, and reason-based logging.
	pub fn new(prefix: impl Into<PathBuf>) -> Self {
		Self {
			name: prefix.into(),
			use_friendly_names: false,
			always_use_full_encoding: false,
			granularity: ProofGranularity::default(),
		}
	}
}

/// Append an extension to a path prefix without replacing anything.
fn suffixed(prefix: &PathBuf, ext: &str) -> PathBuf {
	let mut path = prefix.clone().into_os_string();
	path.push(ext);
	PathBuf::from(path)
}

impl Proof {
	/// Set up proof output with the given options; the output files are
	/// created immediately so that write problems surface early.
	pub(crate) fn new(options: ProofOptions) -> Result<Self, ProofError> {
		let opb_path = suffixed(&options.name, ".opb");
		let logger = ProofLogger::new(suffixed(&options.name, ".pbp"))?;
		Ok(Self {
			tracker: EncodingTracker::new(options.use_friendly_names),
			model: ProofModel::default(),
			logger,
			started: false,
			model_contradiction: false,
			opb_path,
			options,
		})
	}

	/// How eagerly inferences are logged.
	pub(crate) fn granularity(&self) -> ProofGranularity {
		self.options.granularity
	}

	/// Whether the model has been found contradictory while writing it.
	pub(crate) fn model_failed(&self) -> bool {
		self.model_contradiction
	}

	/// The encoding used for newly created variables.
	fn representation(&self) -> ProofRepresentation {
		if self.options.always_use_full_encoding {
			ProofRepresentation::DirectOnly
		} else {
			ProofRepresentation::Bits
		}
	}

	/// Track a freshly created stored variable and write its encoding into
	/// the model.
	pub(crate) fn track_new_var(
		&mut self,
		var: IntVarRef,
		set: &IntervalSet,
		name: Option<String>,
	) {
		self.tracker.track_stored(
			var,
			set.lower(),
			set.upper(),
			name,
			self.representation(),
		);
		self.setup_var(TrackedVar::Stored(var), set);
	}

	/// Create a variable that exists only in the proof, with contiguous
	/// bounds. Usable both while the model is written and inside the proof,
	/// where its encoding appears as redundance steps.
	pub(crate) fn create_proof_only_var(
		&mut self,
		lb: IntVal,
		ub: IntVal,
		name: Option<String>,
	) -> ProofVarRef {
		let var = self
			.tracker
			.track_proof_only(lb, ub, name, self.representation());
		self.setup_var(TrackedVar::ProofOnly(var), &IntervalSet::new(lb, ub));
		var
	}

	/// Emit the encoding of a tracked variable: bounds over the bits (or the
	/// direct encoding with its at-most-one and at-least-one clauses), plus
	/// an exclusion for every hole in the initial domain.
	fn setup_var(&mut self, var: TrackedVar, set: &IntervalSet) {
		let (lb, ub) = (set.lower(), set.upper());
		let stem = self.tracker.describe(var);
		let representation = self.tracker_representation(var);
		debug!(var = %stem, lb, ub, ?representation, "set up proof variable");
		if !self.started {
			self.model
				.emit_comment(&format!("variable {stem} in [{lb}, {ub}]"));
		}

		match representation {
			ProofRepresentation::Bits => {
				let bits = self.tracker.ensure_bits(var);
				let mut terms = bits.bit_lits.clone();
				if let Some(nb) = bits.negative {
					terms.push(nb);
				}

				let mut lower = String::new();
				let mut upper = String::new();
				for &(c, b) in &terms {
					let name = self.tracker.pb_string(b);
					write!(lower, "{c} {name} ").unwrap();
					write!(upper, "{} {name} ", -c).unwrap();
				}
				write!(lower, ">= {lb} ;").unwrap();
				write!(upper, ">= {} ;", -ub).unwrap();

				let witness_for = |tracker: &EncodingTracker, value: IntVal| {
					bits.lits_for_value(value)
						.into_iter()
						.map(|l| {
							let positive = encoding::XLiteral {
								id: l.id,
								negated: false,
							};
							format!(
								"{} -> {}",
								tracker.pb_string(positive),
								u8::from(!l.negated)
							)
						})
						.join(" ")
				};
				let lower_witness = witness_for(&self.tracker, lb);
				let upper_witness = witness_for(&self.tracker, ub);
				let mut sink = if self.started {
					ProofSink::Log(&mut self.logger)
				} else {
					ProofSink::Model(&mut self.model)
				};
				let _ = sink.emit_definition(lower, &lower_witness);
				let _ = sink.emit_definition(upper, &upper_witness);

				// holes in the initial domain: forbid each gap interval
				for (gap_lower, gap_upper) in set.gaps() {
					let mut sink = if self.started {
						ProofSink::Log(&mut self.logger)
					} else {
						ProofSink::Model(&mut self.model)
					};
					let below =
						self.tracker
							.lit_for(&mut sink, var, &crate::LitMeaning::Less(gap_lower));
					let above = self.tracker.lit_for(
						&mut sink,
						var,
						&crate::LitMeaning::GreaterEq(gap_upper + 1),
					);
					let mut clause = String::new();
					for atom in [below, above] {
						if let encoding::PbLit::X(x) = atom {
							write!(clause, "1 {} ", self.tracker.pb_string(x)).unwrap();
						}
					}
					clause.push_str(">= 1 ;");
					let mut sink = if self.started {
						ProofSink::Log(&mut self.logger)
					} else {
						ProofSink::Model(&mut self.model)
					};
					let _ = sink.emit_implied(clause);
				}
			}
			ProofRepresentation::DirectOnly => {
				let mut sink = if self.started {
					ProofSink::Log(&mut self.logger)
				} else {
					ProofSink::Model(&mut self.model)
				};
				let mut value_lits = Vec::new();
				for v in lb..=ub {
					match self.tracker.lit_for(&mut sink, var, &crate::LitMeaning::Eq(v)) {
						encoding::PbLit::X(x) => value_lits.push((v, x)),
						// a single-value variable needs no clauses
						_ => return,
					}
				}

				let mut at_least = String::new();
				let mut at_most = String::new();
				for &(_, x) in &value_lits {
					write!(at_least, "1 {} ", self.tracker.pb_string(x)).unwrap();
					write!(at_most, "-1 {} ", self.tracker.pb_string(x)).unwrap();
				}
				at_least.push_str(">= 1 ;");
				write!(at_most, ">= -1 ;").unwrap();

				let one_hot = format!("{} -> 1", self.tracker.pb_string(value_lits[0].1));
				let alo = sink.emit_definition(at_least, &one_hot);
				let all_zero = value_lits
					.iter()
					.map(|&(v, x)| {
						format!(
							"{} -> {}",
							self.tracker.pb_string(x),
							u8::from(v == lb)
						)
					})
					.join(" ");
				let _ = sink.emit_definition(at_most, &all_zero);
				self.tracker.record_at_least_one(var, alo);

				// values inside gaps are excluded outright
				for (gap_lower, gap_upper) in set.gaps() {
					for v in gap_lower..=gap_upper {
						if let Some(&(_, x)) =
							value_lits.iter().find(|&&(value, _)| value == v)
						{
							let _ = sink.emit_implied(format!(
								"1 {} >= 1 ;",
								self.tracker.pb_string(!x)
							));
						}
					}
				}
			}
		}
	}

	/// The representation a tracked variable was created with.
	fn tracker_representation(&self, var: TrackedVar) -> ProofRepresentation {
		self.tracker.representation_of(var)
	}

	/// Emit a comment ahead of a constraint definition.
	pub(crate) fn posting(&mut self, text: &str) {
		if self.started {
			self.logger.emit_comment(&format!("posting: {text}"));
		} else {
			self.model.posting(text);
		}
	}

	/// Whether a less-or-equal constraint can never hold given the tracked
	/// variable bounds.
	fn trivially_false(&self, ineq: &PbLeq) -> bool {
		let mut min_lhs: IntVal = 0;
		for &(w, ref term) in &ineq.sum.0 {
			match term {
				PbTerm::Lit(_) | PbTerm::Flag(_) | PbTerm::ProofCond(_) => {
					min_lhs += w.min(0);
				}
				PbTerm::Int(view) => match view.0 {
					IntViewInner::Const(c) => min_lhs += w * c,
					IntViewInner::VarRef(v) => {
						let (lb, ub) = self.tracker.bounds(TrackedVar::Stored(v));
						min_lhs += (w * lb).min(w * ub);
					}
					IntViewInner::Offset { transform, var } => {
						let (lb, ub) = self.tracker.bounds(TrackedVar::Stored(var));
						let (a, b) = (transform.transform(lb), transform.transform(ub));
						min_lhs += (w * a).min(w * b);
					}
				},
				PbTerm::ProofInt(p) => {
					let (lb, ub) = self.tracker.bounds(TrackedVar::ProofOnly(*p));
					min_lhs += (w * lb).min(w * ub);
				}
			}
		}
		min_lhs > ineq.rhs
	}

	/// Add a pseudo-Boolean less-or-equal constraint to the model, optionally
	/// half-reified on a conjunction of literals and flags.
	///
	/// Returns the constraint's identifier, or `None` when the constraint is
	/// trivially satisfied and nothing was written.
	pub(crate) fn add_ineq(
		&mut self,
		mut ineq: PbLeq,
		half_reif: Option<&[ReifTerm]>,
	) -> Option<ProofLine> {
		debug_assert!(!self.started, "model constraints must precede the proof");
		if !sanitise(&mut ineq) {
			return None;
		}
		if half_reif.is_none() && self.trivially_false(&ineq) {
			// unsatisfiable at model time: append the contradiction itself
			self.model_contradiction = true;
		}
		self.tracker
			.need_all_names_in(&mut ProofSink::Model(&mut self.model), &ineq.sum);
		let body = self.tracker.format_ineq(
			&mut ProofSink::Model(&mut self.model),
			&ineq,
			half_reif,
		);
		Some(self.model.add_line(body))
	}

	/// Add an equality as a pair of less-or-equal constraints.
	pub(crate) fn add_eq(
		&mut self,
		eq: pseudo_boolean::PbEq,
		half_reif: Option<&[ReifTerm]>,
	) -> (Option<ProofLine>, Option<ProofLine>) {
		let le = PbLeq {
			sum: eq.sum.clone(),
			rhs: eq.rhs,
		};
		let ge = PbSum(eq.sum.0.clone()).geq(eq.rhs);
		(self.add_ineq(le, half_reif), self.add_ineq(ge, half_reif))
	}

	/// Add a clause to the model.
	pub(crate) fn add_cnf(&mut self, clause: &[Lit]) -> Option<ProofLine> {
		let sum: PbSum = clause
			.iter()
			.map(|l| (1, PbTerm::Lit(l.clone())))
			.collect();
		self.add_ineq(sum.geq(1), None)
	}

	/// Add an at-most-one constraint over the given literals to the model.
	pub(crate) fn add_at_most_one(&mut self, lits: &[Lit]) -> Option<ProofLine> {
		let sum: PbSum = lits.iter().map(|l| (1, PbTerm::Lit(l.clone()))).collect();
		self.add_ineq(sum.leq(1), None)
	}

	/// Append an explicit contradiction to the model.
	pub(crate) fn add_model_contradiction(&mut self, reason: &str) {
		self.posting(reason);
		self.model_contradiction = true;
		let _ = self.model.add_line(">= 1 ;".to_owned());
	}

	/// Record that the given view is to be minimised.
	pub(crate) fn minimise(&mut self, objective: IntView) {
		let mut sink = ProofSink::Model(&mut self.model);
		let mut terms = String::new();
		match objective.0 {
			IntViewInner::Const(_) => {}
			IntViewInner::VarRef(v) => {
				for (c, b) in self.tracker.enc_terms(TrackedVar::Stored(v), &mut sink) {
					write!(terms, "{c} {} ", self.tracker.pb_string(b)).unwrap();
				}
			}
			IntViewInner::Offset { transform, var } => {
				// the constant offset shifts every value equally and is left
				// out of the objective function
				let scale = if transform.negate { -1 } else { 1 };
				for (c, b) in self.tracker.enc_terms(TrackedVar::Stored(var), &mut sink) {
					write!(terms, "{} {} ", scale * c, self.tracker.pb_string(b)).unwrap();
				}
			}
		}
		let trimmed = terms.trim_end().to_owned();
		self.model.set_objective(trimmed);
	}

	/// Create a fresh proof flag.
	pub(crate) fn new_flag(&mut self, name: Option<&str>) -> ProofFlag {
		self.tracker.new_flag(name)
	}

	/// The constraint saying a tracked variable takes at least one of its
	/// values, introduced on first use and cached afterwards.
	pub(crate) fn need_at_least_one(&mut self, var: TrackedVar) -> ProofLine {
		let mut sink = if self.started {
			ProofSink::Log(&mut self.logger)
		} else {
			ProofSink::Model(&mut self.model)
		};
		self.tracker.at_least_one(&mut sink, var)
	}

	/// Finalise the model, write the `.opb` file, and switch every later
	/// emission to the proof log. Must be called exactly once, before search.
	pub(crate) fn start_proof(&mut self) -> Result<(), ProofError> {
		debug_assert!(!self.started);
		self.model.finalise();
		self.model
			.write(&self.opb_path, self.tracker.variable_count())?;
		self.logger.start_proof(self.model.number_of_constraints());
		self.started = true;
		Ok(())
	}

	/// Log an inference made during search.
	pub(crate) fn log_inference(
		&mut self,
		state: &State,
		contradicting: bool,
		lit: &Lit,
		why: Justification,
		reason: &Reason,
	) -> Result<(), ProofError> {
		self.logger
			.infer(&mut self.tracker, state, contradicting, lit, why, reason)
	}

	/// Log a solution; every stored variable is recorded at its current
	/// lower bound (its value, once fixed). Returns the identifier of the
	/// implicit constraint the solution line adds.
	pub(crate) fn log_solution(&mut self, state: &State, improving: bool) -> ProofLine {
		let assignments: Vec<(TrackedVar, IntVal)> = (0..state.var_count())
			.map(IntVarRef::from)
			.map(|v| (TrackedVar::Stored(v), state.store.set(v).lower()))
			.collect();
		self.logger
			.solution(&mut self.tracker, &assignments, improving)
	}

	/// Log that the current guess sequence is exhausted.
	pub(crate) fn log_backtrack(&mut self, state: &State) {
		let _ = self.logger.log_backtrack(&mut self.tracker, state);
	}

	/// Start tagging proof lines at the given depth.
	pub(crate) fn enter_level(&mut self, depth: usize) {
		self.logger.enter_proof_level(depth);
	}

	/// Delete every proof line tagged at the given depth.
	pub(crate) fn forget_level(&mut self, depth: usize) {
		self.logger.forget_proof_level(depth);
	}

	/// Conclude: no solution exists.
	pub(crate) fn conclude_unsatisfiable(&mut self) -> Result<(), ProofError> {
		self.logger.conclude_unsatisfiable()
	}

	/// Conclude: at least one solution was found (decision problem).
	pub(crate) fn conclude_satisfiable(&mut self) -> Result<(), ProofError> {
		self.logger.conclude_satisfiable()
	}

	/// Conclude: the given objective value is optimal.
	pub(crate) fn conclude_optimality(&mut self, value: IntVal) -> Result<(), ProofError> {
		self.logger.conclude_optimality(value)
	}

	/// Conclude with bounds for an interrupted optimisation.
	pub(crate) fn conclude_bounds(&mut self, lower: IntVal, best: IntVal) -> Result<(), ProofError> {
		self.logger.conclude_bounds(lower, best)
	}

	/// Conclude without a verdict (cancellation or timeout).
	pub(crate) fn conclude_none(&mut self) -> Result<(), ProofError> {
		self.logger.conclude_none()
	}
}
