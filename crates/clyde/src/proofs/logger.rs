//! The proof log: every reasoning step the solver takes during search is
//! mirrored here in the cutting-planes pseudo-Boolean format.
//!
//! The logger owns proof-line numbering and the per-level deletion lists.
//! Levels form a stack that follows the search depth: entering a level
//! redirects tagging, forgetting a level emits the batched `del` instruction
//! for everything tagged at it. Lines at the top level are never deleted.

use std::{fmt::Write as _, fs, io::Write as _, path::PathBuf};

use itertools::Itertools;
use tracing::{debug, trace};

use crate::{
	inference::{Justification, Reason},
	proofs::{
		encoding::{EncodingTracker, PbLit, ProofSink, TrackedVar, XLiteral},
		pseudo_boolean::PbLeq,
		ProofError, ProofLevel, ProofLine,
	},
	state::State,
	IntVal, Lit,
};

#[derive(Debug)]
/// The proof log writer.
pub struct ProofLogger {
	/// Where the proof is written when it concludes.
	path: PathBuf,
	/// The buffered proof text.
	out: String,
	/// The identifier the next constraint-producing step will get.
	next_line: ProofLine,
	/// Whether the proof header has been written.
	started: bool,
	/// The level new `Current` lines are tagged at.
	active_level: usize,
	/// Lines to delete, per level.
	levels: Vec<Vec<ProofLine>>,
	/// Scratch lines to delete at the next opportunity.
	temporary: Vec<ProofLine>,
}

impl ProofLogger {
	/// Create the logger, truncating the proof file so that write problems
	/// surface before any search effort is spent.
	pub(crate) fn new(path: PathBuf) -> Result<Self, ProofError> {
		let _ = fs::File::create(&path)?;
		Ok(Self {
			path,
			out: String::new(),
			next_line: 0,
			started: false,
			active_level: 0,
			levels: vec![Vec::new()],
			temporary: Vec::new(),
		})
	}

	/// Switch from model writing to proof writing. Must be called exactly
	/// once, with the number of constraints in the finalised model.
	pub(crate) fn start_proof(&mut self, model_constraints: ProofLine) {
		debug_assert!(!self.started);
		self.started = true;
		self.next_line = model_constraints + 1;
		self.out.push_str("pseudo-Boolean proof version 2.0\n");
		writeln!(self.out, "f {model_constraints}").unwrap();
	}

	/// The level currently receiving `Current`-tagged lines.
	pub fn proof_level(&self) -> usize {
		self.active_level
	}

	/// Assign the next identifier and tag it for deletion per `level`.
	fn record(&mut self, level: ProofLevel) -> ProofLine {
		let id = self.next_line;
		self.next_line += 1;
		match level {
			ProofLevel::Top => {}
			ProofLevel::Current => self.levels[self.active_level].push(id),
			ProofLevel::At(depth) => {
				self.grow_to(depth);
				self.levels[depth].push(id);
			}
			ProofLevel::Temporary => self.temporary.push(id),
		}
		id
	}

	/// Make sure the level stack reaches `depth`.
	fn grow_to(&mut self, depth: usize) {
		while self.levels.len() <= depth {
			self.levels.push(Vec::new());
		}
	}

	/// Emit raw text as one proof step and return its identifier.
	pub fn emit_proof_line(&mut self, text: &str, level: ProofLevel) -> ProofLine {
		debug_assert!(self.started);
		self.out.push_str(text);
		self.out.push('\n');
		self.record(level)
	}

	/// Emit a comment; comments carry no identifier.
	pub fn emit_comment(&mut self, text: &str) {
		writeln!(self.out, "* {text}").unwrap();
	}

	/// Emit a reverse-unit-propagation step for a `>=`-form body.
	pub(crate) fn emit_rup_raw(&mut self, body: &str, level: ProofLevel) -> ProofLine {
		self.emit_proof_line(&format!("u {body}"), level)
	}

	/// Emit an assertion step for a `>=`-form body.
	pub(crate) fn emit_assert_raw(&mut self, body: &str, level: ProofLevel) -> ProofLine {
		self.emit_proof_line(&format!("a {body}"), level)
	}

	/// Emit a redundance step for a `>=`-form body with the given witness.
	pub(crate) fn emit_red_raw(
		&mut self,
		body: &str,
		witness: &str,
		level: ProofLevel,
	) -> ProofLine {
		self.emit_proof_line(&format!("red {body} {witness}"), level)
	}

	/// Emit a reverse-unit-propagation step for an expression.
	pub fn emit_rup_proof_line(
		&mut self,
		tracker: &mut EncodingTracker,
		ineq: &PbLeq,
		level: ProofLevel,
	) -> ProofLine {
		let body = tracker.format_ineq(&mut ProofSink::Log(self), ineq, None);
		self.emit_rup_raw(&body, level)
	}

	/// Emit an assertion step for an expression.
	pub fn emit_assert_proof_line(
		&mut self,
		tracker: &mut EncodingTracker,
		ineq: &PbLeq,
		level: ProofLevel,
	) -> ProofLine {
		let body = tracker.format_ineq(&mut ProofSink::Log(self), ineq, None);
		self.emit_assert_raw(&body, level)
	}

	/// Emit a redundance step for an expression, with a witness assigning the
	/// given literals.
	pub fn emit_red_proof_line(
		&mut self,
		tracker: &mut EncodingTracker,
		ineq: &PbLeq,
		witness: &[(XLiteral, bool)],
		level: ProofLevel,
	) -> ProofLine {
		let body = tracker.format_ineq(&mut ProofSink::Log(self), ineq, None);
		let witness_text = witness
			.iter()
			.map(|&(lit, value)| format!("{} -> {}", tracker.pb_string(lit), u8::from(value)))
			.join(" ");
		self.emit_red_raw(&body, &witness_text, level)
	}

	/// Emit a cutting-planes step combining earlier lines; `operations` is the
	/// reverse-polish sequence of identifiers and operators.
	pub fn emit_pol(&mut self, operations: &str, level: ProofLevel) -> ProofLine {
		self.emit_proof_line(&format!("pol {operations}"), level)
	}

	/// Emit the pair of redundance steps reifying an expression on a proof
	/// flag: `flag → ineq` and `¬flag → ¬ineq`.
	pub fn emit_red_proof_lines_reifying(
		&mut self,
		tracker: &mut EncodingTracker,
		ineq: &PbLeq,
		flag: crate::proofs::encoding::ProofFlag,
		level: ProofLevel,
	) -> (ProofLine, ProofLine) {
		use crate::proofs::pseudo_boolean::{PbSum, ReifTerm};

		let flag_name = tracker.pb_string(tracker.flag_lit(flag));
		let forward = tracker.format_ineq(
			&mut ProofSink::Log(self),
			ineq,
			Some(&[ReifTerm::Flag(flag)]),
		);
		let fwd = self.emit_red_raw(&forward, &format!("{flag_name} -> 0"), level);

		// the negation of `sum ≤ rhs` is `sum ≥ rhs + 1`
		let negated = PbSum(ineq.sum.0.clone()).geq(ineq.rhs + 1);
		let backward = tracker.format_ineq(
			&mut ProofSink::Log(self),
			&negated,
			Some(&[ReifTerm::Flag(!flag)]),
		);
		let bwd = self.emit_red_raw(&backward, &format!("{flag_name} -> 1"), level);
		(fwd, bwd)
	}

	/// Create a fresh proof flag and emit the redundance steps reifying it
	/// for the given expression.
	pub fn create_proof_flag_reifying(
		&mut self,
		tracker: &mut EncodingTracker,
		ineq: &PbLeq,
		name: Option<&str>,
		level: ProofLevel,
	) -> (crate::proofs::encoding::ProofFlag, ProofLine, ProofLine) {
		let flag = tracker.new_flag(name);
		let (fwd, bwd) = self.emit_red_proof_lines_reifying(tracker, ineq, flag, level);
		(flag, fwd, bwd)
	}

	/// Log, if the justification calls for it, that a literal has been
	/// inferred (or, when `contradicting`, that false has been derived).
	pub(crate) fn infer(
		&mut self,
		tracker: &mut EncodingTracker,
		state: &State,
		contradicting: bool,
		lit: &Lit,
		why: Justification,
		reason: &Reason,
	) -> Result<(), ProofError> {
		match why {
			Justification::NoJustificationNeeded => Ok(()),
			Justification::Rup => {
				let _ = self.emit_inference_clause("u", tracker, state, contradicting, lit, reason);
				Ok(())
			}
			Justification::Assertion => {
				let _ = self.emit_inference_clause("a", tracker, state, contradicting, lit, reason);
				Ok(())
			}
			Justification::Explicit(justify) => {
				// supporting lines are scratch work, deleted once the
				// conclusion is in place
				justify(self, tracker)?;
				let _ = self.emit_inference_clause("u", tracker, state, contradicting, lit, reason);
				Ok(())
			}
			Justification::ExplicitThenRup(justify) => {
				justify(self, tracker)?;
				let _ = self.emit_inference_clause("u", tracker, state, contradicting, lit, reason);
				Ok(())
			}
		}
	}

	/// Emit the clause `reasons → lit` (or `reasons → false`) as one step.
	fn emit_inference_clause(
		&mut self,
		rule: &str,
		tracker: &mut EncodingTracker,
		state: &State,
		contradicting: bool,
		lit: &Lit,
		reason: &Reason,
	) -> Option<ProofLine> {
		let mut body = String::new();
		for r in reason.to_lits(state) {
			match tracker.resolve_lit(&mut ProofSink::Log(self), &!r) {
				// a reason literal that is trivially true adds nothing
				PbLit::False => {}
				PbLit::True => {
					debug_assert!(false, "false literal used as a reason");
				}
				PbLit::X(x) => write!(body, "1 {} ", tracker.pb_string(x)).unwrap(),
			}
		}
		if !contradicting {
			match tracker.resolve_lit(&mut ProofSink::Log(self), lit) {
				// an inference of a trivial literal needs no proof step
				PbLit::True => return None,
				PbLit::False => {}
				PbLit::X(x) => write!(body, "1 {} ", tracker.pb_string(x)).unwrap(),
			}
		}
		body.push_str(">= 1 ;");
		trace!(rule, body = %body, "log inference");
		Some(self.emit_proof_line(&format!("{rule} {body}"), ProofLevel::Current))
	}

	/// Log that the current sequence of guesses is exhausted.
	pub(crate) fn log_backtrack(
		&mut self,
		tracker: &mut EncodingTracker,
		state: &State,
	) -> Option<ProofLine> {
		if state.guesses().is_empty() {
			return None;
		}
		let mut body = String::new();
		for guess in state.guesses() {
			match tracker.resolve_lit(&mut ProofSink::Log(self), &!guess.clone()) {
				PbLit::False => {}
				PbLit::True => return None,
				PbLit::X(x) => write!(body, "1 {} ", tracker.pb_string(x)).unwrap(),
			}
		}
		body.push_str(">= 1 ;");
		Some(self.emit_rup_raw(&body, ProofLevel::Current))
	}

	/// Log a solution. The implicit constraint added by the solution line
	/// (solution exclusion, or the objective improvement for `soli`) takes
	/// the next identifier at the top level; it is returned so the driver can
	/// cite it.
	pub(crate) fn solution(
		&mut self,
		tracker: &mut EncodingTracker,
		assignments: &[(TrackedVar, IntVal)],
		improving: bool,
	) -> ProofLine {
		let rule = if improving { "soli" } else { "solx" };
		let mut body = String::new();
		for &(var, value) in assignments {
			for lit in tracker.solution_lits(&mut ProofSink::Log(self), var, value) {
				write!(body, " {}", tracker.pb_string(lit)).unwrap();
			}
		}
		debug!(rule, "log solution");
		self.out.push_str(rule);
		self.out.push_str(&body);
		self.out.push('\n');
		self.record(ProofLevel::Top)
	}

	/// Start tagging `Current` lines at the given depth.
	pub(crate) fn enter_proof_level(&mut self, depth: usize) {
		self.grow_to(depth);
		self.active_level = depth;
	}

	/// Delete every line tagged at the given depth (and any scratch lines),
	/// most recent first.
	pub(crate) fn forget_proof_level(&mut self, depth: usize) {
		self.grow_to(depth);
		let mut doomed = std::mem::take(&mut self.levels[depth]);
		doomed.append(&mut self.temporary);
		if doomed.is_empty() {
			return;
		}
		doomed.reverse();
		let ids = doomed.iter().map(ProofLine::to_string).join(" ");
		writeln!(self.out, "del id {ids}").unwrap();
	}

	/// Emit the trailer for an unsatisfiable conclusion: the empty
	/// constraint, then the conclusion section.
	pub(crate) fn conclude_unsatisfiable(&mut self) -> Result<(), ProofError> {
		let contradiction = self.emit_rup_raw(">= 1 ;", ProofLevel::Top);
		self.out.push_str("output NONE\n");
		writeln!(self.out, "conclusion UNSAT : {contradiction}").unwrap();
		self.finish()
	}

	/// Emit the trailer after at least one solution of a decision problem.
	pub(crate) fn conclude_satisfiable(&mut self) -> Result<(), ProofError> {
		self.out.push_str("output NONE\n");
		self.out.push_str("conclusion SAT\n");
		self.finish()
	}

	/// Emit the trailer proving the given objective value optimal.
	pub(crate) fn conclude_optimality(&mut self, value: IntVal) -> Result<(), ProofError> {
		self.out.push_str("output NONE\n");
		writeln!(self.out, "conclusion BOUNDS {value} {value}").unwrap();
		self.finish()
	}

	/// Emit the trailer for an interrupted optimisation: the proved lower
	/// bound and the best solution found.
	pub(crate) fn conclude_bounds(&mut self, lower: IntVal, best: IntVal) -> Result<(), ProofError> {
		self.out.push_str("output NONE\n");
		writeln!(self.out, "conclusion BOUNDS {lower} {best}").unwrap();
		self.finish()
	}

	/// Emit the trailer of a proof that reached no conclusion; the log ends
	/// with an explicit incomplete mark.
	pub(crate) fn conclude_none(&mut self) -> Result<(), ProofError> {
		self.out.push_str("output NONE\n");
		self.out.push_str("conclusion NONE\n");
		self.finish()
	}

	/// Write the end marker and flush the buffered proof to disk.
	fn finish(&mut self) -> Result<(), ProofError> {
		self.out.push_str("end pseudo-Boolean proof\n");
		let mut file = fs::File::create(&self.path)?;
		file.write_all(self.out.as_bytes())?;
		Ok(())
	}

	/// The proof text buffered so far.
	#[cfg(test)]
	pub(crate) fn buffered_text(&self) -> &str {
		&self.out
	}

	/// Whether every line tagged above the root level has been deleted.
	#[cfg(test)]
	pub(crate) fn levels_above_root_clean(&self) -> bool {
		self.levels.iter().skip(1).all(Vec::is_empty) && self.temporary.is_empty()
	}
}
