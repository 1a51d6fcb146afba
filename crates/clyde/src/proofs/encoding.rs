//! The shared dictionary between semantic conditions and raw proof literals.
//!
//! Both the model writer and the proof logger need to talk about conditions
//! like `x ≥ v` in terms of the 0/1 variables that actually appear in the
//! files. This tracker owns that bijection: it allocates raw literals, emits
//! their defining constraints exactly once (into the model while the model is
//! being written, as redundance steps inside the proof afterwards), and
//! guarantees that the same condition always resolves to the same literal.

use std::{collections::BTreeMap, fmt::Write, ops::Not};

use index_vec::IndexVec;
use tracing::trace;

use crate::{
	lit::{LitMeaning, SimpleLit},
	proofs::{
		logger::ProofLogger,
		model::ProofModel,
		pseudo_boolean::{PbLeq, PbSum, PbTerm, ReifTerm},
		ProofError, ProofLevel, ProofLine, ProofRepresentation,
	},
	state::IntVarRef,
	IntVal, IntViewInner, Lit,
};

index_vec::define_index_type! {
	/// Identifies an integer variable that exists only in the proof log.
	pub struct ProofVarRef = u32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// The lowest level of a raw 0/1 literal as it appears in the model file or
/// the proof log.
pub struct XLiteral {
	/// The allocation index of the underlying proof variable.
	pub(crate) id: u64,
	/// Whether the literal is the negation of the variable.
	pub(crate) negated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A Boolean used inside the proof like a variable, never part of the user
/// model. Used to name conjunctions and reifications.
pub struct ProofFlag {
	/// The allocation index of the flag.
	pub(crate) index: u32,
	/// The polarity of this occurrence.
	pub(crate) positive: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// A stored variable or a proof-only variable; the key space of the tracker.
pub enum TrackedVar {
	/// A variable with state in the domain store.
	Stored(IntVarRef),
	/// A variable that exists only in the proof.
	ProofOnly(ProofVarRef),
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A condition resolved against the tracked bounds of its variable.
pub enum PbLit {
	/// The condition always holds.
	True,
	/// The condition never holds.
	False,
	/// The condition is named by this raw literal.
	X(XLiteral),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// The bit decomposition of a tracked variable.
pub(crate) struct Bits {
	/// The positive bits, as `(coefficient, literal)` with ascending powers
	/// of two.
	pub(crate) bit_lits: Vec<(IntVal, XLiteral)>,
	/// The negative most-significant bit, if the range includes negatives.
	pub(crate) negative: Option<(IntVal, XLiteral)>,
}

#[derive(Clone, Debug)]
/// Everything the tracker knows about one integer variable.
struct VarData {
	/// The display stem used to build friendly literal names.
	stem: String,
	/// The bounds the variable had at model time.
	bounds: (IntVal, IntVal),
	/// How the variable is represented in the proof.
	representation: ProofRepresentation,
	/// The bit decomposition, once allocated.
	bits: Option<Bits>,
	/// Known order literals `x ≥ v`, with the proof lines defining them.
	gevars: BTreeMap<IntVal, (XLiteral, ProofLine, ProofLine)>,
	/// Known value literals `x = v`.
	eqvars: BTreeMap<IntVal, XLiteral>,
	/// The at-least-one-value constraint, once emitted.
	at_least_one: Option<ProofLine>,
}

#[derive(Debug)]
/// Where defining constraints for lazily introduced literals go.
///
/// While the model is being written, introductions are ordinary model
/// constraints; once the proof has started they become redundance steps that
/// do not change the set of solutions.
pub(crate) enum ProofSink<'a> {
	/// Emit into the model file.
	Model(&'a mut ProofModel),
	/// Emit into the proof log.
	Log(&'a mut ProofLogger),
}

#[derive(Debug)]
/// The tracker state: allocation of raw literals and the semantics attached
/// to each.
pub struct EncodingTracker {
	/// Whether literal names are derived from user variable names.
	use_friendly_names: bool,
	/// The next raw variable id; allocation is contiguous, starting at 1.
	next_id: u64,
	/// The name of every allocated variable, by id (1-based).
	names: Vec<String>,
	/// Data for stored variables, in creation order.
	stored: IndexVec<IntVarRef, VarData>,
	/// Data for proof-only variables, in creation order.
	proof_only: IndexVec<ProofVarRef, VarData>,
	/// The raw literal behind each allocated proof flag.
	flags: Vec<XLiteral>,
}

impl Not for XLiteral {
	type Output = XLiteral;

	fn not(self) -> Self::Output {
		XLiteral {
			id: self.id,
			negated: !self.negated,
		}
	}
}

impl Not for ProofFlag {
	type Output = ProofFlag;

	fn not(self) -> Self::Output {
		ProofFlag {
			index: self.index,
			positive: !self.positive,
		}
	}
}

impl Not for PbLit {
	type Output = PbLit;

	fn not(self) -> Self::Output {
		match self {
			PbLit::True => PbLit::False,
			PbLit::False => PbLit::True,
			PbLit::X(x) => PbLit::X(!x),
		}
	}
}

impl Bits {
	/// The number of bits and the negative-bit coefficient covering the
	/// closed range `[lb, ub]`.
	///
	/// The positive bits are `2^0 .. 2^n` for the smallest `n` such that
	/// `2^(n+1) - 1` reaches the largest magnitude needed; the negative bit
	/// has coefficient `-2^(n+1)` and exists exactly when `lb` is negative.
	pub(crate) fn coeffs_for(lb: IntVal, ub: IntVal) -> (u32, IntVal) {
		let largest = ub.max(if lb < 0 { -lb - 1 } else { 0 }).max(0);
		let mut n = 0_u32;
		while (1_i64 << (n + 1)) - 1 < largest {
			n += 1;
		}
		let neg = if lb < 0 { -(1_i64 << (n + 1)) } else { 0 };
		(n + 1, neg)
	}

	/// The smallest value the decomposition can represent.
	fn min_sum(&self) -> IntVal {
		self.negative.map_or(0, |(c, _)| c)
	}

	/// All weighted literals, including the negative bit.
	fn terms(&self) -> Vec<(IntVal, XLiteral)> {
		let mut out = self.bit_lits.clone();
		if let Some(nb) = self.negative {
			out.push(nb);
		}
		out
	}

	/// The literal polarities that make the decomposition equal `value`.
	pub(crate) fn lits_for_value(&self, value: IntVal) -> Vec<XLiteral> {
		let mut out = Vec::with_capacity(self.bit_lits.len() + 1);
		let mut rem = value;
		if let Some((coeff, lit)) = self.negative {
			if value < 0 {
				rem = value - coeff;
				out.push(lit);
			} else {
				out.push(!lit);
			}
		}
		debug_assert!(rem >= 0);
		for (i, &(_, lit)) in self.bit_lits.iter().enumerate() {
			if (rem >> i) & 1 == 1 {
				out.push(lit);
			} else {
				out.push(!lit);
			}
		}
		out
	}
}

impl ProofSink<'_> {
	/// Emit the defining constraint of a fresh literal.
	///
	/// In the model this is an ordinary axiom; in the proof it is a
	/// redundance step with the given witness assignment (which is ignored in
	/// the model, where fresh variables need no justification).
	pub(crate) fn emit_definition(&mut self, body: String, witness: &str) -> ProofLine {
		match self {
			ProofSink::Model(model) => model.add_line(body),
			ProofSink::Log(logger) => logger.emit_red_raw(&body, witness, ProofLevel::Top),
		}
	}

	/// Emit a constraint that is implied by what is already there.
	pub(crate) fn emit_implied(&mut self, body: String) -> ProofLine {
		match self {
			ProofSink::Model(model) => model.add_line(body),
			ProofSink::Log(logger) => logger.emit_rup_raw(&body, ProofLevel::Top),
		}
	}
}

/// Spell a value for use inside a literal name; minus signs are not valid in
/// variable names, so negatives get an `m` prefix.
fn val_name(v: IntVal) -> String {
	if v < 0 {
		format!("m{}", -v)
	} else {
		v.to_string()
	}
}

impl EncodingTracker {
	/// Create an empty tracker.
	pub(crate) fn new(use_friendly_names: bool) -> Self {
		Self {
			use_friendly_names,
			next_id: 1,
			names: Vec::new(),
			stored: IndexVec::new(),
			proof_only: IndexVec::new(),
			flags: Vec::new(),
		}
	}

	/// The number of raw variables allocated so far.
	pub(crate) fn variable_count(&self) -> u64 {
		self.next_id - 1
	}

	/// Allocate a fresh raw variable and return its positive literal.
	fn alloc(&mut self, friendly: String) -> XLiteral {
		let id = self.next_id;
		self.next_id += 1;
		let name = if self.use_friendly_names {
			friendly
		} else {
			format!("x{id}")
		};
		trace!(id, name = %name, "allocate proof literal");
		self.names.push(name);
		XLiteral { id, negated: false }
	}

	/// The string used for a literal in the model file and proof log.
	pub(crate) fn pb_string(&self, lit: XLiteral) -> String {
		debug_assert!(lit.id >= 1 && (lit.id as usize) <= self.names.len());
		let name = &self.names[(lit.id - 1) as usize];
		if lit.negated {
			format!("~{name}")
		} else {
			name.clone()
		}
	}

	/// Start tracking a stored variable with the given model-time bounds.
	pub(crate) fn track_stored(
		&mut self,
		var: IntVarRef,
		lb: IntVal,
		ub: IntVal,
		name: Option<String>,
		representation: ProofRepresentation,
	) {
		let stem = name.unwrap_or_else(|| format!("i{}", usize::from(var)));
		let slot = self.stored.push(VarData {
			stem,
			bounds: (lb, ub),
			representation,
			bits: None,
			gevars: BTreeMap::new(),
			eqvars: BTreeMap::new(),
			at_least_one: None,
		});
		debug_assert_eq!(var, slot);
	}

	/// Start tracking a proof-only variable with the given bounds.
	pub(crate) fn track_proof_only(
		&mut self,
		lb: IntVal,
		ub: IntVal,
		name: Option<String>,
		representation: ProofRepresentation,
	) -> ProofVarRef {
		let index = self.proof_only.len();
		let stem = name.unwrap_or_else(|| format!("p{index}"));
		self.proof_only.push(VarData {
			stem,
			bounds: (lb, ub),
			representation,
			bits: None,
			gevars: BTreeMap::new(),
			eqvars: BTreeMap::new(),
			at_least_one: None,
		})
	}

	/// The model-time bounds of a tracked variable.
	pub(crate) fn bounds(&self, var: TrackedVar) -> (IntVal, IntVal) {
		self.data(var).bounds
	}

	/// Shared access to a variable's tracker data.
	fn data(&self, var: TrackedVar) -> &VarData {
		match var {
			TrackedVar::Stored(v) => &self.stored[v],
			TrackedVar::ProofOnly(v) => &self.proof_only[v],
		}
	}

	/// Mutable access to a variable's tracker data.
	fn data_mut(&mut self, var: TrackedVar) -> &mut VarData {
		match var {
			TrackedVar::Stored(v) => &mut self.stored[v],
			TrackedVar::ProofOnly(v) => &mut self.proof_only[v],
		}
	}

	/// Allocate the bit literals of a variable, if not already present.
	///
	/// Allocating twice is guaranteed to yield the same literals.
	pub(crate) fn ensure_bits(&mut self, var: TrackedVar) -> Bits {
		if let Some(bits) = &self.data(var).bits {
			return bits.clone();
		}
		let (lb, ub) = self.data(var).bounds;
		let stem = self.data(var).stem.clone();
		let (count, neg_coeff) = Bits::coeffs_for(lb, ub);
		let bit_lits = (0..count)
			.map(|i| (1_i64 << i, self.alloc(format!("{stem}_b{i}"))))
			.collect();
		let negative = if neg_coeff != 0 {
			Some((neg_coeff, self.alloc(format!("{stem}_nb"))))
		} else {
			None
		};
		let bits = Bits { bit_lits, negative };
		self.data_mut(var).bits = Some(bits.clone());
		bits
	}

	/// The weighted 0/1 decomposition of a variable: bit-weighted bit
	/// literals, or value-weighted value literals for a direct-only variable.
	pub(crate) fn enc_terms(&mut self, var: TrackedVar, sink: &mut ProofSink<'_>) -> Vec<(IntVal, XLiteral)> {
		match self.data(var).representation {
			ProofRepresentation::Bits => self.ensure_bits(var).terms(),
			ProofRepresentation::DirectOnly => {
				let (lb, ub) = self.data(var).bounds;
				(lb..=ub)
					.filter(|&v| v != 0)
					.map(|v| {
						let lit = self.direct_eqvar(var, v, sink);
						(v, lit)
					})
					.collect()
			}
		}
	}

	/// The value literal of a direct-only variable, allocated eagerly during
	/// set-up but recoverable lazily as well.
	fn direct_eqvar(&mut self, var: TrackedVar, v: IntVal, _sink: &mut ProofSink<'_>) -> XLiteral {
		if let Some(&lit) = self.data(var).eqvars.get(&v) {
			return lit;
		}
		let stem = self.data(var).stem.clone();
		let lit = self.alloc(format!("{stem}_eq_{}", val_name(v)));
		let _ = self.data_mut(var).eqvars.insert(v, lit);
		lit
	}

	/// Resolve a condition on a tracked variable to a raw literal, clamping
	/// against the model-time bounds and introducing the literal (and its
	/// defining constraints) on first use.
	pub(crate) fn lit_for(
		&mut self,
		sink: &mut ProofSink<'_>,
		var: TrackedVar,
		meaning: &LitMeaning,
	) -> PbLit {
		let (lb, ub) = self.data(var).bounds;
		match *meaning {
			LitMeaning::GreaterEq(v) => {
				if v <= lb {
					PbLit::True
				} else if v > ub {
					PbLit::False
				} else {
					PbLit::X(self.gevar(sink, var, v))
				}
			}
			LitMeaning::Less(v) => !self.lit_for(sink, var, &LitMeaning::GreaterEq(v)),
			LitMeaning::Eq(v) => {
				if v < lb || v > ub {
					PbLit::False
				} else if lb == ub {
					PbLit::True
				} else if self.data(var).representation == ProofRepresentation::DirectOnly {
					PbLit::X(self.direct_eqvar(var, v, sink))
				} else if v == lb {
					// x = lb holds exactly when x < lb + 1
					!self.lit_for(sink, var, &LitMeaning::GreaterEq(lb + 1))
				} else if v == ub {
					// x = ub holds exactly when x >= ub
					self.lit_for(sink, var, &LitMeaning::GreaterEq(ub))
				} else {
					PbLit::X(self.eqvar(sink, var, v))
				}
			}
			LitMeaning::NotEq(v) => !self.lit_for(sink, var, &LitMeaning::Eq(v)),
		}
	}

	/// Resolve a condition without introducing anything.
	///
	/// Asking for a literal that was never introduced is a programming
	/// error, reported as [`ProofError::UnknownCondition`].
	pub fn xliteral_for(
		&self,
		var_desc: &str,
		var: TrackedVar,
		meaning: &LitMeaning,
	) -> Result<PbLit, ProofError> {
		let (lb, ub) = self.data(var).bounds;
		let missing = || ProofError::UnknownCondition(format!("{var_desc} {meaning}"));
		match *meaning {
			LitMeaning::GreaterEq(v) => {
				if v <= lb {
					Ok(PbLit::True)
				} else if v > ub {
					Ok(PbLit::False)
				} else {
					self.data(var)
						.gevars
						.get(&v)
						.map(|&(l, _, _)| PbLit::X(l))
						.ok_or_else(missing)
				}
			}
			LitMeaning::Less(v) => Ok(!self.xliteral_for(var_desc, var, &LitMeaning::GreaterEq(v))?),
			LitMeaning::Eq(v) => {
				if v < lb || v > ub {
					Ok(PbLit::False)
				} else if lb == ub {
					Ok(PbLit::True)
				} else if let Some(&l) = self.data(var).eqvars.get(&v) {
					Ok(PbLit::X(l))
				} else if v == lb {
					Ok(!self.xliteral_for(var_desc, var, &LitMeaning::GreaterEq(lb + 1))?)
				} else if v == ub {
					self.xliteral_for(var_desc, var, &LitMeaning::GreaterEq(ub))
				} else {
					Err(missing())
				}
			}
			LitMeaning::NotEq(v) => Ok(!self.xliteral_for(var_desc, var, &LitMeaning::Eq(v))?),
		}
	}

	/// The order literal `x ≥ v`, introduced on first use.
	///
	/// The two reifying definitions `x ≥ v → encoding ≥ v` and
	/// `x < v → encoding ≤ v - 1` are emitted once; their line numbers are
	/// recorded so later steps can cite them.
	fn gevar(&mut self, sink: &mut ProofSink<'_>, var: TrackedVar, v: IntVal) -> XLiteral {
		if let Some(&(lit, _, _)) = self.data(var).gevars.get(&v) {
			return lit;
		}
		let stem = self.data(var).stem.clone();
		let lit = self.alloc(format!("{stem}_ge_{}", val_name(v)));
		let name = self.pb_string(lit);

		let (forward, backward) = match self.data(var).representation {
			ProofRepresentation::Bits => {
				let bits = self.ensure_bits(var);
				let terms = bits.terms();
				// o -> bits >= v, padded so the line is void when o is false
				let slack_a = v - bits.min_sum();
				let mut fwd = String::new();
				for &(c, b) in &terms {
					write!(fwd, "{c} {} ", self.pb_string(b)).unwrap();
				}
				write!(fwd, "{slack_a} ~{name} >= {v} ;").unwrap();
				// ~o -> bits <= v - 1
				let max_sum: IntVal = terms.iter().map(|&(c, _)| c.max(0)).sum();
				let slack_b = max_sum - v + 1;
				let mut bwd = String::new();
				for &(c, b) in &terms {
					write!(bwd, "{} {} ", -c, self.pb_string(b)).unwrap();
				}
				write!(bwd, "{slack_b} {name} >= {} ;", 1 - v).unwrap();
				(fwd, bwd)
			}
			ProofRepresentation::DirectOnly => {
				let (_, ub) = self.data(var).bounds;
				let above: Vec<XLiteral> = (v..=ub)
					.map(|w| self.direct_eqvar(var, w, sink))
					.collect();
				// o -> some value at or above v is taken
				let mut fwd = String::new();
				for &e in &above {
					write!(fwd, "1 {} ", self.pb_string(e)).unwrap();
				}
				write!(fwd, "1 ~{name} >= 1 ;").unwrap();
				// ~o -> no value at or above v is taken
				let mut bwd = String::new();
				for &e in &above {
					write!(bwd, "-1 {} ", self.pb_string(e)).unwrap();
				}
				write!(bwd, "{} {name} >= 0 ;", above.len()).unwrap();
				(fwd, bwd)
			}
		};

		let fwd_line = sink.emit_definition(forward, &format!("{name} -> 0"));
		let bwd_line = sink.emit_definition(backward, &format!("{name} -> 1"));
		let _ = self.data_mut(var).gevars.insert(v, (lit, fwd_line, bwd_line));
		lit
	}

	/// The value literal `x = v` of a bits-encoded variable, introduced on
	/// first use as `x ≥ v ∧ ¬(x ≥ v + 1)`.
	fn eqvar(&mut self, sink: &mut ProofSink<'_>, var: TrackedVar, v: IntVal) -> XLiteral {
		if let Some(&lit) = self.data(var).eqvars.get(&v) {
			return lit;
		}
		let ge_v = self.gevar(sink, var, v);
		let ge_next = self.gevar(sink, var, v + 1);
		let stem = self.data(var).stem.clone();
		let lit = self.alloc(format!("{stem}_eq_{}", val_name(v)));
		let name = self.names[(lit.id - 1) as usize].clone();

		let ge_v_s = self.pb_string(ge_v);
		let not_next_s = self.pb_string(!ge_next);
		let zero = format!("{name} -> 0");
		let one = format!("{name} -> 1");
		let _ = sink.emit_definition(format!("1 ~{name} 1 {ge_v_s} >= 1 ;"), &zero);
		let _ = sink.emit_definition(format!("1 ~{name} 1 {not_next_s} >= 1 ;"), &zero);
		let _ = sink.emit_definition(
			format!(
				"1 {name} 1 {} 1 {} >= 1 ;",
				self.pb_string(!ge_v),
				self.pb_string(ge_next)
			),
			&one,
		);
		let _ = self.data_mut(var).eqvars.insert(v, lit);
		lit
	}

	/// The constraint saying the variable takes at least one of its values,
	/// emitted once and cached.
	pub(crate) fn at_least_one(&mut self, sink: &mut ProofSink<'_>, var: TrackedVar) -> ProofLine {
		if let Some(line) = self.data(var).at_least_one {
			return line;
		}
		let (lb, ub) = self.data(var).bounds;
		let mut body = String::new();
		for v in lb..=ub {
			match self.lit_for(sink, var, &LitMeaning::Eq(v)) {
				PbLit::True => {
					// single-value variable: the clause is vacuous
					body.clear();
					break;
				}
				PbLit::False => {}
				PbLit::X(l) => write!(body, "1 {} ", self.pb_string(l)).unwrap(),
			}
		}
		let line = if body.is_empty() {
			0
		} else {
			body.push_str(">= 1 ;");
			sink.emit_implied(body)
		};
		self.data_mut(var).at_least_one = Some(line);
		line
	}

	/// Create a fresh proof flag.
	pub(crate) fn new_flag(&mut self, name: Option<&str>) -> ProofFlag {
		let index = self.flags.len() as u32;
		let friendly = match name {
			Some(n) => format!("f{index}_{n}"),
			None => format!("f{index}"),
		};
		let lit = self.alloc(friendly);
		self.flags.push(lit);
		ProofFlag {
			index,
			positive: true,
		}
	}

	/// The raw literal behind a proof flag occurrence.
	pub(crate) fn flag_lit(&self, flag: ProofFlag) -> XLiteral {
		let lit = self.flags[flag.index as usize];
		if flag.positive {
			lit
		} else {
			!lit
		}
	}

	/// Resolve a model literal to a raw proof literal, introducing it on
	/// first use.
	pub(crate) fn resolve_lit(&mut self, sink: &mut ProofSink<'_>, lit: &Lit) -> PbLit {
		match lit.simplify() {
			SimpleLit::True => PbLit::True,
			SimpleLit::False => PbLit::False,
			SimpleLit::Cond(cond) => {
				self.lit_for(sink, TrackedVar::Stored(cond.var), &cond.meaning)
			}
		}
	}

	/// Make sure a raw literal exists for every term of the sum the caller is
	/// about to emit.
	pub(crate) fn need_all_names_in(&mut self, sink: &mut ProofSink<'_>, sum: &PbSum) {
		for (_, term) in &sum.0 {
			match term {
				PbTerm::Lit(lit) => {
					let _ = self.resolve_lit(sink, lit);
				}
				PbTerm::ProofCond(cond) => {
					let _ = self.lit_for(sink, TrackedVar::ProofOnly(cond.var), &cond.meaning);
				}
				PbTerm::Flag(_) => {}
				PbTerm::Int(view) => match view.0 {
					IntViewInner::Const(_) => {}
					IntViewInner::VarRef(v) | IntViewInner::Offset { var: v, .. } => {
						let _ = self.enc_terms(TrackedVar::Stored(v), sink);
					}
				},
				PbTerm::ProofInt(p) => {
					let _ = self.enc_terms(TrackedVar::ProofOnly(*p), sink);
				}
			}
		}
	}

	/// Write a less-or-equal expression, in the `>=` form the files use,
	/// introducing literals as needed. The optional half-reification guards
	/// the constraint under a conjunction of literals and flags.
	pub(crate) fn format_ineq(
		&mut self,
		sink: &mut ProofSink<'_>,
		ineq: &PbLeq,
		half_reif: Option<&[ReifTerm]>,
	) -> String {
		let mut out = String::new();
		let mut rhs = -ineq.rhs;
		let mut reif_const: IntVal = 0;
		let mut vacuous = false;

		let mut emit_atom = |out: &mut String,
		                     reif_const: &mut IntVal,
		                     rhs: &mut IntVal,
		                     weight: IntVal,
		                     atom: PbLit,
		                     tracker: &EncodingTracker| match atom {
			PbLit::True => *rhs += weight,
			PbLit::False => {}
			PbLit::X(x) => {
				write!(out, "{} {} ", -weight, tracker.pb_string(x)).unwrap();
				*reif_const += weight.max(0);
			}
		};

		for &(w, ref term) in &ineq.sum.0 {
			if w == 0 {
				continue;
			}
			match term {
				PbTerm::Lit(lit) => {
					let atom = self.resolve_lit(sink, lit);
					emit_atom(&mut out, &mut reif_const, &mut rhs, w, atom, self);
				}
				PbTerm::ProofCond(cond) => {
					let atom = self.lit_for(sink, TrackedVar::ProofOnly(cond.var), &cond.meaning);
					emit_atom(&mut out, &mut reif_const, &mut rhs, w, atom, self);
				}
				PbTerm::Flag(flag) => {
					let atom = PbLit::X(self.flag_lit(*flag));
					emit_atom(&mut out, &mut reif_const, &mut rhs, w, atom, self);
				}
				PbTerm::Int(view) => match view.0 {
					IntViewInner::Const(c) => rhs += w * c,
					IntViewInner::VarRef(v) => {
						for (c, b) in self.enc_terms(TrackedVar::Stored(v), sink) {
							let coeff = w * c;
							if coeff != 0 {
								write!(out, "{} {} ", -coeff, self.pb_string(b)).unwrap();
								reif_const += coeff.max(0);
							}
						}
					}
					IntViewInner::Offset { transform, var } => {
						let wx = if transform.negate { -w } else { w };
						for (c, b) in self.enc_terms(TrackedVar::Stored(var), sink) {
							let coeff = wx * c;
							if coeff != 0 {
								write!(out, "{} {} ", -coeff, self.pb_string(b)).unwrap();
								reif_const += coeff.max(0);
							}
						}
						rhs += w * transform.offset;
						reif_const += (-w * transform.offset).max(0);
					}
				},
				PbTerm::ProofInt(p) => {
					for (c, b) in self.enc_terms(TrackedVar::ProofOnly(*p), sink) {
						let coeff = w * c;
						if coeff != 0 {
							write!(out, "{} {} ", -coeff, self.pb_string(b)).unwrap();
							reif_const += coeff.max(0);
						}
					}
				}
			}
		}

		if let Some(reif) = half_reif {
			reif_const += rhs;
			reif_const = reif_const.max(1);
			for term in reif {
				let atom = match term {
					ReifTerm::Lit(lit) => self.resolve_lit(sink, lit),
					ReifTerm::Flag(flag) => PbLit::X(self.flag_lit(*flag)),
				};
				match atom {
					// reifying on a true term changes nothing
					PbLit::True => {}
					PbLit::False => vacuous = true,
					PbLit::X(x) => {
						write!(out, "{reif_const} {} ", self.pb_string(!x)).unwrap();
					}
				}
			}
		}

		if vacuous {
			write!(out, ">= {} ;", rhs - reif_const).unwrap();
		} else {
			write!(out, ">= {rhs} ;").unwrap();
		}
		out
	}

	/// The literal polarities that record `var = value` in a solution line.
	pub(crate) fn solution_lits(
		&mut self,
		sink: &mut ProofSink<'_>,
		var: TrackedVar,
		value: IntVal,
	) -> Vec<XLiteral> {
		match self.data(var).representation {
			ProofRepresentation::Bits => {
				let bits = self.ensure_bits(var);
				bits.lits_for_value(value)
			}
			ProofRepresentation::DirectOnly => {
				let (lb, ub) = self.data(var).bounds;
				(lb..=ub)
					.map(|v| {
						let e = self.direct_eqvar(var, v, sink);
						if v == value {
							e
						} else {
							!e
						}
					})
					.collect()
			}
		}
	}

	/// The representation a tracked variable was created with.
	pub(crate) fn representation_of(&self, var: TrackedVar) -> ProofRepresentation {
		self.data(var).representation
	}

	/// Record the at-least-one constraint of a variable set up elsewhere.
	pub(crate) fn record_at_least_one(&mut self, var: TrackedVar, line: ProofLine) {
		self.data_mut(var).at_least_one = Some(line);
	}

	/// A human-readable description of a tracked variable, for errors and
	/// comments.
	pub(crate) fn describe(&self, var: TrackedVar) -> String {
		self.data(var).stem.clone()
	}
}

#[cfg(test)]
mod tests {
	use crate::proofs::encoding::Bits;

	#[test]
	fn test_bit_coefficients() {
		// (bit count, negative coefficient) covering [lb, ub]
		assert_eq!(Bits::coeffs_for(0, 1), (1, 0));
		assert_eq!(Bits::coeffs_for(0, 2), (2, 0));
		assert_eq!(Bits::coeffs_for(0, 3), (2, 0));
		assert_eq!(Bits::coeffs_for(0, 4), (3, 0));
		assert_eq!(Bits::coeffs_for(0, 7), (3, 0));
		assert_eq!(Bits::coeffs_for(0, 8), (4, 0));
		assert_eq!(Bits::coeffs_for(1, 9), (4, 0));

		assert_eq!(Bits::coeffs_for(-1, 0), (1, -2));
		assert_eq!(Bits::coeffs_for(-2, 0), (1, -2));
		assert_eq!(Bits::coeffs_for(-3, 0), (2, -4));

		assert_eq!(Bits::coeffs_for(-1, 1), (1, -2));
		assert_eq!(Bits::coeffs_for(-4, 1), (2, -4));
		assert_eq!(Bits::coeffs_for(-5, 1), (3, -8));
		assert_eq!(Bits::coeffs_for(-1, 7), (3, -8));
		assert_eq!(Bits::coeffs_for(-9, 7), (4, -16));
		assert_eq!(Bits::coeffs_for(-3, -3), (2, -4));
		assert_eq!(Bits::coeffs_for(-9, -3), (4, -16));
	}

	#[test]
	fn test_bits_value_round_trip() {
		for (lb, ub) in [(0, 9), (-5, 3), (-8, -1), (1, 1)] {
			let (count, neg) = Bits::coeffs_for(lb, ub);
			let bits = Bits {
				bit_lits: (0..count)
					.map(|i| {
						(1_i64 << i, crate::proofs::encoding::XLiteral {
							id: u64::from(i) + 1,
							negated: false,
						})
					})
					.collect(),
				negative: (neg != 0).then_some((neg, crate::proofs::encoding::XLiteral {
					id: u64::from(count) + 1,
					negated: false,
				})),
			};
			for v in lb..=ub {
				let lits = bits.lits_for_value(v);
				// decode: sum the coefficients of positively set literals
				let mut total = 0;
				for lit in lits {
					if lit.negated {
						continue;
					}
					if let Some((c, nb)) = bits.negative {
						if nb.id == lit.id {
							total += c;
							continue;
						}
					}
					total += bits.bit_lits[(lit.id - 1) as usize].0;
				}
				assert_eq!(total, v, "value {v} in [{lb},{ub}]");
			}
		}
	}
}
