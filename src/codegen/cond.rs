//! Condition model and the short-circuit branch compiler
//!
//! A [`Cond`] never materialises a boolean: compiling it leaves the operand
//! stack exactly as it found it and transfers control to a label instead.
//! `jump_false` and `jump_true` are the two mutually recursive compilation
//! modes (the javac `CondItem` jump chains, expressed over labels).

use super::chain::{Chain, RelOp};
use super::descriptor::{PrimitiveType, TypeDesc};
use super::gen::{is_boolean_like, Gen};
use super::insn::Label;
use super::opcodes;
use super::types::{binary_promotion, computational};
use crate::common::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Const(bool),
    /// The chain yields `true`
    Truth(Chain),
    /// The chain yields `false`
    Falsity(Chain),
    Null(Chain),
    NonNull(Chain),
    Compare {
        op: RelOp,
        lhs: Chain,
        rhs: Chain,
        /// Result when a floating operand is NaN
        nan: bool,
    },
    And(Vec<Cond>),
    Or(Vec<Cond>),
}

impl Cond {
    pub fn always(value: bool) -> Cond {
        Cond::Const(value)
    }

    pub fn is_true(chain: Chain) -> Cond {
        Cond::Truth(chain)
    }

    pub fn is_false(chain: Chain) -> Cond {
        Cond::Falsity(chain)
    }

    pub fn is_null(chain: Chain) -> Cond {
        Cond::Null(chain)
    }

    pub fn not_null(chain: Chain) -> Cond {
        Cond::NonNull(chain)
    }

    pub fn compare(op: RelOp, lhs: Chain, rhs: Chain) -> Cond {
        Cond::Compare { op, lhs, rhs, nan: op == RelOp::Ne }
    }

    pub fn eq(lhs: Chain, rhs: Chain) -> Cond {
        Self::compare(RelOp::Eq, lhs, rhs)
    }

    pub fn ne(lhs: Chain, rhs: Chain) -> Cond {
        Self::compare(RelOp::Ne, lhs, rhs)
    }

    pub fn lt(lhs: Chain, rhs: Chain) -> Cond {
        Self::compare(RelOp::Lt, lhs, rhs)
    }

    pub fn le(lhs: Chain, rhs: Chain) -> Cond {
        Self::compare(RelOp::Le, lhs, rhs)
    }

    pub fn gt(lhs: Chain, rhs: Chain) -> Cond {
        Self::compare(RelOp::Gt, lhs, rhs)
    }

    pub fn ge(lhs: Chain, rhs: Chain) -> Cond {
        Self::compare(RelOp::Ge, lhs, rhs)
    }

    /// Conjunction; nested conjunctions flatten into one node
    pub fn and(self, other: Cond) -> Cond {
        let mut parts = match self {
            Cond::And(parts) => parts,
            single => vec![single],
        };
        match other {
            Cond::And(more) => parts.extend(more),
            single => parts.push(single),
        }
        Cond::And(parts)
    }

    /// Disjunction; nested disjunctions flatten into one node
    pub fn or(self, other: Cond) -> Cond {
        let mut parts = match self {
            Cond::Or(parts) => parts,
            single => vec![single],
        };
        match other {
            Cond::Or(more) => parts.extend(more),
            single => parts.push(single),
        }
        Cond::Or(parts)
    }

    /// Conjunction of all conditions; `true` when empty
    pub fn all(conds: impl IntoIterator<Item = Cond>) -> Cond {
        conds.into_iter().reduce(Cond::and).unwrap_or(Cond::Const(true))
    }

    /// Disjunction of all conditions; `false` when empty
    pub fn any(conds: impl IntoIterator<Item = Cond>) -> Cond {
        conds.into_iter().reduce(Cond::or).unwrap_or(Cond::Const(false))
    }

    /// Logical inverse (De Morgan for composites)
    pub fn negate(self) -> Cond {
        match self {
            Cond::Const(value) => Cond::Const(!value),
            Cond::Truth(chain) => Cond::Falsity(chain),
            Cond::Falsity(chain) => Cond::Truth(chain),
            Cond::Null(chain) => Cond::NonNull(chain),
            Cond::NonNull(chain) => Cond::Null(chain),
            Cond::Compare { op, lhs, rhs, nan } => Cond::Compare { op: op.negate(), lhs, rhs, nan: !nan },
            Cond::And(parts) => Cond::Or(parts.into_iter().map(Cond::negate).collect()),
            Cond::Or(parts) => Cond::And(parts.into_iter().map(Cond::negate).collect()),
        }
    }

    /// Compile so that control reaches `end` when the condition is false and
    /// falls through when it is true
    pub fn build(&self, gen: &mut Gen<'_>, end: Label) -> Result<()> {
        self.jump_false(gen, end)
    }

    /// Jump to `target` if false, fall through if true
    pub fn jump_false(&self, gen: &mut Gen<'_>, target: Label) -> Result<()> {
        match self {
            Cond::And(parts) => {
                for part in parts {
                    part.jump_false(gen, target)?;
                    if !gen.code.alive {
                        break;
                    }
                }
                Ok(())
            }
            Cond::Or(parts) => {
                let Some((last, rest)) = parts.split_last() else {
                    return Cond::Const(false).jump_false(gen, target);
                };
                let success = gen.new_label();
                for part in rest {
                    part.jump_true(gen, success)?;
                    if !gen.code.alive {
                        break;
                    }
                }
                if gen.code.alive {
                    last.jump_false(gen, target)?;
                }
                gen.place(success)
            }
            leaf => leaf.branch(gen, target, false),
        }
    }

    /// Jump to `target` if true, fall through if false
    pub fn jump_true(&self, gen: &mut Gen<'_>, target: Label) -> Result<()> {
        match self {
            Cond::Or(parts) => {
                for part in parts {
                    part.jump_true(gen, target)?;
                    if !gen.code.alive {
                        break;
                    }
                }
                Ok(())
            }
            Cond::And(parts) => {
                let Some((last, rest)) = parts.split_last() else {
                    return Cond::Const(true).jump_true(gen, target);
                };
                let skip = gen.new_label();
                for part in rest {
                    part.jump_false(gen, skip)?;
                    if !gen.code.alive {
                        break;
                    }
                }
                if gen.code.alive {
                    last.jump_true(gen, target)?;
                }
                gen.place(skip)
            }
            leaf => leaf.branch(gen, target, true),
        }
    }

    /// Leaf compilation: branch to `target` when the leaf evaluates to `sense`
    fn branch(&self, gen: &mut Gen<'_>, target: Label, sense: bool) -> Result<()> {
        match self {
            Cond::Const(value) => {
                if *value == sense {
                    gen.emit_jump(opcodes::GOTO, target)?;
                }
                Ok(())
            }
            Cond::Truth(chain) | Cond::Falsity(chain) => {
                gen.gen_value(chain)?;
                gen.coerce(&TypeDesc::BOOLEAN)?;
                gen.code.pop()?;
                let on_true = matches!(self, Cond::Truth(_)) == sense;
                let opcode = if on_true { opcodes::IFNE } else { opcodes::IFEQ };
                gen.emit_jump(opcode, target)
            }
            Cond::Null(chain) | Cond::NonNull(chain) => {
                let ty = gen.probe(chain)?;
                if ty.is_primitive() {
                    return Err(Error::NullComparedToPrimitive { ty: ty.to_string() });
                }
                gen.gen_value(chain)?;
                gen.code.pop()?;
                let on_null = matches!(self, Cond::Null(_)) == sense;
                let opcode = if on_null { opcodes::IFNULL } else { opcodes::IFNONNULL };
                gen.emit_jump(opcode, target)
            }
            Cond::Compare { op, lhs, rhs, nan } => compare(gen, *op, *nan, sense, lhs, rhs, target),
            Cond::And(_) | Cond::Or(_) => {
                if sense {
                    self.jump_true(gen, target)
                } else {
                    self.jump_false(gen, target)
                }
            }
        }
    }
}

/// Emit both operands and a branch taken when `lhs op rhs` evaluates to `sense`.
///
/// Wrappers unbox and both sides promote to a common numeric type; only
/// `==`/`!=` between two references compares identity.
fn compare(
    gen: &mut Gen<'_>,
    op: RelOp,
    nan: bool,
    sense: bool,
    lhs: &Chain,
    rhs: &Chain,
    target: Label,
) -> Result<()> {
    let lt = gen.probe(lhs)?;
    let rt = gen.probe(rhs)?;

    if lt == TypeDesc::Null && rt.is_primitive() {
        return Err(Error::NullComparedToPrimitive { ty: rt.to_string() });
    }
    if rt == TypeDesc::Null && lt.is_primitive() {
        return Err(Error::NullComparedToPrimitive { ty: lt.to_string() });
    }

    let written = op;
    let (op, nan) = if sense { (op, nan) } else { (op.negate(), !nan) };
    let both_references = lt.is_reference() && rt.is_reference();

    if both_references && written.is_equality() {
        gen.gen_value(lhs)?;
        gen.gen_value(rhs)?;
        return reference_branch(gen, op, target);
    }

    if is_boolean_like(&lt) || is_boolean_like(&rt) {
        if !written.is_equality() {
            return Err(Error::invalid_input(format!("operator {} is not defined on boolean", written.symbol())));
        }
        gen.gen_value(lhs)?;
        gen.coerce(&TypeDesc::BOOLEAN)?;
        gen.gen_value(rhs)?;
        gen.coerce(&TypeDesc::BOOLEAN)?;
        gen.code.pop_n(2)?;
        return gen.emit_jump(op.icmp_opcode(), target);
    }

    if let Some(promoted) = binary_promotion(&lt, &rt) {
        let ty = TypeDesc::Primitive(promoted);
        gen.gen_value(lhs)?;
        gen.coerce(&ty)?;
        gen.gen_value(rhs)?;
        gen.coerce(&ty)?;
        return numeric_branch(gen, promoted, op, nan, target);
    }

    match (lt.as_primitive(), rt.as_primitive()) {
        // int against Object: checked unboxing of the reference
        (Some(prim), None) => {
            gen.gen_value(lhs)?;
            gen.gen_value(rhs)?;
            gen.coerce(&lt)?;
            numeric_branch(gen, computational(prim), op, nan, target)
        }
        (None, Some(prim)) if written.is_equality() => {
            gen.gen_value(lhs)?;
            gen.gen_value(rhs)?;
            gen.coerce(&TypeDesc::wrapper_of(prim))?;
            reference_branch(gen, op, target)
        }
        (Some(_), Some(_)) => Err(Error::no_conversion(&rt, &lt)),
        _ => Err(Error::invalid_input(format!(
            "operator {} is not defined on {} and {}",
            written.symbol(),
            lt,
            rt
        ))),
    }
}

/// Both operands are on the stack, already of computational type `ty`
fn numeric_branch(gen: &mut Gen<'_>, ty: PrimitiveType, op: RelOp, nan: bool, target: Label) -> Result<()> {
    let operand = TypeDesc::Primitive(ty);
    gen.code.pop_n(2)?;
    // For <, <= the NaN result comes from `*cmpl` (-1); for >, >= from `*cmpg` (+1)
    let low = matches!(op, RelOp::Lt | RelOp::Le) == nan;
    let cmp = match ty {
        PrimitiveType::Long => Some(opcodes::LCMP),
        PrimitiveType::Float => Some(if low { opcodes::FCMPL } else { opcodes::FCMPG }),
        PrimitiveType::Double => Some(if low { opcodes::DCMPL } else { opcodes::DCMPG }),
        PrimitiveType::Int => None,
        other => {
            return Err(Error::internal(format!("{} is not a computational type ({})", other, operand)));
        }
    };
    match cmp {
        Some(cmp) => {
            gen.emit_op(cmp);
            gen.emit_jump(op.if_opcode(), target)
        }
        None => gen.emit_jump(op.icmp_opcode(), target),
    }
}

/// `op` is `==` or `!=`
fn reference_branch(gen: &mut Gen<'_>, op: RelOp, target: Label) -> Result<()> {
    let opcode = op
        .acmp_opcode()
        .ok_or_else(|| Error::internal(format!("reference comparison with {}", op.symbol())))?;
    gen.code.pop_n(2)?;
    gen.emit_jump(opcode, target)
}
