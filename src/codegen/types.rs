//! Type conversion engine
//!
//! Classifies the conversion between two types ([`conversion_kind`]) and emits
//! the minimal instruction sequence for it. The implicit half (`coerce`) is what
//! assignment, argument passing and returns use; the explicit half (`cast`) is
//! what a cast in source would use.

use super::descriptor::{PrimitiveType, TypeDesc};
use super::gen::Gen;
use super::insn::MemberRef;
use super::opcodes;
use super::symtab::Resolver;
use crate::common::error::{Error, Result};
use crate::config::Config;

/// Conversion kinds, after JLS chapter 5
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Identity,
    WideningPrimitive,
    /// short<->char and byte->char treated as implicit, truncating to the target range
    Reinterpret,
    NarrowingPrimitive,
    Boxing,
    /// Boxing followed by a widening reference conversion (int -> Number)
    BoxingWidening,
    Unboxing,
    /// Unboxing followed by widening (Integer -> long)
    UnboxingWidening,
    /// checkcast to the wrapper, then unbox (Object -> int)
    CheckedUnboxing,
    WideningReference,
    NarrowingReference,
    Illegal,
}

impl ConversionKind {
    /// Allowed without an explicit cast
    pub fn is_implicit(self) -> bool {
        matches!(
            self,
            ConversionKind::Identity
                | ConversionKind::WideningPrimitive
                | ConversionKind::Reinterpret
                | ConversionKind::Boxing
                | ConversionKind::BoxingWidening
                | ConversionKind::Unboxing
                | ConversionKind::UnboxingWidening
                | ConversionKind::WideningReference
        )
    }

    /// Implicit and free of boxing
    pub fn is_strict(self) -> bool {
        matches!(
            self,
            ConversionKind::Identity
                | ConversionKind::WideningPrimitive
                | ConversionKind::Reinterpret
                | ConversionKind::WideningReference
        )
    }
}

/// Knobs of the classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRules {
    pub narrow_reinterpretation: bool,
}

impl ConversionRules {
    /// Plain language rules, used for overload resolution
    pub const STANDARD: ConversionRules = ConversionRules { narrow_reinterpretation: false };

    pub fn from_config(config: &Config) -> Self {
        Self { narrow_reinterpretation: config.narrow_reinterpretation }
    }
}

/// Classify the conversion from `from` to `to`
pub fn conversion_kind(
    from: &TypeDesc,
    to: &TypeDesc,
    resolver: &dyn Resolver,
    rules: ConversionRules,
) -> ConversionKind {
    if from == to {
        return ConversionKind::Identity;
    }
    if from.is_void() || to.is_void() || *to == TypeDesc::Null {
        return ConversionKind::Illegal;
    }
    match (from.as_primitive(), to.as_primitive()) {
        (Some(f), Some(t)) => primitive_kind(f, t, rules),
        (Some(f), None) => {
            let wrapper = TypeDesc::wrapper_of(f);
            if *to == wrapper {
                ConversionKind::Boxing
            } else if resolver.is_subtype(&wrapper, to) {
                ConversionKind::BoxingWidening
            } else {
                ConversionKind::Illegal
            }
        }
        (None, Some(t)) => {
            if *from == TypeDesc::Null {
                return ConversionKind::Illegal;
            }
            if let Some(p) = from.unboxed() {
                if p == t {
                    return ConversionKind::Unboxing;
                }
                if primitive_kind(p, t, ConversionRules::STANDARD) == ConversionKind::WideningPrimitive {
                    return ConversionKind::UnboxingWidening;
                }
            }
            if resolver.is_subtype(&TypeDesc::wrapper_of(t), from) {
                ConversionKind::CheckedUnboxing
            } else {
                ConversionKind::Illegal
            }
        }
        (None, None) => {
            if resolver.is_subtype(from, to) {
                ConversionKind::WideningReference
            } else {
                ConversionKind::NarrowingReference
            }
        }
    }
}

fn primitive_kind(from: PrimitiveType, to: PrimitiveType, rules: ConversionRules) -> ConversionKind {
    use PrimitiveType::*;

    if from == to {
        return ConversionKind::Identity;
    }
    if from == Boolean || to == Boolean {
        return ConversionKind::Illegal;
    }
    if rules.narrow_reinterpretation && matches!((from, to), (Short, Char) | (Char, Short) | (Byte, Char)) {
        return ConversionKind::Reinterpret;
    }
    let rank = |p: PrimitiveType| match p {
        Byte => 1,
        Short | Char => 2,
        Int => 3,
        Long => 4,
        Float => 5,
        Double => 6,
        Boolean => 0,
    };
    if to != Char && rank(to) > rank(from) {
        ConversionKind::WideningPrimitive
    } else {
        ConversionKind::NarrowingPrimitive
    }
}

/// Type the machine computes in: int for everything int-like
pub fn computational(p: PrimitiveType) -> PrimitiveType {
    if p.is_int_like() {
        PrimitiveType::Int
    } else {
        p
    }
}

fn numeric_operand(ty: &TypeDesc) -> Option<PrimitiveType> {
    ty.as_primitive()
        .or_else(|| ty.unboxed())
        .filter(|p| p.is_numeric())
}

/// Binary numeric promotion; wrappers are unboxed first
pub fn binary_promotion(a: &TypeDesc, b: &TypeDesc) -> Option<PrimitiveType> {
    let (a, b) = (numeric_operand(a)?, numeric_operand(b)?);
    let promoted = if a == PrimitiveType::Double || b == PrimitiveType::Double {
        PrimitiveType::Double
    } else if a == PrimitiveType::Float || b == PrimitiveType::Float {
        PrimitiveType::Float
    } else if a == PrimitiveType::Long || b == PrimitiveType::Long {
        PrimitiveType::Long
    } else {
        PrimitiveType::Int
    };
    Some(promoted)
}

/// Unary numeric promotion
pub fn unary_promotion(ty: &TypeDesc) -> Option<PrimitiveType> {
    numeric_operand(ty).map(computational)
}

/// Type both arms of a conditional agree on
pub fn common_type(
    then_ty: &TypeDesc,
    else_ty: &TypeDesc,
    resolver: &dyn Resolver,
    rules: ConversionRules,
) -> Result<TypeDesc> {
    if then_ty == else_ty {
        return Ok(then_ty.clone());
    }
    let forward = conversion_kind(then_ty, else_ty, resolver, rules).is_implicit();
    let backward = conversion_kind(else_ty, then_ty, resolver, rules).is_implicit();
    match (forward, backward) {
        (true, false) => Ok(else_ty.clone()),
        (false, true) => Ok(then_ty.clone()),
        (true, true) if else_ty.is_primitive() && !then_ty.is_primitive() => Ok(else_ty.clone()),
        (true, true) => Ok(then_ty.clone()),
        (false, false) => Err(Error::IncompatibleBranches {
            then_ty: then_ty.to_string(),
            else_ty: else_ty.to_string(),
        }),
    }
}

impl<'a> Gen<'a> {
    pub fn conversion_rules(&self) -> ConversionRules {
        ConversionRules::from_config(self.context().config)
    }

    /// Implicitly convert the top of the stack to `to`
    pub fn coerce(&mut self, to: &TypeDesc) -> Result<()> {
        let from = self.code.peek()?.clone();
        let kind = conversion_kind(&from, to, self.context().resolver, self.conversion_rules());
        if !kind.is_implicit() {
            return Err(Error::no_conversion(&from, to));
        }
        self.apply_conversion(kind, &from, to)
    }

    /// Explicitly convert the top of the stack to `to`
    pub fn cast(&mut self, to: &TypeDesc) -> Result<()> {
        let from = self.code.peek()?.clone();
        let kind = conversion_kind(&from, to, self.context().resolver, self.conversion_rules());
        if kind == ConversionKind::Illegal {
            return Err(Error::illegal_cast(&from, to));
        }
        self.apply_conversion(kind, &from, to)
    }

    fn apply_conversion(&mut self, kind: ConversionKind, from: &TypeDesc, to: &TypeDesc) -> Result<()> {
        let expect_primitive = |ty: &TypeDesc| {
            ty.as_primitive()
                .ok_or_else(|| Error::internal(format!("{} is not primitive", ty)))
        };
        match kind {
            ConversionKind::Identity => return Ok(()),
            ConversionKind::WideningPrimitive
            | ConversionKind::Reinterpret
            | ConversionKind::NarrowingPrimitive => {
                self.emit_primitive_conversion(expect_primitive(from)?, expect_primitive(to)?);
            }
            ConversionKind::Boxing => self.emit_box(expect_primitive(from)?),
            ConversionKind::BoxingWidening => {
                self.emit_box(expect_primitive(from)?);
                self.emit_type_op(opcodes::CHECKCAST, to);
            }
            ConversionKind::Unboxing => self.emit_unbox(expect_primitive(to)?),
            ConversionKind::UnboxingWidening => {
                let unboxed = from
                    .unboxed()
                    .ok_or_else(|| Error::internal(format!("{} is not a wrapper", from)))?;
                self.emit_unbox(unboxed);
                self.emit_primitive_conversion(unboxed, expect_primitive(to)?);
            }
            ConversionKind::CheckedUnboxing => {
                let target = expect_primitive(to)?;
                self.emit_type_op(opcodes::CHECKCAST, &TypeDesc::wrapper_of(target));
                self.emit_unbox(target);
            }
            ConversionKind::WideningReference | ConversionKind::NarrowingReference => {
                if *from != TypeDesc::Null {
                    self.emit_type_op(opcodes::CHECKCAST, to);
                }
            }
            ConversionKind::Illegal => return Err(Error::illegal_cast(from, to)),
        }
        self.code.replace_top(to.clone())
    }

    /// Computational-type step, then truncation into byte/short/char
    fn emit_primitive_conversion(&mut self, from: PrimitiveType, to: PrimitiveType) {
        use PrimitiveType::*;

        let step = match (computational(from), computational(to)) {
            (Int, Long) => Some(opcodes::I2L),
            (Int, Float) => Some(opcodes::I2F),
            (Int, Double) => Some(opcodes::I2D),
            (Long, Int) => Some(opcodes::L2I),
            (Long, Float) => Some(opcodes::L2F),
            (Long, Double) => Some(opcodes::L2D),
            (Float, Int) => Some(opcodes::F2I),
            (Float, Long) => Some(opcodes::F2L),
            (Float, Double) => Some(opcodes::F2D),
            (Double, Int) => Some(opcodes::D2I),
            (Double, Long) => Some(opcodes::D2L),
            (Double, Float) => Some(opcodes::D2F),
            _ => None,
        };
        if let Some(op) = step {
            self.emit_op(op);
        }
        let fits = from == to || (from == Byte && to == Short);
        if !fits {
            match to {
                Byte => self.emit_op(opcodes::I2B),
                Short => self.emit_op(opcodes::I2S),
                Char => self.emit_op(opcodes::I2C),
                _ => {}
            }
        }
    }

    fn emit_box(&mut self, prim: PrimitiveType) {
        let wrapper = TypeDesc::wrapper_of(prim);
        let value_of = MemberRef::method(wrapper.clone(), "valueOf", vec![TypeDesc::Primitive(prim)], wrapper);
        self.emit_member_op(opcodes::INVOKESTATIC, &value_of);
    }

    fn emit_unbox(&mut self, prim: PrimitiveType) {
        let accessor = MemberRef::method(
            TypeDesc::wrapper_of(prim),
            prim.unbox_method(),
            Vec::new(),
            TypeDesc::Primitive(prim),
        );
        self.emit_member_op(opcodes::INVOKEVIRTUAL, &accessor);
    }
}
