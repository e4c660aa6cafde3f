//! Instruction sink: the low-level emission primitive the generator drives
//!
//! [`InsnSink`] is the boundary between the code generator and whatever
//! eventually writes bytes. [`InsnBuffer`] records a symbolic instruction list
//! (used for listings, the encoder and tests); [`Discard`] drops everything and
//! is used when the generator probes a fragment's result type.

use std::collections::HashMap;
use std::fmt;

use super::descriptor::{MethodDescriptor, TypeDesc};
use super::opcodes;
use super::symtab::{Member, MemberKind};

/// Opaque jump target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Constant loaded with `ldc`
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl Literal {
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            Literal::Int(_) => TypeDesc::INT,
            Literal::Long(_) => TypeDesc::LONG,
            Literal::Float(_) => TypeDesc::FLOAT,
            Literal::Double(_) => TypeDesc::DOUBLE,
            Literal::String(_) => TypeDesc::string(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Long(v) => write!(f, "{}L", v),
            Literal::Float(v) => write!(f, "{}f", v),
            Literal::Double(v) => write!(f, "{}d", v),
            Literal::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Symbolic field or method reference
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRef {
    pub owner: TypeDesc,
    pub name: String,
    /// Fields carry their type as `ret` with no params
    pub descriptor: MethodDescriptor,
    pub is_field: bool,
    pub is_interface: bool,
}

impl MemberRef {
    pub fn method(owner: TypeDesc, name: &str, params: Vec<TypeDesc>, ret: TypeDesc) -> Self {
        Self {
            owner,
            name: name.to_string(),
            descriptor: MethodDescriptor::new(params, ret),
            is_field: false,
            is_interface: false,
        }
    }

    pub fn field(owner: TypeDesc, name: &str, ty: TypeDesc) -> Self {
        Self {
            owner,
            name: name.to_string(),
            descriptor: MethodDescriptor::new(Vec::new(), ty),
            is_field: true,
            is_interface: false,
        }
    }
}

impl From<&Member> for MemberRef {
    fn from(member: &Member) -> Self {
        Self {
            owner: member.owner.clone(),
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
            is_field: member.kind == MemberKind::Field,
            is_interface: member.owner_is_interface,
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_field {
            write!(f, "{}.{}:{}", self.owner, self.name, self.descriptor.ret)
        } else {
            let params: Vec<String> = self.descriptor.params.iter().map(|p| p.to_string()).collect();
            write!(f, "{}.{}({}){}", self.owner, self.name, params.join(","), self.descriptor.ret)
        }
    }
}

/// Low-level instruction emission primitive
pub trait InsnSink {
    /// An instruction without operands
    fn emit_op(&mut self, opcode: u8);
    /// `bipush`, `sipush`, `newarray`
    fn emit_int_op(&mut self, opcode: u8, operand: i32);
    /// `new`, `checkcast`, `instanceof`, `anewarray`
    fn emit_type_op(&mut self, opcode: u8, ty: &TypeDesc);
    fn emit_literal(&mut self, value: &Literal);
    fn emit_jump(&mut self, opcode: u8, target: Label);
    fn new_label(&mut self) -> Label;
    fn place_label(&mut self, label: Label);
    /// Typed local load/store with a slot index
    fn emit_var_op(&mut self, opcode: u8, slot: u16);
    /// Field access or invocation
    fn emit_member_op(&mut self, opcode: u8, member: &MemberRef);
}

/// One recorded instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    Op(u8),
    IntOp(u8, i32),
    TypeOp(u8, TypeDesc),
    Ldc(Literal),
    Jump(u8, Label),
    Label(Label),
    Var(u8, u16),
    Member(u8, MemberRef),
}

impl Insn {
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Insn::Op(op)
            | Insn::IntOp(op, _)
            | Insn::TypeOp(op, _)
            | Insn::Jump(op, _)
            | Insn::Var(op, _)
            | Insn::Member(op, _) => Some(*op),
            Insn::Ldc(_) => Some(opcodes::LDC),
            Insn::Label(_) => None,
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Op(op) => f.write_str(opcodes::mnemonic(*op)),
            Insn::IntOp(op, v) => write!(f, "{} {}", opcodes::mnemonic(*op), v),
            Insn::TypeOp(op, ty) => write!(f, "{} {}", opcodes::mnemonic(*op), ty),
            Insn::Ldc(value) => write!(f, "ldc {}", value),
            Insn::Jump(op, label) => write!(f, "{} {}", opcodes::mnemonic(*op), label),
            Insn::Label(label) => write!(f, "{}:", label),
            Insn::Var(op, slot) => write!(f, "{} {}", opcodes::mnemonic(*op), slot),
            Insn::Member(op, m) => write!(f, "{} {}", opcodes::mnemonic(*op), m),
        }
    }
}

/// Recording sink
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsnBuffer {
    insns: Vec<Insn>,
    next_label: u32,
}

impl InsnBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insns(&self) -> &[Insn] {
        &self.insns
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Position of each placed label in the instruction list
    pub fn label_positions(&self) -> HashMap<Label, usize> {
        self.insns
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Insn::Label(l) => Some((*l, i)),
                _ => None,
            })
            .collect()
    }

    /// Opcodes in emission order, labels skipped
    pub fn opcodes(&self) -> Vec<u8> {
        self.insns.iter().filter_map(Insn::opcode).collect()
    }

    /// One instruction per line, labels flush left
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for insn in &self.insns {
            match insn {
                Insn::Label(_) => out.push_str(&format!("{}\n", insn)),
                _ => out.push_str(&format!("    {}\n", insn)),
            }
        }
        out
    }
}

impl InsnSink for InsnBuffer {
    fn emit_op(&mut self, opcode: u8) {
        self.insns.push(Insn::Op(opcode));
    }

    fn emit_int_op(&mut self, opcode: u8, operand: i32) {
        self.insns.push(Insn::IntOp(opcode, operand));
    }

    fn emit_type_op(&mut self, opcode: u8, ty: &TypeDesc) {
        self.insns.push(Insn::TypeOp(opcode, ty.clone()));
    }

    fn emit_literal(&mut self, value: &Literal) {
        self.insns.push(Insn::Ldc(value.clone()));
    }

    fn emit_jump(&mut self, opcode: u8, target: Label) {
        self.insns.push(Insn::Jump(opcode, target));
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn place_label(&mut self, label: Label) {
        self.insns.push(Insn::Label(label));
    }

    fn emit_var_op(&mut self, opcode: u8, slot: u16) {
        self.insns.push(Insn::Var(opcode, slot));
    }

    fn emit_member_op(&mut self, opcode: u8, member: &MemberRef) {
        self.insns.push(Insn::Member(opcode, member.clone()));
    }
}

/// Sink that drops every instruction.
///
/// Labels come from the upper half of the id space so they never collide
/// with labels of a real sink the same method is being written to.
#[derive(Debug, Default)]
pub struct Discard {
    next_label: u32,
}

impl Discard {
    const LABEL_BASE: u32 = 1 << 31;
}

impl InsnSink for Discard {
    fn emit_op(&mut self, _opcode: u8) {}
    fn emit_int_op(&mut self, _opcode: u8, _operand: i32) {}
    fn emit_type_op(&mut self, _opcode: u8, _ty: &TypeDesc) {}
    fn emit_literal(&mut self, _value: &Literal) {}
    fn emit_jump(&mut self, _opcode: u8, _target: Label) {}

    fn new_label(&mut self) -> Label {
        let label = Label(Self::LABEL_BASE + self.next_label);
        self.next_label += 1;
        label
    }

    fn place_label(&mut self, _label: Label) {}
    fn emit_var_op(&mut self, _opcode: u8, _slot: u16) {}
    fn emit_member_op(&mut self, _opcode: u8, _member: &MemberRef) {}
}
