//! Bytecode encoder: recorded instructions to the bytes of a `Code` attribute
//!
//! Picks the compact encodings (`iload_1`, `ldc` vs `ldc_w`), widens slot
//! operands past 255 with `wide`, and patches branch offsets once every label
//! position is known. All branches use the 16-bit forms.

use std::collections::HashMap;

use super::constpool::ConstantPool;
use super::insn::{Insn, Label, Literal};
use super::opcodes;
use super::symtab::ClassHandle;
use crate::common::error::{Error, Result};

struct Fixup {
    /// Offset of the branch opcode
    at: usize,
    target: Label,
}

/// Encode `insns`, interning constants into `pool`
pub fn encode(insns: &[Insn], pool: &mut ConstantPool, this: &ClassHandle, max_code_length: usize) -> Result<Vec<u8>> {
    let mut code = Vec::new();
    let mut labels: HashMap<Label, usize> = HashMap::new();
    let mut fixups = Vec::new();

    for insn in insns {
        match insn {
            Insn::Op(op) => code.push(*op),
            Insn::IntOp(op, value) => encode_int_op(&mut code, *op, *value)?,
            Insn::TypeOp(op, ty) => {
                let index = pool.add_type(ty, this)?;
                code.push(*op);
                code.extend_from_slice(&index.to_be_bytes());
            }
            Insn::Ldc(value) => {
                let index = pool.add_literal(value)?;
                match value {
                    Literal::Long(_) | Literal::Double(_) => {
                        code.push(opcodes::LDC2_W);
                        code.extend_from_slice(&index.to_be_bytes());
                    }
                    _ => match u8::try_from(index) {
                        Ok(short) => code.extend_from_slice(&[opcodes::LDC, short]),
                        Err(_) => {
                            code.push(opcodes::LDC_W);
                            code.extend_from_slice(&index.to_be_bytes());
                        }
                    },
                }
            }
            Insn::Jump(op, target) => {
                fixups.push(Fixup { at: code.len(), target: *target });
                code.extend_from_slice(&[*op, 0, 0]);
            }
            Insn::Label(label) => {
                labels.insert(*label, code.len());
            }
            Insn::Var(op, slot) => encode_var_op(&mut code, *op, *slot)?,
            Insn::Member(op, member) => {
                let index = pool.add_member_ref(member, this)?;
                code.push(*op);
                code.extend_from_slice(&index.to_be_bytes());
                if *op == opcodes::INVOKEINTERFACE {
                    let count = 1 + member.descriptor.arg_slots();
                    let count = u8::try_from(count)
                        .map_err(|_| Error::invalid_input(format!("too many arguments for {}", member)))?;
                    code.extend_from_slice(&[count, 0]);
                }
            }
        }
    }

    if code.len() > max_code_length {
        return Err(Error::CodeTooLarge { size: code.len() });
    }

    for fixup in fixups {
        let target = labels
            .get(&fixup.target)
            .ok_or_else(|| Error::internal(format!("jump to unplaced label {}", fixup.target)))?;
        let offset = *target as i64 - fixup.at as i64;
        let offset = i16::try_from(offset).map_err(|_| Error::BranchTooFar { offset })?;
        code[fixup.at + 1..fixup.at + 3].copy_from_slice(&offset.to_be_bytes());
    }

    Ok(code)
}

fn encode_int_op(code: &mut Vec<u8>, op: u8, value: i32) -> Result<()> {
    match op {
        opcodes::BIPUSH => {
            let v = i8::try_from(value).map_err(|_| Error::internal(format!("bipush operand {} out of range", value)))?;
            code.extend_from_slice(&[op, v as u8]);
        }
        opcodes::SIPUSH => {
            let v = i16::try_from(value).map_err(|_| Error::internal(format!("sipush operand {} out of range", value)))?;
            code.push(op);
            code.extend_from_slice(&v.to_be_bytes());
        }
        opcodes::NEWARRAY => {
            let v = u8::try_from(value).map_err(|_| Error::internal(format!("bad newarray type {}", value)))?;
            code.extend_from_slice(&[op, v]);
        }
        other => {
            return Err(Error::internal(format!("{} takes no immediate", opcodes::mnemonic(other))));
        }
    }
    Ok(())
}

fn encode_var_op(code: &mut Vec<u8>, op: u8, slot: u16) -> Result<()> {
    let compact = match op {
        opcodes::ILOAD..=opcodes::ALOAD => Some(opcodes::ILOAD_0 + (op - opcodes::ILOAD) * 4),
        opcodes::ISTORE..=opcodes::ASTORE => Some(opcodes::ISTORE_0 + (op - opcodes::ISTORE) * 4),
        _ => None,
    };
    let Some(compact) = compact else {
        return Err(Error::internal(format!("{} is not a local variable op", opcodes::mnemonic(op))));
    };
    match slot {
        0..=3 => code.push(compact + slot as u8),
        4..=255 => code.extend_from_slice(&[op, slot as u8]),
        _ => {
            code.extend_from_slice(&[opcodes::WIDE, op]);
            code.extend_from_slice(&slot.to_be_bytes());
        }
    }
    Ok(())
}
