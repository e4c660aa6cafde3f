//! Code generation: from operation chains to JVM instructions
//!
//! Leaves first: descriptors and opcodes, the instruction sink, member
//! resolution, the simulator, conversions, conditions, the generator, and
//! finally method assembly and byte encoding.

pub mod bytecode;
pub mod chain;
pub mod code;
pub mod cond;
pub mod constpool;
pub mod descriptor;
pub mod gen;
pub mod gen_flow;
pub mod insn;
pub mod method;
pub mod opcodes;
pub mod symtab;
pub mod types;

pub use chain::{ArithOp, Chain, LocalRef, Op, RelOp};
pub use code::Code;
pub use cond::Cond;
pub use constpool::{Constant, ConstantPool};
pub use descriptor::{MethodDescriptor, PrimitiveType, TypeDesc};
pub use gen::Gen;
pub use insn::{Discard, Insn, InsnBuffer, InsnSink, Label, Literal, MemberRef};
pub use method::{assemble_method, gen_method, AssembledMethod, ClassContext, Limits, MethodSpec};
pub use symtab::{AccessFlags, ClassHandle, Member, MemberKind, MemberTable, Resolver};
