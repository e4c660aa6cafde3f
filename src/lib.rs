//! jfluent: fluent JVM method-body assembler
//!
//! Method bodies are described as [`Chain`]s of operations and assembled into
//! JVM instructions while a simulated operand stack, local table and scope
//! stack validate every step.
//!
//! ## Architecture
//!
//! - **codegen::code**: operand-stack / locals simulator
//! - **codegen::types**: implicit and explicit conversions, numeric promotion
//! - **codegen::cond**: conditions and the short-circuit branch compiler
//! - **codegen::gen**, **codegen::gen_flow**: the generator and control flow
//! - **codegen::method**: method assembly; **codegen::bytecode**: byte encoding
//! - **samples**: ready-made bodies used by the CLI
//!
//! ```text
//! Chain → Gen (Code + Conversions + Cond) → InsnSink → bytecode::encode → bytes
//! ```

pub mod codegen;
pub mod common;
pub mod config;
pub mod samples;

pub use codegen::chain::Chain;
pub use codegen::cond::Cond;
pub use codegen::descriptor::TypeDesc;
pub use codegen::method::{assemble_method, AssembledMethod, ClassContext, MethodSpec};
pub use common::error::{Error, ErrorKind, Result};
pub use config::Config;
