//! Method assembly: binds parameters, runs the generator over a body and
//! closes off the method

use log::debug;

use super::bytecode;
use super::chain::Chain;
use super::constpool::ConstantPool;
use super::descriptor::{MethodDescriptor, TypeDesc};
use super::gen::Gen;
use super::insn::{InsnBuffer, InsnSink};
use super::opcodes;
use super::symtab::{AccessFlags, ClassHandle, Resolver};
use crate::common::error::{Error, Result};
use crate::config::Config;

/// Everything a method body may consult about its surroundings.
///
/// Passed explicitly to every generator; there is no ambient context.
#[derive(Clone, Copy)]
pub struct ClassContext<'a> {
    pub this: &'a ClassHandle,
    pub resolver: &'a dyn Resolver,
    pub config: &'a Config,
}

impl<'a> ClassContext<'a> {
    pub fn new(this: &'a ClassHandle, resolver: &'a dyn Resolver, config: &'a Config) -> Self {
        Self { this, resolver, config }
    }
}

/// Declarative description of one method
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSpec {
    pub name: String,
    pub access: AccessFlags,
    pub params: Vec<(String, TypeDesc)>,
    pub ret: TypeDesc,
    pub throws: Vec<TypeDesc>,
    pub body: Chain,
}

impl MethodSpec {
    pub fn new(name: &str, ret: TypeDesc) -> Self {
        Self {
            name: name.to_string(),
            access: AccessFlags::PUBLIC,
            params: Vec::new(),
            ret,
            throws: Vec::new(),
            body: Chain::new(),
        }
    }

    pub fn with_access(mut self, access: AccessFlags) -> Self {
        self.access = access;
        self
    }

    pub fn param(mut self, name: &str, ty: TypeDesc) -> Self {
        self.params.push((name.to_string(), ty));
        self
    }

    pub fn throws(mut self, ty: TypeDesc) -> Self {
        self.throws.push(ty);
        self
    }

    pub fn body(mut self, body: Chain) -> Self {
        self.body = body;
        self
    }

    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn method_descriptor(&self) -> MethodDescriptor {
        MethodDescriptor::new(self.params.iter().map(|(_, ty)| ty.clone()).collect(), self.ret.clone())
    }

    pub fn descriptor(&self, this: &ClassHandle) -> Result<String> {
        self.method_descriptor().descriptor(this)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limits {
    pub max_stack: u16,
    pub max_locals: u16,
}

/// Generate `spec` into an arbitrary sink
pub fn gen_method(spec: &MethodSpec, ctx: ClassContext<'_>, sink: &mut dyn InsnSink) -> Result<Limits> {
    debug!("assembling {}{}", spec.name, spec.method_descriptor_text());

    let mut gen = Gen::new(ctx, sink, spec.is_static(), spec.ret.clone());
    if !spec.is_static() {
        gen.code.add_named_local("this", TypeDesc::SelfType)?;
    }
    for (name, ty) in &spec.params {
        gen.code.add_named_local(name, ty.clone())?;
    }

    gen.gen_chain(&spec.body)?;

    if gen.code.alive {
        if !spec.ret.is_void() || !ctx.config.implicit_void_return {
            return Err(Error::invalid_input(format!("missing return in {}", spec.name)));
        }
        if !gen.code.is_empty() {
            return Err(Error::internal(format!(
                "{} values left on the stack at the end of {}",
                gen.code.size(),
                spec.name
            )));
        }
        gen.emit_op(opcodes::RETURN);
    }

    let limits = Limits { max_stack: gen.code.max_stack, max_locals: gen.code.max_locals };
    debug!(
        "assembled {}: max_stack={} max_locals={}",
        spec.name, limits.max_stack, limits.max_locals
    );
    Ok(limits)
}

impl MethodSpec {
    /// Descriptor for log lines; the self type may not be named yet
    fn method_descriptor_text(&self) -> String {
        let desc = self.method_descriptor();
        let params: Vec<String> = desc.params.iter().map(|p| p.to_string()).collect();
        format!("({}){}", params.join(", "), desc.ret)
    }
}

/// A method body ready to be written out
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledMethod {
    pub name: String,
    pub access: AccessFlags,
    pub descriptor: MethodDescriptor,
    pub throws: Vec<TypeDesc>,
    pub insns: InsnBuffer,
    pub max_stack: u16,
    pub max_locals: u16,
    pub max_code_length: usize,
}

impl AssembledMethod {
    pub fn descriptor(&self, this: &ClassHandle) -> Result<String> {
        self.descriptor.descriptor(this)
    }

    /// Encode the instruction list, adding its constants to `pool`
    pub fn encode(&self, pool: &mut ConstantPool, this: &ClassHandle) -> Result<Vec<u8>> {
        bytecode::encode(self.insns.insns(), pool, this, self.max_code_length)
    }
}

/// Assemble `spec` into a recorded instruction list
pub fn assemble_method(spec: &MethodSpec, ctx: &ClassContext<'_>) -> Result<AssembledMethod> {
    let mut insns = InsnBuffer::new();
    let limits = gen_method(spec, *ctx, &mut insns)?;
    Ok(AssembledMethod {
        name: spec.name.clone(),
        access: spec.access,
        descriptor: spec.method_descriptor(),
        throws: spec.throws.clone(),
        insns,
        max_stack: limits.max_stack,
        max_locals: limits.max_locals,
        max_code_length: ctx.config.max_code_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::cond::Cond;
    use crate::codegen::symtab::MemberTable;
    use crate::common::error::ErrorKind;

    fn assemble(spec: &MethodSpec, this: &ClassHandle) -> Result<AssembledMethod> {
        let table = MemberTable::with_java_lang();
        let config = Config::default();
        let ctx = ClassContext::new(this, &table, &config);
        assemble_method(spec, &ctx)
    }

    #[test]
    fn test_parameters_take_their_width() {
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let spec = MethodSpec::new("pick", TypeDesc::INT)
            .param("wide", TypeDesc::LONG)
            .param("n", TypeDesc::INT)
            .body(Chain::local("n").ret());
        let m = assemble(&spec, &this).unwrap();
        assert_eq!(m.insns.listing(), "    iload 3\n    ireturn\n");
        assert_eq!(m.max_locals, 4);
        assert_eq!(m.max_stack, 1);
        assert_eq!(m.descriptor(&this).unwrap(), "(JI)I");
    }

    #[test]
    fn test_static_binds_no_receiver() {
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let spec = MethodSpec::new("id", TypeDesc::INT)
            .with_access(AccessFlags::PUBLIC | AccessFlags::STATIC)
            .param("n", TypeDesc::INT)
            .body(Chain::local("n").ret());
        let m = assemble(&spec, &this).unwrap();
        assert_eq!(m.insns.listing(), "    iload 0\n    ireturn\n");
        assert_eq!(m.max_locals, 1);
    }

    #[test]
    fn test_void_falls_off_end() {
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let spec = MethodSpec::new("noop", TypeDesc::Void);
        let m = assemble(&spec, &this).unwrap();
        assert_eq!(m.insns.listing(), "    return\n");
    }

    #[test]
    fn test_missing_return() {
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let spec = MethodSpec::new("f", TypeDesc::INT).body(Chain::new().if_then(
            Cond::gt(Chain::int(1), Chain::int(0)),
            Chain::int(1).ret(),
        ));
        let err = assemble(&spec, &this).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("missing return"));

        let no_implicit = Config { implicit_void_return: false, ..Config::default() };
        let table = MemberTable::with_java_lang();
        let ctx = ClassContext::new(&this, &table, &no_implicit);
        let err = assemble_method(&MethodSpec::new("g", TypeDesc::Void), &ctx).unwrap_err();
        assert!(err.to_string().contains("missing return"));
    }

    #[test]
    fn test_leftover_value_is_internal() {
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let spec = MethodSpec::new("leak", TypeDesc::Void).body(Chain::int(4));
        let err = assemble(&spec, &this).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn test_self_type_descriptor_is_late_bound() {
        let this = ClassHandle::new("java/lang/Object");
        let spec = MethodSpec::new("me", TypeDesc::SelfType).body(Chain::this().ret());
        let m = assemble(&spec, &this).unwrap();
        assert_eq!(m.descriptor(&this), Err(Error::UnresolvedSelfType));
        this.set_name("demo.Late").unwrap();
        assert_eq!(m.descriptor(&this).unwrap(), "()Ldemo/Late;");
    }
}
