//! Per-method code generator
//!
//! [`Gen`] walks a [`Chain`] and, for every [`Op`], validates it against the
//! simulated machine state, emits instructions to the sink and applies the
//! stack effect to [`Code`]. Control-flow operations live in `gen_flow`,
//! conversions in `types`, conditions in `cond`.

use std::collections::HashMap;

use log::trace;

use super::chain::{ArithOp, Chain, LocalRef, Op};
use super::code::Code;
use super::descriptor::{PrimitiveType, TypeDesc};
use super::insn::{Discard, Insn, InsnSink, Label, Literal, MemberRef};
use super::method::ClassContext;
use super::opcodes::{self, atype};
use super::symtab::Member;
use super::types::{binary_promotion, computational, unary_promotion};
use crate::common::error::{Error, Result};

pub struct Gen<'a> {
    pub code: Code,
    sink: &'a mut dyn InsnSink,
    ctx: ClassContext<'a>,
    is_static: bool,
    ret: TypeDesc,
    /// Probed fragment types keyed by chain address, valid while the
    /// outermost op that borrows those chains is being generated
    probed: HashMap<usize, TypeDesc>,
    op_depth: usize,
}

impl<'a> Gen<'a> {
    pub fn new(ctx: ClassContext<'a>, sink: &'a mut dyn InsnSink, is_static: bool, ret: TypeDesc) -> Self {
        Self {
            code: Code::new(),
            sink,
            ctx,
            is_static,
            ret,
            probed: HashMap::new(),
            op_depth: 0,
        }
    }

    pub fn context(&self) -> ClassContext<'a> {
        self.ctx
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn return_type(&self) -> &TypeDesc {
        &self.ret
    }

    // ------------------------------------------------------------------
    // Emission primitives
    // ------------------------------------------------------------------

    fn trace(&self, insn: impl FnOnce() -> Insn) {
        if self.ctx.config.debug_code {
            trace!("[{:>3}] {}", self.code.slot_depth(), insn());
        }
    }

    /// Emit an operand-less instruction; a terminal one ends the reachable code
    pub fn emit_op(&mut self, opcode: u8) {
        self.trace(|| Insn::Op(opcode));
        self.sink.emit_op(opcode);
        if opcodes::is_terminal(opcode) {
            self.code.mark_dead();
        }
    }

    pub fn emit_int_op(&mut self, opcode: u8, operand: i32) {
        self.trace(|| Insn::IntOp(opcode, operand));
        self.sink.emit_int_op(opcode, operand);
    }

    pub fn emit_type_op(&mut self, opcode: u8, ty: &TypeDesc) {
        self.trace(|| Insn::TypeOp(opcode, ty.clone()));
        self.sink.emit_type_op(opcode, ty);
    }

    pub fn emit_literal(&mut self, value: &Literal) {
        self.trace(|| Insn::Ldc(value.clone()));
        self.sink.emit_literal(value);
    }

    pub fn emit_var_op(&mut self, opcode: u8, slot: u16) {
        self.trace(|| Insn::Var(opcode, slot));
        self.sink.emit_var_op(opcode, slot);
    }

    pub fn emit_member_op(&mut self, opcode: u8, member: &MemberRef) {
        self.trace(|| Insn::Member(opcode, member.clone()));
        self.sink.emit_member_op(opcode, member);
    }

    /// Branch to `target`; the current stack shape is recorded for the label
    pub fn emit_jump(&mut self, opcode: u8, target: Label) -> Result<()> {
        self.code.jump_to(target)?;
        self.trace(|| Insn::Jump(opcode, target));
        self.sink.emit_jump(opcode, target);
        if opcode == opcodes::GOTO {
            self.code.mark_dead();
        }
        Ok(())
    }

    pub fn new_label(&mut self) -> Label {
        self.sink.new_label()
    }

    pub fn place(&mut self, label: Label) -> Result<()> {
        self.code.place(label)?;
        self.trace(|| Insn::Label(label));
        self.sink.place_label(label);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Chains
    // ------------------------------------------------------------------

    pub fn gen_chain(&mut self, chain: &Chain) -> Result<()> {
        for op in chain.ops() {
            self.gen_op(op)?;
        }
        Ok(())
    }

    /// Generate a fragment that must leave exactly one value on the stack
    pub fn gen_value(&mut self, chain: &Chain) -> Result<TypeDesc> {
        let before = self.code.size();
        self.gen_chain(chain)?;
        let pushed = self.code.size() as i64 - before as i64;
        if pushed != 1 {
            return Err(Error::internal(format!(
                "fragment expected to push exactly one value pushed {}",
                pushed
            )));
        }
        Ok(self.code.peek()?.clone())
    }

    /// Generate `chain` in a fresh scope
    pub fn gen_scoped(&mut self, chain: &Chain) -> Result<()> {
        self.code.begin_scope();
        self.gen_chain(chain)?;
        self.code.end_scope()
    }

    /// Type a value fragment would produce, without emitting anything.
    ///
    /// Each fragment is dry-run at most once per outermost op; the types of
    /// everything nested inside it are remembered too.
    pub fn probe(&mut self, chain: &Chain) -> Result<TypeDesc> {
        let key = chain as *const Chain as usize;
        if let Some(ty) = self.probed.get(&key) {
            return Ok(ty.clone());
        }
        let mut scratch = Discard::default();
        let mut dry = Gen {
            code: self.code.fork(),
            sink: &mut scratch,
            ctx: self.ctx,
            is_static: self.is_static,
            ret: self.ret.clone(),
            probed: std::mem::take(&mut self.probed),
            op_depth: self.op_depth + 1,
        };
        let result = dry.gen_value(chain);
        self.probed = std::mem::take(&mut dry.probed);
        if self.op_depth == 0 {
            self.probed.clear();
        } else if let Ok(ty) = &result {
            self.probed.insert(key, ty.clone());
        }
        result
    }

    fn gen_op(&mut self, op: &Op) -> Result<()> {
        self.op_depth += 1;
        let result = self.dispatch(op);
        self.op_depth -= 1;
        if self.op_depth == 0 {
            self.probed.clear();
        }
        result
    }

    fn dispatch(&mut self, op: &Op) -> Result<()> {
        if !self.code.alive {
            return Err(Error::invalid_input(format!("unreachable code: {}", op.name())));
        }
        match op {
            Op::Const(value) => self.gen_constant(value),
            Op::Bool(value) => {
                self.emit_op(if *value { opcodes::ICONST_1 } else { opcodes::ICONST_0 });
                self.code.push(TypeDesc::BOOLEAN)
            }
            Op::Null => {
                self.emit_op(opcodes::ACONST_NULL);
                self.code.push(TypeDesc::Null)
            }
            Op::This => {
                if self.is_static {
                    return Err(Error::static_mismatch("`this` referenced in a static method"));
                }
                self.emit_var_op(opcodes::ALOAD, 0);
                self.code.push(TypeDesc::SelfType)
            }
            Op::Load(local) => {
                let slot = self.slot_of(local)?;
                let ty = self.code.local_type(slot)?.clone();
                self.load(slot, ty)
            }
            Op::Store(local, value) => self.gen_store(local, value),
            Op::Declare { name, ty, init } => {
                match init {
                    Some(init) => {
                        self.gen_value(init)?;
                        self.coerce(ty)?;
                        let slot = self.code.add_named_local(name, ty.clone())?;
                        self.store_top(slot)
                    }
                    None => self.code.add_named_local(name, ty.clone()).map(|_| ()),
                }
            }
            Op::Increment(local, by) => self.gen_increment(local, *by),
            Op::GetField(name) => self.gen_get_field(name),
            Op::PutField(name, value) => self.gen_put_field(name, value),
            Op::GetStatic(owner, name) => {
                let field = self.static_field(owner, name)?;
                self.emit_member_op(opcodes::GETSTATIC, &MemberRef::from(&field));
                self.code.push(field.value_type().clone())
            }
            Op::PutStatic(owner, name, value) => {
                let field = self.static_field(owner, name)?;
                self.gen_value(value)?;
                self.coerce(field.value_type())?;
                self.code.pop()?;
                self.emit_member_op(opcodes::PUTSTATIC, &MemberRef::from(&field));
                Ok(())
            }
            Op::Invoke(name, args) => self.gen_invoke(name, args),
            Op::InvokeStatic(owner, name, args) => self.gen_invoke_static(owner, name, args),
            Op::New(ty, args) => self.gen_new(ty, args),
            Op::SuperInit(args) => self.gen_super_init(args),
            Op::NewArray(elem, len) => self.gen_new_array(elem, len),
            Op::ArrayLoad(index) => {
                let elem = self.array_element()?;
                self.gen_value(index)?;
                self.coerce(&TypeDesc::INT)?;
                self.code.pop_n(2)?;
                self.emit_op(opcodes::IALOAD + elem.typecode());
                self.code.push(elem)
            }
            Op::ArrayStore(index, value) => {
                let elem = self.array_element()?;
                self.gen_value(index)?;
                self.coerce(&TypeDesc::INT)?;
                self.gen_value(value)?;
                self.coerce(&elem)?;
                self.code.pop_n(3)?;
                self.emit_op(opcodes::IASTORE + elem.typecode());
                Ok(())
            }
            Op::ArrayLength => {
                self.array_element()?;
                self.code.pop()?;
                self.emit_op(opcodes::ARRAYLENGTH);
                self.code.push(TypeDesc::INT)
            }
            Op::Arith(op, rhs) => self.gen_arith(*op, rhs),
            Op::Neg => {
                let ty = self.code.peek()?.clone();
                let promoted = unary_promotion(&ty)
                    .ok_or_else(|| Error::invalid_input(format!("cannot negate a value of type {}", ty)))?;
                self.coerce(&TypeDesc::Primitive(promoted))?;
                self.emit_op(opcodes::INEG + promoted.typecode());
                Ok(())
            }
            Op::Cast(ty) => self.cast(ty),
            Op::Convert(ty) => self.coerce(ty),
            Op::InstanceOf(ty) => {
                let top = self.code.peek()?.clone();
                if !top.is_reference() || !ty.is_reference() || *ty == TypeDesc::Null {
                    return Err(Error::invalid_input(format!("{} instanceof {} is not a reference test", top, ty)));
                }
                self.code.pop()?;
                self.emit_type_op(opcodes::INSTANCEOF, ty);
                self.code.push(TypeDesc::BOOLEAN)
            }
            Op::Pop => {
                let ty = self.code.pop()?;
                self.emit_op(if ty.is_wide() { opcodes::POP2 } else { opcodes::POP });
                Ok(())
            }
            Op::Return => {
                if self.ret.is_void() {
                    return Err(Error::invalid_input("return with a value from a void method"));
                }
                let ret = self.ret.clone();
                self.coerce(&ret)?;
                self.code.pop()?;
                self.emit_op(opcodes::IRETURN + opcodes::truncate(ret.typecode()));
                Ok(())
            }
            Op::ReturnVoid => {
                if !self.ret.is_void() {
                    return Err(Error::invalid_input(format!("missing return value of type {}", self.ret)));
                }
                self.emit_op(opcodes::RETURN);
                Ok(())
            }
            Op::Throw => {
                let ty = self.code.peek()?.clone();
                let throwable = TypeDesc::class("java.lang.Throwable");
                if !self.ctx.resolver.is_subtype(&ty, &throwable) {
                    return Err(Error::invalid_input(format!("cannot throw a value of type {}", ty)));
                }
                self.code.pop()?;
                self.emit_op(opcodes::ATHROW);
                Ok(())
            }
            Op::If { cond, then, otherwise } => self.gen_if(cond, then, otherwise.as_ref()),
            Op::While { cond, body } => self.gen_while(cond, body),
            Op::Ternary { cond, then, otherwise } => self.gen_ternary(cond, then, otherwise),
            Op::CondValue(cond) => self.gen_cond_value(cond),
            Op::Block(body) => self.gen_scoped(body),
            Op::Malformed(message) => Err(Error::invalid_input(message.clone())),
        }
    }

    // ------------------------------------------------------------------
    // Constants and locals
    // ------------------------------------------------------------------

    fn gen_constant(&mut self, value: &Literal) -> Result<()> {
        match value {
            Literal::Int(v @ -1..=5) => self.emit_op((i32::from(opcodes::ICONST_0) + v) as u8),
            Literal::Int(v) if i8::try_from(*v).is_ok() => self.emit_int_op(opcodes::BIPUSH, *v),
            Literal::Int(v) if i16::try_from(*v).is_ok() => self.emit_int_op(opcodes::SIPUSH, *v),
            Literal::Long(v @ 0..=1) => self.emit_op(opcodes::LCONST_0 + *v as u8),
            Literal::Float(v) if is_small_constant(f64::from(*v), 2.0) => {
                self.emit_op(opcodes::FCONST_0 + *v as u8)
            }
            Literal::Double(v) if is_small_constant(*v, 1.0) => self.emit_op(opcodes::DCONST_0 + *v as u8),
            _ => self.emit_literal(value),
        }
        self.code.push(value.type_desc())
    }

    fn slot_of(&self, local: &LocalRef) -> Result<u16> {
        match local {
            LocalRef::Named(name) => self.code.resolve_index(name),
            LocalRef::Slot(slot) => Ok(*slot),
        }
    }

    fn load(&mut self, slot: u16, ty: TypeDesc) -> Result<()> {
        self.emit_var_op(opcodes::ILOAD + opcodes::truncate(ty.typecode()), slot);
        self.code.push(ty)
    }

    /// Pop the top of the stack into `slot`
    fn store_top(&mut self, slot: u16) -> Result<()> {
        let ty = self.code.pop()?;
        self.emit_var_op(opcodes::ISTORE + opcodes::truncate(ty.typecode()), slot);
        Ok(())
    }

    fn gen_store(&mut self, local: &LocalRef, value: &Chain) -> Result<()> {
        let (slot, declared) = match local {
            LocalRef::Named(name) => {
                let slot = self.code.resolve_index(name)?;
                (slot, Some(self.code.local_type(slot)?.clone()))
            }
            LocalRef::Slot(slot) => (*slot, self.code.local_type(*slot).ok().cloned()),
        };
        let ty = self.gen_value(value)?;
        match declared {
            Some(declared) => self.coerce(&declared)?,
            None => self.code.set_local(slot, ty)?,
        }
        self.store_top(slot)
    }

    fn gen_increment(&mut self, local: &LocalRef, by: i32) -> Result<()> {
        let slot = self.slot_of(local)?;
        let ty = self.code.local_type(slot)?.clone();
        let prim = ty
            .as_primitive()
            .filter(|p| p.is_numeric())
            .ok_or_else(|| Error::invalid_input(format!("cannot increment {} of type {}", local, ty)))?;
        let comp = computational(prim);
        let step = match comp {
            PrimitiveType::Long => Literal::Long(i64::from(by)),
            PrimitiveType::Float => Literal::Float(by as f32),
            PrimitiveType::Double => Literal::Double(f64::from(by)),
            _ => Literal::Int(by),
        };
        self.load(slot, ty.clone())?;
        self.gen_constant(&step)?;
        self.code.pop_n(2)?;
        self.emit_op(opcodes::IADD + comp.typecode());
        self.code.push(TypeDesc::Primitive(comp))?;
        self.cast(&ty)?;
        self.store_top(slot)
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    fn check_access(&self, member: &Member) -> Result<()> {
        if self.ctx.resolver.is_accessible(&TypeDesc::SelfType, &member.owner, member.access) {
            return Ok(());
        }
        let from = self
            .ctx
            .this
            .binary_name()
            .map(|n| n.replace('/', "."))
            .unwrap_or_else(|_| TypeDesc::SelfType.to_string());
        Err(Error::Inaccessible { member: member.to_string(), from })
    }

    fn resolve_field(&self, owner: &TypeDesc, name: &str) -> Result<Member> {
        let field = self.ctx.resolver.resolve_field(owner, name).ok_or_else(|| Error::UnresolvedMember {
            owner: owner.to_string(),
            name: name.to_string(),
            args: String::new(),
        })?;
        self.check_access(&field)?;
        Ok(field)
    }

    fn resolve_method(&self, owner: &TypeDesc, name: &str, args: &[TypeDesc], is_constructor: bool) -> Result<Member> {
        let method = self
            .ctx
            .resolver
            .resolve(owner, name, args, is_constructor)
            .ok_or_else(|| Error::UnresolvedMember {
                owner: owner.to_string(),
                name: name.to_string(),
                args: args.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", "),
            })?;
        self.check_access(&method)?;
        Ok(method)
    }

    fn static_field(&self, owner: &TypeDesc, name: &str) -> Result<Member> {
        let field = self.resolve_field(owner, name)?;
        if !field.is_static() {
            return Err(Error::static_mismatch(format!("{} is an instance field", field)));
        }
        Ok(field)
    }

    /// Receiver on top of the stack, which must be a non-null reference
    fn receiver(&self, what: &str) -> Result<TypeDesc> {
        let ty = self.code.peek()?.clone();
        if !ty.is_reference() || ty == TypeDesc::Null {
            return Err(Error::invalid_input(format!("{} on a value of type {}", what, ty)));
        }
        Ok(ty)
    }

    fn instance_field(&self, name: &str) -> Result<Member> {
        let owner = self.receiver(&format!("field access .{}", name))?;
        let field = self.resolve_field(&owner, name)?;
        if field.is_static() {
            return Err(Error::static_mismatch(format!("static field {} accessed through an instance", field)));
        }
        Ok(field)
    }

    fn gen_get_field(&mut self, name: &str) -> Result<()> {
        let field = self.instance_field(name)?;
        self.code.pop()?;
        self.emit_member_op(opcodes::GETFIELD, &MemberRef::from(&field));
        self.code.push(field.value_type().clone())
    }

    fn gen_put_field(&mut self, name: &str, value: &Chain) -> Result<()> {
        let field = self.instance_field(name)?;
        self.gen_value(value)?;
        self.coerce(field.value_type())?;
        self.code.pop_n(2)?;
        self.emit_member_op(opcodes::PUTFIELD, &MemberRef::from(&field));
        Ok(())
    }

    fn probe_args(&mut self, args: &[Chain]) -> Result<Vec<TypeDesc>> {
        args.iter().map(|arg| self.probe(arg)).collect()
    }

    fn gen_args(&mut self, args: &[Chain], params: &[TypeDesc]) -> Result<()> {
        for (arg, param) in args.iter().zip(params) {
            self.gen_value(arg)?;
            self.coerce(param)?;
        }
        Ok(())
    }

    /// Consume receiver and arguments, emit the call and push its result
    fn finish_call(&mut self, opcode: u8, method: &Member, with_receiver: bool) -> Result<()> {
        self.code.pop_n(method.params().len() + usize::from(with_receiver))?;
        self.emit_member_op(opcode, &MemberRef::from(method));
        let ret = method.value_type();
        if !ret.is_void() {
            self.code.push(ret.clone())?;
        }
        Ok(())
    }

    fn gen_invoke(&mut self, name: &str, args: &[Chain]) -> Result<()> {
        let owner = self.receiver(&format!("call to {}", name))?;
        let arg_types = self.probe_args(args)?;
        let method = self.resolve_method(&owner, name, &arg_types, false)?;
        if method.is_static() {
            return Err(Error::static_mismatch(format!("static method {} invoked through an instance", method)));
        }
        self.gen_args(args, method.params())?;
        let opcode = if method.owner_is_interface {
            opcodes::INVOKEINTERFACE
        } else if method.access.is_private() && method.owner == TypeDesc::SelfType {
            opcodes::INVOKESPECIAL
        } else {
            opcodes::INVOKEVIRTUAL
        };
        self.finish_call(opcode, &method, true)
    }

    fn gen_invoke_static(&mut self, owner: &TypeDesc, name: &str, args: &[Chain]) -> Result<()> {
        let arg_types = self.probe_args(args)?;
        let method = self.resolve_method(owner, name, &arg_types, false)?;
        if !method.is_static() {
            return Err(Error::static_mismatch(format!("{} is an instance method", method)));
        }
        self.gen_args(args, method.params())?;
        self.finish_call(opcodes::INVOKESTATIC, &method, false)
    }

    fn gen_new(&mut self, ty: &TypeDesc, args: &[Chain]) -> Result<()> {
        if !matches!(ty, TypeDesc::Class(_) | TypeDesc::SelfType) {
            return Err(Error::invalid_input(format!("cannot instantiate {}", ty)));
        }
        let arg_types = self.probe_args(args)?;
        let ctor = self.resolve_method(ty, "<init>", &arg_types, true)?;
        self.emit_type_op(opcodes::NEW, ty);
        self.code.push(ty.clone())?;
        self.emit_op(opcodes::DUP);
        self.code.push(ty.clone())?;
        self.gen_args(args, ctor.params())?;
        self.finish_call(opcodes::INVOKESPECIAL, &ctor, true)
    }

    fn gen_super_init(&mut self, args: &[Chain]) -> Result<()> {
        if self.is_static {
            return Err(Error::static_mismatch("super constructor call in a static method"));
        }
        let superclass = self.ctx.this.superclass();
        let arg_types = self.probe_args(args)?;
        let ctor = self.resolve_method(&superclass, "<init>", &arg_types, true)?;
        self.emit_var_op(opcodes::ALOAD, 0);
        self.code.push(TypeDesc::SelfType)?;
        self.gen_args(args, ctor.params())?;
        self.finish_call(opcodes::INVOKESPECIAL, &ctor, true)
    }

    // ------------------------------------------------------------------
    // Arrays and arithmetic
    // ------------------------------------------------------------------

    fn gen_new_array(&mut self, elem: &TypeDesc, len: &Chain) -> Result<()> {
        if elem.is_void() || *elem == TypeDesc::Null {
            return Err(Error::invalid_input(format!("no arrays of {}", elem)));
        }
        self.gen_value(len)?;
        self.coerce(&TypeDesc::INT)?;
        self.code.pop()?;
        match elem.as_primitive() {
            Some(prim) => self.emit_int_op(opcodes::NEWARRAY, array_type_code(prim)),
            None => self.emit_type_op(opcodes::ANEWARRAY, elem),
        }
        self.code.push(TypeDesc::array_of(elem.clone()))
    }

    /// Element type of the array on top of the stack
    fn array_element(&self) -> Result<TypeDesc> {
        let ty = self.code.peek()?;
        ty.element_type()
            .cloned()
            .ok_or_else(|| Error::invalid_input(format!("{} is not an array", ty)))
    }

    fn gen_arith(&mut self, op: ArithOp, rhs: &Chain) -> Result<()> {
        let lt = self.code.peek()?.clone();
        let rt = self.probe(rhs)?;
        let not_applicable =
            || Error::invalid_input(format!("operator {} is not applicable to {} and {}", op.symbol(), lt, rt));

        let result = if op.is_shift() {
            let promoted = unary_promotion(&lt)
                .filter(|p| p.is_integral())
                .ok_or_else(not_applicable)?;
            let ty = TypeDesc::Primitive(promoted);
            self.coerce(&ty)?;
            self.gen_value(rhs)?;
            self.coerce(&TypeDesc::INT)?;
            ty
        } else if op.is_bitwise() && is_boolean_like(&lt) && is_boolean_like(&rt) {
            self.coerce(&TypeDesc::BOOLEAN)?;
            self.gen_value(rhs)?;
            self.coerce(&TypeDesc::BOOLEAN)?;
            TypeDesc::BOOLEAN
        } else {
            let promoted = binary_promotion(&lt, &rt)
                .filter(|p| !op.is_bitwise() || p.is_integral())
                .ok_or_else(not_applicable)?;
            let ty = TypeDesc::Primitive(promoted);
            self.coerce(&ty)?;
            self.gen_value(rhs)?;
            self.coerce(&ty)?;
            ty
        };
        self.code.pop_n(2)?;
        self.emit_op(op.base_opcode() + opcodes::truncate(result.typecode()));
        self.code.push(result)
    }
}

pub(super) fn is_boolean_like(ty: &TypeDesc) -> bool {
    ty.is_boolean() || ty.unboxed() == Some(PrimitiveType::Boolean)
}

/// `v` is one of 0.0 (positive), 1.0, ... `max`
fn is_small_constant(v: f64, max: f64) -> bool {
    v.fract() == 0.0 && (0.0..=max).contains(&v) && v.is_sign_positive()
}

fn array_type_code(prim: PrimitiveType) -> i32 {
    match prim {
        PrimitiveType::Boolean => atype::T_BOOLEAN,
        PrimitiveType::Char => atype::T_CHAR,
        PrimitiveType::Float => atype::T_FLOAT,
        PrimitiveType::Double => atype::T_DOUBLE,
        PrimitiveType::Byte => atype::T_BYTE,
        PrimitiveType::Short => atype::T_SHORT,
        PrimitiveType::Int => atype::T_INT,
        PrimitiveType::Long => atype::T_LONG,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::insn::InsnBuffer;
    use crate::codegen::symtab::{ClassHandle, MemberTable};
    use crate::config::Config;

    fn with_gen<T>(is_static: bool, f: impl FnOnce(&mut Gen<'_>) -> Result<T>) -> (Result<T>, InsnBuffer) {
        let table = MemberTable::with_java_lang();
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let config = Config::default();
        let mut buf = InsnBuffer::new();
        let result = {
            let mut gen = Gen::new(ClassContext::new(&this, &table, &config), &mut buf, is_static, TypeDesc::Void);
            f(&mut gen)
        };
        (result, buf)
    }

    #[test]
    fn test_constant_forms() {
        let (result, buf) = with_gen(true, |gen| {
            for chain in [
                Chain::int(-1),
                Chain::int(5),
                Chain::int(100),
                Chain::int(1000),
                Chain::int(100_000),
                Chain::long(1),
                Chain::float(2.0),
                Chain::double(-0.0),
            ] {
                gen.gen_value(&chain)?;
            }
            Ok(gen.code.slot_depth())
        });
        assert_eq!(result.unwrap(), 10);
        assert_eq!(
            buf.insns(),
            &[
                Insn::Op(opcodes::ICONST_M1),
                Insn::Op(opcodes::ICONST_5),
                Insn::IntOp(opcodes::BIPUSH, 100),
                Insn::IntOp(opcodes::SIPUSH, 1000),
                Insn::Ldc(Literal::Int(100_000)),
                Insn::Op(opcodes::LCONST_1),
                Insn::Op(opcodes::FCONST_2),
                Insn::Ldc(Literal::Double(-0.0)),
            ]
        );
    }

    #[test]
    fn test_probe_emits_nothing() {
        let (result, buf) = with_gen(true, |gen| {
            let ty = gen.probe(&Chain::string("x").invoke("length", vec![]))?;
            Ok((ty, gen.code.size()))
        });
        assert_eq!(result.unwrap(), (TypeDesc::INT, 0));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_gen_value_requires_one_value() {
        let (result, _) = with_gen(true, |gen| gen.gen_value(&Chain::int(1).append(Chain::int(2))));
        let err = result.unwrap_err();
        assert!(err.is_internal());
        assert_eq!(
            err.to_string(),
            "internal invariant violated: fragment expected to push exactly one value pushed 2"
        );
    }

    #[test]
    fn test_this_in_static_method() {
        let (result, _) = with_gen(true, |gen| gen.gen_value(&Chain::this()));
        assert!(matches!(result, Err(Error::StaticMismatch { .. })));
    }

    #[test]
    fn test_increment_narrow_local() {
        let (result, buf) = with_gen(true, |gen| {
            gen.gen_chain(&Chain::new().declare("b", TypeDesc::BYTE, Chain::int(3).cast(TypeDesc::BYTE)).increment("b", 1))
        });
        result.unwrap();
        let listing = buf.listing();
        assert!(listing.contains("iadd"));
        assert!(listing.contains("i2b"));
    }

    #[test]
    fn test_unreachable_code() {
        let (result, _) = with_gen(true, |gen| gen.gen_chain(&Chain::new().ret_void().ret_void()));
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }

    #[test]
    fn test_arith_promotion() {
        let (result, buf) = with_gen(true, |gen| gen.gen_value(&Chain::int(1).add(Chain::long(2))));
        assert_eq!(result.unwrap(), TypeDesc::LONG);
        assert_eq!(buf.opcodes(), vec![opcodes::ICONST_1, opcodes::I2L, opcodes::LDC, opcodes::LADD]);
    }

    #[test]
    fn test_bitwise_rejects_floating() {
        let (result, _) = with_gen(true, |gen| gen.gen_value(&Chain::double(1.5).and(Chain::int(1))));
        assert!(matches!(result, Err(Error::InvalidInput { .. })));
    }
}
