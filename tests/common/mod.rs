// Common test utilities: logging setup and a small interpreter over recorded
// instruction lists.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use jfluent::codegen::descriptor::TypeDesc;
use jfluent::codegen::insn::{Insn, Label, Literal, MemberRef};
use jfluent::codegen::method::{assemble_method, AssembledMethod, ClassContext, MethodSpec};
use jfluent::codegen::opcodes::{self, typecodes};
use jfluent::codegen::symtab::{ClassHandle, MemberTable};
use jfluent::samples;
use jfluent::Config;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Null,
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    /// A wrapper object (`Integer`, `Boolean`, ...) around a primitive value
    Boxed(Box<Value>),
}

impl Value {
    pub fn int_array(values: &[i32]) -> Value {
        Value::Array(Rc::new(RefCell::new(values.iter().map(|v| Value::Int(*v)).collect())))
    }

    pub fn bool(b: bool) -> Value {
        Value::Int(i32::from(b))
    }

    fn width(&self) -> u16 {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    fn int(&self) -> i32 {
        match self {
            Value::Int(v) => *v,
            other => panic!("expected int, found {:?}", other),
        }
    }

    fn long(&self) -> i64 {
        match self {
            Value::Long(v) => *v,
            other => panic!("expected long, found {:?}", other),
        }
    }

    fn float(&self) -> f32 {
        match self {
            Value::Float(v) => *v,
            other => panic!("expected float, found {:?}", other),
        }
    }

    fn double(&self) -> f64 {
        match self {
            Value::Double(v) => *v,
            other => panic!("expected double, found {:?}", other),
        }
    }

    fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Boxed(a), Value::Boxed(b)) => a == b,
            _ => false,
        }
    }
}

/// Executes one method at a time; static fields persist across calls
#[derive(Debug, Default)]
pub struct Machine {
    pub statics: HashMap<String, Value>,
}

const STEP_LIMIT: usize = 100_000;

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn static_bool(&self, name: &str) -> bool {
        matches!(self.statics.get(name), Some(Value::Int(1)))
    }

    pub fn run(&mut self, insns: &[Insn], args: Vec<Value>) -> Option<Value> {
        let labels: HashMap<Label, usize> = insns
            .iter()
            .enumerate()
            .filter_map(|(i, insn)| match insn {
                Insn::Label(l) => Some((*l, i)),
                _ => None,
            })
            .collect();

        let mut locals: HashMap<u16, Value> = HashMap::new();
        let mut slot = 0;
        for arg in args {
            let width = arg.width();
            locals.insert(slot, arg);
            slot += width;
        }

        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;
        for _ in 0..STEP_LIMIT {
            let insn = insns.get(pc).unwrap_or_else(|| panic!("fell off the end of the method"));
            pc += 1;
            match insn {
                Insn::Label(_) => {}
                Insn::Op(op) => {
                    if let Some(result) = self.exec_op(*op, &mut stack) {
                        return result;
                    }
                }
                Insn::IntOp(op, v) => match *op {
                    opcodes::BIPUSH | opcodes::SIPUSH => stack.push(Value::Int(*v)),
                    opcodes::NEWARRAY => {
                        let len = stack.pop().unwrap().int() as usize;
                        let zero = match *v {
                            opcodes::atype::T_LONG => Value::Long(0),
                            opcodes::atype::T_FLOAT => Value::Float(0.0),
                            opcodes::atype::T_DOUBLE => Value::Double(0.0),
                            _ => Value::Int(0),
                        };
                        stack.push(Value::Array(Rc::new(RefCell::new(vec![zero; len]))));
                    }
                    other => panic!("unsupported int op {}", opcodes::mnemonic(other)),
                },
                Insn::TypeOp(op, ty) => match *op {
                    opcodes::CHECKCAST => {}
                    opcodes::INSTANCEOF => {
                        let v = stack.pop().unwrap();
                        stack.push(Value::bool(instance_of(&v, ty)));
                    }
                    opcodes::ANEWARRAY => {
                        let len = stack.pop().unwrap().int() as usize;
                        stack.push(Value::Array(Rc::new(RefCell::new(vec![Value::Null; len]))));
                    }
                    other => panic!("unsupported type op {}", opcodes::mnemonic(other)),
                },
                Insn::Ldc(lit) => stack.push(match lit {
                    Literal::Int(v) => Value::Int(*v),
                    Literal::Long(v) => Value::Long(*v),
                    Literal::Float(v) => Value::Float(*v),
                    Literal::Double(v) => Value::Double(*v),
                    Literal::String(s) => Value::Str(s.clone()),
                }),
                Insn::Jump(op, target) => {
                    if branch_taken(*op, &mut stack) {
                        pc = labels[target];
                    }
                }
                Insn::Var(op, slot) => {
                    if (opcodes::ILOAD..=opcodes::ALOAD).contains(op) {
                        let v = locals.get(slot).cloned().unwrap_or_else(|| panic!("slot {} unset", slot));
                        stack.push(v);
                    } else {
                        locals.insert(*slot, stack.pop().unwrap());
                    }
                }
                Insn::Member(op, member) => self.exec_member(*op, member, &mut stack),
            }
        }
        panic!("step limit exceeded");
    }

    /// `Some(result)` when the op returns from the method
    fn exec_op(&mut self, op: u8, stack: &mut Vec<Value>) -> Option<Option<Value>> {
        macro_rules! binary {
            ($get:ident, $wrap:ident, |$a:ident, $b:ident| $e:expr) => {{
                let $b = stack.pop().unwrap().$get();
                let $a = stack.pop().unwrap().$get();
                stack.push(Value::$wrap($e));
            }};
        }
        macro_rules! unary {
            ($get:ident, $wrap:ident, |$a:ident| $e:expr) => {{
                let $a = stack.pop().unwrap().$get();
                stack.push(Value::$wrap($e));
            }};
        }
        match op {
            opcodes::NOP => {}
            opcodes::ACONST_NULL => stack.push(Value::Null),
            opcodes::ICONST_M1..=opcodes::ICONST_5 => stack.push(Value::Int(op as i32 - opcodes::ICONST_0 as i32)),
            opcodes::LCONST_0 | opcodes::LCONST_1 => stack.push(Value::Long((op - opcodes::LCONST_0) as i64)),
            opcodes::FCONST_0..=opcodes::FCONST_2 => stack.push(Value::Float((op - opcodes::FCONST_0) as f32)),
            opcodes::DCONST_0 | opcodes::DCONST_1 => stack.push(Value::Double((op - opcodes::DCONST_0) as f64)),
            _ if (opcodes::IALOAD..=opcodes::SALOAD).contains(&op) => {
                let index = stack.pop().unwrap().int() as usize;
                let Value::Array(array) = stack.pop().unwrap() else { panic!("not an array") };
                let v = array.borrow()[index].clone();
                stack.push(v);
            }
            _ if (opcodes::IASTORE..=opcodes::SASTORE).contains(&op) => {
                let v = stack.pop().unwrap();
                let index = stack.pop().unwrap().int() as usize;
                let Value::Array(array) = stack.pop().unwrap() else { panic!("not an array") };
                array.borrow_mut()[index] = v;
            }
            opcodes::ARRAYLENGTH => {
                let Value::Array(array) = stack.pop().unwrap() else { panic!("not an array") };
                let len = array.borrow().len() as i32;
                stack.push(Value::Int(len));
            }
            opcodes::POP | opcodes::POP2 => {
                stack.pop().unwrap();
            }
            opcodes::DUP => {
                let top = stack.last().cloned().unwrap();
                stack.push(top);
            }
            opcodes::IADD => binary!(int, Int, |a, b| a.wrapping_add(b)),
            opcodes::LADD => binary!(long, Long, |a, b| a.wrapping_add(b)),
            opcodes::FADD => binary!(float, Float, |a, b| a + b),
            opcodes::DADD => binary!(double, Double, |a, b| a + b),
            opcodes::ISUB => binary!(int, Int, |a, b| a.wrapping_sub(b)),
            opcodes::LSUB => binary!(long, Long, |a, b| a.wrapping_sub(b)),
            opcodes::FSUB => binary!(float, Float, |a, b| a - b),
            opcodes::DSUB => binary!(double, Double, |a, b| a - b),
            opcodes::IMUL => binary!(int, Int, |a, b| a.wrapping_mul(b)),
            opcodes::LMUL => binary!(long, Long, |a, b| a.wrapping_mul(b)),
            opcodes::FMUL => binary!(float, Float, |a, b| a * b),
            opcodes::DMUL => binary!(double, Double, |a, b| a * b),
            opcodes::IDIV => binary!(int, Int, |a, b| a.wrapping_div(b)),
            opcodes::LDIV => binary!(long, Long, |a, b| a.wrapping_div(b)),
            opcodes::FDIV => binary!(float, Float, |a, b| a / b),
            opcodes::DDIV => binary!(double, Double, |a, b| a / b),
            opcodes::IREM => binary!(int, Int, |a, b| a.wrapping_rem(b)),
            opcodes::LREM => binary!(long, Long, |a, b| a.wrapping_rem(b)),
            opcodes::INEG => unary!(int, Int, |a| a.wrapping_neg()),
            opcodes::LNEG => unary!(long, Long, |a| a.wrapping_neg()),
            opcodes::FNEG => unary!(float, Float, |a| -a),
            opcodes::DNEG => unary!(double, Double, |a| -a),
            opcodes::ISHL => binary!(int, Int, |a, b| a.wrapping_shl(b as u32)),
            opcodes::ISHR => binary!(int, Int, |a, b| a.wrapping_shr(b as u32)),
            opcodes::IUSHR => binary!(int, Int, |a, b| ((a as u32).wrapping_shr(b as u32)) as i32),
            opcodes::IAND => binary!(int, Int, |a, b| a & b),
            opcodes::IOR => binary!(int, Int, |a, b| a | b),
            opcodes::IXOR => binary!(int, Int, |a, b| a ^ b),
            opcodes::LAND => binary!(long, Long, |a, b| a & b),
            opcodes::LOR => binary!(long, Long, |a, b| a | b),
            opcodes::LXOR => binary!(long, Long, |a, b| a ^ b),
            opcodes::LSHL | opcodes::LSHR | opcodes::LUSHR => {
                let b = stack.pop().unwrap().int() as u32;
                let a = stack.pop().unwrap().long();
                stack.push(Value::Long(match op {
                    opcodes::LSHL => a.wrapping_shl(b),
                    opcodes::LSHR => a.wrapping_shr(b),
                    _ => ((a as u64).wrapping_shr(b)) as i64,
                }));
            }
            opcodes::I2L => unary!(int, Long, |a| a as i64),
            opcodes::I2F => unary!(int, Float, |a| a as f32),
            opcodes::I2D => unary!(int, Double, |a| a as f64),
            opcodes::L2I => unary!(long, Int, |a| a as i32),
            opcodes::L2F => unary!(long, Float, |a| a as f32),
            opcodes::L2D => unary!(long, Double, |a| a as f64),
            opcodes::F2I => unary!(float, Int, |a| a as i32),
            opcodes::F2L => unary!(float, Long, |a| a as i64),
            opcodes::F2D => unary!(float, Double, |a| a as f64),
            opcodes::D2I => unary!(double, Int, |a| a as i32),
            opcodes::D2L => unary!(double, Long, |a| a as i64),
            opcodes::D2F => unary!(double, Float, |a| a as f32),
            opcodes::I2B => unary!(int, Int, |a| a as i8 as i32),
            opcodes::I2C => unary!(int, Int, |a| a as u16 as i32),
            opcodes::I2S => unary!(int, Int, |a| a as i16 as i32),
            opcodes::LCMP => binary!(long, Int, |a, b| a.cmp(&b) as i32),
            opcodes::FCMPL | opcodes::FCMPG => {
                let b = stack.pop().unwrap().float();
                let a = stack.pop().unwrap().float();
                let nan = if op == opcodes::FCMPL { -1 } else { 1 };
                stack.push(Value::Int(a.partial_cmp(&b).map_or(nan, |o| o as i32)));
            }
            opcodes::DCMPL | opcodes::DCMPG => {
                let b = stack.pop().unwrap().double();
                let a = stack.pop().unwrap().double();
                let nan = if op == opcodes::DCMPL { -1 } else { 1 };
                stack.push(Value::Int(a.partial_cmp(&b).map_or(nan, |o| o as i32)));
            }
            opcodes::IRETURN..=opcodes::ARETURN => return Some(Some(stack.pop().unwrap())),
            opcodes::RETURN => return Some(None),
            opcodes::ATHROW => panic!("exception thrown: {:?}", stack.pop()),
            other => panic!("unsupported op {}", opcodes::mnemonic(other)),
        }
        None
    }

    fn exec_member(&mut self, op: u8, member: &MemberRef, stack: &mut Vec<Value>) {
        match op {
            opcodes::GETSTATIC => {
                let v = self.statics.get(&member.name).cloned().unwrap_or_else(|| zero_of(&member.descriptor.ret));
                stack.push(v);
            }
            opcodes::PUTSTATIC => {
                let v = stack.pop().unwrap();
                self.statics.insert(member.name.clone(), v);
            }
            opcodes::INVOKESTATIC | opcodes::INVOKEVIRTUAL | opcodes::INVOKEINTERFACE => {
                let argc = member.descriptor.params.len();
                let args = stack.split_off(stack.len() - argc);
                let receiver = if op == opcodes::INVOKESTATIC { None } else { stack.pop() };
                if let Some(result) = call_library(member, receiver, args) {
                    stack.push(result);
                }
            }
            other => panic!("unsupported member op {} {}", opcodes::mnemonic(other), member),
        }
    }
}

fn call_library(member: &MemberRef, receiver: Option<Value>, args: Vec<Value>) -> Option<Value> {
    let owner = match &member.owner {
        TypeDesc::Class(name) => name.as_str(),
        other => panic!("no library behaviour for {}", other),
    };
    match (owner, member.name.as_str(), receiver) {
        (_, "valueOf", None) if owner != "java/lang/String" => Some(Value::Boxed(Box::new(args[0].clone()))),
        (_, name, Some(Value::Boxed(inner))) if name.ends_with("Value") => Some(*inner),
        ("java/lang/String", "equals", Some(Value::Str(s))) => Some(Value::bool(args[0] == Value::Str(s))),
        ("java/lang/String", "length", Some(Value::Str(s))) => Some(Value::Int(s.encode_utf16().count() as i32)),
        ("java/lang/Math", "abs", None) => Some(match &args[0] {
            Value::Int(v) => Value::Int(v.wrapping_abs()),
            Value::Long(v) => Value::Long(v.wrapping_abs()),
            Value::Double(v) => Value::Double(v.abs()),
            other => panic!("Math.abs({:?})", other),
        }),
        (owner, name, receiver) => panic!("no library behaviour for {}.{} on {:?}", owner, name, receiver),
    }
}

fn zero_of(ty: &TypeDesc) -> Value {
    match ty.typecode() {
        typecodes::LONG => Value::Long(0),
        typecodes::FLOAT => Value::Float(0.0),
        typecodes::DOUBLE => Value::Double(0.0),
        typecodes::OBJECT => Value::Null,
        _ => Value::Int(0),
    }
}

fn instance_of(v: &Value, ty: &TypeDesc) -> bool {
    match v {
        Value::Null => false,
        Value::Str(_) => *ty == TypeDesc::string() || *ty == TypeDesc::object(),
        Value::Array(_) => matches!(ty, TypeDesc::Array(_)) || *ty == TypeDesc::object(),
        Value::Boxed(_) => ty.unboxed().is_some() || *ty == TypeDesc::object(),
        _ => false,
    }
}

fn branch_taken(op: u8, stack: &mut Vec<Value>) -> bool {
    match op {
        opcodes::GOTO => true,
        opcodes::IFEQ..=opcodes::IFLE => {
            let v = stack.pop().unwrap().int();
            relation(op - opcodes::IFEQ, v.cmp(&0))
        }
        opcodes::IF_ICMPEQ..=opcodes::IF_ICMPLE => {
            let b = stack.pop().unwrap().int();
            let a = stack.pop().unwrap().int();
            relation(op - opcodes::IF_ICMPEQ, a.cmp(&b))
        }
        opcodes::IF_ACMPEQ | opcodes::IF_ACMPNE => {
            let b = stack.pop().unwrap();
            let a = stack.pop().unwrap();
            a.same_ref(&b) == (op == opcodes::IF_ACMPEQ)
        }
        opcodes::IFNULL => stack.pop().unwrap() == Value::Null,
        opcodes::IFNONNULL => stack.pop().unwrap() != Value::Null,
        other => panic!("unsupported branch {}", opcodes::mnemonic(other)),
    }
}

/// eq, ne, lt, ge, gt, le, in opcode order
fn relation(index: u8, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match index {
        0 => ordering == Equal,
        1 => ordering != Equal,
        2 => ordering == Less,
        3 => ordering != Less,
        4 => ordering == Greater,
        _ => ordering != Greater,
    }
}

/// Assemble a spec against the sample class with java.lang preloaded
pub fn assemble(spec: &MethodSpec) -> jfluent::Result<AssembledMethod> {
    assemble_with(spec, &Config::default())
}

pub fn assemble_with(spec: &MethodSpec, config: &Config) -> jfluent::Result<AssembledMethod> {
    init_logging();
    let this = ClassHandle::named("demo.Samples", "java/lang/Object");
    let table: MemberTable = samples::sample_table("demo.Samples");
    let ctx = ClassContext::new(&this, &table, config);
    assemble_method(spec, &ctx)
}

/// Assemble and run a static method in a fresh machine
pub fn call(spec: &MethodSpec, args: Vec<Value>) -> Option<Value> {
    let method = assemble(spec).unwrap_or_else(|e| panic!("assembling {}: {}", spec.name, e));
    Machine::new().run(method.insns.insns(), args)
}
