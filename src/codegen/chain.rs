//! Instruction chains
//!
//! A [`Chain`] is an append-only sequence of [`Op`]s built fluently in call
//! order. Value chains start from a source (`Chain::local`, `Chain::int`, ...)
//! and continue with operations that consume the value on top of the stack
//! (`invoke`, `add`, `cast`, ...). Statement chains are concatenations of value
//! chains ending in a consumer (`ret`, `pop`, `set`, ...).
//!
//! Chains are plain data; nothing is checked until the chain is assembled.

use super::cond::Cond;
use super::descriptor::TypeDesc;
use super::insn::Literal;
use super::opcodes;

/// A local variable, by name or by raw slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalRef {
    Named(String),
    Slot(u16),
}

impl From<&str> for LocalRef {
    fn from(name: &str) -> Self {
        LocalRef::Named(name.to_string())
    }
}

impl From<String> for LocalRef {
    fn from(name: String) -> Self {
        LocalRef::Named(name)
    }
}

impl From<u16> for LocalRef {
    fn from(slot: u16) -> Self {
        LocalRef::Slot(slot)
    }
}

impl std::fmt::Display for LocalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocalRef::Named(name) => f.write_str(name),
            LocalRef::Slot(slot) => write!(f, "${}", slot),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

impl ArithOp {
    /// The int form of the instruction; the typed forms follow at `+ typecode`
    pub fn base_opcode(self) -> u8 {
        match self {
            ArithOp::Add => opcodes::IADD,
            ArithOp::Sub => opcodes::ISUB,
            ArithOp::Mul => opcodes::IMUL,
            ArithOp::Div => opcodes::IDIV,
            ArithOp::Rem => opcodes::IREM,
            ArithOp::And => opcodes::IAND,
            ArithOp::Or => opcodes::IOR,
            ArithOp::Xor => opcodes::IXOR,
            ArithOp::Shl => opcodes::ISHL,
            ArithOp::Shr => opcodes::ISHR,
            ArithOp::Ushr => opcodes::IUSHR,
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, ArithOp::And | ArithOp::Or | ArithOp::Xor)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Rem => "%",
            ArithOp::And => "&",
            ArithOp::Or => "|",
            ArithOp::Xor => "^",
            ArithOp::Shl => "<<",
            ArithOp::Shr => ">>",
            ArithOp::Ushr => ">>>",
        }
    }
}

/// Relational operators, in the order of the JVM `if<cond>` families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl RelOp {
    pub const ALL: [RelOp; 6] = [RelOp::Eq, RelOp::Ne, RelOp::Lt, RelOp::Ge, RelOp::Gt, RelOp::Le];

    pub fn negate(self) -> RelOp {
        match self {
            RelOp::Eq => RelOp::Ne,
            RelOp::Ne => RelOp::Eq,
            RelOp::Lt => RelOp::Ge,
            RelOp::Ge => RelOp::Lt,
            RelOp::Gt => RelOp::Le,
            RelOp::Le => RelOp::Gt,
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, RelOp::Eq | RelOp::Ne)
    }

    fn offset(self) -> u8 {
        match self {
            RelOp::Eq => 0,
            RelOp::Ne => 1,
            RelOp::Lt => 2,
            RelOp::Ge => 3,
            RelOp::Gt => 4,
            RelOp::Le => 5,
        }
    }

    /// Compare-with-zero branch (`ifeq` ...)
    pub fn if_opcode(self) -> u8 {
        opcodes::IFEQ + self.offset()
    }

    /// Two-int branch (`if_icmpeq` ...)
    pub fn icmp_opcode(self) -> u8 {
        opcodes::IF_ICMPEQ + self.offset()
    }

    /// Reference identity branch; only `Eq`/`Ne` have one
    pub fn acmp_opcode(self) -> Option<u8> {
        match self {
            RelOp::Eq => Some(opcodes::IF_ACMPEQ),
            RelOp::Ne => Some(opcodes::IF_ACMPNE),
            _ => None,
        }
    }

    /// Evaluate on an `lcmp`-style ordering result
    pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            RelOp::Eq => ordering == Equal,
            RelOp::Ne => ordering != Equal,
            RelOp::Lt => ordering == Less,
            RelOp::Ge => ordering != Less,
            RelOp::Gt => ordering == Greater,
            RelOp::Le => ordering != Greater,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Ge => ">=",
            RelOp::Gt => ">",
            RelOp::Le => "<=",
        }
    }
}

/// One operation of a chain
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Const(Literal),
    Bool(bool),
    Null,
    This,
    Load(LocalRef),
    Store(LocalRef, Chain),
    Declare {
        name: String,
        ty: TypeDesc,
        init: Option<Chain>,
    },
    Increment(LocalRef, i32),
    GetField(String),
    PutField(String, Chain),
    GetStatic(TypeDesc, String),
    PutStatic(TypeDesc, String, Chain),
    Invoke(String, Vec<Chain>),
    InvokeStatic(TypeDesc, String, Vec<Chain>),
    New(TypeDesc, Vec<Chain>),
    SuperInit(Vec<Chain>),
    NewArray(TypeDesc, Chain),
    ArrayLoad(Chain),
    ArrayStore(Chain, Chain),
    ArrayLength,
    Arith(ArithOp, Chain),
    Neg,
    Cast(TypeDesc),
    Convert(TypeDesc),
    InstanceOf(TypeDesc),
    Pop,
    Return,
    ReturnVoid,
    Throw,
    If {
        cond: Cond,
        then: Chain,
        otherwise: Option<Chain>,
    },
    While {
        cond: Cond,
        body: Chain,
    },
    Ternary {
        cond: Cond,
        then: Chain,
        otherwise: Chain,
    },
    CondValue(Cond),
    Block(Chain),
    /// Builder misuse, reported when the chain is assembled
    Malformed(String),
}

impl Op {
    /// Short name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Op::Const(_) => "constant",
            Op::Bool(_) => "boolean constant",
            Op::Null => "null",
            Op::This => "this",
            Op::Load(_) => "load",
            Op::Store(..) => "store",
            Op::Declare { .. } => "declaration",
            Op::Increment(..) => "increment",
            Op::GetField(_) => "field read",
            Op::PutField(..) => "field write",
            Op::GetStatic(..) => "static field read",
            Op::PutStatic(..) => "static field write",
            Op::Invoke(..) => "invocation",
            Op::InvokeStatic(..) => "static invocation",
            Op::New(..) => "object creation",
            Op::SuperInit(_) => "super constructor call",
            Op::NewArray(..) => "array creation",
            Op::ArrayLoad(_) => "array load",
            Op::ArrayStore(..) => "array store",
            Op::ArrayLength => "array length",
            Op::Arith(..) => "arithmetic",
            Op::Neg => "negation",
            Op::Cast(_) => "cast",
            Op::Convert(_) => "conversion",
            Op::InstanceOf(_) => "instanceof",
            Op::Pop => "pop",
            Op::Return => "return",
            Op::ReturnVoid => "return",
            Op::Throw => "throw",
            Op::If { .. } => "if",
            Op::While { .. } => "while",
            Op::Ternary { .. } => "conditional",
            Op::CondValue(_) => "condition value",
            Op::Block(_) => "block",
            Op::Malformed(_) => "malformed operation",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chain {
    ops: Vec<Op>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Append a raw operation
    pub fn then(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Concatenate another chain
    pub fn append(mut self, other: Chain) -> Self {
        self.ops.extend(other.ops);
        self
    }

    fn start(op: Op) -> Self {
        Self { ops: vec![op] }
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    pub fn local(local: impl Into<LocalRef>) -> Self {
        Self::start(Op::Load(local.into()))
    }

    pub fn int(value: i32) -> Self {
        Self::start(Op::Const(Literal::Int(value)))
    }

    pub fn long(value: i64) -> Self {
        Self::start(Op::Const(Literal::Long(value)))
    }

    pub fn float(value: f32) -> Self {
        Self::start(Op::Const(Literal::Float(value)))
    }

    pub fn double(value: f64) -> Self {
        Self::start(Op::Const(Literal::Double(value)))
    }

    pub fn string(value: &str) -> Self {
        Self::start(Op::Const(Literal::String(value.to_string())))
    }

    pub fn null() -> Self {
        Self::start(Op::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::start(Op::Bool(value))
    }

    pub fn this() -> Self {
        Self::start(Op::This)
    }

    pub fn get_static(owner: TypeDesc, name: &str) -> Self {
        Self::start(Op::GetStatic(owner, name.to_string()))
    }

    pub fn invoke_static(owner: TypeDesc, name: &str, args: Vec<Chain>) -> Self {
        Self::start(Op::InvokeStatic(owner, name.to_string(), args))
    }

    pub fn new_object(ty: TypeDesc, args: Vec<Chain>) -> Self {
        Self::start(Op::New(ty, args))
    }

    pub fn new_array(elem: TypeDesc, len: Chain) -> Self {
        Self::start(Op::NewArray(elem, len))
    }

    /// `cond ? then : otherwise`
    pub fn ternary(cond: Cond, then: Chain, otherwise: Chain) -> Self {
        Self::start(Op::Ternary { cond, then, otherwise })
    }

    /// The condition as a `boolean` value
    pub fn cond_value(cond: Cond) -> Self {
        Self::start(Op::CondValue(cond))
    }

    /// `body` in its own scope
    pub fn block(body: Chain) -> Self {
        Self::start(Op::Block(body))
    }

    // ------------------------------------------------------------------
    // Operations on the value on top of the stack
    // ------------------------------------------------------------------

    pub fn get_field(self, name: &str) -> Self {
        self.then(Op::GetField(name.to_string()))
    }

    pub fn put_field(self, name: &str, value: Chain) -> Self {
        self.then(Op::PutField(name.to_string(), value))
    }

    pub fn invoke(self, name: &str, args: Vec<Chain>) -> Self {
        self.then(Op::Invoke(name.to_string(), args))
    }

    pub fn add(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Add, rhs))
    }

    pub fn sub(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Sub, rhs))
    }

    pub fn mul(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Mul, rhs))
    }

    pub fn div(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Div, rhs))
    }

    pub fn rem(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Rem, rhs))
    }

    pub fn and(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::And, rhs))
    }

    pub fn or(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Or, rhs))
    }

    pub fn xor(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Xor, rhs))
    }

    pub fn shl(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Shl, rhs))
    }

    pub fn shr(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Shr, rhs))
    }

    pub fn ushr(self, rhs: Chain) -> Self {
        self.then(Op::Arith(ArithOp::Ushr, rhs))
    }

    pub fn neg(self) -> Self {
        self.then(Op::Neg)
    }

    /// Explicit conversion
    pub fn cast(self, ty: TypeDesc) -> Self {
        self.then(Op::Cast(ty))
    }

    /// Implicit conversion
    pub fn convert(self, ty: TypeDesc) -> Self {
        self.then(Op::Convert(ty))
    }

    pub fn instance_of(self, ty: TypeDesc) -> Self {
        self.then(Op::InstanceOf(ty))
    }

    pub fn array_length(self) -> Self {
        self.then(Op::ArrayLength)
    }

    /// Element load
    pub fn index(self, index: Chain) -> Self {
        self.then(Op::ArrayLoad(index))
    }

    pub fn array_store(self, index: Chain, value: Chain) -> Self {
        self.then(Op::ArrayStore(index, value))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Declare an initialised local in the current scope
    pub fn declare(self, name: &str, ty: TypeDesc, init: Chain) -> Self {
        self.then(Op::Declare { name: name.to_string(), ty, init: Some(init) })
    }

    pub fn declare_uninit(self, name: &str, ty: TypeDesc) -> Self {
        self.then(Op::Declare { name: name.to_string(), ty, init: None })
    }

    pub fn set(self, local: impl Into<LocalRef>, value: Chain) -> Self {
        self.then(Op::Store(local.into(), value))
    }

    pub fn increment(self, local: impl Into<LocalRef>, by: i32) -> Self {
        self.then(Op::Increment(local.into(), by))
    }

    pub fn put_static(self, owner: TypeDesc, name: &str, value: Chain) -> Self {
        self.then(Op::PutStatic(owner, name.to_string(), value))
    }

    pub fn super_init(self, args: Vec<Chain>) -> Self {
        self.then(Op::SuperInit(args))
    }

    pub fn if_then(self, cond: Cond, body: Chain) -> Self {
        self.then(Op::If { cond, then: body, otherwise: None })
    }

    /// Attach an else branch to the trailing `if_then`
    pub fn or_else(mut self, body: Chain) -> Self {
        let attached = match self.ops.last_mut() {
            Some(Op::If { otherwise, .. }) if otherwise.is_none() => {
                *otherwise = Some(body);
                true
            }
            _ => false,
        };
        if !attached {
            self.ops
                .push(Op::Malformed("or_else must directly follow an if_then without an else".to_string()));
        }
        self
    }

    pub fn while_loop(self, cond: Cond, body: Chain) -> Self {
        self.then(Op::While { cond, body })
    }

    /// Return the value on top of the stack
    pub fn ret(self) -> Self {
        self.then(Op::Return)
    }

    pub fn ret_void(self) -> Self {
        self.then(Op::ReturnVoid)
    }

    /// Discard the value on top of the stack
    pub fn pop(self) -> Self {
        self.then(Op::Pop)
    }

    pub fn throw(self) -> Self {
        self.then(Op::Throw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_append_in_call_order() {
        let chain = Chain::local("a").add(Chain::int(1)).ret();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.ops()[0], Op::Load(LocalRef::Named("a".into())));
        assert!(matches!(chain.ops()[1], Op::Arith(ArithOp::Add, _)));
        assert_eq!(chain.ops()[2], Op::Return);
    }

    #[test]
    fn test_or_else_rewrites_trailing_if() {
        let chain = Chain::new()
            .if_then(Cond::always(true), Chain::new().ret_void())
            .or_else(Chain::new().ret_void());
        assert_eq!(chain.len(), 1);
        match &chain.ops()[0] {
            Op::If { otherwise, .. } => assert!(otherwise.is_some()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_or_else_without_if_is_recorded() {
        let chain = Chain::int(1).or_else(Chain::new());
        assert!(matches!(chain.ops().last(), Some(Op::Malformed(_))));

        let twice = Chain::new()
            .if_then(Cond::always(true), Chain::new())
            .or_else(Chain::new())
            .or_else(Chain::new());
        assert!(matches!(twice.ops().last(), Some(Op::Malformed(_))));
    }

    #[test]
    fn test_relop_tables() {
        for op in RelOp::ALL {
            assert_eq!(op.negate().negate(), op);
            assert_eq!(opcodes::negate(op.if_opcode()).unwrap(), op.negate().if_opcode());
            assert_eq!(opcodes::negate(op.icmp_opcode()).unwrap(), op.negate().icmp_opcode());
        }
        assert_eq!(RelOp::Le.icmp_opcode(), opcodes::IF_ICMPLE);
        assert_eq!(RelOp::Lt.acmp_opcode(), None);
    }

    #[test]
    fn test_append_concatenates() {
        let chain = Chain::new()
            .declare("x", TypeDesc::INT, Chain::int(3))
            .append(Chain::local("x").ret());
        assert_eq!(chain.len(), 3);
        let uninit = Chain::new().declare_uninit("y", TypeDesc::LONG);
        assert!(matches!(&uninit.ops()[0], Op::Declare { init: None, .. }));
    }
}
