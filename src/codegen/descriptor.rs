//! Type descriptors and the class-file descriptor grammar
//!
//! A [`TypeDesc`] names a semantic type. Class types carry their binary name
//! (`java/lang/String`); the [`TypeDesc::SelfType`] placeholder stands for the
//! class currently being assembled and only becomes a concrete name once the
//! owning [`ClassHandle`] is named.

use std::fmt;

use super::opcodes::typecodes;
use super::symtab::ClassHandle;
use crate::common::error::{Error, Result};

pub const OBJECT: &str = "java/lang/Object";
pub const STRING: &str = "java/lang/String";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveType {
    pub const ALL: [PrimitiveType; 8] = [
        PrimitiveType::Boolean,
        PrimitiveType::Byte,
        PrimitiveType::Short,
        PrimitiveType::Char,
        PrimitiveType::Int,
        PrimitiveType::Long,
        PrimitiveType::Float,
        PrimitiveType::Double,
    ];

    pub fn descriptor_char(self) -> char {
        match self {
            PrimitiveType::Boolean => 'Z',
            PrimitiveType::Byte => 'B',
            PrimitiveType::Short => 'S',
            PrimitiveType::Char => 'C',
            PrimitiveType::Int => 'I',
            PrimitiveType::Long => 'J',
            PrimitiveType::Float => 'F',
            PrimitiveType::Double => 'D',
        }
    }

    pub fn from_descriptor_char(c: char) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.descriptor_char() == c)
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Byte => "byte",
            PrimitiveType::Short => "short",
            PrimitiveType::Char => "char",
            PrimitiveType::Int => "int",
            PrimitiveType::Long => "long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    /// 64-bit primitives take two stack and local slots
    pub fn is_wide(self) -> bool {
        matches!(self, PrimitiveType::Long | PrimitiveType::Double)
    }

    pub fn is_numeric(self) -> bool {
        self != PrimitiveType::Boolean
    }

    /// Types the machine represents as a plain int
    pub fn is_int_like(self) -> bool {
        matches!(
            self,
            PrimitiveType::Boolean
                | PrimitiveType::Byte
                | PrimitiveType::Short
                | PrimitiveType::Char
                | PrimitiveType::Int
        )
    }

    pub fn is_integral(self) -> bool {
        self.is_numeric() && !matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }

    pub fn typecode(self) -> u8 {
        match self {
            PrimitiveType::Boolean | PrimitiveType::Byte => typecodes::BYTE,
            PrimitiveType::Short => typecodes::SHORT,
            PrimitiveType::Char => typecodes::CHAR,
            PrimitiveType::Int => typecodes::INT,
            PrimitiveType::Long => typecodes::LONG,
            PrimitiveType::Float => typecodes::FLOAT,
            PrimitiveType::Double => typecodes::DOUBLE,
        }
    }

    /// Binary name of the matching wrapper class
    pub fn wrapper(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "java/lang/Boolean",
            PrimitiveType::Byte => "java/lang/Byte",
            PrimitiveType::Short => "java/lang/Short",
            PrimitiveType::Char => "java/lang/Character",
            PrimitiveType::Int => "java/lang/Integer",
            PrimitiveType::Long => "java/lang/Long",
            PrimitiveType::Float => "java/lang/Float",
            PrimitiveType::Double => "java/lang/Double",
        }
    }

    /// Canonical value accessor on the wrapper (`intValue`, ...)
    pub fn unbox_method(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "booleanValue",
            PrimitiveType::Byte => "byteValue",
            PrimitiveType::Short => "shortValue",
            PrimitiveType::Char => "charValue",
            PrimitiveType::Int => "intValue",
            PrimitiveType::Long => "longValue",
            PrimitiveType::Float => "floatValue",
            PrimitiveType::Double => "doubleValue",
        }
    }

    pub fn from_wrapper(binary_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.wrapper() == binary_name)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Primitive(PrimitiveType),
    /// Class or interface, by binary name
    Class(String),
    Array(Box<TypeDesc>),
    /// The class under construction
    SelfType,
    /// Type of the `null` literal
    Null,
    Void,
}

impl TypeDesc {
    pub const BOOLEAN: TypeDesc = TypeDesc::Primitive(PrimitiveType::Boolean);
    pub const BYTE: TypeDesc = TypeDesc::Primitive(PrimitiveType::Byte);
    pub const SHORT: TypeDesc = TypeDesc::Primitive(PrimitiveType::Short);
    pub const CHAR: TypeDesc = TypeDesc::Primitive(PrimitiveType::Char);
    pub const INT: TypeDesc = TypeDesc::Primitive(PrimitiveType::Int);
    pub const LONG: TypeDesc = TypeDesc::Primitive(PrimitiveType::Long);
    pub const FLOAT: TypeDesc = TypeDesc::Primitive(PrimitiveType::Float);
    pub const DOUBLE: TypeDesc = TypeDesc::Primitive(PrimitiveType::Double);

    /// Class type from a host name; `java.lang.String` becomes `java/lang/String`
    pub fn class(name: &str) -> Self {
        TypeDesc::Class(name.replace('.', "/"))
    }

    pub fn object() -> Self {
        TypeDesc::Class(OBJECT.to_string())
    }

    pub fn string() -> Self {
        TypeDesc::Class(STRING.to_string())
    }

    pub fn array_of(elem: TypeDesc) -> Self {
        TypeDesc::Array(Box::new(elem))
    }

    pub fn wrapper_of(prim: PrimitiveType) -> Self {
        TypeDesc::Class(prim.wrapper().to_string())
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            TypeDesc::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeDesc::Primitive(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeDesc::Class(_) | TypeDesc::Array(_) | TypeDesc::SelfType | TypeDesc::Null
        )
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeDesc::Void)
    }

    pub fn is_wide(&self) -> bool {
        self.as_primitive().map_or(false, PrimitiveType::is_wide)
    }

    pub fn is_numeric(&self) -> bool {
        self.as_primitive().map_or(false, PrimitiveType::is_numeric)
    }

    pub fn is_boolean(&self) -> bool {
        *self == TypeDesc::BOOLEAN
    }

    /// Stack / local slots taken by a value of this type
    pub fn width(&self) -> u16 {
        match self {
            TypeDesc::Void => 0,
            t if t.is_wide() => 2,
            _ => 1,
        }
    }

    pub fn typecode(&self) -> u8 {
        match self {
            TypeDesc::Primitive(p) => p.typecode(),
            TypeDesc::Void => typecodes::VOID,
            _ => typecodes::OBJECT,
        }
    }

    /// Primitive this wrapper class unboxes to
    pub fn unboxed(&self) -> Option<PrimitiveType> {
        match self {
            TypeDesc::Class(name) => PrimitiveType::from_wrapper(name),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&TypeDesc> {
        match self {
            TypeDesc::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Field descriptor, resolving the self type through `this`
    pub fn descriptor(&self, this: &ClassHandle) -> Result<String> {
        let mut out = String::new();
        self.write_descriptor(&mut out, this)?;
        Ok(out)
    }

    fn write_descriptor(&self, out: &mut String, this: &ClassHandle) -> Result<()> {
        match self {
            TypeDesc::Primitive(p) => out.push(p.descriptor_char()),
            TypeDesc::Void => out.push('V'),
            TypeDesc::Class(name) => {
                out.push('L');
                out.push_str(name);
                out.push(';');
            }
            TypeDesc::SelfType => {
                out.push('L');
                out.push_str(this.binary_name()?);
                out.push(';');
            }
            TypeDesc::Array(elem) => {
                out.push('[');
                elem.write_descriptor(out, this)?;
            }
            TypeDesc::Null => {
                return Err(Error::internal("the null type has no descriptor"));
            }
        }
        Ok(())
    }

    /// Name as it appears in a CONSTANT_Class entry: the binary name for
    /// classes, the descriptor for arrays.
    pub fn internal_name(&self, this: &ClassHandle) -> Result<String> {
        match self {
            TypeDesc::Class(name) => Ok(name.clone()),
            TypeDesc::SelfType => Ok(this.binary_name()?.to_string()),
            TypeDesc::Array(_) => self.descriptor(this),
            other => Err(Error::internal(format!("{} has no class constant", other))),
        }
    }

    /// Parse a single field descriptor such as `[Ljava/lang/String;`
    pub fn parse(descriptor: &str) -> Result<TypeDesc> {
        let mut chars = descriptor.char_indices().peekable();
        let ty = parse_one(descriptor, &mut chars)?;
        if chars.peek().is_some() {
            return Err(invalid(descriptor));
        }
        Ok(ty)
    }
}

type DescChars<'a> = std::iter::Peekable<std::str::CharIndices<'a>>;

fn invalid(descriptor: &str) -> Error {
    Error::InvalidDescriptor { descriptor: descriptor.to_string() }
}

fn parse_one(descriptor: &str, chars: &mut DescChars<'_>) -> Result<TypeDesc> {
    let (start, c) = chars.next().ok_or_else(|| invalid(descriptor))?;
    match c {
        'V' => Ok(TypeDesc::Void),
        '[' => {
            let elem = parse_one(descriptor, chars)?;
            if elem.is_void() {
                return Err(invalid(descriptor));
            }
            Ok(TypeDesc::array_of(elem))
        }
        'L' => {
            for (i, c) in chars.by_ref() {
                if c == ';' {
                    let name = &descriptor[start + 1..i];
                    if name.is_empty() || name.contains('.') {
                        return Err(invalid(descriptor));
                    }
                    return Ok(TypeDesc::Class(name.to_string()));
                }
            }
            Err(invalid(descriptor))
        }
        c => PrimitiveType::from_descriptor_char(c)
            .map(TypeDesc::Primitive)
            .ok_or_else(|| invalid(descriptor)),
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Primitive(p) => write!(f, "{}", p),
            TypeDesc::Class(name) => f.write_str(&name.replace('/', ".")),
            TypeDesc::Array(elem) => write!(f, "{}[]", elem),
            TypeDesc::SelfType => f.write_str("<this>"),
            TypeDesc::Null => f.write_str("null"),
            TypeDesc::Void => f.write_str("void"),
        }
    }
}

/// A method signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub params: Vec<TypeDesc>,
    pub ret: TypeDesc,
}

impl MethodDescriptor {
    pub fn new(params: Vec<TypeDesc>, ret: TypeDesc) -> Self {
        Self { params, ret }
    }

    /// `(` params `)` ret
    pub fn descriptor(&self, this: &ClassHandle) -> Result<String> {
        let mut d = String::from("(");
        for p in &self.params {
            if p.is_void() {
                return Err(Error::invalid_input("void is not a parameter type"));
            }
            d.push_str(&p.descriptor(this)?);
        }
        d.push(')');
        d.push_str(&self.ret.descriptor(this)?);
        Ok(d)
    }

    pub fn parse(descriptor: &str) -> Result<MethodDescriptor> {
        let mut chars = descriptor.char_indices().peekable();
        if chars.next().map(|(_, c)| c) != Some('(') {
            return Err(invalid(descriptor));
        }
        let mut params = Vec::new();
        loop {
            match chars.peek() {
                Some((_, ')')) => {
                    chars.next();
                    break;
                }
                Some(_) => {
                    let p = parse_one(descriptor, &mut chars)?;
                    if p.is_void() {
                        return Err(invalid(descriptor));
                    }
                    params.push(p);
                }
                None => return Err(invalid(descriptor)),
            }
        }
        let ret = parse_one(descriptor, &mut chars)?;
        if chars.peek().is_some() {
            return Err(invalid(descriptor));
        }
        Ok(MethodDescriptor { params, ret })
    }

    /// Argument slots, not counting a receiver
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(TypeDesc::width).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_name_substitution() {
        assert_eq!(TypeDesc::class("java.lang.String"), TypeDesc::string());
        assert_eq!(TypeDesc::string().to_string(), "java.lang.String");
    }

    #[test]
    fn test_descriptors() {
        let this = ClassHandle::named("demo/Point", OBJECT);
        assert_eq!(TypeDesc::INT.descriptor(&this).unwrap(), "I");
        assert_eq!(TypeDesc::LONG.descriptor(&this).unwrap(), "J");
        assert_eq!(
            TypeDesc::array_of(TypeDesc::array_of(TypeDesc::string()))
                .descriptor(&this)
                .unwrap(),
            "[[Ljava/lang/String;"
        );
        assert_eq!(TypeDesc::SelfType.descriptor(&this).unwrap(), "Ldemo/Point;");
        let m = MethodDescriptor::new(vec![TypeDesc::INT, TypeDesc::DOUBLE], TypeDesc::Void);
        assert_eq!(m.descriptor(&this).unwrap(), "(ID)V");
        assert_eq!(m.arg_slots(), 3);
    }

    #[test]
    fn test_self_type_needs_a_name() {
        let this = ClassHandle::new(OBJECT);
        assert_eq!(
            TypeDesc::SelfType.descriptor(&this).unwrap_err(),
            Error::UnresolvedSelfType
        );
        this.set_name("demo.Late").unwrap();
        assert_eq!(TypeDesc::SelfType.descriptor(&this).unwrap(), "Ldemo/Late;");
    }

    #[test]
    fn test_parse() {
        assert_eq!(TypeDesc::parse("Z").unwrap(), TypeDesc::BOOLEAN);
        assert_eq!(
            TypeDesc::parse("[I").unwrap(),
            TypeDesc::array_of(TypeDesc::INT)
        );
        assert_eq!(TypeDesc::parse("Ljava/lang/Object;").unwrap(), TypeDesc::object());
        assert!(TypeDesc::parse("Ljava/lang/Object").is_err());
        assert!(TypeDesc::parse("II").is_err());
        assert!(TypeDesc::parse("[V").is_err());
        assert!(TypeDesc::parse("Q").is_err());

        let m = MethodDescriptor::parse("(I[JLjava/lang/String;)Z").unwrap();
        assert_eq!(
            m.params,
            vec![TypeDesc::INT, TypeDesc::array_of(TypeDesc::LONG), TypeDesc::string()]
        );
        assert_eq!(m.ret, TypeDesc::BOOLEAN);
        assert!(MethodDescriptor::parse("(V)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
    }

    #[test]
    fn test_widths_and_wrappers() {
        assert_eq!(TypeDesc::DOUBLE.width(), 2);
        assert_eq!(TypeDesc::string().width(), 1);
        assert_eq!(TypeDesc::Void.width(), 0);
        assert_eq!(TypeDesc::class("java.lang.Integer").unboxed(), Some(PrimitiveType::Int));
        assert_eq!(PrimitiveType::Char.wrapper(), "java/lang/Character");
    }
}
