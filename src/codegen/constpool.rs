//! Constant pool for the code attribute's symbolic references
//!
//! Indices are 1-based as in the class file; `long` and `double` entries take
//! two indices. Identical entries are shared.

use std::collections::HashMap;

use super::descriptor::TypeDesc;
use super::insn::{Literal, MemberRef};
use super::symtab::ClassHandle;
use crate::common::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
}

pub mod constant_tags {
    pub const CONSTANT_UTF8: u8 = 1;
    pub const CONSTANT_INTEGER: u8 = 3;
    pub const CONSTANT_FLOAT: u8 = 4;
    pub const CONSTANT_LONG: u8 = 5;
    pub const CONSTANT_DOUBLE: u8 = 6;
    pub const CONSTANT_CLASS: u8 = 7;
    pub const CONSTANT_STRING: u8 = 8;
    pub const CONSTANT_FIELDREF: u8 = 9;
    pub const CONSTANT_METHODREF: u8 = 10;
    pub const CONSTANT_INTERFACEMETHODREF: u8 = 11;
    pub const CONSTANT_NAMEANDTYPE: u8 = 12;
}

impl Constant {
    pub fn tag(&self) -> u8 {
        use constant_tags::*;
        match self {
            Constant::Utf8(_) => CONSTANT_UTF8,
            Constant::Integer(_) => CONSTANT_INTEGER,
            Constant::Float(_) => CONSTANT_FLOAT,
            Constant::Long(_) => CONSTANT_LONG,
            Constant::Double(_) => CONSTANT_DOUBLE,
            Constant::Class(_) => CONSTANT_CLASS,
            Constant::String(_) => CONSTANT_STRING,
            Constant::FieldRef(..) => CONSTANT_FIELDREF,
            Constant::MethodRef(..) => CONSTANT_METHODREF,
            Constant::InterfaceMethodRef(..) => CONSTANT_INTERFACEMETHODREF,
            Constant::NameAndType(..) => CONSTANT_NAMEANDTYPE,
        }
    }

    /// Number of pool indices the entry occupies
    pub fn width(&self) -> u16 {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.tag()];
        match self {
            Constant::Utf8(value) => {
                let utf8 = modified_utf8(value);
                bytes.extend_from_slice(&(utf8.len() as u16).to_be_bytes());
                bytes.extend_from_slice(&utf8);
            }
            Constant::Integer(value) => bytes.extend_from_slice(&value.to_be_bytes()),
            Constant::Float(value) => bytes.extend_from_slice(&value.to_bits().to_be_bytes()),
            Constant::Long(value) => bytes.extend_from_slice(&value.to_be_bytes()),
            Constant::Double(value) => bytes.extend_from_slice(&value.to_bits().to_be_bytes()),
            Constant::Class(index) | Constant::String(index) => bytes.extend_from_slice(&index.to_be_bytes()),
            Constant::FieldRef(a, b)
            | Constant::MethodRef(a, b)
            | Constant::InterfaceMethodRef(a, b)
            | Constant::NameAndType(a, b) => {
                bytes.extend_from_slice(&a.to_be_bytes());
                bytes.extend_from_slice(&b.to_be_bytes());
            }
        }
        bytes
    }
}

/// The class file's "modified UTF-8": NUL as two bytes, supplementary
/// characters as surrogate pairs
fn modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}

#[derive(Debug, Default)]
pub struct ConstantPool {
    constants: Vec<Constant>,
    /// Serialized entry -> index; float keys compare by bit pattern
    index: HashMap<Vec<u8>, u16>,
    next: u16,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { constants: Vec::new(), index: HashMap::new(), next: 1 }
    }

    /// Entries in insertion order
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// The `constant_pool_count` of the class file: one more than the highest index
    pub fn count(&self) -> u16 {
        self.next.max(1)
    }

    pub fn add(&mut self, constant: Constant) -> Result<u16> {
        let key = constant.to_bytes();
        if let Some(&index) = self.index.get(&key) {
            return Ok(index);
        }
        let index = self.next.max(1);
        let next = index
            .checked_add(constant.width())
            .ok_or_else(|| Error::invalid_input("constant pool overflow"))?;
        self.constants.push(constant);
        self.index.insert(key, index);
        self.next = next;
        Ok(index)
    }

    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        self.add(Constant::Utf8(value.to_string()))
    }

    pub fn add_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.add_utf8(internal_name)?;
        self.add(Constant::Class(name))
    }

    /// Class constant for a type; arrays use their descriptor
    pub fn add_type(&mut self, ty: &TypeDesc, this: &ClassHandle) -> Result<u16> {
        let name = ty.internal_name(this)?;
        self.add_class(&name)
    }

    pub fn add_string(&mut self, value: &str) -> Result<u16> {
        let utf8 = self.add_utf8(value)?;
        self.add(Constant::String(utf8))
    }

    pub fn add_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.add_utf8(name)?;
        let descriptor = self.add_utf8(descriptor)?;
        self.add(Constant::NameAndType(name, descriptor))
    }

    /// Fieldref, Methodref or InterfaceMethodref for `member`
    pub fn add_member_ref(&mut self, member: &MemberRef, this: &ClassHandle) -> Result<u16> {
        let class = self.add_type(&member.owner, this)?;
        let descriptor = if member.is_field {
            member.descriptor.ret.descriptor(this)?
        } else {
            member.descriptor.descriptor(this)?
        };
        let name_and_type = self.add_name_and_type(&member.name, &descriptor)?;
        let constant = if member.is_field {
            Constant::FieldRef(class, name_and_type)
        } else if member.is_interface {
            Constant::InterfaceMethodRef(class, name_and_type)
        } else {
            Constant::MethodRef(class, name_and_type)
        };
        self.add(constant)
    }

    pub fn add_literal(&mut self, value: &Literal) -> Result<u16> {
        match value {
            Literal::Int(v) => self.add(Constant::Integer(*v)),
            Literal::Long(v) => self.add(Constant::Long(*v)),
            Literal::Float(v) => self.add(Constant::Float(*v)),
            Literal::Double(v) => self.add(Constant::Double(*v)),
            Literal::String(s) => self.add_string(s),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.count().to_be_bytes());
        for constant in &self.constants {
            bytes.extend_from_slice(&constant.to_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_one_based_and_shared() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.add_utf8("abs").unwrap(), 1);
        assert_eq!(pool.add_class("java/lang/Math").unwrap(), 3);
        assert_eq!(pool.add_utf8("abs").unwrap(), 1);
        assert_eq!(pool.add_class("java/lang/Math").unwrap(), 3);
        assert_eq!(pool.constants().len(), 3);
        assert_eq!(pool.count(), 4);
    }

    #[test]
    fn test_wide_entries_take_two_indices() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.add(Constant::Long(1)).unwrap(), 1);
        assert_eq!(pool.add(Constant::Integer(1)).unwrap(), 3);
        assert_eq!(pool.add(Constant::Double(0.5)).unwrap(), 4);
        assert_eq!(pool.count(), 6);
    }

    #[test]
    fn test_member_ref_kinds() {
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let mut pool = ConstantPool::new();
        let field = MemberRef::field(TypeDesc::SelfType, "flag", TypeDesc::BOOLEAN);
        let idx = pool.add_member_ref(&field, &this).unwrap();
        assert!(matches!(pool.constants().last(), Some(Constant::FieldRef(..))));
        assert_eq!(pool.add_member_ref(&field, &this).unwrap(), idx);

        let mut call = MemberRef::method(TypeDesc::class("java.lang.CharSequence"), "length", vec![], TypeDesc::INT);
        call.is_interface = true;
        pool.add_member_ref(&call, &this).unwrap();
        assert!(matches!(pool.constants().last(), Some(Constant::InterfaceMethodRef(..))));
        assert!(pool
            .constants()
            .contains(&Constant::Utf8("()I".to_string())));
    }

    #[test]
    fn test_modified_utf8() {
        assert_eq!(Constant::Utf8("a\0".into()).to_bytes(), vec![1, 0, 3, b'a', 0xc0, 0x80]);
        assert_eq!(Constant::Float(1.0).to_bytes(), vec![4, 0x3f, 0x80, 0, 0]);
    }
}
