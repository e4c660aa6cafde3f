//! Member metadata, the self-type handle and member resolution
//!
//! Member lookup is an injected capability: the generator only talks to the
//! [`Resolver`] trait. [`MemberTable`] is the in-memory implementation, able to
//! describe both pre-existing library types and the class under construction
//! (members owned by [`TypeDesc::SelfType`]).

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::ops::BitOr;

use once_cell::sync::OnceCell;

use super::descriptor::{MethodDescriptor, PrimitiveType, TypeDesc, OBJECT, STRING};
use super::types::{conversion_kind, ConversionRules};
use crate::common::error::{Error, Result};

/// Handle to the class currently being assembled.
///
/// The binary name is bound at most once and may arrive after methods that
/// mention the self type were assembled; descriptors are only resolved when
/// they are needed.
#[derive(Debug)]
pub struct ClassHandle {
    name: OnceCell<String>,
    superclass: String,
}

impl ClassHandle {
    pub fn new(superclass: &str) -> Self {
        Self {
            name: OnceCell::new(),
            superclass: superclass.replace('.', "/"),
        }
    }

    pub fn named(name: &str, superclass: &str) -> Self {
        let handle = Self::new(superclass);
        // A fresh cell always accepts its first value
        let _ = handle.name.set(name.replace('.', "/"));
        handle
    }

    /// Bind the final binary name
    pub fn set_name(&self, name: &str) -> Result<()> {
        self.name.set(name.replace('.', "/")).map_err(|_| {
            Error::invalid_input(format!(
                "class under construction already named {}",
                self.name.get().map(String::as_str).unwrap_or("?")
            ))
        })
    }

    pub fn binary_name(&self) -> Result<&str> {
        self.name.get().map(String::as_str).ok_or(Error::UnresolvedSelfType)
    }

    pub fn is_named(&self) -> bool {
        self.name.get().is_some()
    }

    pub fn superclass(&self) -> TypeDesc {
        TypeDesc::Class(self.superclass.clone())
    }
}

/// Class-file access flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub const PUBLIC: AccessFlags = AccessFlags(0x0001);
    pub const PRIVATE: AccessFlags = AccessFlags(0x0002);
    pub const PROTECTED: AccessFlags = AccessFlags(0x0004);
    pub const STATIC: AccessFlags = AccessFlags(0x0008);
    pub const FINAL: AccessFlags = AccessFlags(0x0010);
    pub const SYNCHRONIZED: AccessFlags = AccessFlags(0x0020);
    pub const VARARGS: AccessFlags = AccessFlags(0x0080);
    pub const NATIVE: AccessFlags = AccessFlags(0x0100);
    pub const INTERFACE: AccessFlags = AccessFlags(0x0200);
    pub const ABSTRACT: AccessFlags = AccessFlags(0x0400);

    pub const PACKAGE: AccessFlags = AccessFlags(0);

    pub fn contains(self, other: AccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }
}

impl BitOr for AccessFlags {
    type Output = AccessFlags;

    fn bitor(self, rhs: AccessFlags) -> AccessFlags {
        AccessFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    Constructor,
}

/// Resolved, pre-validated member metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub owner: TypeDesc,
    pub name: String,
    pub kind: MemberKind,
    /// For fields: no params, `ret` is the field type
    pub descriptor: MethodDescriptor,
    pub throws: Vec<TypeDesc>,
    pub access: AccessFlags,
    pub owner_is_interface: bool,
}

impl Member {
    pub fn is_static(&self) -> bool {
        self.access.is_static()
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.descriptor.params
    }

    /// Return type for methods, value type for fields
    pub fn value_type(&self) -> &TypeDesc {
        &self.descriptor.ret
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MemberKind::Field => write!(f, "{}.{}", self.owner, self.name),
            _ => {
                let params: Vec<String> = self.params().iter().map(|p| p.to_string()).collect();
                write!(f, "{}.{}({})", self.owner, self.name, params.join(", "))
            }
        }
    }
}

/// Member lookup and visibility, against both existing types and the class
/// under construction
pub trait Resolver {
    /// Resolve a method or constructor overload for the given argument types
    fn resolve(
        &self,
        owner: &TypeDesc,
        name: &str,
        args: &[TypeDesc],
        is_constructor: bool,
    ) -> Option<Member>;

    fn resolve_field(&self, owner: &TypeDesc, name: &str) -> Option<Member>;

    fn is_accessible(&self, accessor: &TypeDesc, declaring: &TypeDesc, access: AccessFlags)
        -> bool;

    /// Reference subtyping (reflexive)
    fn is_subtype(&self, sub: &TypeDesc, sup: &TypeDesc) -> bool;
}

#[derive(Debug, Clone)]
struct ClassInfo {
    superclass: Option<TypeDesc>,
    interfaces: Vec<TypeDesc>,
    is_interface: bool,
}

/// In-memory [`Resolver`]
#[derive(Debug, Clone, Default)]
pub struct MemberTable {
    classes: HashMap<TypeDesc, ClassInfo>,
    members: HashMap<(TypeDesc, String), Vec<Member>>,
    self_package: String,
}

impl MemberTable {
    pub fn new() -> Self {
        let mut table = Self::default();
        table.classes.insert(
            TypeDesc::object(),
            ClassInfo { superclass: None, interfaces: Vec::new(), is_interface: false },
        );
        table
    }

    /// Table preloaded with the java.lang members the assembler relies on
    pub fn with_java_lang() -> Self {
        let mut table = Self::new();
        table.load_java_lang();
        table
    }

    pub fn declare_class(&mut self, name: &str, superclass: &str, interfaces: &[&str]) -> &mut Self {
        let info = ClassInfo {
            superclass: Some(TypeDesc::class(superclass)),
            interfaces: interfaces.iter().map(|i| TypeDesc::class(i)).collect(),
            is_interface: false,
        };
        self.classes.insert(TypeDesc::class(name), info);
        self
    }

    pub fn declare_interface(&mut self, name: &str, extends: &[&str]) -> &mut Self {
        let info = ClassInfo {
            superclass: Some(TypeDesc::object()),
            interfaces: extends.iter().map(|i| TypeDesc::class(i)).collect(),
            is_interface: true,
        };
        self.classes.insert(TypeDesc::class(name), info);
        self
    }

    /// Register the class under construction
    pub fn declare_self(&mut self, package: &str, superclass: &str, interfaces: &[&str]) -> &mut Self {
        let info = ClassInfo {
            superclass: Some(TypeDesc::class(superclass)),
            interfaces: interfaces.iter().map(|i| TypeDesc::class(i)).collect(),
            is_interface: false,
        };
        self.classes.insert(TypeDesc::SelfType, info);
        self.self_package = package.replace('.', "/");
        self
    }

    pub fn declare_field(&mut self, owner: TypeDesc, name: &str, ty: TypeDesc, access: AccessFlags) -> &mut Self {
        let member = Member {
            owner_is_interface: self.is_interface(&owner),
            owner,
            name: name.to_string(),
            kind: MemberKind::Field,
            descriptor: MethodDescriptor::new(Vec::new(), ty),
            throws: Vec::new(),
            access,
        };
        self.insert(member);
        self
    }

    pub fn declare_method(
        &mut self,
        owner: TypeDesc,
        name: &str,
        params: Vec<TypeDesc>,
        ret: TypeDesc,
        access: AccessFlags,
    ) -> &mut Self {
        self.declare_method_throwing(owner, name, params, ret, access, Vec::new())
    }

    pub fn declare_method_throwing(
        &mut self,
        owner: TypeDesc,
        name: &str,
        params: Vec<TypeDesc>,
        ret: TypeDesc,
        access: AccessFlags,
        throws: Vec<TypeDesc>,
    ) -> &mut Self {
        let member = Member {
            owner_is_interface: self.is_interface(&owner),
            owner,
            name: name.to_string(),
            kind: MemberKind::Method,
            descriptor: MethodDescriptor::new(params, ret),
            throws,
            access,
        };
        self.insert(member);
        self
    }

    pub fn declare_constructor(&mut self, owner: TypeDesc, params: Vec<TypeDesc>, access: AccessFlags) -> &mut Self {
        let member = Member {
            owner,
            name: "<init>".to_string(),
            kind: MemberKind::Constructor,
            descriptor: MethodDescriptor::new(params, TypeDesc::Void),
            throws: Vec::new(),
            access,
            owner_is_interface: false,
        };
        self.insert(member);
        self
    }

    fn insert(&mut self, member: Member) {
        self.members
            .entry((member.owner.clone(), member.name.clone()))
            .or_default()
            .push(member);
    }

    fn is_interface(&self, ty: &TypeDesc) -> bool {
        self.classes.get(ty).map_or(false, |c| c.is_interface)
    }

    /// `ty` followed by its supertypes, nearest first
    fn lineage(&self, ty: &TypeDesc) -> Vec<TypeDesc> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([ty.clone()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(info) = self.classes.get(&next) {
                queue.extend(info.superclass.iter().cloned());
                queue.extend(info.interfaces.iter().cloned());
            }
            order.push(next);
        }
        if ty.is_reference() && !seen.contains(&TypeDesc::object()) {
            order.push(TypeDesc::object());
        }
        order
    }

    fn package_of(&self, ty: &TypeDesc) -> String {
        match ty {
            TypeDesc::SelfType => self.self_package.clone(),
            TypeDesc::Class(name) => name.rsplit_once('/').map(|(p, _)| p.to_string()).unwrap_or_default(),
            _ => String::new(),
        }
    }

    /// Strict applicability excludes boxing and unboxing, as in the first
    /// overload-resolution phase of the Java language
    fn is_applicable(&self, member: &Member, args: &[TypeDesc], strict: bool) -> bool {
        member.params().len() == args.len()
            && member.params().iter().zip(args).all(|(p, a)| {
                let kind = conversion_kind(a, p, self, ConversionRules::STANDARD);
                if strict { kind.is_strict() } else { kind.is_implicit() }
            })
    }

    fn more_specific(&self, a: &Member, b: &Member) -> bool {
        a.params()
            .iter()
            .zip(b.params())
            .all(|(pa, pb)| conversion_kind(pa, pb, self, ConversionRules::STANDARD).is_implicit())
    }

    fn load_java_lang(&mut self) {
        let public = AccessFlags::PUBLIC;
        let public_static = AccessFlags::PUBLIC | AccessFlags::STATIC;
        let object = TypeDesc::object();
        let string = TypeDesc::string();
        let builder = TypeDesc::class("java.lang.StringBuilder");
        let number = "java/lang/Number";

        self.declare_interface("java/io/Serializable", &[])
            .declare_interface("java/lang/Comparable", &[])
            .declare_interface("java/lang/CharSequence", &[])
            .declare_interface("java/lang/Cloneable", &[])
            .declare_class(number, OBJECT, &["java/io/Serializable"])
            .declare_class(STRING, OBJECT, &["java/io/Serializable", "java/lang/Comparable", "java/lang/CharSequence"])
            .declare_class("java/lang/StringBuilder", OBJECT, &["java/io/Serializable", "java/lang/CharSequence"])
            .declare_class("java/lang/Math", OBJECT, &[])
            .declare_class("java/lang/Throwable", OBJECT, &["java/io/Serializable"])
            .declare_class("java/lang/Exception", "java/lang/Throwable", &[])
            .declare_class("java/lang/RuntimeException", "java/lang/Exception", &[])
            .declare_class("java/lang/IllegalArgumentException", "java/lang/RuntimeException", &[]);

        self.declare_constructor(object.clone(), vec![], public)
            .declare_method(object.clone(), "equals", vec![object.clone()], TypeDesc::BOOLEAN, public)
            .declare_method(object.clone(), "hashCode", vec![], TypeDesc::INT, public)
            .declare_method(object.clone(), "toString", vec![], string.clone(), public);

        self.declare_method(string.clone(), "length", vec![], TypeDesc::INT, public)
            .declare_method(string.clone(), "isEmpty", vec![], TypeDesc::BOOLEAN, public)
            .declare_method(string.clone(), "charAt", vec![TypeDesc::INT], TypeDesc::CHAR, public)
            .declare_method(string.clone(), "concat", vec![string.clone()], string.clone(), public)
            .declare_method(string.clone(), "equals", vec![object.clone()], TypeDesc::BOOLEAN, public)
            .declare_method(string.clone(), "valueOf", vec![TypeDesc::INT], string.clone(), public_static)
            .declare_method(string.clone(), "valueOf", vec![object.clone()], string.clone(), public_static);

        self.declare_constructor(builder.clone(), vec![], public)
            .declare_constructor(builder.clone(), vec![string.clone()], public)
            .declare_method(builder.clone(), "length", vec![], TypeDesc::INT, public)
            .declare_method(builder.clone(), "toString", vec![], string.clone(), public);
        for arg in [string.clone(), object.clone(), TypeDesc::INT, TypeDesc::LONG, TypeDesc::CHAR, TypeDesc::BOOLEAN, TypeDesc::DOUBLE] {
            self.declare_method(builder.clone(), "append", vec![arg], builder.clone(), public);
        }

        let math = TypeDesc::class("java.lang.Math");
        for ty in [TypeDesc::INT, TypeDesc::LONG, TypeDesc::DOUBLE] {
            self.declare_method(math.clone(), "abs", vec![ty.clone()], ty.clone(), public_static)
                .declare_method(math.clone(), "max", vec![ty.clone(), ty.clone()], ty.clone(), public_static)
                .declare_method(math.clone(), "min", vec![ty.clone(), ty.clone()], ty.clone(), public_static);
        }

        let exception = TypeDesc::class("java.lang.IllegalArgumentException");
        self.declare_constructor(exception.clone(), vec![], public)
            .declare_constructor(exception, vec![string.clone()], public);

        for prim in PrimitiveType::ALL {
            let wrapper = TypeDesc::wrapper_of(prim);
            let superclass = if prim.is_numeric() && prim != PrimitiveType::Char { number } else { OBJECT };
            self.declare_class(prim.wrapper(), superclass, &["java/io/Serializable", "java/lang/Comparable"]);
            let p = TypeDesc::Primitive(prim);
            self.declare_method(wrapper.clone(), "valueOf", vec![p.clone()], wrapper.clone(), public_static)
                .declare_method(wrapper.clone(), prim.unbox_method(), vec![], p, public);
        }
        let integer = TypeDesc::wrapper_of(PrimitiveType::Int);
        self.declare_method(integer.clone(), "parseInt", vec![string], TypeDesc::INT, public_static)
            .declare_field(integer.clone(), "MAX_VALUE", TypeDesc::INT, public_static | AccessFlags::FINAL)
            .declare_field(integer, "MIN_VALUE", TypeDesc::INT, public_static | AccessFlags::FINAL);
    }
}

impl Resolver for MemberTable {
    fn resolve(
        &self,
        owner: &TypeDesc,
        name: &str,
        args: &[TypeDesc],
        is_constructor: bool,
    ) -> Option<Member> {
        let search: Vec<TypeDesc> = if is_constructor { vec![owner.clone()] } else { self.lineage(owner) };
        let wanted = if is_constructor { "<init>" } else { name };

        // Nearest declaration of each signature wins (overriding)
        let mut seen = HashSet::new();
        let mut candidates: Vec<&Member> = Vec::new();
        for ty in &search {
            if let Some(list) = self.members.get(&(ty.clone(), wanted.to_string())) {
                for member in list {
                    if member.kind == MemberKind::Field {
                        continue;
                    }
                    if seen.insert(member.params().to_vec()) {
                        candidates.push(member);
                    }
                }
            }
        }

        if let Some(exact) = candidates.iter().find(|m| m.params() == args) {
            return Some((*exact).clone());
        }

        for strict in [true, false] {
            let applicable: Vec<&Member> = candidates
                .iter()
                .copied()
                .filter(|m| self.is_applicable(m, args, strict))
                .collect();
            if applicable.is_empty() {
                continue;
            }
            return applicable
                .iter()
                .find(|m| applicable.iter().all(|other| self.more_specific(m, other)))
                .or_else(|| applicable.first())
                .map(|m| (*m).clone());
        }
        None
    }

    fn resolve_field(&self, owner: &TypeDesc, name: &str) -> Option<Member> {
        self.lineage(owner).iter().find_map(|ty| {
            self.members
                .get(&(ty.clone(), name.to_string()))
                .and_then(|list| list.iter().find(|m| m.kind == MemberKind::Field))
                .cloned()
        })
    }

    fn is_accessible(&self, accessor: &TypeDesc, declaring: &TypeDesc, access: AccessFlags) -> bool {
        if access.is_public() || accessor == declaring {
            return true;
        }
        if access.is_private() {
            return false;
        }
        if self.package_of(accessor) == self.package_of(declaring) {
            return true;
        }
        access.is_protected() && self.is_subtype(accessor, declaring)
    }

    fn is_subtype(&self, sub: &TypeDesc, sup: &TypeDesc) -> bool {
        if sub == sup {
            return true;
        }
        match (sub, sup) {
            (TypeDesc::Null, s) => s.is_reference(),
            (s, TypeDesc::Class(name)) if s.is_reference() && name == OBJECT => true,
            (TypeDesc::Array(a), TypeDesc::Array(b)) => {
                if a.is_primitive() || b.is_primitive() {
                    a == b
                } else {
                    self.is_subtype(a, b)
                }
            }
            (TypeDesc::Array(_), TypeDesc::Class(name)) => {
                name == "java/lang/Cloneable" || name == "java/io/Serializable"
            }
            (TypeDesc::Class(_) | TypeDesc::SelfType, TypeDesc::Class(_) | TypeDesc::SelfType) => {
                self.lineage(sub).contains(sup)
            }
            _ => false,
        }
    }
}
