//! Ready-made method bodies used by the CLI and the scenario tests

use crate::codegen::chain::Chain;
use crate::codegen::cond::Cond;
use crate::codegen::descriptor::TypeDesc;
use crate::codegen::method::{assemble_method, AssembledMethod, ClassContext, MethodSpec};
use crate::codegen::symtab::{AccessFlags, ClassHandle, MemberTable};
use crate::common::error::{Error, Result};
use crate::config::Config;

pub struct Sample {
    pub name: &'static str,
    pub about: &'static str,
    build: fn() -> MethodSpec,
}

impl Sample {
    pub fn spec(&self) -> MethodSpec {
        (self.build)()
    }

    /// Assemble against a class named `class_name` with the sample's members declared
    pub fn assemble(&self, class_name: &str, config: &Config) -> Result<(ClassHandle, AssembledMethod)> {
        let this = ClassHandle::named(class_name, "java/lang/Object");
        let table = sample_table(class_name);
        let ctx = ClassContext::new(&this, &table, config);
        let method = assemble_method(&self.spec(), &ctx)?;
        Ok((this, method))
    }
}

pub const SAMPLES: &[Sample] = &[
    Sample {
        name: "abs",
        about: "if (value < 0) return value * -1; return value;",
        build: abs,
    },
    Sample {
        name: "min",
        about: "return a < b ? a : b;",
        build: min,
    },
    Sample {
        name: "sum",
        about: "while-loop sum over an int[]",
        build: sum,
    },
    Sample {
        name: "branch_names",
        about: "if/else-if/else on String.equals, setting one of two static flags",
        build: branch_names,
    },
];

pub fn find(name: &str) -> Result<&'static Sample> {
    SAMPLES
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| Error::invalid_input(format!("no sample named '{}'", name)))
}

/// Members the samples reference on the class under construction
pub fn sample_table(class_name: &str) -> MemberTable {
    let package = class_name.replace('.', "/").rsplit_once('/').map(|(p, _)| p.to_string()).unwrap_or_default();
    let flag = AccessFlags::PUBLIC | AccessFlags::STATIC;
    let mut table = MemberTable::with_java_lang();
    table
        .declare_self(&package, "java/lang/Object", &[])
        .declare_field(TypeDesc::SelfType, "hit", TypeDesc::BOOLEAN, flag)
        .declare_field(TypeDesc::SelfType, "miss", TypeDesc::BOOLEAN, flag);
    table
}

fn public_static() -> AccessFlags {
    AccessFlags::PUBLIC | AccessFlags::STATIC
}

fn abs() -> MethodSpec {
    MethodSpec::new("abs", TypeDesc::INT)
        .with_access(public_static())
        .param("value", TypeDesc::INT)
        .body(
            Chain::new()
                .if_then(
                    Cond::lt(Chain::local("value"), Chain::int(0)),
                    Chain::local("value").mul(Chain::int(-1)).ret(),
                )
                .append(Chain::local("value").ret()),
        )
}

fn min() -> MethodSpec {
    MethodSpec::new("min", TypeDesc::INT)
        .with_access(public_static())
        .param("a", TypeDesc::INT)
        .param("b", TypeDesc::INT)
        .body(
            Chain::ternary(
                Cond::lt(Chain::local("a"), Chain::local("b")),
                Chain::local("a"),
                Chain::local("b"),
            )
            .ret(),
        )
}

fn sum() -> MethodSpec {
    MethodSpec::new("sum", TypeDesc::INT)
        .with_access(public_static())
        .param("values", TypeDesc::array_of(TypeDesc::INT))
        .body(
            Chain::new()
                .declare("total", TypeDesc::INT, Chain::int(0))
                .declare("i", TypeDesc::INT, Chain::int(0))
                .while_loop(
                    Cond::lt(Chain::local("i"), Chain::local("values").array_length()),
                    Chain::new()
                        .set(
                            "total",
                            Chain::local("total").add(Chain::local("values").index(Chain::local("i"))),
                        )
                        .increment("i", 1),
                )
                .append(Chain::local("total").ret()),
        )
}

fn branch_names() -> MethodSpec {
    let equals = |text: &str| Cond::is_true(Chain::local("name").invoke("equals", vec![Chain::string(text)]));
    let set = |flag: &str| Chain::new().put_static(TypeDesc::SelfType, flag, Chain::bool(true));
    MethodSpec::new("branchNames", TypeDesc::string())
        .with_access(public_static())
        .param("name", TypeDesc::string())
        .body(
            Chain::new()
                .if_then(equals("if"), set("hit").append(Chain::string("if").ret()))
                .or_else(
                    Chain::new()
                        .if_then(equals("elseIf"), set("hit").append(Chain::string("elseIf").ret()))
                        .or_else(set("miss").append(Chain::string("else").ret())),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sample_assembles() {
        let config = Config::default();
        for sample in SAMPLES {
            let (this, method) = sample.assemble("demo.Samples", &config).unwrap();
            assert!(!method.insns.is_empty(), "{}", sample.name);
            assert!(method.descriptor(&this).is_ok());
        }
    }

    #[test]
    fn test_find() {
        assert_eq!(find("min").unwrap().name, "min");
        assert!(find("max").is_err());
    }

    #[test]
    fn test_abs_listing() {
        let (_, method) = find("abs").unwrap().assemble("demo.Samples", &Config::default()).unwrap();
        assert_eq!(
            method.insns.listing(),
            "    iload 0\n    iconst_0\n    if_icmpge L0\n    iload 0\n    iconst_m1\n    imul\n    ireturn\nL0:\n    iload 0\n    ireturn\n"
        );
        assert_eq!(method.max_stack, 2);
        assert_eq!(method.max_locals, 1);
    }
}
