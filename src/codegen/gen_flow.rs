//! Structured control flow: if/else, while, conditional values
//!
//! Bodies of a branch run in their own scope. A branch that becomes
//! unreachable (a constant condition, or a body that already returned) is not
//! generated; labels that nothing jumps to stay dead.

use super::chain::Chain;
use super::cond::Cond;
use super::descriptor::TypeDesc;
use super::gen::Gen;
use super::opcodes;
use super::types::common_type;
use crate::common::error::Result;

impl<'a> Gen<'a> {
    pub fn gen_if(&mut self, cond: &Cond, then: &Chain, otherwise: Option<&Chain>) -> Result<()> {
        let end = self.new_label();
        let else_label = if otherwise.is_some() { self.new_label() } else { end };

        cond.jump_false(self, else_label)?;
        if self.code.alive {
            self.gen_scoped(then)?;
        }
        if let Some(otherwise) = otherwise {
            if self.code.alive {
                self.emit_jump(opcodes::GOTO, end)?;
            }
            self.place(else_label)?;
            if self.code.alive {
                self.gen_scoped(otherwise)?;
            }
        }
        self.place(end)
    }

    pub fn gen_while(&mut self, cond: &Cond, body: &Chain) -> Result<()> {
        let start = self.new_label();
        let end = self.new_label();

        self.place(start)?;
        cond.jump_false(self, end)?;
        if self.code.alive {
            self.gen_scoped(body)?;
            if self.code.alive {
                self.emit_jump(opcodes::GOTO, start)?;
            }
        }
        self.place(end)
    }

    /// `cond ? then : otherwise`, both arms converted to the type they agree on
    pub fn gen_ternary(&mut self, cond: &Cond, then: &Chain, otherwise: &Chain) -> Result<()> {
        let then_ty = self.probe(then)?;
        let else_ty = self.probe(otherwise)?;
        let ctx = self.context();
        let ty = common_type(&then_ty, &else_ty, ctx.resolver, self.conversion_rules())?;

        let else_label = self.new_label();
        let end = self.new_label();
        cond.jump_false(self, else_label)?;
        if self.code.alive {
            self.gen_arm(then, &ty)?;
            self.emit_jump(opcodes::GOTO, end)?;
        }
        self.place(else_label)?;
        if self.code.alive {
            self.gen_arm(otherwise, &ty)?;
        }
        self.place(end)
    }

    fn gen_arm(&mut self, arm: &Chain, ty: &TypeDesc) -> Result<()> {
        self.code.begin_scope();
        self.gen_value(arm)?;
        self.coerce(ty)?;
        self.code.end_scope()
    }

    /// Materialise a condition as a `boolean`
    pub fn gen_cond_value(&mut self, cond: &Cond) -> Result<()> {
        let when_false = self.new_label();
        let end = self.new_label();

        cond.jump_false(self, when_false)?;
        if self.code.alive {
            self.emit_op(opcodes::ICONST_1);
            self.code.push(TypeDesc::BOOLEAN)?;
            self.emit_jump(opcodes::GOTO, end)?;
        }
        self.place(when_false)?;
        if self.code.alive {
            self.emit_op(opcodes::ICONST_0);
            self.code.push(TypeDesc::BOOLEAN)?;
        }
        self.place(end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::insn::InsnBuffer;
    use crate::codegen::method::ClassContext;
    use crate::codegen::symtab::{ClassHandle, MemberTable};
    use crate::common::error::Error;
    use crate::config::Config;

    fn run(chain: Chain) -> (Result<Vec<TypeDesc>>, String) {
        let table = MemberTable::with_java_lang();
        let this = ClassHandle::named("demo/T", "java/lang/Object");
        let config = Config::default();
        let mut buf = InsnBuffer::new();
        let result = {
            let mut gen = Gen::new(ClassContext::new(&this, &table, &config), &mut buf, true, TypeDesc::INT);
            gen.code.add_named_local("x", TypeDesc::INT).unwrap();
            gen.gen_chain(&chain).map(|_| gen.code.stack().to_vec())
        };
        (result, buf.listing())
    }

    #[test]
    fn test_if_else_layout() {
        let chain = Chain::new()
            .if_then(
                Cond::lt(Chain::local("x"), Chain::int(0)),
                Chain::local("x").neg().ret(),
            )
            .or_else(Chain::local("x").ret());
        let (result, listing) = run(chain);
        assert!(result.unwrap().is_empty());
        assert_eq!(
            listing,
            "    iload 0\n    iconst_0\n    if_icmpge L1\n    iload 0\n    ineg\n    ireturn\nL1:\n    iload 0\n    ireturn\nL0:\n"
        );
    }

    #[test]
    fn test_while_loop_layout() {
        let chain = Chain::new().while_loop(
            Cond::lt(Chain::local("x"), Chain::int(10)),
            Chain::new().increment("x", 1),
        );
        let (result, listing) = run(chain);
        assert!(result.unwrap().is_empty());
        assert_eq!(
            listing,
            "L0:\n    iload 0\n    bipush 10\n    if_icmpge L1\n    iload 0\n    iconst_1\n    iadd\n    istore 0\n    goto L0\nL1:\n"
        );
    }

    #[test]
    fn test_unbalanced_loop_body() {
        let chain = Chain::new().while_loop(Cond::always(true), Chain::int(1));
        let (result, _) = run(chain);
        assert!(result.unwrap_err().is_internal());
    }

    #[test]
    fn test_constant_false_skips_then() {
        let chain = Chain::new().if_then(Cond::always(false), Chain::int(1).ret());
        let (result, listing) = run(chain);
        assert!(result.unwrap().is_empty());
        assert_eq!(listing, "    goto L0\nL0:\n");
    }

    #[test]
    fn test_ternary_types() {
        let chain = Chain::ternary(
            Cond::gt(Chain::local("x"), Chain::int(0)),
            Chain::local("x"),
            Chain::long(7),
        );
        let (result, listing) = run(chain);
        assert_eq!(result.unwrap(), vec![TypeDesc::LONG]);
        assert!(listing.contains("i2l"));

        let bad = Chain::ternary(Cond::always(true), Chain::bool(true), Chain::string("s"));
        let (result, _) = run(bad);
        assert!(matches!(result, Err(Error::IncompatibleBranches { .. })));
    }

    #[test]
    fn test_cond_value() {
        let chain = Chain::cond_value(Cond::eq(Chain::local("x"), Chain::int(3)));
        let (result, listing) = run(chain);
        assert_eq!(result.unwrap(), vec![TypeDesc::BOOLEAN]);
        assert_eq!(
            listing,
            "    iload 0\n    iconst_3\n    if_icmpne L0\n    iconst_1\n    goto L1\nL0:\n    iconst_0\nL1:\n"
        );
    }
}
