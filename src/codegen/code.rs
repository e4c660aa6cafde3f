//! Per-method compile-time machine state
//!
//! [`Code`] simulates what the real machine holds while a method body is being
//! assembled: the operand stack (as types), the local-variable slot table and
//! the lexical scopes that own slots. It mirrors the state javac's `Code.State`
//! keeps, plus the stack shape recorded at every label so that control-flow
//! joins can be checked for balance.

use std::collections::HashMap;

use super::descriptor::TypeDesc;
use super::insn::Label;
use crate::common::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Code {
    stack: Vec<TypeDesc>,
    /// Current stack depth in slots
    stacksize: u16,
    /// Maximum stack depth seen, in slots
    pub max_stack: u16,
    /// One entry per slot; wide types fill two consecutive entries
    locals: Vec<Option<TypeDesc>>,
    names: Vec<Option<String>>,
    pub max_locals: u16,
    /// Checkpoints of the local table length
    scopes: Vec<usize>,
    /// Code generation reachable? (javac `alive`)
    pub alive: bool,
    label_states: HashMap<Label, Vec<TypeDesc>>,
}

impl Default for Code {
    fn default() -> Self {
        Self::new()
    }
}

impl Code {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            stacksize: 0,
            max_stack: 0,
            locals: Vec::new(),
            names: Vec::new(),
            max_locals: 0,
            scopes: Vec::new(),
            alive: true,
            label_states: HashMap::new(),
        }
    }

    /// Copy of the machine state for a dry run; label bookkeeping is not
    /// carried over because a probed fragment only jumps to its own labels.
    pub fn fork(&self) -> Code {
        Code {
            label_states: HashMap::new(),
            ..self.clone()
        }
    }

    // ------------------------------------------------------------------
    // Operand stack
    // ------------------------------------------------------------------

    pub fn push(&mut self, ty: TypeDesc) -> Result<()> {
        if ty.is_void() {
            return Err(Error::internal("pushed a void value"));
        }
        self.stacksize += ty.width();
        self.max_stack = self.max_stack.max(self.stacksize);
        self.stack.push(ty);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<TypeDesc> {
        let ty = self
            .stack
            .pop()
            .ok_or_else(|| Error::internal("pop from an empty operand stack"))?;
        self.stacksize -= ty.width();
        Ok(ty)
    }

    /// Pop `n` entries, returned in push order
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<TypeDesc>> {
        if n > self.stack.len() {
            return Err(Error::internal(format!(
                "pop of {} values from an operand stack holding {}",
                n,
                self.stack.len()
            )));
        }
        let values = self.stack.split_off(self.stack.len() - n);
        self.stacksize -= values.iter().map(TypeDesc::width).sum::<u16>();
        Ok(values)
    }

    pub fn peek(&self) -> Result<&TypeDesc> {
        self.stack
            .last()
            .ok_or_else(|| Error::internal("peek at an empty operand stack"))
    }

    /// Retag the top of the stack after a conversion
    pub fn replace_top(&mut self, ty: TypeDesc) -> Result<()> {
        self.pop()?;
        self.push(ty)
    }

    pub fn size(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn slot_depth(&self) -> u16 {
        self.stacksize
    }

    pub fn stack(&self) -> &[TypeDesc] {
        &self.stack
    }

    // ------------------------------------------------------------------
    // Local variables
    // ------------------------------------------------------------------

    /// Allocate the next free slot (two for long/double)
    pub fn add_local(&mut self, ty: TypeDesc) -> Result<u16> {
        self.alloc(ty, None)
    }

    pub fn add_named_local(&mut self, name: &str, ty: TypeDesc) -> Result<u16> {
        self.alloc(ty, Some(name.to_string()))
    }

    fn alloc(&mut self, ty: TypeDesc, name: Option<String>) -> Result<u16> {
        let index = u16::try_from(self.locals.len())
            .map_err(|_| Error::invalid_input("too many local variables"))?;
        self.set_slots(index, ty)?;
        self.names[index as usize] = name;
        Ok(index)
    }

    /// Rewrite (or create) the slot at `index`; a wide type also claims `index + 1`
    pub fn set_local(&mut self, index: u16, ty: TypeDesc) -> Result<()> {
        self.set_slots(index, ty)
    }

    /// Rewrite the named slot, or allocate it if the name is unbound
    pub fn set_named_local(&mut self, name: &str, ty: TypeDesc) -> Result<u16> {
        match self.resolve_index(name) {
            Ok(index) => {
                self.set_slots(index, ty)?;
                Ok(index)
            }
            Err(_) => self.add_named_local(name, ty),
        }
    }

    fn set_slots(&mut self, index: u16, ty: TypeDesc) -> Result<()> {
        if ty.is_void() || ty == TypeDesc::Null {
            return Err(Error::invalid_input(format!("a local cannot hold {}", ty)));
        }
        let was_wide = self
            .locals
            .get(index as usize)
            .and_then(Option::as_ref)
            .map_or(false, TypeDesc::is_wide);
        let width = ty.width() as usize;
        let end = index as usize + width;
        if was_wide && width == 1 {
            if let Some(stale) = self.locals.get_mut(end) {
                *stale = None;
            }
        }
        if self.locals.len() < end {
            self.locals.resize(end, None);
            self.names.resize(end, None);
        }
        for slot in index as usize..end {
            self.locals[slot] = Some(ty.clone());
        }
        if width == 2 {
            self.names[end - 1] = None;
        }
        self.max_locals = self.max_locals.max(end as u16);
        Ok(())
    }

    pub fn local_type(&self, index: u16) -> Result<&TypeDesc> {
        self.locals
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::internal(format!("local slot {} is not allocated", index)))
    }

    /// Slot bound to `name`; the innermost binding wins
    pub fn resolve_index(&self, name: &str) -> Result<u16> {
        self.names
            .iter()
            .rposition(|n| n.as_deref() == Some(name))
            .map(|i| i as u16)
            .ok_or_else(|| Error::UnresolvedLocal { name: name.to_string() })
    }

    /// Number of slot entries in the table
    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    pub fn begin_scope(&mut self) {
        self.scopes.push(self.locals.len());
    }

    /// Drop every slot and name added since the matching `begin_scope`
    pub fn end_scope(&mut self) -> Result<()> {
        let checkpoint = self
            .scopes
            .pop()
            .ok_or_else(|| Error::internal("end_scope without an open scope"))?;
        self.locals.truncate(checkpoint);
        self.names.truncate(checkpoint);
        Ok(())
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    // ------------------------------------------------------------------
    // Reachability and joins
    // ------------------------------------------------------------------

    pub fn mark_dead(&mut self) {
        self.alive = false;
    }

    /// Record the stack shape carried by a jump to `label`
    pub fn jump_to(&mut self, label: Label) -> Result<()> {
        let shape = self.stack.clone();
        self.merge_state(label, shape)
    }

    /// Enter `label`: the fall-through shape (if reachable) and every recorded
    /// jump shape must agree. Unreachable with no incoming jump stays dead.
    pub fn place(&mut self, label: Label) -> Result<()> {
        if self.alive {
            let shape = self.stack.clone();
            return self.merge_state(label, shape);
        }
        if let Some(shape) = self.label_states.get(&label).cloned() {
            self.stacksize = shape.iter().map(TypeDesc::width).sum();
            self.stack = shape;
            self.alive = true;
        }
        Ok(())
    }

    fn merge_state(&mut self, label: Label, shape: Vec<TypeDesc>) -> Result<()> {
        match self.label_states.get(&label) {
            Some(expected) if *expected != shape => Err(Error::internal(format!(
                "operand stack mismatch at {}: expected [{}], found [{}]",
                label,
                join(expected),
                join(&shape)
            ))),
            Some(_) => Ok(()),
            None => {
                self.label_states.insert(label, shape);
                Ok(())
            }
        }
    }
}

fn join(types: &[TypeDesc]) -> String {
    types.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_tracks_slots() {
        let mut code = Code::new();
        code.push(TypeDesc::INT).unwrap();
        code.push(TypeDesc::LONG).unwrap();
        assert_eq!(code.size(), 2);
        assert_eq!(code.slot_depth(), 3);
        assert_eq!(code.pop().unwrap(), TypeDesc::LONG);
        assert_eq!(code.slot_depth(), 1);
        assert_eq!(code.max_stack, 3);
        assert!(code.push(TypeDesc::Void).is_err());
    }

    #[test]
    fn test_pop_empty_is_internal() {
        let mut code = Code::new();
        assert!(code.pop().unwrap_err().is_internal());
        assert!(code.peek().unwrap_err().is_internal());
        code.push(TypeDesc::INT).unwrap();
        assert!(code.pop_n(2).unwrap_err().is_internal());
    }

    #[test]
    fn test_pop_n_returns_push_order() {
        let mut code = Code::new();
        code.push(TypeDesc::INT).unwrap();
        code.push(TypeDesc::string()).unwrap();
        code.push(TypeDesc::DOUBLE).unwrap();
        let popped = code.pop_n(2).unwrap();
        assert_eq!(popped, vec![TypeDesc::string(), TypeDesc::DOUBLE]);
        assert_eq!(code.slot_depth(), 1);
    }

    #[test]
    fn test_wide_locals_take_two_slots() {
        let mut code = Code::new();
        let a = code.add_named_local("a", TypeDesc::INT).unwrap();
        let b = code.add_named_local("b", TypeDesc::DOUBLE).unwrap();
        let c = code.add_local(TypeDesc::string()).unwrap();
        assert_eq!((a, b, c), (0, 1, 3));
        assert_eq!(code.local_type(2).unwrap(), &TypeDesc::DOUBLE);
        assert_eq!(code.max_locals, 4);
    }

    #[test]
    fn test_set_local_wide_writes_both_entries() {
        let mut code = Code::new();
        code.set_local(4, TypeDesc::LONG).unwrap();
        assert_eq!(code.local_count(), 6);
        assert_eq!(code.local_type(4).unwrap(), &TypeDesc::LONG);
        assert_eq!(code.local_type(5).unwrap(), &TypeDesc::LONG);
        assert!(code.local_type(3).is_err());
    }

    #[test]
    fn test_scopes_shadow_and_restore() {
        let mut code = Code::new();
        code.add_named_local("x", TypeDesc::INT).unwrap();
        code.begin_scope();
        assert_eq!(code.scope_depth(), 1);
        let inner = code.add_named_local("x", TypeDesc::LONG).unwrap();
        assert_eq!(code.resolve_index("x").unwrap(), inner);
        code.add_named_local("y", TypeDesc::INT).unwrap();
        code.end_scope().unwrap();
        assert_eq!(code.scope_depth(), 0);
        assert_eq!(code.resolve_index("x").unwrap(), 0);
        assert!(matches!(
            code.resolve_index("y"),
            Err(Error::UnresolvedLocal { .. })
        ));
        assert_eq!(code.local_count(), 1);
        assert!(code.end_scope().unwrap_err().is_internal());
    }

    #[test]
    fn test_set_named_local_rewrites_or_allocates() {
        let mut code = Code::new();
        let x = code.add_named_local("x", TypeDesc::INT).unwrap();

        assert_eq!(code.set_named_local("x", TypeDesc::LONG).unwrap(), x);
        assert_eq!(code.local_count(), 2);
        assert_eq!(code.local_type(x + 1).unwrap(), &TypeDesc::LONG);
        assert_eq!(code.max_locals, 2);

        // narrowing again releases the second half
        assert_eq!(code.set_named_local("x", TypeDesc::INT).unwrap(), x);
        assert!(code.local_type(x + 1).is_err());

        let y = code.set_named_local("y", TypeDesc::DOUBLE).unwrap();
        assert_eq!(y, 2);
        assert_eq!(code.resolve_index("y").unwrap(), y);
        assert_eq!(code.local_count(), 4);
        assert_eq!(code.max_locals, 4);
    }

    #[test]
    fn test_label_states_must_agree() {
        let mut code = Code::new();
        let l = Label(0);
        code.push(TypeDesc::INT).unwrap();
        code.jump_to(l).unwrap();
        code.push(TypeDesc::INT).unwrap();
        assert!(code.place(l).unwrap_err().is_internal());
    }

    #[test]
    fn test_dead_code_revives_from_jump_shape() {
        let mut code = Code::new();
        let l = Label(7);
        code.push(TypeDesc::string()).unwrap();
        code.jump_to(l).unwrap();
        code.pop().unwrap();
        code.mark_dead();
        code.place(l).unwrap();
        assert!(code.alive);
        assert_eq!(code.stack(), &[TypeDesc::string()]);

        let mut dead = Code::new();
        dead.mark_dead();
        dead.place(Label(1)).unwrap();
        assert!(!dead.alive);
    }
}
