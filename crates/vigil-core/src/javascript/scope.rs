//! Scope frames for identifier bindings
//!
//! Frames form a stack. Lookup walks from the innermost frame outwards and
//! the first match wins. Names that no frame binds fall through to the
//! knowledge base's global table.

use std::collections::HashMap;

use super::value::Wrapped;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Global,
    Function,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Var,
    Let,
    Const,
    Function,
    Param,
    /// Created by assigning to an undeclared name.
    Implicit,
}

impl BindingKind {
    fn is_function_scoped(self) -> bool {
        matches!(
            self,
            BindingKind::Var | BindingKind::Function | BindingKind::Param | BindingKind::Implicit
        )
    }
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub kind: BindingKind,
    pub value: Wrapped,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    bindings: HashMap<String, Binding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Updated,
    /// The binding is `const`; the write was dropped.
    Constant,
    /// No frame declares the name.
    Unbound,
}

#[derive(Debug)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame {
                kind: FrameKind::Global,
                bindings: HashMap::new(),
            }],
        }
    }

    pub fn push(&mut self, kind: FrameKind) {
        self.frames.push(Frame {
            kind,
            bindings: HashMap::new(),
        });
    }

    /// Pops the innermost frame. The global frame is never popped.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// True when no function frame is open.
    pub fn at_top_level(&self) -> bool {
        self.frames.iter().all(|f| f.kind != FrameKind::Function)
    }

    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.bindings.get(name))
    }

    pub fn global_binding(&self, name: &str) -> Option<&Binding> {
        self.frames.first().and_then(|f| f.bindings.get(name))
    }

    /// True if the nearest frame binding `name` is the global frame.
    pub fn resolves_to_global(&self, name: &str) -> bool {
        match self.frames.iter().rposition(|f| f.bindings.contains_key(name)) {
            Some(index) => index == 0,
            None => true,
        }
    }

    /// Declares `name`. Function-scoped kinds go to the nearest function or
    /// global frame, lexical kinds to the innermost frame.
    pub fn declare(&mut self, name: &str, kind: BindingKind, value: Wrapped) {
        let index = if kind.is_function_scoped() {
            self.frames
                .iter()
                .rposition(|f| f.kind != FrameKind::Block)
                .unwrap_or(0)
        } else {
            self.frames.len() - 1
        };

        self.frames[index]
            .bindings
            .insert(name.to_string(), Binding { kind, value });
    }

    /// Hoists a `var` without clobbering an existing binding in its frame.
    pub fn hoist(&mut self, name: &str) {
        let index = self
            .frames
            .iter()
            .rposition(|f| f.kind != FrameKind::Block)
            .unwrap_or(0);

        self.frames[index]
            .bindings
            .entry(name.to_string())
            .or_insert_with(|| Binding {
                kind: BindingKind::Var,
                value: Wrapped::undefined(),
            });
    }

    pub fn assign(&mut self, name: &str, value: Wrapped) -> AssignOutcome {
        let Some(binding) = self
            .frames
            .iter_mut()
            .rev()
            .find_map(|frame| frame.bindings.get_mut(name))
        else {
            return AssignOutcome::Unbound;
        };

        if binding.kind == BindingKind::Const {
            return AssignOutcome::Constant;
        }
        binding.value = value;
        AssignOutcome::Updated
    }

    pub fn assign_global(&mut self, name: &str, value: Wrapped) {
        let global = &mut self.frames[0].bindings;
        match global.get_mut(name) {
            Some(binding) => binding.value = value,
            None => {
                global.insert(
                    name.to_string(),
                    Binding {
                        kind: BindingKind::Implicit,
                        value,
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::javascript::value::Literal;

    fn number(binding: Option<&Binding>) -> Option<f64> {
        binding.and_then(|b| b.value.as_number())
    }

    #[test]
    fn innermost_binding_wins() {
        let mut scopes = ScopeStack::new();
        scopes.declare("x", BindingKind::Var, Wrapped::number(1.0));
        scopes.push(FrameKind::Function);
        scopes.declare("x", BindingKind::Let, Wrapped::number(2.0));

        assert_eq!(number(scopes.lookup("x")), Some(2.0));

        scopes.pop();
        assert_eq!(number(scopes.lookup("x")), Some(1.0));
    }

    #[test]
    fn var_escapes_block_but_let_does_not() {
        let mut scopes = ScopeStack::new();
        scopes.push(FrameKind::Function);
        scopes.push(FrameKind::Block);
        scopes.declare("a", BindingKind::Var, Wrapped::number(1.0));
        scopes.declare("b", BindingKind::Let, Wrapped::number(2.0));
        scopes.pop();

        assert!(scopes.lookup("a").is_some());
        assert!(scopes.lookup("b").is_none());
    }

    #[test]
    fn const_bindings_reject_writes() {
        let mut scopes = ScopeStack::new();
        scopes.declare("c", BindingKind::Const, Wrapped::number(1.0));

        assert_eq!(scopes.assign("c", Wrapped::number(5.0)), AssignOutcome::Constant);
        assert_eq!(number(scopes.lookup("c")), Some(1.0));
        assert_eq!(scopes.assign("missing", Wrapped::unknown()), AssignOutcome::Unbound);
    }

    #[test]
    fn hoisting_keeps_existing_binding() {
        let mut scopes = ScopeStack::new();
        scopes.declare("f", BindingKind::Function, Wrapped::function());
        scopes.hoist("f");
        scopes.hoist("g");

        assert!(matches!(
            scopes.lookup("f").map(|b| b.kind),
            Some(BindingKind::Function)
        ));
        assert_eq!(
            scopes.lookup("g").and_then(|b| b.value.as_literal().cloned()),
            Some(Literal::Undefined)
        );
    }

    #[test]
    fn global_frame_is_never_popped() {
        let mut scopes = ScopeStack::new();
        scopes.pop();
        scopes.assign_global("x", Wrapped::number(3.0));

        assert_eq!(scopes.depth(), 1);
        assert!(scopes.resolves_to_global("x"));
        assert_eq!(number(scopes.global_binding("x")), Some(3.0));
    }
}
