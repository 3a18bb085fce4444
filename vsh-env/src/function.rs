//! Storage for `function name () { ... }` definitions.
//!
//! A function body is parsed out of the transient per-line arena the CLI
//! driver resets before reading the next line (see `vsh-arena`), so it
//! cannot be kept by reference past that reset. This table owns a private
//! arena that is never reset for the lifetime of the shell, and
//! [`vsh_syntax::deep_copy`]s each definition into it once, at `define` time.

use std::cell::RefCell;
use std::collections::HashMap;

use vsh_arena::Arena;
use vsh_syntax::Node;

/// A pointer into `FunctionTable::arena` with its lifetime erased to
/// `'static`. Never exposed directly: [`FunctionTable::get`] re-binds it to
/// `&self`, which is sound because the arena it points into is a field of
/// the same `FunctionTable` and is never reset or dropped while `self` is
/// borrowed.
struct ErasedNode(*const Node<'static>);

#[derive(Default)]
pub struct FunctionTable {
    functions: RefCell<HashMap<String, ErasedNode>>,
    arena: Arena,
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTable")
            .field("names", &self.functions.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FunctionTable {
    pub fn new() -> Self {
        FunctionTable::default()
    }

    /// Defines (or redefines) a function. `body` may borrow from any arena;
    /// it is deep-copied into this table's own arena before being stored.
    pub fn define(&self, name: &str, body: &Node<'_>) {
        let copied: &Node<'_> = vsh_syntax::deep_copy(body, &self.arena);
        // SAFETY: `copied` was just allocated in `self.arena`, a field of
        // `self` that lives until `self` is dropped and is never reset.
        let erased = copied as *const Node<'_> as *const Node<'static>;
        self.functions
            .borrow_mut()
            .insert(name.to_string(), ErasedNode(erased));
    }

    pub fn get(&self, name: &str) -> Option<&Node<'_>> {
        self.functions
            .borrow()
            .get(name)
            .map(|p| unsafe { &*(p.0 as *const Node<'_>) })
    }

    /// Like [`get`](Self::get), but returns an owned copy whose borrow of
    /// `self` ends immediately — needed by a caller (the executor calling a
    /// function) that must run the body against `&mut Env` while `self` is
    /// itself a field of that `Env`. Sound under the same invariant as
    /// `ErasedNode`: the arena behind the copied references is never reset
    /// or dropped while the table lives.
    pub fn get_body(&self, name: &str) -> Option<Node<'static>> {
        self.functions.borrow().get(name).map(|p| unsafe { *p.0 })
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.functions.borrow().contains_key(name)
    }

    pub fn remove(&self, name: &str) {
        self.functions.borrow_mut().remove(name);
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defined_function_survives_source_arena_reset() {
        let table = FunctionTable::new();
        {
            let mut src = Arena::new();
            let node = src.alloc(Node::Command {
                argv: &*src.alloc_slice_fill_iter(["echo", "hi"].map(|s| src.alloc_str(s))),
                redirs: &[],
                assignments: &[],
            });
            table.define("greet", node);
            src.reset();
        }
        let body = table.get("greet").unwrap();
        match body {
            Node::Command { argv, .. } => assert_eq!(*argv, ["echo", "hi"]),
            _ => panic!("expected Command"),
        }
    }

    #[test]
    fn redefining_replaces_the_old_body() {
        let table = FunctionTable::new();
        let arena = Arena::new();
        let a = arena.alloc(Node::Return { status: Some("1") });
        let b = arena.alloc(Node::Return { status: Some("2") });
        table.define("f", a);
        table.define("f", b);
        assert!(matches!(table.get("f").unwrap(), Node::Return { status: Some(s) } if *s == "2"));
    }
}
