use std::collections::HashMap;

use crate::types::Type;

/// A single level of bindings.
pub type Scope = HashMap<Box<str>, Type>;

/// Stack of lexical scopes. Lookups resolve to the innermost binding.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    scopes: Vec<Scope>,
}

impl TypeContext {
    pub fn new() -> TypeContext {
        TypeContext::default()
    }

    /// Builds a context whose first element is the outermost scope.
    pub fn from_scopes(scopes: impl IntoIterator<Item = Scope>) -> TypeContext {
        TypeContext {
            scopes: scopes.into_iter().collect(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn pop_scope(&mut self) -> Option<Scope> {
        self.scopes.pop()
    }

    /// Binds `name` in the innermost scope, replacing any binding of the same
    /// name in that scope only.
    pub fn bind(&mut self, name: impl Into<Box<str>>, ty: Type) {
        if self.scopes.is_empty() {
            self.push_scope();
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), ty);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Whether the innermost scope binds `name`.
    pub fn is_bound_here(&self, name: &str) -> bool {
        self.scopes
            .last()
            .is_some_and(|scope| scope.contains_key(name))
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scope<const N: usize>(bindings: [(&str, Type); N]) -> Scope {
        bindings
            .into_iter()
            .map(|(name, ty)| (Box::from(name), ty))
            .collect()
    }

    #[test]
    fn innermost_binding_wins() {
        let mut ctx = TypeContext::from_scopes([
            scope([]),
            scope([("other", Type::Float)]),
            scope([("some", Type::Int)]),
            scope([]),
        ]);
        assert_eq!(ctx.lookup("some"), Some(&Type::Int));
        assert_eq!(ctx.lookup("other"), Some(&Type::Float));

        ctx.push_scope();
        ctx.bind("some", Type::Str);
        assert_eq!(ctx.lookup("some"), Some(&Type::Str));

        ctx.pop_scope();
        assert_eq!(ctx.lookup("some"), Some(&Type::Int));
        assert_eq!(ctx.lookup("missing"), None);
    }

    #[test]
    fn rebinding_only_touches_innermost_scope() {
        let mut ctx = TypeContext::from_scopes([scope([("x", Type::Int)])]);
        ctx.push_scope();
        ctx.bind("x", Type::Bool);
        ctx.bind("x", Type::Char);
        assert!(ctx.is_bound_here("x"));
        assert_eq!(ctx.lookup("x"), Some(&Type::Char));

        ctx.pop_scope();
        assert_eq!(ctx.lookup("x"), Some(&Type::Int));
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn bind_on_empty_context_opens_a_scope() {
        let mut ctx = TypeContext::new();
        ctx.bind("x", Type::Int);
        assert_eq!(ctx.depth(), 1);
        assert_eq!(ctx.lookup("x"), Some(&Type::Int));
    }
}
