//! Variable Environment
//!
//! One global scope plus a stack of local scopes, one per active function
//! call. Lookups search the innermost local scope first.

use indexmap::IndexMap;

use crate::interpreter::types::Value;
use crate::ir::AssignScope;

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub value: Value,
    pub exported: bool,
    pub readonly: bool,
}

impl Variable {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            exported: false,
            readonly: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Environment {
    globals: IndexMap<String, Variable>,
    locals: Vec<IndexMap<String, Variable>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.locals.push(IndexMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.locals.pop();
    }

    pub fn in_function(&self) -> bool {
        !self.locals.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
    }

    /// The scope an assignment with `scope` writes to. Local assignments
    /// outside any function write the global scope.
    fn scope_mut(&mut self, scope: AssignScope) -> &mut IndexMap<String, Variable> {
        match (scope, self.locals.last_mut()) {
            (AssignScope::Local, Some(innermost)) => innermost,
            _ => &mut self.globals,
        }
    }

    /// The variable an assignment with `scope` would overwrite.
    pub fn target(&self, name: &str, scope: AssignScope) -> Option<&Variable> {
        match (scope, self.locals.last()) {
            (AssignScope::Local, Some(innermost)) => innermost.get(name),
            _ => self.globals.get(name),
        }
    }

    /// Set `name` in the chosen scope, keeping existing attributes.
    pub fn set(&mut self, name: &str, value: Value, scope: AssignScope) -> &mut Variable {
        let vars = self.scope_mut(scope);
        let var = vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(Value::Str(String::new())));
        var.value = value;
        var
    }

    /// Declare `name` in the current scope. Returns false when it is
    /// already declared there.
    pub fn declare(&mut self, name: &str, var: Variable) -> bool {
        let vars = self.scope_mut(AssignScope::Local);
        if vars.contains_key(name) {
            return false;
        }
        vars.insert(name.to_string(), var);
        true
    }

    /// Exported variables visible from the current scope, in first
    /// definition order.
    pub fn exported(&self) -> Vec<(String, String)> {
        let mut visible: IndexMap<&str, &Variable> = IndexMap::new();
        for (name, var) in self.globals.iter().chain(self.locals.iter().flatten()) {
            visible.insert(name.as_str(), var);
        }
        visible
            .into_iter()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| (name.to_string(), var.value.to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.locals.iter().map(|scope| scope.len()).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
