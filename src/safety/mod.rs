//! Static safety checks over generated Python before anything runs.
//!
//! The walk is purely syntactic: no alias tracking, no data-flow analysis.
//! Calls reached through renamed imports, stored references, or dynamically
//! constructed attribute names are out of scope for this checker.

use std::collections::BTreeSet;

use rustpython_parser::{ast, Parse};
use thiserror::Error;

/// Why a generated script was refused admission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("generated code has a syntax error: {0}")]
    Syntax(String),
    #[error("import of module '{0}' is not allowed")]
    Import(String),
    #[error("call to '{0}' is not allowed")]
    Call(String),
}

/// Immutable admission policy for generated scripts.
///
/// Constructed once per run and shared read-only; `Default` mirrors what the
/// analysis prompts promise the model it may use.
#[derive(Debug, Clone)]
pub struct CodePolicy {
    /// Modules admissible via `import m` / `from m import ...`.
    pub allowed_modules: BTreeSet<String>,
    /// Project-internal helper modules, admissible in `from m import ...` form.
    pub internal_modules: BTreeSet<String>,
    /// Call targets refused at any call site, bare or attribute.
    pub denied_calls: BTreeSet<String>,
    /// Module-name prefixes refused regardless of the allow list.
    pub denied_prefixes: Vec<String>,
}

impl Default for CodePolicy {
    fn default() -> Self {
        let allowed = [
            "pandas",
            "matplotlib",
            "matplotlib.pyplot",
            "seaborn",
            "numpy",
            "os",
            "pathlib",
            "datetime",
            "dataset_io",
        ];
        let internal = ["dataset_io"];
        let denied_calls = ["exec", "eval", "compile", "open", "system", "popen"];
        let denied_prefixes = [
            "subprocess",
            "sys",
            "shlex",
            "socket",
            "requests",
            "http",
            "urllib",
        ];
        Self {
            allowed_modules: allowed.iter().map(|s| s.to_string()).collect(),
            internal_modules: internal.iter().map(|s| s.to_string()).collect(),
            denied_calls: denied_calls.iter().map(|s| s.to_string()).collect(),
            denied_prefixes: denied_prefixes.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CodePolicy {
    fn is_deny_prefixed(&self, module: &str) -> bool {
        self.denied_prefixes.iter().any(|p| module.starts_with(p.as_str()))
    }

    fn allowed_top_level(&self, module: &str) -> bool {
        let top = module.split('.').next().unwrap_or("");
        self.allowed_modules
            .iter()
            .any(|m| m.split('.').next() == Some(top))
    }

    fn check_import(&self, module: &str) -> Result<(), Violation> {
        if self.is_deny_prefixed(module) || !self.allowed_modules.contains(module) {
            return Err(Violation::Import(module.to_string()));
        }
        Ok(())
    }

    fn check_import_from(&self, module: &str) -> Result<(), Violation> {
        // Deny prefixes win even over allow-listed names.
        if self.is_deny_prefixed(module) {
            return Err(Violation::Import(module.to_string()));
        }
        if self.allowed_modules.contains(module)
            || self.internal_modules.contains(module)
            || self.allowed_top_level(module)
        {
            return Ok(());
        }
        Err(Violation::Import(module.to_string()))
    }

    fn check_call_target(&self, name: &str) -> Result<(), Violation> {
        if self.denied_calls.contains(name) {
            return Err(Violation::Call(name.to_string()));
        }
        Ok(())
    }
}

/// Parse `source` and walk every statement and expression, refusing the
/// first disallowed import or call. Unparsable input is refused outright;
/// no partial checking is attempted.
pub fn validate(source: &str, policy: &CodePolicy) -> Result<(), Violation> {
    let suite = ast::Suite::parse(source, "<generated>")
        .map_err(|e| Violation::Syntax(e.to_string()))?;
    walk_body(&suite, policy)
}

fn walk_body(body: &[ast::Stmt], policy: &CodePolicy) -> Result<(), Violation> {
    for stmt in body {
        walk_stmt(stmt, policy)?;
    }
    Ok(())
}

fn walk_stmt(stmt: &ast::Stmt, policy: &CodePolicy) -> Result<(), Violation> {
    use ast::Stmt;
    match stmt {
        Stmt::Import(s) => {
            for alias in &s.names {
                policy.check_import(alias.name.as_str())?;
            }
        }
        Stmt::ImportFrom(s) => {
            let module = s.module.as_ref().map(|m| m.as_str()).unwrap_or("");
            policy.check_import_from(module)?;
        }
        Stmt::FunctionDef(s) => {
            walk_arguments(&s.args, policy)?;
            for d in &s.decorator_list {
                walk_expr(d, policy)?;
            }
            if let Some(r) = &s.returns {
                walk_expr(r, policy)?;
            }
            walk_body(&s.body, policy)?;
        }
        Stmt::AsyncFunctionDef(s) => {
            walk_arguments(&s.args, policy)?;
            for d in &s.decorator_list {
                walk_expr(d, policy)?;
            }
            if let Some(r) = &s.returns {
                walk_expr(r, policy)?;
            }
            walk_body(&s.body, policy)?;
        }
        Stmt::ClassDef(s) => {
            for b in &s.bases {
                walk_expr(b, policy)?;
            }
            for k in &s.keywords {
                walk_expr(&k.value, policy)?;
            }
            for d in &s.decorator_list {
                walk_expr(d, policy)?;
            }
            walk_body(&s.body, policy)?;
        }
        Stmt::Return(s) => {
            if let Some(v) = &s.value {
                walk_expr(v, policy)?;
            }
        }
        Stmt::Delete(s) => {
            for t in &s.targets {
                walk_expr(t, policy)?;
            }
        }
        Stmt::Assign(s) => {
            for t in &s.targets {
                walk_expr(t, policy)?;
            }
            walk_expr(&s.value, policy)?;
        }
        Stmt::AugAssign(s) => {
            walk_expr(&s.target, policy)?;
            walk_expr(&s.value, policy)?;
        }
        Stmt::AnnAssign(s) => {
            walk_expr(&s.target, policy)?;
            walk_expr(&s.annotation, policy)?;
            if let Some(v) = &s.value {
                walk_expr(v, policy)?;
            }
        }
        Stmt::For(s) => {
            walk_expr(&s.target, policy)?;
            walk_expr(&s.iter, policy)?;
            walk_body(&s.body, policy)?;
            walk_body(&s.orelse, policy)?;
        }
        Stmt::AsyncFor(s) => {
            walk_expr(&s.target, policy)?;
            walk_expr(&s.iter, policy)?;
            walk_body(&s.body, policy)?;
            walk_body(&s.orelse, policy)?;
        }
        Stmt::While(s) => {
            walk_expr(&s.test, policy)?;
            walk_body(&s.body, policy)?;
            walk_body(&s.orelse, policy)?;
        }
        Stmt::If(s) => {
            walk_expr(&s.test, policy)?;
            walk_body(&s.body, policy)?;
            walk_body(&s.orelse, policy)?;
        }
        Stmt::With(s) => {
            for item in &s.items {
                walk_expr(&item.context_expr, policy)?;
                if let Some(v) = &item.optional_vars {
                    walk_expr(v, policy)?;
                }
            }
            walk_body(&s.body, policy)?;
        }
        Stmt::AsyncWith(s) => {
            for item in &s.items {
                walk_expr(&item.context_expr, policy)?;
                if let Some(v) = &item.optional_vars {
                    walk_expr(v, policy)?;
                }
            }
            walk_body(&s.body, policy)?;
        }
        Stmt::Match(s) => {
            walk_expr(&s.subject, policy)?;
            for case in &s.cases {
                walk_pattern(&case.pattern, policy)?;
                if let Some(g) = &case.guard {
                    walk_expr(g, policy)?;
                }
                walk_body(&case.body, policy)?;
            }
        }
        Stmt::Raise(s) => {
            if let Some(e) = &s.exc {
                walk_expr(e, policy)?;
            }
            if let Some(c) = &s.cause {
                walk_expr(c, policy)?;
            }
        }
        Stmt::Try(s) => {
            walk_body(&s.body, policy)?;
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(t) = &h.type_ {
                    walk_expr(t, policy)?;
                }
                walk_body(&h.body, policy)?;
            }
            walk_body(&s.orelse, policy)?;
            walk_body(&s.finalbody, policy)?;
        }
        Stmt::TryStar(s) => {
            walk_body(&s.body, policy)?;
            for handler in &s.handlers {
                let ast::ExceptHandler::ExceptHandler(h) = handler;
                if let Some(t) = &h.type_ {
                    walk_expr(t, policy)?;
                }
                walk_body(&h.body, policy)?;
            }
            walk_body(&s.orelse, policy)?;
            walk_body(&s.finalbody, policy)?;
        }
        Stmt::Assert(s) => {
            walk_expr(&s.test, policy)?;
            if let Some(m) = &s.msg {
                walk_expr(m, policy)?;
            }
        }
        Stmt::Expr(s) => walk_expr(&s.value, policy)?,
        Stmt::Global(_) | Stmt::Nonlocal(_) | Stmt::Pass(_) | Stmt::Break(_)
        | Stmt::Continue(_) => {}
        Stmt::TypeAlias(s) => {
            walk_expr(&s.name, policy)?;
            walk_expr(&s.value, policy)?;
        }
    }
    Ok(())
}

fn walk_expr(expr: &ast::Expr, policy: &CodePolicy) -> Result<(), Violation> {
    use ast::Expr;
    match expr {
        Expr::Call(c) => {
            // The deny list fires on the call target's trailing name, whether
            // written `open(...)` or `anything.system(...)`.
            match c.func.as_ref() {
                Expr::Name(n) => policy.check_call_target(n.id.as_str())?,
                Expr::Attribute(a) => policy.check_call_target(a.attr.as_str())?,
                _ => {}
            }
            walk_expr(&c.func, policy)?;
            for a in &c.args {
                walk_expr(a, policy)?;
            }
            for k in &c.keywords {
                walk_expr(&k.value, policy)?;
            }
        }
        Expr::BoolOp(e) => {
            for v in &e.values {
                walk_expr(v, policy)?;
            }
        }
        Expr::NamedExpr(e) => {
            walk_expr(&e.target, policy)?;
            walk_expr(&e.value, policy)?;
        }
        Expr::BinOp(e) => {
            walk_expr(&e.left, policy)?;
            walk_expr(&e.right, policy)?;
        }
        Expr::UnaryOp(e) => walk_expr(&e.operand, policy)?,
        Expr::Lambda(e) => {
            walk_arguments(&e.args, policy)?;
            walk_expr(&e.body, policy)?;
        }
        Expr::IfExp(e) => {
            walk_expr(&e.test, policy)?;
            walk_expr(&e.body, policy)?;
            walk_expr(&e.orelse, policy)?;
        }
        Expr::Dict(e) => {
            for k in e.keys.iter().flatten() {
                walk_expr(k, policy)?;
            }
            for v in &e.values {
                walk_expr(v, policy)?;
            }
        }
        Expr::Set(e) => {
            for v in &e.elts {
                walk_expr(v, policy)?;
            }
        }
        Expr::ListComp(e) => {
            walk_expr(&e.elt, policy)?;
            walk_comprehensions(&e.generators, policy)?;
        }
        Expr::SetComp(e) => {
            walk_expr(&e.elt, policy)?;
            walk_comprehensions(&e.generators, policy)?;
        }
        Expr::DictComp(e) => {
            walk_expr(&e.key, policy)?;
            walk_expr(&e.value, policy)?;
            walk_comprehensions(&e.generators, policy)?;
        }
        Expr::GeneratorExp(e) => {
            walk_expr(&e.elt, policy)?;
            walk_comprehensions(&e.generators, policy)?;
        }
        Expr::Await(e) => walk_expr(&e.value, policy)?,
        Expr::Yield(e) => {
            if let Some(v) = &e.value {
                walk_expr(v, policy)?;
            }
        }
        Expr::YieldFrom(e) => walk_expr(&e.value, policy)?,
        Expr::Compare(e) => {
            walk_expr(&e.left, policy)?;
            for c in &e.comparators {
                walk_expr(c, policy)?;
            }
        }
        Expr::FormattedValue(e) => {
            walk_expr(&e.value, policy)?;
            if let Some(f) = &e.format_spec {
                walk_expr(f, policy)?;
            }
        }
        Expr::JoinedStr(e) => {
            for v in &e.values {
                walk_expr(v, policy)?;
            }
        }
        Expr::Attribute(e) => walk_expr(&e.value, policy)?,
        Expr::Subscript(e) => {
            walk_expr(&e.value, policy)?;
            walk_expr(&e.slice, policy)?;
        }
        Expr::Starred(e) => walk_expr(&e.value, policy)?,
        Expr::List(e) => {
            for v in &e.elts {
                walk_expr(v, policy)?;
            }
        }
        Expr::Tuple(e) => {
            for v in &e.elts {
                walk_expr(v, policy)?;
            }
        }
        Expr::Slice(e) => {
            if let Some(l) = &e.lower {
                walk_expr(l, policy)?;
            }
            if let Some(u) = &e.upper {
                walk_expr(u, policy)?;
            }
            if let Some(s) = &e.step {
                walk_expr(s, policy)?;
            }
        }
        Expr::Constant(_) | Expr::Name(_) => {}
    }
    Ok(())
}

fn walk_arguments(args: &ast::Arguments, policy: &CodePolicy) -> Result<(), Violation> {
    for arg in args.posonlyargs.iter().chain(&args.args).chain(&args.kwonlyargs) {
        if let Some(a) = &arg.def.annotation {
            walk_expr(a, policy)?;
        }
        if let Some(d) = &arg.default {
            walk_expr(d, policy)?;
        }
    }
    for arg in args.vararg.iter().chain(&args.kwarg) {
        if let Some(a) = &arg.annotation {
            walk_expr(a, policy)?;
        }
    }
    Ok(())
}

fn walk_comprehensions(
    generators: &[ast::Comprehension],
    policy: &CodePolicy,
) -> Result<(), Violation> {
    for comp in generators {
        walk_expr(&comp.target, policy)?;
        walk_expr(&comp.iter, policy)?;
        for test in &comp.ifs {
            walk_expr(test, policy)?;
        }
    }
    Ok(())
}

fn walk_pattern(pattern: &ast::Pattern, policy: &CodePolicy) -> Result<(), Violation> {
    use ast::Pattern;
    match pattern {
        Pattern::MatchValue(p) => walk_expr(&p.value, policy)?,
        Pattern::MatchSingleton(_) => {}
        Pattern::MatchSequence(p) => {
            for sub in &p.patterns {
                walk_pattern(sub, policy)?;
            }
        }
        Pattern::MatchMapping(p) => {
            for k in &p.keys {
                walk_expr(k, policy)?;
            }
            for sub in &p.patterns {
                walk_pattern(sub, policy)?;
            }
        }
        Pattern::MatchClass(p) => {
            walk_expr(&p.cls, policy)?;
            for sub in p.patterns.iter().chain(&p.kwd_patterns) {
                walk_pattern(sub, policy)?;
            }
        }
        Pattern::MatchStar(_) => {}
        Pattern::MatchAs(p) => {
            if let Some(sub) = &p.pattern {
                walk_pattern(sub, policy)?;
            }
        }
        Pattern::MatchOr(p) => {
            for sub in &p.patterns {
                walk_pattern(sub, policy)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> Result<(), Violation> {
        validate(source, &CodePolicy::default())
    }

    #[test]
    fn test_syntax_error_rejected() {
        let err = check("def f(:").unwrap_err();
        assert!(matches!(err, Violation::Syntax(_)), "got {:?}", err);
    }

    #[test]
    fn test_allowed_analysis_script() {
        let src = "import pandas\nimport matplotlib.pyplot\nfrom dataset_io import load_records\nANALYTICS_RESULT = {'metrics': {}, 'plots': []}\n";
        assert!(check(src).is_ok());
    }

    #[test]
    fn test_unknown_module_rejected() {
        let err = check("import tkinter").unwrap_err();
        assert_eq!(err, Violation::Import("tkinter".into()));
    }

    #[test]
    fn test_deny_prefixed_modules_rejected() {
        for module in ["subprocess", "socket", "requests", "http", "urllib", "sys"] {
            let err = check(&format!("import {}", module)).unwrap_err();
            assert_eq!(err, Violation::Import(module.into()), "module {}", module);
        }
    }

    #[test]
    fn test_deny_prefix_wins_in_from_import() {
        let err = check("from subprocess import run").unwrap_err();
        assert_eq!(err, Violation::Import("subprocess".into()));
    }

    #[test]
    fn test_from_import_submodule_of_allowed() {
        assert!(check("from matplotlib import pyplot").is_ok());
        assert!(check("from pandas.api import types").is_ok());
    }

    #[test]
    fn test_attribute_call_on_allowed_module_rejected() {
        // `os` is importable, but the call-name deny list still fires.
        let err = check("import os\nos.system('rm -rf /')\n").unwrap_err();
        assert_eq!(err, Violation::Call("system".into()));
    }

    #[test]
    fn test_bare_dangerous_calls_rejected() {
        for call in ["exec", "eval", "compile", "open"] {
            let err = check(&format!("{}('x')", call)).unwrap_err();
            assert_eq!(err, Violation::Call(call.into()), "call {}", call);
        }
    }

    #[test]
    fn test_call_inside_function_body_detected() {
        let src = "def helper():\n    return eval('1 + 1')\n";
        let err = check(src).unwrap_err();
        assert_eq!(err, Violation::Call("eval".into()));
    }

    #[test]
    fn test_call_nested_in_expression_detected() {
        let src = "values = [open(p) for p in paths]\n";
        let err = check(src).unwrap_err();
        assert_eq!(err, Violation::Call("open".into()));
    }

    #[test]
    fn test_first_violation_wins() {
        let src = "import socket\nimport subprocess\n";
        let err = check(src).unwrap_err();
        assert_eq!(err, Violation::Import("socket".into()));
    }

    #[test]
    fn test_indirect_access_not_detected() {
        // Documented limitation: the walk is syntactic only.
        let src = "import os\nf = getattr(os, 'sys' + 'tem')\nf('id')\n";
        assert!(check(src).is_ok());
    }

    #[test]
    fn test_alternate_policy() {
        let mut policy = CodePolicy::default();
        policy.allowed_modules.insert("tkinter".into());
        assert!(validate("import tkinter", &policy).is_ok());
        assert!(validate("import subprocess", &policy).is_err());
    }
}
