use indexmap::IndexMap;

use crate::ast::Ref;
use crate::builtins;
use crate::pattern::{Pattern, PrimFn};
use crate::{Error, Result};

/// The value bound to an identifier.
#[derive(Debug, Clone)]
pub enum Binding {
    Pattern(Pattern),
    String(String),
    Hashtag(String),
    Function(PrimFn),
    /// Forward placeholder installed in the first block-compilation pass;
    /// observable only while its own block is compiling.
    Novalue {
        exported: bool,
        ast: Option<crate::ast::Exp>,
    },
}

impl Binding {
    /// Kind name used in type-mismatch diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pattern(_) => "pattern",
            Self::String(_) => "string",
            Self::Hashtag(_) => "hashtag",
            Self::Function(_) => "function",
            Self::Novalue { .. } => "unbound",
        }
    }

    pub(crate) fn exported(&self) -> bool {
        match self {
            Self::Pattern(p) => p.exported,
            Self::Novalue { exported, .. } => *exported,
            _ => true,
        }
    }
}

/// A nested, lexically scoped symbol table. Unqualified lookups walk the
/// frame stack innermost outward; package-qualified lookups resolve against
/// imported package tables and only see exported bindings.
#[derive(Debug, Default)]
pub struct Env {
    frames: Vec<IndexMap<String, Binding>>,
    imports: IndexMap<String, IndexMap<String, Binding>>,
}

impl Env {
    pub fn new() -> Self {
        Env {
            frames: vec![IndexMap::new()],
            imports: IndexMap::new(),
        }
    }

    /// An environment whose base frame carries the pre-installed primitive
    /// functions, with a fresh working frame on top.
    pub fn standard() -> Self {
        let mut env = Self::new();
        for f in builtins::all() {
            env.bind(f.name, Binding::Function(f.clone()));
        }
        env.push();
        env
    }

    /// Introduce a new innermost frame.
    pub fn push(&mut self) {
        self.frames.push(IndexMap::new());
    }

    /// Drop the innermost frame, returning its bindings.
    pub fn pop(&mut self) -> IndexMap<String, Binding> {
        match self.frames.len() {
            // the base frame stays
            1 => IndexMap::new(),
            _ => self.frames.pop().unwrap_or_default(),
        }
    }

    /// Assign in the innermost frame, returning any binding it replaces.
    pub fn bind<S: Into<String>>(&mut self, name: S, binding: Binding) -> Option<Binding> {
        match self.frames.last_mut() {
            Some(frame) => frame.insert(name.into(), binding),
            None => None,
        }
    }

    pub fn lookup(&self, id: &Ref) -> Option<&Binding> {
        match &id.package {
            Some(package) => self
                .imports
                .get(package)?
                .get(&id.local)
                .filter(|b| b.exported()),
            None => self.frames.iter().rev().find_map(|f| f.get(&id.local)),
        }
    }

    /// Make a loaded package's bindings visible under `prefix`.
    pub fn import<S: Into<String>>(&mut self, prefix: S, bindings: IndexMap<String, Binding>) {
        self.imports.insert(prefix.into(), bindings);
    }
}

/// A package produced by block compilation.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: Option<String>,
    pub bindings: IndexMap<String, Binding>,
}

/// Engine-wide table of loaded packages, keyed by importpath. Each entry is
/// written at most once.
#[derive(Debug, Default)]
pub struct Packages(IndexMap<String, Package>);

impl Packages {
    pub fn register(&mut self, importpath: &str, package: Package) -> Result<()> {
        if self.0.contains_key(importpath) {
            return Err(Error::Internal(format!(
                "package already registered: {importpath}"
            )));
        }
        self.0.insert(importpath.to_string(), package);
        Ok(())
    }

    pub fn get(&self, importpath: &str) -> Option<&Package> {
        self.0.get(importpath)
    }
}

#[cfg(test)]
mod tests {
    use crate::peg::Peg;

    use super::*;

    fn pattern(peg: Peg, exported: bool) -> Binding {
        let mut pat = Pattern::new(peg);
        pat.exported = exported;
        Binding::Pattern(pat)
    }

    #[test]
    fn test_scoped_lookup() {
        let mut env = Env::new();
        env.bind("a", pattern(Peg::lit("outer"), true));
        env.push();
        assert!(env.lookup(&Ref::new("a")).is_some());

        // inner frames shadow outer ones
        env.bind("a", pattern(Peg::lit("inner"), true));
        match env.lookup(&Ref::new("a")) {
            Some(Binding::Pattern(p)) => assert_eq!(p.peg, Peg::lit("inner")),
            b => panic!("unexpected binding: {b:?}"),
        }

        env.pop();
        match env.lookup(&Ref::new("a")) {
            Some(Binding::Pattern(p)) => assert_eq!(p.peg, Peg::lit("outer")),
            b => panic!("unexpected binding: {b:?}"),
        }
    }

    #[test]
    fn test_qualified_lookup() {
        let mut env = Env::new();
        let mut bindings = IndexMap::new();
        bindings.insert("pub".to_string(), pattern(Peg::lit("p"), true));
        bindings.insert("priv".to_string(), pattern(Peg::lit("q"), false));
        env.import("pkg", bindings);

        assert!(env.lookup(&Ref::qualified("pkg", "pub")).is_some());
        // local bindings are invisible from outside
        assert!(env.lookup(&Ref::qualified("pkg", "priv")).is_none());
        assert!(env.lookup(&Ref::qualified("other", "pub")).is_none());
        assert!(env.lookup(&Ref::new("pub")).is_none());
    }

    #[test]
    fn test_standard_env() {
        let env = Env::standard();
        match env.lookup(&Ref::new("find")) {
            Some(Binding::Function(f)) => assert_eq!(f.name, "find"),
            b => panic!("unexpected binding: {b:?}"),
        }
    }

    #[test]
    fn test_packages_register_once() {
        let mut packages = Packages::default();
        let pkg = Package {
            name: Some("net".to_string()),
            bindings: IndexMap::new(),
        };
        packages.register("net", pkg.clone()).unwrap();
        assert!(packages.get("net").is_some());
        assert!(packages.register("net", pkg).is_err());
    }
}
