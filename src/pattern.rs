use std::fmt;

use crate::ast::Exp;
use crate::peg::Peg;
use crate::{Error, Result};

/// A compiled pattern: the executable expression plus binding metadata.
///
/// Patterns are immutable once bound; the mutating helpers below are only
/// used while a binding is being assembled.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: Option<String>,
    pub peg: Peg,
    /// The expression without its outer capture, present exactly when `peg`
    /// is a capture applied at a binding site.
    pub uncap: Option<Peg>,
    pub alias: bool,
    pub exported: bool,
    /// Expression the pattern was compiled from.
    pub ast: Option<Exp>,
}

impl Pattern {
    pub(crate) fn new(peg: Peg) -> Self {
        Pattern {
            name: None,
            peg,
            uncap: None,
            alias: false,
            exported: true,
            ast: None,
        }
    }

    /// Label the pattern at a binding or grammar-rule site. A previously
    /// applied label is peeled off first, so `p1 = p2` captures as `p1`.
    /// Grammars carry the capture applied at assembly time and are left
    /// alone.
    pub(crate) fn wrap(&mut self, label: &str) {
        if let Some(uncap) = &self.uncap {
            self.peg = Peg::capture(label, uncap.clone());
        } else if !self.peg.is_grammar() {
            let inner = self.peg.clone();
            self.uncap = Some(inner.clone());
            self.peg = Peg::capture(label, inner);
        }
    }

    /// Wrap with the anonymous `*` label for ad-hoc top-level matching;
    /// applies to grammars as well.
    pub(crate) fn wrap_anonymous(&mut self) {
        let inner = self.peg.clone();
        self.peg = Peg::capture("*", inner);
    }
}

/// The result of compiling a single expression.
#[derive(Debug, Clone)]
pub enum Value {
    Pattern(Pattern),
    String(String),
    Hashtag(String),
}

impl Value {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Pattern(_) => "pattern",
            Self::String(_) => "string",
            Self::Hashtag(_) => "hashtag",
        }
    }
}

/// A compiler-provided function usable through application syntax.
#[derive(Debug, Clone)]
pub struct PrimFn {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub(crate) func: fn(&[Value]) -> std::result::Result<Pattern, String>,
}

impl PrimFn {
    pub(crate) fn apply(&self, args: &[Value]) -> Result<Pattern> {
        if args.len() < self.min_args || args.len() > self.max_args {
            return Err(Error::Function(format!(
                "{} takes {}..{} arguments, given {}",
                self.name,
                self.min_args,
                self.max_args,
                args.len()
            )));
        }
        (self.func)(args).map_err(Error::Function)
    }
}

impl fmt::Display for PrimFn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_fresh() {
        let mut pat = Pattern::new(Peg::lit("x"));
        pat.wrap("p");
        assert_eq!(pat.peg, Peg::capture("p", Peg::lit("x")));
        assert_eq!(pat.uncap, Some(Peg::lit("x")));
    }

    #[test]
    fn test_wrap_relabels() {
        // p1 = p2 captures as p1, not p2
        let mut pat = Pattern::new(Peg::lit("x"));
        pat.wrap("p2");
        pat.wrap("p1");
        assert_eq!(pat.peg, Peg::capture("p1", Peg::lit("x")));
        assert_eq!(pat.uncap, Some(Peg::lit("x")));
    }

    #[test]
    fn test_wrap_skips_grammars() {
        let rules = indexmap::indexmap! {
            "s".to_string() => Peg::capture("s", Peg::lit("x")),
        };
        let g = Peg::grammar(rules, "s").unwrap();
        let mut pat = Pattern::new(g.clone());
        pat.wrap("other");
        assert_eq!(pat.peg, g);
        assert_eq!(pat.uncap, None);

        pat.wrap_anonymous();
        assert_eq!(pat.peg, Peg::capture("*", g));
    }
}
