use std::fmt;

use serde::Serialize;

use crate::ast::Exp;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Syntax,
    Compile,
    Info,
    Warning,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "syntax"),
            Self::Compile => write!(f, "compile"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Location of the offending source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRef {
    pub text: String,
    pub s: usize,
    pub e: usize,
    pub origin: Option<String>,
    pub parent: Option<Box<SourceRef>>,
}

/// A single diagnostic, collected without aborting compilation.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub kind: Kind,
    pub who: &'static str,
    pub message: String,
    pub ast: Option<Exp>,
    pub sourceref: Option<SourceRef>,
}

impl Violation {
    pub fn new<S: Into<String>>(kind: Kind, who: &'static str, message: S) -> Self {
        Violation {
            kind,
            who,
            message: message.into(),
            ast: None,
            sourceref: None,
        }
    }

    pub fn with_ast(mut self, exp: &Exp) -> Self {
        self.ast = Some(exp.clone());
        self
    }

    pub fn with_sourceref(mut self, sourceref: SourceRef) -> Self {
        self.sourceref = Some(sourceref);
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.who, self.message)
    }
}

/// Ordered sink of diagnostics; entries appear in compilation order.
#[derive(Debug, Default)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn push(&mut self, violation: Violation) {
        self.0.push(violation);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether compilation completed without errors; informational and
    /// warning entries don't count.
    pub fn is_clean(&self) -> bool {
        !self
            .0
            .iter()
            .any(|v| matches!(v.kind, Kind::Syntax | Kind::Compile))
    }
}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink() {
        let mut sink = Violations::default();
        assert!(sink.is_clean());

        sink.push(Violation::new(Kind::Info, "compiler", "rebinding x"));
        assert!(sink.is_clean());

        sink.push(Violation::new(Kind::Compile, "compiler", "unbound identifier: y"));
        assert!(!sink.is_clean());
        assert_eq!(sink.len(), 2);

        let rendered: Vec<_> = sink.iter().map(|v| v.to_string()).collect();
        assert_eq!(rendered[1], "compile [compiler]: unbound identifier: y");
    }
}
