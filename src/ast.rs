use std::fmt;

use itertools::Itertools;
use serde::Serialize;

/// A parsed top-level block: optional package declaration, import markers,
/// and bindings in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub package: Option<String>,
    pub imports: Vec<Import>,
    pub stmts: Vec<Binding>,
    /// Original source text, kept for source references in diagnostics.
    #[serde(skip)]
    pub source: Option<String>,
}

/// Import declarations are satisfied by the loader before compilation; the
/// compiler only skips over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Import {
    pub importpath: String,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub id: Ref,
    pub exp: Exp,
    pub alias: bool,
    pub local: bool,
    /// Byte span of the statement in the enclosing source, when known.
    pub span: Option<(usize, usize)>,
}

/// A possibly package-qualified identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Ref {
    pub package: Option<String>,
    pub local: String,
}

impl Ref {
    pub fn new<S: Into<String>>(local: S) -> Self {
        Ref {
            package: None,
            local: local.into(),
        }
    }

    pub fn qualified<P, S>(package: P, local: S) -> Self
    where
        P: Into<String>,
        S: Into<String>,
    {
        Ref {
            package: Some(package.into()),
            local: local.into(),
        }
    }
}

impl fmt::Display for Ref {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.package {
            Some(p) => write!(f, "{p}.{}", self.local),
            None => write!(f, "{}", self.local),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum PredKind {
    LookAhead,
    LookBehind,
    Negation,
}

impl fmt::Display for PredKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::LookAhead => write!(f, ">"),
            Self::LookBehind => write!(f, "<"),
            Self::Negation => write!(f, "!"),
        }
    }
}

/// Expression nodes as handed over by the parser and macro expander.
///
/// Literal and charset payloads hold the raw source text with escape
/// sequences intact; decoding happens during compilation so that escape
/// errors surface as compile violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Exp {
    Literal(String),
    RplString(String),
    Hashtag(String),
    Ref(Ref),
    Sequence(Vec<Exp>),
    Choice(Vec<Exp>),
    Predicate {
        kind: PredKind,
        exp: Box<Exp>,
    },
    CsRange {
        first: String,
        last: String,
        complement: bool,
    },
    CsList {
        chars: Vec<String>,
        complement: bool,
    },
    CsNamed {
        name: String,
        complement: bool,
    },
    CsExp {
        cexp: Box<Exp>,
        complement: bool,
    },
    CsUnion {
        cexps: Vec<Exp>,
    },
    CsIntersection {
        cexps: Vec<Exp>,
    },
    CsDifference {
        first: Box<Exp>,
        second: Box<Exp>,
    },
    AtLeast {
        min: u32,
        exp: Box<Exp>,
    },
    AtMost {
        max: u32,
        exp: Box<Exp>,
    },
    Grammar {
        rules: Vec<Binding>,
    },
    Application {
        id: Ref,
        args: Vec<Exp>,
    },
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let neg = |c: bool| if c { "^" } else { "" };
        match self {
            Self::Literal(s) | Self::RplString(s) => write!(f, "\"{s}\""),
            Self::Hashtag(s) => write!(f, "#{s}"),
            Self::Ref(r) => write!(f, "{r}"),
            Self::Sequence(exps) => {
                write!(f, "{{{}}}", exps.iter().map(|e| e.to_string()).join(" "))
            }
            Self::Choice(exps) => {
                write!(f, "{{{}}}", exps.iter().map(|e| e.to_string()).join(" / "))
            }
            Self::Predicate { kind, exp } => write!(f, "{kind}{exp}"),
            Self::CsRange {
                first,
                last,
                complement,
            } => write!(f, "[{}{first}-{last}]", neg(*complement)),
            Self::CsList { chars, complement } => {
                write!(f, "[{}{}]", neg(*complement), chars.concat())
            }
            Self::CsNamed { name, complement } => write!(f, "[:{}{name}:]", neg(*complement)),
            Self::CsExp { cexp, complement } => write!(f, "[{}{cexp}]", neg(*complement)),
            Self::CsUnion { cexps } => {
                write!(f, "{}", cexps.iter().map(|e| e.to_string()).join(" "))
            }
            Self::CsIntersection { cexps } => {
                write!(f, "{}", cexps.iter().map(|e| e.to_string()).join(" & "))
            }
            Self::CsDifference { first, second } => write!(f, "{first} - {second}"),
            Self::AtLeast { min, exp } => match min {
                0 => write!(f, "{exp}*"),
                1 => write!(f, "{exp}+"),
                n => write!(f, "{exp}{{{n},}}"),
            },
            Self::AtMost { max, exp } => match max {
                1 => write!(f, "{exp}?"),
                n => write!(f, "{exp}{{,{n}}}"),
            },
            Self::Grammar { rules } => {
                let rules = rules
                    .iter()
                    .map(|r| format!("{} = {}", r.id, r.exp))
                    .join(" ");
                write!(f, "grammar {rules} end")
            }
            Self::Application { id, args } => {
                write!(f, "{id}:({})", args.iter().map(|e| e.to_string()).join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_fmt() {
        assert_eq!(Ref::new("num").to_string(), "num");
        assert_eq!(Ref::qualified("net", "ipv4").to_string(), "net.ipv4");
    }

    #[test]
    fn test_exp_fmt() {
        let digit = Exp::CsRange {
            first: "0".to_string(),
            last: "9".to_string(),
            complement: false,
        };
        let exp = Exp::Sequence(vec![
            Exp::AtLeast {
                min: 1,
                exp: Box::new(digit),
            },
            Exp::Predicate {
                kind: PredKind::Negation,
                exp: Box::new(Exp::Literal(".".to_string())),
            },
        ]);
        assert_eq!(exp.to_string(), "{[0-9]+ !\".\"}");

        let app = Exp::Application {
            id: Ref::new("find"),
            args: vec![Exp::Ref(Ref::new("num"))],
        };
        assert_eq!(app.to_string(), "find:(num)");
    }
}
