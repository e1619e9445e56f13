use indexmap::IndexMap;

mod exec;
pub use exec::{Match, MatchResult};

/// Longest byte distance a lookbehind may reach.
pub const LOOKBEHIND_MAX: usize = 255;

/// Structured construction errors reported by the back-end. The compiler
/// maps these codes onto its own diagnostics instead of parsing message
/// strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PegError {
    #[error("loop body may accept empty string")]
    EmptyLoopBody,
    #[error("pattern does not have fixed length")]
    NotFixedLength,
    #[error("pattern longer than {} bytes", LOOKBEHIND_MAX)]
    TooLong,
    #[error("pattern has captures")]
    HasCaptures,
    #[error("rule {0} may be left recursive")]
    LeftRecursive(String),
    #[error("undefined rule in grammar: {0}")]
    UndefinedRule(String),
}

/// An executable parsing expression.
///
/// Values are immutable once constructed; the fallible constructors perform
/// the structural rejections the compiler relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peg {
    Lit(Vec<u8>),
    ByteRange(u8, u8),
    Seq(Box<Peg>, Box<Peg>),
    Alt(Vec<Peg>),
    LookAhead(Box<Peg>),
    LookBehind(Box<Peg>),
    Negation(Box<Peg>),
    AtLeast(Box<Peg>, u32),
    AtMost(Box<Peg>, u32),
    Capture(String, Box<Peg>),
    Grammar {
        rules: IndexMap<String, Peg>,
        start: String,
    },
    V(String),
}

impl Peg {
    pub fn lit<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self::Lit(bytes.into())
    }

    pub fn byte_range(lo: u8, hi: u8) -> Self {
        Self::ByteRange(lo, hi)
    }

    /// Any single byte.
    pub fn any_byte() -> Self {
        Self::ByteRange(0x00, 0xff)
    }

    pub fn seq(a: Self, b: Self) -> Self {
        Self::Seq(Box::new(a), Box::new(b))
    }

    /// Ordered choice, flattening nested alternations.
    pub fn alt(a: Self, b: Self) -> Self {
        match a {
            Self::Alt(mut alts) => {
                alts.push(b);
                Self::Alt(alts)
            }
            a => Self::Alt(vec![a, b]),
        }
    }

    pub fn look_ahead(p: Self) -> Self {
        Self::LookAhead(Box::new(p))
    }

    pub fn look_behind(p: Self) -> Result<Self, PegError> {
        match p.fixed_len() {
            None => Err(PegError::NotFixedLength),
            Some(n) if n > LOOKBEHIND_MAX => Err(PegError::TooLong),
            Some(_) if p.has_captures() => Err(PegError::HasCaptures),
            Some(_) => Ok(Self::LookBehind(Box::new(p))),
        }
    }

    pub fn negation(p: Self) -> Self {
        Self::Negation(Box::new(p))
    }

    pub fn rep_atleast(p: Self, n: u32) -> Result<Self, PegError> {
        match p.nullable() {
            true => Err(PegError::EmptyLoopBody),
            false => Ok(Self::AtLeast(Box::new(p), n)),
        }
    }

    pub fn rep_atmost(p: Self, n: u32) -> Result<Self, PegError> {
        match p.nullable() {
            true => Err(PegError::EmptyLoopBody),
            false => Ok(Self::AtMost(Box::new(p), n)),
        }
    }

    pub fn capture<S: Into<String>>(label: S, p: Self) -> Self {
        Self::Capture(label.into(), Box::new(p))
    }

    /// A reference to a rule of the enclosing grammar, resolved when the
    /// grammar is assembled.
    pub fn v<S: Into<String>>(name: S) -> Self {
        Self::V(name.into())
    }

    /// Assemble a mutually recursive rule set into a single expression.
    pub fn grammar(rules: IndexMap<String, Peg>, start: &str) -> Result<Self, PegError> {
        if !rules.contains_key(start) {
            return Err(PegError::UndefinedRule(start.to_string()));
        }
        for name in rules.keys() {
            let mut path = vec![name.clone()];
            head_nullable(&rules[name], &rules, &mut path)?;
        }
        Ok(Self::Grammar {
            rules,
            start: start.to_string(),
        })
    }

    /// Whether the expression can succeed without consuming input. Open
    /// rule references resolve at grammar assembly and count as consuming.
    pub(crate) fn nullable(&self) -> bool {
        match self {
            Self::Lit(bytes) => bytes.is_empty(),
            Self::ByteRange(..) => false,
            Self::Seq(a, b) => a.nullable() && b.nullable(),
            Self::Alt(alts) => alts.iter().any(|p| p.nullable()),
            Self::LookAhead(_) | Self::LookBehind(_) | Self::Negation(_) => true,
            Self::AtLeast(p, n) => *n == 0 || p.nullable(),
            Self::AtMost(..) => true,
            Self::Capture(_, p) => p.nullable(),
            Self::V(_) => false,
            Self::Grammar { rules, start } => {
                rules.get(start).map(|r| r.nullable()).unwrap_or(false)
            }
        }
    }

    /// The exact number of bytes every match consumes, when that number is
    /// statically known.
    pub(crate) fn fixed_len(&self) -> Option<usize> {
        match self {
            Self::Lit(bytes) => Some(bytes.len()),
            Self::ByteRange(..) => Some(1),
            Self::Seq(a, b) => a.fixed_len()?.checked_add(b.fixed_len()?),
            Self::Alt(alts) => {
                let mut lens = alts.iter().map(|p| p.fixed_len());
                let first = lens.next()??;
                lens.all(|l| l == Some(first)).then(|| first)
            }
            Self::LookAhead(_) | Self::LookBehind(_) | Self::Negation(_) => Some(0),
            Self::AtLeast(..) | Self::AtMost(..) => None,
            Self::Capture(_, p) => p.fixed_len(),
            Self::V(_) | Self::Grammar { .. } => None,
        }
    }

    pub(crate) fn has_captures(&self) -> bool {
        match self {
            Self::Capture(..) => true,
            Self::Lit(_) | Self::ByteRange(..) | Self::V(_) => false,
            Self::Seq(a, b) => a.has_captures() || b.has_captures(),
            Self::Alt(alts) => alts.iter().any(|p| p.has_captures()),
            Self::LookAhead(p) | Self::LookBehind(p) | Self::Negation(p) => p.has_captures(),
            Self::AtLeast(p, _) | Self::AtMost(p, _) => p.has_captures(),
            Self::Grammar { rules, .. } => rules.values().any(|p| p.has_captures()),
        }
    }

    pub(crate) fn is_grammar(&self) -> bool {
        matches!(self, Self::Grammar { .. })
    }
}

// Walk the positions an expression can reach before consuming a byte,
// resolving rule references against the rule map. Detects undefined rules
// and head-position cycles while reporting whether the expression is
// nullable in context.
fn head_nullable(
    peg: &Peg,
    rules: &IndexMap<String, Peg>,
    path: &mut Vec<String>,
) -> Result<bool, PegError> {
    match peg {
        Peg::Lit(bytes) => Ok(bytes.is_empty()),
        Peg::ByteRange(..) => Ok(false),
        Peg::Seq(a, b) => match head_nullable(a, rules, path)? {
            true => head_nullable(b, rules, path),
            false => Ok(false),
        },
        Peg::Alt(alts) => {
            let mut nullable = false;
            for p in alts {
                nullable |= head_nullable(p, rules, path)?;
            }
            Ok(nullable)
        }
        Peg::LookAhead(p) | Peg::Negation(p) => {
            head_nullable(p, rules, path)?;
            Ok(true)
        }
        // lookbehind bodies are fixed-length and therefore reference-free
        Peg::LookBehind(_) => Ok(true),
        Peg::AtLeast(p, n) => {
            let nullable = head_nullable(p, rules, path)?;
            Ok(*n == 0 || nullable)
        }
        Peg::AtMost(p, _) => {
            head_nullable(p, rules, path)?;
            Ok(true)
        }
        Peg::Capture(_, p) => head_nullable(p, rules, path),
        Peg::V(name) => {
            if path.iter().any(|n| n == name) {
                return Err(PegError::LeftRecursive(name.clone()));
            }
            let rule = rules
                .get(name)
                .ok_or_else(|| PegError::UndefinedRule(name.clone()))?;
            path.push(name.clone());
            let nullable = head_nullable(rule, rules, path);
            path.pop();
            nullable
        }
        // nested grammars were verified at their own assembly
        Peg::Grammar { .. } => Ok(peg.nullable()),
    }
}
