use indexmap::IndexMap;

use crate::ast::{self, Exp, PredKind};
use crate::env::{Binding, Env};
use crate::macros::regex;
use crate::pattern::{Pattern, Value};
use crate::peg::{Peg, PegError};
use crate::unescape::{self, CsChar};
use crate::violation::{Kind, SourceRef, Violation, Violations};
use crate::{charset, utf8, Error, Result};

/// Parameters of a load in progress, supplied by the module loader.
#[derive(Debug, Default, Clone)]
pub struct LoadRequest {
    pub importpath: Option<String>,
    pub prefix: Option<String>,
    pub packagename: Option<String>,
}

impl LoadRequest {
    // The prefix attached to capture labels: the requested prefix, falling
    // back to the package name. A "." prefix imports unprefixed, and loads
    // without an importpath never prefix.
    fn effective_prefix(&self) -> Option<&str> {
        self.importpath.as_ref()?;
        match self.prefix.as_deref() {
            Some(".") => None,
            Some(p) => Some(p),
            None => self.packagename.as_deref(),
        }
    }
}

fn label(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(p) => format!("{p}.{name}"),
        None => name.to_string(),
    }
}

fn pattern(peg: Peg, exp: &Exp) -> Value {
    let mut pat = Pattern::new(peg);
    pat.ast = Some(exp.clone());
    Value::Pattern(pat)
}

fn expect_pattern(value: Value, exp: &Exp) -> Result<Pattern> {
    match value {
        Value::Pattern(p) => Ok(p),
        _ => Err(Error::InvalidExpression(exp.to_string())),
    }
}

fn compile_pat(exp: &Exp, env: &mut Env, prefix: Option<&str>) -> Result<Pattern> {
    expect_pattern(compile_exp(exp, env, prefix)?, exp)
}

/// Compile a single expression node against an environment.
pub(crate) fn compile_exp(exp: &Exp, env: &mut Env, prefix: Option<&str>) -> Result<Value> {
    match exp {
        Exp::Literal(raw) => Ok(pattern(Peg::lit(unescape::literal(raw)?), exp)),
        Exp::RplString(raw) => Ok(Value::String(unescape::string(raw)?)),
        Exp::Hashtag(tag) => Ok(Value::Hashtag(tag.clone())),
        Exp::Sequence(exps) => match exps.split_first() {
            None => Err(Error::Internal("empty sequence".to_string())),
            Some((first, rest)) => {
                let mut peg = compile_pat(first, env, prefix)?.peg;
                for e in rest {
                    peg = Peg::seq(peg, compile_pat(e, env, prefix)?.peg);
                }
                Ok(pattern(peg, exp))
            }
        },
        Exp::Choice(exps) => match exps.split_first() {
            None => Err(Error::Internal("empty choice".to_string())),
            Some((first, rest)) => {
                let mut peg = compile_pat(first, env, prefix)?.peg;
                for e in rest {
                    peg = Peg::alt(peg, compile_pat(e, env, prefix)?.peg);
                }
                Ok(pattern(peg, exp))
            }
        },
        Exp::Predicate { kind, exp: body } => {
            let pat = compile_pat(body, env, prefix)?;
            let peg = match kind {
                PredKind::LookAhead => Peg::look_ahead(pat.peg),
                PredKind::Negation => Peg::negation(pat.peg),
                PredKind::LookBehind => Peg::look_behind(pat.peg).map_err(|e| match e {
                    PegError::NotFixedLength => Error::LookbehindNotFixed(body.to_string()),
                    PegError::TooLong => Error::LookbehindTooLong(body.to_string()),
                    PegError::HasCaptures => Error::LookbehindCaptures(body.to_string()),
                    e => Error::Internal(e.to_string()),
                })?,
            };
            Ok(pattern(peg, exp))
        }
        Exp::CsNamed { name, complement } => {
            let peg = charset::named(name).ok_or_else(|| Error::UnknownCharset(name.clone()))?;
            Ok(pattern(maybe_complement(peg, *complement), exp))
        }
        Exp::CsRange {
            first,
            last,
            complement,
        } => Ok(pattern(cs_range(first, last, *complement)?, exp)),
        Exp::CsList { chars, complement } => {
            let mut peg: Option<Peg> = None;
            for c in chars {
                let lit = match unescape::charset_char(c)? {
                    CsChar::Byte(b) => Peg::lit([b]),
                    CsChar::Codepoint(cp) => Peg::lit(utf8::encode(cp)),
                };
                peg = Some(match peg {
                    Some(prev) => Peg::alt(prev, lit),
                    None => lit,
                });
            }
            let peg = peg.ok_or_else(|| Error::Internal("empty character list".to_string()))?;
            Ok(pattern(maybe_complement(peg, *complement), exp))
        }
        Exp::CsExp { cexp, complement } => cs_exp(cexp, *complement, env, prefix),
        // charset algebra nodes are only meaningful inside a bracket
        // expression
        Exp::CsUnion { .. } | Exp::CsIntersection { .. } | Exp::CsDifference { .. } => {
            Err(Error::InvalidExpression(exp.to_string()))
        }
        Exp::AtLeast { min, exp: body } => {
            let pat = compile_pat(body, env, prefix)?;
            let peg = Peg::rep_atleast(pat.peg, *min).map_err(rep_error)?;
            Ok(pattern(peg, exp))
        }
        Exp::AtMost { max, exp: body } => {
            let pat = compile_pat(body, env, prefix)?;
            let peg = Peg::rep_atmost(pat.peg, *max).map_err(rep_error)?;
            Ok(pattern(peg, exp))
        }
        Exp::Ref(r) => match env.lookup(r) {
            None | Some(Binding::Novalue { .. }) => Err(Error::Unbound(r.to_string())),
            Some(Binding::Pattern(p)) => {
                let mut pat = p.clone();
                pat.name = Some(r.local.clone());
                Ok(Value::Pattern(pat))
            }
            Some(b) => Err(Error::TypeMismatch {
                name: r.to_string(),
                expected: "pattern",
                actual: b.kind(),
            }),
        },
        Exp::Application { id, args } => {
            let func = match env.lookup(id) {
                None | Some(Binding::Novalue { .. }) => return Err(Error::Unbound(id.to_string())),
                Some(Binding::Function(f)) => f.clone(),
                Some(b) => {
                    return Err(Error::TypeMismatch {
                        name: id.to_string(),
                        expected: "function",
                        actual: b.kind(),
                    })
                }
            };
            let values = args
                .iter()
                .map(|a| compile_exp(a, env, prefix))
                .collect::<Result<Vec<_>>>()?;
            let mut pat = func.apply(&values)?;
            pat.name = Some(id.to_string());
            pat.ast = Some(exp.clone());
            Ok(Value::Pattern(pat))
        }
        Exp::Grammar { rules } => compile_grammar(rules, env, prefix).map(Value::Pattern),
    }
}

fn rep_error(e: PegError) -> Error {
    match e {
        PegError::EmptyLoopBody => Error::EmptyRepetition,
        e => Error::Internal(e.to_string()),
    }
}

// A complemented single-byte expression: any byte the body does not match.
fn maybe_complement(peg: Peg, complement: bool) -> Peg {
    match complement {
        true => Peg::seq(Peg::negation(peg), Peg::any_byte()),
        false => peg,
    }
}

fn cs_range(first: &str, last: &str, complement: bool) -> Result<Peg> {
    let first = unescape::charset_char(first)?;
    let last = unescape::charset_char(last)?;
    match (first, last) {
        (CsChar::Byte(lo), CsChar::Byte(hi)) => {
            Ok(maybe_complement(Peg::byte_range(lo, hi), complement))
        }
        // a codepoint endpoint makes the whole range a codepoint range
        (first, last) => {
            let lo = codepoint(first);
            let hi = codepoint(last);
            match complement {
                false => utf8::compile_range(lo, hi),
                true => complement_codepoints(lo, hi),
            }
        }
    }
}

fn codepoint(c: CsChar) -> u32 {
    match c {
        CsChar::Byte(b) => b as u32,
        CsChar::Codepoint(cp) => cp,
    }
}

// The scalar values outside [lo, hi], as an ordered choice of the two
// complementary intervals.
fn complement_codepoints(lo: u32, hi: u32) -> Result<Peg> {
    let mut parts = vec![];
    if lo > 0 {
        parts.push(utf8::compile_range(0, lo - 1)?);
    }
    if hi < utf8::MAX_CODEPOINT {
        parts.push(utf8::compile_range(hi + 1, utf8::MAX_CODEPOINT)?);
    }
    let mut parts = parts.into_iter();
    match parts.next() {
        // complement of the full codepoint space matches nothing
        None => Ok(Peg::seq(Peg::negation(Peg::any_byte()), Peg::any_byte())),
        Some(first) => Ok(parts.fold(first, Peg::alt)),
    }
}

// Bracket-expression simplification: nested bracket complements cancel,
// unions fold into an ordered choice, and the unimplemented algebra is
// rejected.
fn cs_exp(cexp: &Exp, complement: bool, env: &mut Env, prefix: Option<&str>) -> Result<Value> {
    match cexp {
        Exp::CsExp {
            cexp: inner,
            complement: inner_complement,
        } => cs_exp(inner, complement ^ inner_complement, env, prefix),
        Exp::CsUnion { cexps } => match cexps.split_first() {
            None => Err(Error::Internal("empty character set union".to_string())),
            Some((first, rest)) => {
                let mut peg = compile_pat(first, env, prefix)?.peg;
                for e in rest {
                    peg = Peg::alt(peg, compile_pat(e, env, prefix)?.peg);
                }
                Ok(pattern(maybe_complement(peg, complement), cexp))
            }
        },
        Exp::CsIntersection { .. } => Err(Error::CsetIntersection),
        Exp::CsDifference { .. } => Err(Error::CsetDifference),
        simple => {
            let pat = compile_pat(simple, env, prefix)?;
            Ok(pattern(maybe_complement(pat.peg, complement), cexp))
        }
    }
}

// Grammar compilation in three passes: placeholder rule bindings, rule
// bodies in the extended environment, then the back-end fixpoint.
fn compile_grammar(rules: &[ast::Binding], env: &mut Env, prefix: Option<&str>) -> Result<Pattern> {
    let first = rules
        .first()
        .ok_or_else(|| Error::Internal("empty grammar".to_string()))?;
    let grammar_id = first.id.local.clone();

    env.push();
    let mut labels = IndexMap::new();
    for rule in rules {
        let id = &rule.id.local;
        let mut placeholder = Pattern::new(Peg::v(id.clone()));
        placeholder.name = Some(id.clone());
        placeholder.alias = rule.alias;
        placeholder.exported = false;
        env.bind(id.clone(), Binding::Pattern(placeholder));
        if !rule.alias {
            let l = match *id == grammar_id {
                true => label(prefix, id),
                false => label(prefix, &format!("{grammar_id}.{id}")),
            };
            labels.insert(id.clone(), l);
        }
    }

    let mut compiled = IndexMap::new();
    let mut failure = None;
    for rule in rules {
        match compile_pat(&rule.exp, env, prefix) {
            Ok(mut pat) => {
                if let Some(l) = labels.get(&rule.id.local) {
                    pat.wrap(l);
                }
                compiled.insert(rule.id.local.clone(), pat.peg);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    env.pop();
    if let Some(e) = failure {
        return Err(e);
    }

    let peg = Peg::grammar(compiled, &grammar_id).map_err(Error::from_grammar)?;
    let mut pat = Pattern::new(peg);
    pat.name = Some(grammar_id);
    Ok(pat)
}

fn sourceref(
    block: &ast::Block,
    stmt: &ast::Binding,
    request: Option<&LoadRequest>,
) -> Option<SourceRef> {
    let (s, e) = stmt.span?;
    let text = block.source.as_ref()?.get(s..e)?.to_string();
    Some(SourceRef {
        text,
        s,
        e,
        origin: request.and_then(|r| r.importpath.clone()),
        parent: None,
    })
}

/// Compile a block of statements into the package environment.
///
/// Per-binding failures are recorded in `messages` and compilation moves on
/// to the next binding, leaving the failed identifier bound to its forward
/// placeholder. The returned value is the block's declared package name.
pub fn compile_block(
    block: &ast::Block,
    env: &mut Env,
    request: Option<&LoadRequest>,
    messages: &mut Violations,
) -> Result<Option<String>> {
    let prefix = request.and_then(|r| r.effective_prefix());

    if let Some(name) = &block.package {
        if !regex!(r"^[a-zA-Z][a-zA-Z0-9_]*$").is_match(name) {
            messages.push(Violation::new(
                Kind::Warning,
                "compiler",
                format!("non-standard package name: {name}"),
            ));
        }
    }
    if !block.imports.is_empty() {
        tracing::debug!("skipping {} already-satisfied imports", block.imports.len());
    }

    // forward declarations
    for stmt in &block.stmts {
        let id = &stmt.id.local;
        let placeholder = Binding::Novalue {
            exported: !stmt.local,
            ast: Some(stmt.exp.clone()),
        };
        let previous = env.bind(id.clone(), placeholder);
        if previous.is_some() {
            tracing::warn!("rebinding {}", id);
            let mut v = Violation::new(Kind::Info, "compiler", format!("rebinding {id}"));
            v = v.with_ast(&stmt.exp);
            messages.push(v);
        }
    }

    // TODO: iterate this pass while any right-hand side still depends on a
    // Novalue binding, so top-level forward references resolve out of order
    for stmt in &block.stmts {
        match compile_exp(&stmt.exp, env, prefix) {
            Err(e) => {
                let mut v =
                    Violation::new(Kind::Compile, "compiler", e.to_string()).with_ast(&stmt.exp);
                if let Some(sr) = sourceref(block, stmt, request) {
                    v = v.with_sourceref(sr);
                }
                messages.push(v);
            }
            Ok(value) => {
                let binding = match value {
                    Value::String(s) => Binding::String(s),
                    Value::Hashtag(s) => Binding::Hashtag(s),
                    Value::Pattern(mut pat) => {
                        if !stmt.alias && !matches!(stmt.exp, Exp::Grammar { .. }) {
                            pat.wrap(&label(prefix, &stmt.id.local));
                        }
                        pat.name = Some(stmt.id.local.clone());
                        pat.alias = stmt.alias;
                        pat.exported = !stmt.local;
                        Binding::Pattern(pat)
                    }
                };
                env.bind(stmt.id.local.clone(), binding);
            }
        }
    }

    Ok(block.package.clone())
}

/// Compile an ad-hoc expression for direct matching. The result always
/// carries an outer capture: references to named patterns keep their label,
/// everything else is wrapped with the anonymous `*` label.
pub fn compile_expression(exp: &Exp, env: &mut Env) -> Result<Pattern> {
    let mut pat = expect_pattern(compile_exp(exp, env, None)?, exp)?;
    match exp {
        Exp::Ref(_) if pat.alias => pat.wrap_anonymous(),
        Exp::Ref(_) => (),
        _ => pat.wrap_anonymous(),
    }
    pat.alias = false;
    Ok(pat)
}
