use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::pattern::{Pattern, PrimFn, Value};
use crate::peg::Peg;

static BUILTINS: Lazy<IndexMap<&'static str, PrimFn>> = Lazy::new(|| {
    [
        PrimFn {
            name: "find",
            min_args: 1,
            max_args: 1,
            func: find,
        },
        PrimFn {
            name: "ci",
            min_args: 1,
            max_args: 1,
            func: ci,
        },
    ]
    .into_iter()
    .map(|f| (f.name, f))
    .collect()
});

pub(crate) fn all() -> impl Iterator<Item = &'static PrimFn> {
    BUILTINS.values()
}

fn pattern_arg(args: &[Value]) -> Result<&Pattern, String> {
    match args {
        [Value::Pattern(p)] => Ok(p),
        [v] => Err(format!("expected a pattern argument, given a {}", v.kind())),
        _ => Err("expected a single pattern argument".to_string()),
    }
}

// Skip ahead byte by byte until the argument matches: {!p .}* p
fn find(args: &[Value]) -> Result<Pattern, String> {
    let pat = pattern_arg(args)?;
    let step = Peg::seq(Peg::negation(pat.peg.clone()), Peg::any_byte());
    let skip = Peg::rep_atleast(step, 0).map_err(|e| e.to_string())?;
    Ok(Pattern::new(Peg::seq(skip, pat.peg.clone())))
}

// ASCII case-insensitive rendition of the argument.
fn ci(args: &[Value]) -> Result<Pattern, String> {
    let pat = pattern_arg(args)?;
    fold_case(&pat.peg).map(Pattern::new)
}

fn fold_case(peg: &Peg) -> Result<Peg, String> {
    match peg {
        Peg::Lit(bytes) => {
            let mut out: Option<Peg> = None;
            for &b in bytes {
                let piece = match b {
                    b'a'..=b'z' => Peg::alt(Peg::lit([b]), Peg::lit([b - 0x20])),
                    b'A'..=b'Z' => Peg::alt(Peg::lit([b + 0x20]), Peg::lit([b])),
                    _ => Peg::lit([b]),
                };
                out = Some(match out {
                    Some(prev) => Peg::seq(prev, piece),
                    None => piece,
                });
            }
            Ok(out.unwrap_or_else(|| Peg::lit("")))
        }
        Peg::ByteRange(lo, hi) => {
            let mut out = Peg::byte_range(*lo, *hi);
            // mirror any alphabetic overlap into the other case
            for (first, last, delta) in [(b'a', b'z', -0x20i16), (b'A', b'Z', 0x20i16)] {
                let s = (*lo).max(first);
                let e = (*hi).min(last);
                if s <= e {
                    out = Peg::alt(out, Peg::byte_range((s as i16 + delta) as u8, (e as i16 + delta) as u8));
                }
            }
            Ok(out)
        }
        Peg::Seq(a, b) => Ok(Peg::seq(fold_case(a)?, fold_case(b)?)),
        Peg::Alt(alts) => {
            let alts = alts.iter().map(fold_case).collect::<Result<Vec<_>, _>>()?;
            Ok(Peg::Alt(alts))
        }
        Peg::LookAhead(p) => Ok(Peg::look_ahead(fold_case(p)?)),
        Peg::LookBehind(p) => Peg::look_behind(fold_case(p)?).map_err(|e| e.to_string()),
        Peg::Negation(p) => Ok(Peg::negation(fold_case(p)?)),
        Peg::AtLeast(p, n) => Peg::rep_atleast(fold_case(p)?, *n).map_err(|e| e.to_string()),
        Peg::AtMost(p, n) => Peg::rep_atmost(fold_case(p)?, *n).map_err(|e| e.to_string()),
        Peg::Capture(label, p) => Ok(Peg::capture(label.clone(), fold_case(p)?)),
        Peg::Grammar { .. } | Peg::V(_) => Err("cannot case-fold a grammar".to_string()),
    }
}
