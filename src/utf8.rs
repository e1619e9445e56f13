use cached::{proc_macro::cached, SizedCache};

use crate::peg::Peg;
use crate::Error;

pub const MAX_CODEPOINT: u32 = 0x10ffff;

const SURROGATE_LO: u32 = 0xd800;
const SURROGATE_HI: u32 = 0xdfff;

/// Encode a codepoint as UTF-8 without a scalar-value check; callers that
/// accept arbitrary escape values rely on the raw bit packing.
pub(crate) fn encode(cp: u32) -> Vec<u8> {
    match cp {
        0..=0x7f => vec![cp as u8],
        0x80..=0x7ff => vec![0xc0 | (cp >> 6) as u8, 0x80 | (cp & 0x3f) as u8],
        0x800..=0xffff => vec![
            0xe0 | (cp >> 12) as u8,
            0x80 | ((cp >> 6) & 0x3f) as u8,
            0x80 | (cp & 0x3f) as u8,
        ],
        _ => vec![
            0xf0 | (cp >> 18) as u8,
            0x80 | ((cp >> 12) & 0x3f) as u8,
            0x80 | ((cp >> 6) & 0x3f) as u8,
            0x80 | (cp & 0x3f) as u8,
        ],
    }
}

// Lowest and highest encodings per byte length.
fn length_start(len: usize) -> &'static [u8] {
    match len {
        1 => &[0x00],
        2 => &[0xc2, 0x80],
        3 => &[0xe0, 0xa0, 0x80],
        _ => &[0xf0, 0x90, 0x80, 0x80],
    }
}

fn length_end(len: usize) -> &'static [u8] {
    match len {
        1 => &[0x7f],
        2 => &[0xdf, 0xbf],
        3 => &[0xef, 0xbf, 0xbf],
        _ => &[0xf4, 0x8f, 0xbf, 0xbf],
    }
}

// Leading-byte rows per length, each with its second-byte bounds. The E0,
// ED, F0, and F4 rows restrict the second byte so that over-long forms,
// surrogate encodings, and values past U+10FFFF never appear.
fn rows(len: usize) -> &'static [(u8, u8, u8, u8)] {
    match len {
        2 => &[(0xc2, 0xdf, 0x80, 0xbf)],
        3 => &[
            (0xe0, 0xe0, 0xa0, 0xbf),
            (0xe1, 0xec, 0x80, 0xbf),
            (0xed, 0xed, 0x80, 0x9f),
            (0xee, 0xef, 0x80, 0xbf),
        ],
        _ => &[
            (0xf0, 0xf0, 0x90, 0xbf),
            (0xf1, 0xf3, 0x80, 0xbf),
            (0xf4, 0xf4, 0x80, 0x8f),
        ],
    }
}

fn second_byte_bounds(first: u8) -> (u8, u8) {
    match first {
        0xe0 => (0xa0, 0xbf),
        0xed => (0x80, 0x9f),
        0xf0 => (0x90, 0xbf),
        0xf4 => (0x80, 0x8f),
        _ => (0x80, 0xbf),
    }
}

/// Intermediate decomposition tree. `FullRanges` nodes defer expansion of
/// "every following byte spans its whole row" sub-ranges to a second pass
/// that knows the per-leading-byte asymmetries.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Range(u8, u8),
    Seq(Box<Node>, Box<Node>),
    Choice(Vec<Node>),
    FullRanges {
        len: usize,
        index: usize,
        lo: u8,
        hi: u8,
    },
}

impl Node {
    fn seq(a: Self, b: Self) -> Self {
        Self::Seq(Box::new(a), Box::new(b))
    }

    fn choice(mut parts: Vec<Self>) -> Self {
        match parts.len() {
            1 => parts.remove(0),
            _ => Self::Choice(parts),
        }
    }
}

// Smallest tail bytes that can follow position `i` of `bytes`.
fn tail_min(bytes: &[u8], i: usize) -> Vec<u8> {
    (i + 1..bytes.len())
        .map(|j| match j {
            1 => second_byte_bounds(bytes[0]).0,
            _ => 0x80,
        })
        .collect()
}

fn tail_max(bytes: &[u8], i: usize) -> Vec<u8> {
    (i + 1..bytes.len())
        .map(|j| match j {
            1 => second_byte_bounds(bytes[0]).1,
            _ => 0xbf,
        })
        .collect()
}

// Decompose the encodings between equal-length `s` and `e`, inclusive,
// looking at byte position `i`. Produces an ordered choice of a low
// fringe, a deferred full middle, and a high fringe; a fringe that spans
// its whole row merges into the middle.
fn between(s: &[u8], e: &[u8], i: usize) -> Node {
    let last = s.len() - 1;
    if i == last {
        return Node::Range(s[i], e[i]);
    }
    if s[i] == e[i] {
        return Node::seq(Node::Range(s[i], s[i]), between(s, e, i + 1));
    }

    let s_full = s[i + 1..] == tail_min(s, i)[..];
    let e_full = e[i + 1..] == tail_max(e, i)[..];
    let lo = if s_full { s[i] } else { s[i] + 1 };
    let hi = if e_full { e[i] } else { e[i] - 1 };

    let mut parts = vec![];
    if !s_full {
        let mut top = s[..=i].to_vec();
        top.extend(tail_max(s, i));
        parts.push(Node::seq(Node::Range(s[i], s[i]), between(s, &top, i + 1)));
    }
    if lo <= hi {
        parts.push(Node::FullRanges {
            len: s.len(),
            index: i,
            lo,
            hi,
        });
    }
    if !e_full {
        let mut bottom = e[..=i].to_vec();
        bottom.extend(tail_min(e, i));
        parts.push(Node::seq(Node::Range(e[i], e[i]), between(&bottom, e, i + 1)));
    }
    Node::choice(parts)
}

// Pass 1: split the interval by encoded length and decompose each piece.
fn decompose(n: u32, m: u32) -> Node {
    let s = encode(n);
    let e = encode(m);
    if s.len() == e.len() {
        return between(&s, &e, 0);
    }

    let mut parts = vec![between(&s, length_end(s.len()), 0)];
    for len in s.len() + 1..e.len() {
        let table = rows(len);
        parts.push(Node::FullRanges {
            len,
            index: 0,
            lo: table[0].0,
            hi: table[table.len() - 1].1,
        });
    }
    parts.push(between(length_start(e.len()), &e, 0));
    Node::choice(parts)
}

// Pass 2: expand deferred full-range nodes into explicit byte-range
// sequences, honoring the leading-byte rows.
fn expand(node: Node) -> Node {
    match node {
        Node::Range(..) => node,
        Node::Seq(a, b) => Node::seq(expand(*a), expand(*b)),
        Node::Choice(parts) => Node::Choice(parts.into_iter().map(expand).collect()),
        Node::FullRanges { len, index: 0, lo, hi } => {
            let mut parts = vec![];
            for &(first_lo, first_hi, second_lo, second_hi) in rows(len) {
                let a = first_lo.max(lo);
                let b = first_hi.min(hi);
                if a > b {
                    continue;
                }
                let mut tail = Node::Range(second_lo, second_hi);
                for _ in 2..len {
                    tail = Node::seq(tail, Node::Range(0x80, 0xbf));
                }
                parts.push(Node::seq(Node::Range(a, b), tail));
            }
            Node::choice(parts)
        }
        Node::FullRanges { len, index, lo, hi } => {
            let mut out = Node::Range(lo, hi);
            for _ in index + 1..len {
                out = Node::seq(out, Node::Range(0x80, 0xbf));
            }
            out
        }
    }
}

// Pass 3: lower the tree onto the primitives.
fn lower(node: Node) -> Peg {
    match node {
        Node::Range(lo, hi) => Peg::byte_range(lo, hi),
        Node::Seq(a, b) => Peg::seq(lower(*a), lower(*b)),
        Node::Choice(parts) => {
            let mut parts = parts.into_iter().map(lower);
            let first = parts.next().expect("choice nodes are never empty");
            parts.fold(first, Peg::alt)
        }
        Node::FullRanges { .. } => unreachable!("expand eliminates all FullRanges nodes"),
    }
}

/// Compile the codepoint interval `[n, m]` into a parsing expression
/// matching exactly the UTF-8 encodings of its codepoints.
///
/// Surrogate codepoints are never matched: intervals intersecting
/// U+D800..U+DFFF are narrowed around the block, and an interval lying
/// entirely inside it is an error.
#[cached(
    type = "SizedCache<(u32, u32), crate::Result<Peg>>",
    create = "{ SizedCache::with_size(256) }",
    convert = r#"{ (n, m) }"#
)]
pub fn compile_range(n: u32, m: u32) -> crate::Result<Peg> {
    if n > m {
        return Err(Error::InvalidValue(format!(
            "invalid codepoint range: {n:#x} > {m:#x}"
        )));
    }
    if m > MAX_CODEPOINT {
        return Err(Error::InvalidValue(format!("codepoint out of range: {m:#x}")));
    }

    let mut pieces = vec![];
    if n < SURROGATE_LO {
        pieces.push((n, m.min(SURROGATE_LO - 1)));
    }
    if m > SURROGATE_HI {
        pieces.push((n.max(SURROGATE_HI + 1), m));
    }
    if pieces.is_empty() {
        return Err(Error::InvalidValue(format!(
            "codepoint range {n:#x}..{m:#x} contains only surrogates"
        )));
    }

    let mut pegs = pieces
        .into_iter()
        .map(|(lo, hi)| lower(expand(decompose(lo, hi))));
    let first = pegs.next().expect("at least one piece");
    Ok(pegs.fold(first, Peg::alt))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(cp: u32) -> bool {
        cp <= MAX_CODEPOINT && !(SURROGATE_LO..=SURROGATE_HI).contains(&cp)
    }

    // boundary-heavy probe set around the interval and the encoding-length
    // breakpoints
    fn probes(n: u32, m: u32) -> Vec<u32> {
        let mut cps = vec![
            0, 1, 0x7e, 0x7f, 0x80, 0x81, 0x7fe, 0x7ff, 0x800, 0x801, 0xd7fe, 0xd7ff, 0xe000,
            0xe001, 0xfffe, 0xffff, 0x10000, 0x10001, 0x10fffe, 0x10ffff,
        ];
        for cp in [n, m] {
            cps.extend([cp.saturating_sub(1), cp, cp.saturating_add(1)]);
        }
        cps.retain(|cp| scalar(*cp));
        cps
    }

    #[test]
    fn test_soundness() {
        for (n, m) in [
            (0x00, 0x7f),
            (0x41, 0x5a),
            (0x2f, 0x31),
            (0x7f, 0x80),
            (0x80, 0x7ff),
            (0x100, 0x17f),
            (0x430, 0x44f),
            (0x7ff, 0x800),
            (0x800, 0xffff),
            (0x900, 0x97f),
            (0xd000, 0xe005),
            (0xffff, 0x10000),
            (0x10000, 0x10ffff),
            (0x1f600, 0x1f64f),
            (0x00, 0x10ffff),
            (0x9, 0x9),
            (0x1f600, 0x1f600),
        ] {
            let peg = compile_range(n, m).unwrap();
            for cp in probes(n, m) {
                let expected = n <= cp && cp <= m;
                assert_eq!(
                    peg.fullmatch(&encode(cp)),
                    expected,
                    "[{n:#x},{m:#x}] at {cp:#x}"
                );
            }
        }
    }

    #[test]
    fn test_dense_soundness() {
        let (n, m) = (0x6f0, 0x1823);
        let peg = compile_range(n, m).unwrap();
        for cp in (0..=MAX_CODEPOINT).step_by(97).filter(|cp| scalar(*cp)) {
            let expected = n <= cp && cp <= m;
            assert_eq!(peg.fullmatch(&encode(cp)), expected, "{cp:#x}");
        }
    }

    #[test]
    fn test_completeness() {
        // every valid encoding length is accepted, malformed sequences are not
        let peg = compile_range(0, MAX_CODEPOINT).unwrap();
        for cp in [0x00, 0x41, 0x7f, 0x80, 0x7ff, 0x800, 0xd7ff, 0xe000, 0xffff, 0x10000, 0x10ffff]
        {
            assert!(peg.fullmatch(&encode(cp)), "{cp:#x} rejected");
        }

        for bad in [
            &[0xc0, 0x80][..],             // over-long two-byte form
            &[0xc1, 0xbf],                 // over-long two-byte form
            &[0xe0, 0x80, 0x80],           // over-long three-byte form
            &[0xed, 0xa0, 0x80],           // encoded surrogate
            &[0xf0, 0x8f, 0x80, 0x80],     // over-long four-byte form
            &[0xf4, 0x90, 0x80, 0x80],     // past U+10FFFF
            &[0xf5, 0x80, 0x80, 0x80],     // invalid leading byte
            &[0x80],                       // lone continuation byte
            &[0xc2],                       // truncated
            &[0xe0, 0xa0],                 // truncated
            &[0xc2, 0x41],                 // invalid continuation byte
        ] {
            assert!(!peg.fullmatch(bad), "{bad:02x?} accepted");
        }

        // exactly one encoding is consumed, nothing more
        let m = peg.match_bytes("é!".as_bytes()).unwrap();
        assert_eq!(m.end, 2);
    }

    #[test]
    fn test_surrogate_handling() {
        // straddling intervals narrow around the surrogate block
        let peg = compile_range(0xd000, 0xe005).unwrap();
        assert!(peg.fullmatch(&encode(0xd7ff)));
        assert!(peg.fullmatch(&encode(0xe000)));
        assert!(!peg.fullmatch(&encode(0xd800)));
        assert!(!peg.fullmatch(&encode(0xdfff)));

        // fully-surrogate intervals are errors
        assert!(compile_range(0xd800, 0xdfff).is_err());
        assert!(compile_range(0xdab0, 0xdab0).is_err());
    }

    #[test]
    fn test_invalid_intervals() {
        assert!(compile_range(5, 4).is_err());
        assert!(compile_range(0, MAX_CODEPOINT + 1).is_err());
    }
}
