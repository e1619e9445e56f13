use indexmap::IndexMap;

use super::Peg;

/// A labeled capture produced by a successful match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub label: String,
    /// Byte offset of the first matched byte.
    pub start: usize,
    /// Byte offset one past the last matched byte.
    pub end: usize,
    pub subs: Vec<Match>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Byte offset one past the last consumed byte.
    pub end: usize,
    pub captures: Vec<Match>,
}

impl Peg {
    /// Match anchored at the start of `input`.
    pub fn match_bytes(&self, input: &[u8]) -> Option<MatchResult> {
        let mut captures = vec![];
        let mut exec = Exec {
            input,
            grammars: vec![],
        };
        let end = exec.run(self, 0, &mut captures)?;
        Some(MatchResult { end, captures })
    }

    /// Whether the whole input matches.
    pub fn fullmatch(&self, input: &[u8]) -> bool {
        matches!(self.match_bytes(input), Some(m) if m.end == input.len())
    }
}

struct Exec<'a> {
    input: &'a [u8],
    // innermost grammar last; rule references resolve innermost first
    grammars: Vec<&'a IndexMap<String, Peg>>,
}

impl<'a> Exec<'a> {
    fn run(&mut self, peg: &'a Peg, pos: usize, caps: &mut Vec<Match>) -> Option<usize> {
        match peg {
            Peg::Lit(bytes) => self.input[pos..]
                .starts_with(bytes)
                .then(|| pos + bytes.len()),
            Peg::ByteRange(lo, hi) => match self.input.get(pos) {
                Some(b) if lo <= b && b <= hi => Some(pos + 1),
                _ => None,
            },
            Peg::Seq(a, b) => {
                let mid = self.run(a, pos, caps)?;
                self.run(b, mid, caps)
            }
            Peg::Alt(alts) => {
                for p in alts {
                    let mark = caps.len();
                    if let Some(end) = self.run(p, pos, caps) {
                        return Some(end);
                    }
                    caps.truncate(mark);
                }
                None
            }
            Peg::LookAhead(p) => {
                let mark = caps.len();
                let matched = self.run(p, pos, caps).is_some();
                caps.truncate(mark);
                matched.then(|| pos)
            }
            Peg::LookBehind(p) => {
                // fixed length is guaranteed at construction
                let len = p.fixed_len()?;
                if pos < len {
                    return None;
                }
                let mark = caps.len();
                let matched = self.run(p, pos - len, caps) == Some(pos);
                caps.truncate(mark);
                matched.then(|| pos)
            }
            Peg::Negation(p) => {
                let mark = caps.len();
                let matched = self.run(p, pos, caps).is_some();
                caps.truncate(mark);
                (!matched).then(|| pos)
            }
            Peg::AtLeast(p, n) => {
                let mut count = 0;
                let mut at = pos;
                loop {
                    let mark = caps.len();
                    match self.run(p, at, caps) {
                        // zero-width iterations would never terminate
                        Some(end) if end > at => {
                            at = end;
                            count += 1;
                        }
                        _ => {
                            caps.truncate(mark);
                            break;
                        }
                    }
                }
                (count >= *n).then(|| at)
            }
            Peg::AtMost(p, n) => {
                let mut at = pos;
                for _ in 0..*n {
                    let mark = caps.len();
                    match self.run(p, at, caps) {
                        Some(end) if end > at => at = end,
                        _ => {
                            caps.truncate(mark);
                            break;
                        }
                    }
                }
                Some(at)
            }
            Peg::Capture(label, p) => {
                let mut subs = vec![];
                let end = self.run(p, pos, &mut subs)?;
                caps.push(Match {
                    label: label.clone(),
                    start: pos,
                    end,
                    subs,
                });
                Some(end)
            }
            Peg::Grammar { rules, start } => {
                self.grammars.push(rules);
                let end = match rules.get(start) {
                    Some(rule) => self.run(rule, pos, caps),
                    None => None,
                };
                self.grammars.pop();
                end
            }
            Peg::V(name) => {
                let rule = self.grammars.iter().rev().find_map(|g| g.get(name))?;
                self.run(rule, pos, caps)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::indexmap;

    use super::*;

    #[test]
    fn test_lit_and_range() {
        let p = Peg::seq(Peg::lit("ab"), Peg::byte_range(b'0', b'9'));
        assert_eq!(p.match_bytes(b"ab7x").map(|m| m.end), Some(3));
        assert!(p.match_bytes(b"abx").is_none());
        assert!(p.match_bytes(b"ab").is_none());
    }

    #[test]
    fn test_choice_order() {
        // PEG ordered choice commits to the first matching branch
        let p = Peg::alt(Peg::lit("ab"), Peg::lit("abc"));
        assert_eq!(p.match_bytes(b"abc").map(|m| m.end), Some(2));

        let p = Peg::alt(Peg::lit("abc"), Peg::lit("ab"));
        assert_eq!(p.match_bytes(b"abc").map(|m| m.end), Some(3));
    }

    #[test]
    fn test_predicates() {
        let p = Peg::negation(Peg::lit("hi"));
        assert!(p.match_bytes(b"hi").is_none());
        assert_eq!(p.match_bytes(b"bye").map(|m| m.end), Some(0));

        let p = Peg::seq(Peg::look_ahead(Peg::lit("hi")), Peg::lit("h"));
        assert_eq!(p.match_bytes(b"hi").map(|m| m.end), Some(1));

        let behind = Peg::look_behind(Peg::lit("ab")).unwrap();
        let p = Peg::seq(Peg::lit("ab"), behind);
        assert_eq!(p.match_bytes(b"ab").map(|m| m.end), Some(2));
        let behind = Peg::look_behind(Peg::lit("xy")).unwrap();
        let p = Peg::seq(Peg::lit("ab"), behind);
        assert!(p.match_bytes(b"ab").is_none());
    }

    #[test]
    fn test_repetition() {
        let digit = Peg::byte_range(b'0', b'9');
        let p = Peg::rep_atleast(digit.clone(), 2).unwrap();
        assert!(p.match_bytes(b"4").is_none());
        assert_eq!(p.match_bytes(b"456x").map(|m| m.end), Some(3));

        let p = Peg::rep_atmost(digit, 2).unwrap();
        assert_eq!(p.match_bytes(b"456").map(|m| m.end), Some(2));
        assert_eq!(p.match_bytes(b"x").map(|m| m.end), Some(0));
    }

    #[test]
    fn test_captures() {
        let digits = Peg::rep_atleast(Peg::byte_range(b'0', b'9'), 1).unwrap();
        let p = Peg::capture("num", digits);
        let m = p.match_bytes(b"42x").unwrap();
        assert_eq!(m.end, 2);
        assert_eq!(
            m.captures,
            vec![Match {
                label: "num".to_string(),
                start: 0,
                end: 2,
                subs: vec![],
            }]
        );
    }

    #[test]
    fn test_grammar_recursion() {
        // s <- "a" s "b" / ""
        let body = Peg::alt(
            Peg::seq(Peg::lit("a"), Peg::seq(Peg::v("s"), Peg::lit("b"))),
            Peg::lit(""),
        );
        let g = Peg::grammar(indexmap! { "s".to_string() => body }, "s").unwrap();
        assert!(g.fullmatch(b"aaabbb"));
        assert!(g.fullmatch(b""));
        assert!(!g.fullmatch(b"aab"));
        assert!(!g.fullmatch(b"ab b"));
    }
}
