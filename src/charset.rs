use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::peg::Peg;

// POSIX classes over the C locale, plus the ascii and word extensions the
// surface language expects.
static CLASSES: Lazy<IndexMap<&'static str, &'static [(u8, u8)]>> = Lazy::new(|| {
    let classes: [(&str, &[(u8, u8)]); 14] = [
        ("alnum", &[(b'0', b'9'), (b'A', b'Z'), (b'a', b'z')]),
        ("alpha", &[(b'A', b'Z'), (b'a', b'z')]),
        ("ascii", &[(0x00, 0x7f)]),
        ("blank", &[(b'\t', b'\t'), (b' ', b' ')]),
        ("cntrl", &[(0x00, 0x1f), (0x7f, 0x7f)]),
        ("digit", &[(b'0', b'9')]),
        ("graph", &[(0x21, 0x7e)]),
        ("lower", &[(b'a', b'z')]),
        ("print", &[(0x20, 0x7e)]),
        ("punct", &[(0x21, 0x2f), (0x3a, 0x40), (0x5b, 0x60), (0x7b, 0x7e)]),
        ("space", &[(b'\t', b'\r'), (b' ', b' ')]),
        ("upper", &[(b'A', b'Z')]),
        ("word", &[(b'0', b'9'), (b'A', b'Z'), (b'_', b'_'), (b'a', b'z')]),
        ("xdigit", &[(b'0', b'9'), (b'A', b'F'), (b'a', b'f')]),
    ];
    classes.into_iter().collect()
});

/// Look up a named class, returning its single-byte expression.
pub(crate) fn named(name: &str) -> Option<Peg> {
    let ranges = CLASSES.get(name)?;
    let mut pegs = ranges.iter().map(|&(lo, hi)| Peg::byte_range(lo, hi));
    let first = pegs.next()?;
    Some(pegs.fold(first, Peg::alt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_classes() {
        for (name, yes, no) in [
            ("digit", &b"059"[..], &b"a/:"[..]),
            ("alpha", b"azAZ", b"0_ "),
            ("space", b" \t\n\r", b"a0"),
            ("punct", b"!/:@[`{~", b"aZ0 "),
            ("xdigit", b"0fF9", b"gG"),
            ("word", b"aZ0_", b"-. "),
        ] {
            let peg = named(name).unwrap();
            for b in yes {
                assert!(peg.fullmatch(&[*b]), "[:{name}:] rejected {b:#x}");
            }
            for b in no {
                assert!(!peg.fullmatch(&[*b]), "[:{name}:] accepted {b:#x}");
            }
        }
    }

    #[test]
    fn test_unknown_class() {
        assert!(named("alphanumeric").is_none());
        assert!(named("").is_none());
    }
}
