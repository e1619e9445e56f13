use crate::{utf8, Error, Result};

/// A decoded character-set endpoint or member.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CsChar {
    /// A plain byte, from an ASCII source char or an `\xHH` escape.
    Byte(u8),
    /// A Unicode codepoint, from a `\uHHHH` escape or a non-ASCII source char.
    Codepoint(u32),
}

#[derive(Debug, Copy, Clone)]
enum Piece {
    Byte(u8),
    Codepoint(u32),
}

fn hex(n: usize, chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    let mut digits = String::new();
    for _ in 0..n {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }
    digits
}

// Decode the escape sequences of a raw source fragment. The error value is
// the offending escape text without its leading backslash, ready for the
// per-context messages.
fn decode(s: &str) -> std::result::Result<Vec<Piece>, String> {
    let mut pieces = vec![];
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            pieces.push(Piece::Codepoint(c as u32));
            continue;
        }

        match chars.next() {
            Some('a') => pieces.push(Piece::Byte(0x07)),
            Some('b') => pieces.push(Piece::Byte(0x08)),
            Some('f') => pieces.push(Piece::Byte(0x0c)),
            Some('n') => pieces.push(Piece::Byte(0x0a)),
            Some('r') => pieces.push(Piece::Byte(0x0d)),
            Some('t') => pieces.push(Piece::Byte(0x09)),
            Some('v') => pieces.push(Piece::Byte(0x0b)),
            Some(c @ ('\\' | '"' | '\'' | '[' | ']' | '-' | '^')) => {
                pieces.push(Piece::Byte(c as u8))
            }
            Some('x') => {
                let digits = hex(2, &mut chars);
                match digits.len() {
                    2 => pieces.push(Piece::Byte(u8::from_str_radix(&digits, 16).unwrap())),
                    _ => return Err(format!("x{digits}")),
                }
            }
            Some('u') => {
                let digits = hex(4, &mut chars);
                match digits.len() {
                    4 => pieces.push(Piece::Codepoint(
                        u32::from_str_radix(&digits, 16).unwrap(),
                    )),
                    _ => return Err(format!("u{digits}")),
                }
            }
            // codepoint escapes beyond the BMP are not implemented
            Some('U') => return Err(format!("U{}", hex(8, &mut chars))),
            Some(c) => return Err(c.to_string()),
            None => return Err(String::new()),
        }
    }

    Ok(pieces)
}

fn bytes(pieces: Vec<Piece>) -> Vec<u8> {
    let mut out = vec![];
    for p in pieces {
        match p {
            Piece::Byte(b) => out.push(b),
            Piece::Codepoint(c) => out.extend(utf8::encode(c)),
        }
    }
    out
}

/// Decode a pattern literal into the byte string it matches.
pub(crate) fn literal(s: &str) -> Result<Vec<u8>> {
    decode(s).map(bytes).map_err(Error::LiteralEscape)
}

/// Decode an RPL string into a plain string value.
pub(crate) fn string(s: &str) -> Result<String> {
    let raw = decode(s).map(bytes).map_err(Error::StringEscape)?;
    String::from_utf8(raw)
        .map_err(|_| Error::InvalidValue(format!("string value is not valid UTF-8: \"{s}\"")))
}

/// Decode a single character-set endpoint or member.
pub(crate) fn charset_char(s: &str) -> Result<CsChar> {
    let pieces = decode(s).map_err(Error::CharsetEscape)?;
    match pieces[..] {
        [Piece::Byte(b)] => Ok(CsChar::Byte(b)),
        [Piece::Codepoint(c)] if c < 0x80 => Ok(CsChar::Byte(c as u8)),
        [Piece::Codepoint(c)] => Ok(CsChar::Codepoint(c)),
        _ => Err(Error::CharsetEscape(s.to_string())),
    }
}
