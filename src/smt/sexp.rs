//! S-expressions as printed by SMT-LIB2 solvers.

use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    /// Symbol, keyword or numeral, verbatim.
    Atom(String),
    /// String literal with `""` escapes already resolved.
    Str(String),
    List(Vec<Sexp>),
}

impl Sexp {
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexp::Atom(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Sexp]> {
        match self {
            Sexp::List(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this is a list whose head is the atom `head`.
    pub fn is_app(&self, head: &str) -> bool {
        match self {
            Sexp::List(items) => items.first().and_then(Sexp::as_atom) == Some(head),
            _ => false,
        }
    }
}

impl fmt::Display for Sexp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(s) => write!(f, "{}", s),
            Sexp::Str(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            Sexp::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Parse every top-level S-expression in `text`.
pub fn parse_all(text: &str) -> Result<Vec<Sexp>> {
    let mut stack: Vec<Vec<Sexp>> = vec![Vec::new()];
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '(' => stack.push(Vec::new()),
            ')' => {
                if stack.len() < 2 {
                    return Err(Error::Parse(format!("unbalanced `)` in `{}`", text)));
                }
                let list = stack.pop().unwrap_or_default();
                if let Some(parent) = stack.last_mut() {
                    parent.push(Sexp::List(list));
                }
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '"' => {
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') if chars.peek() == Some(&'"') => {
                            chars.next();
                            s.push('"');
                        }
                        Some('"') => break,
                        Some(c) => s.push(c),
                        None => return Err(Error::Parse("unterminated string literal".into())),
                    }
                }
                push(&mut stack, Sexp::Str(s));
            }
            '|' => {
                let mut s = String::from("|");
                loop {
                    match chars.next() {
                        Some('|') => break,
                        Some(c) => s.push(c),
                        None => return Err(Error::Parse("unterminated quoted symbol".into())),
                    }
                }
                s.push('|');
                push(&mut stack, Sexp::Atom(s));
            }
            c if c.is_whitespace() => {}
            c => {
                let mut s = String::from(c);
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';') {
                        break;
                    }
                    s.push(c);
                    chars.next();
                }
                push(&mut stack, Sexp::Atom(s));
            }
        }
    }

    if stack.len() != 1 {
        return Err(Error::Parse(format!("unbalanced `(` in `{}`", text)));
    }
    Ok(stack.pop().unwrap_or_default())
}

fn push(stack: &mut [Vec<Sexp>], sexp: Sexp) {
    if let Some(top) = stack.last_mut() {
        top.push(sexp);
    }
}

/// Code points of an SMT-LIB string literal, resolving `\u{..}` and `\u....`.
pub fn unescape(s: &str) -> Vec<u32> {
    let chars: Vec<char> = s.chars().collect();
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && chars.get(i + 1) == Some(&'u') {
            if let Some((code, consumed)) = escape_at(&chars[i + 2..]) {
                out.push(code);
                i += 2 + consumed;
                continue;
            }
        }
        out.push(chars[i] as u32);
        i += 1;
    }
    out
}

fn escape_at(rest: &[char]) -> Option<(u32, usize)> {
    if rest.first() == Some(&'{') {
        let end = rest.iter().position(|&c| c == '}')?;
        if end < 2 || end > 6 {
            return None;
        }
        let digits: String = rest[1..end].iter().collect();
        return u32::from_str_radix(&digits, 16).ok().map(|code| (code, end + 1));
    }
    if rest.len() >= 4 && rest[..4].iter().all(char::is_ascii_hexdigit) {
        let digits: String = rest[..4].iter().collect();
        return u32::from_str_radix(&digits, 16).ok().map(|code| (code, 4));
    }
    None
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_parse_reply() {
        let reply = "sat\n(:reason-unknown \"\")\n((x #x05) (|y z| \"a\"\"b\"))\n";
        let sexps = parse_all(reply).unwrap();
        assert_eq!(sexps.len(), 3);
        assert_eq!(sexps[0], Sexp::Atom("sat".into()));
        let bindings = sexps[2].as_list().unwrap();
        assert_eq!(bindings[0].to_string(), "(x #x05)");
        assert_eq!(bindings[1].as_list().unwrap()[0], Sexp::Atom("|y z|".into()));
        assert_eq!(bindings[1].as_list().unwrap()[1], Sexp::Str("a\"b".into()));
    }

    #[test]
    fn test_comments_and_errors() {
        let sexps = parse_all("; comment\n(a (b c)) ; trailing\n").unwrap();
        assert_eq!(sexps.len(), 1);
        assert!(sexps[0].is_app("a"));
        assert!(parse_all("(a").is_err());
        assert!(parse_all("a)").is_err());
        assert!(parse_all("\"open").is_err());
    }

    fn codes(s: &str) -> Vec<u32> {
        s.chars().map(|c| c as u32).collect()
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\u{e9}b"), codes("aéb"));
        assert_eq!(unescape("\\u00e9"), codes("é"));
        assert_eq!(unescape("\\u{5c}"), codes("\\"));
        assert_eq!(unescape("\\x"), codes("\\x"));
        assert_eq!(unescape("\\u{d800}"), vec![0xd800]);
    }
}
