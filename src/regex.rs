//! Regular expressions over characters.
//!
//! The interpreter matches with Brzozowski derivatives; the SMT backend
//! translates the same AST into `RegLan` terms.

use std::fmt;

use crate::error::{Error, Result};
use crate::types::MAX_CHAR;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Regex {
    /// Matches nothing.
    Empty,
    /// Matches only the empty string.
    Epsilon,
    /// Inclusive range of code points.
    Range(u32, u32),
    AnyChar,
    Concat(Box<Regex>, Box<Regex>),
    Union(Box<Regex>, Box<Regex>),
    Star(Box<Regex>),
}

impl Regex {
    pub fn char(c: char) -> Regex {
        Regex::Range(c as u32, c as u32)
    }

    pub fn range(lo: char, hi: char) -> Result<Regex> {
        let (lo, hi) = (lo as u32, hi as u32);
        if lo > hi || hi > MAX_CHAR {
            return Err(Error::InvalidValue(format!(
                "invalid character range U+{:X}..=U+{:X}",
                lo, hi
            )));
        }
        Ok(Regex::Range(lo, hi))
    }

    pub fn literal(s: &str) -> Regex {
        s.chars()
            .map(Regex::char)
            .reduce(Regex::concat)
            .unwrap_or(Regex::Epsilon)
    }

    pub fn concat(self, other: Regex) -> Regex {
        match (self, other) {
            (Regex::Empty, _) | (_, Regex::Empty) => Regex::Empty,
            (Regex::Epsilon, r) | (r, Regex::Epsilon) => r,
            (a, b) => Regex::Concat(Box::new(a), Box::new(b)),
        }
    }

    pub fn union(self, other: Regex) -> Regex {
        match (self, other) {
            (Regex::Empty, r) | (r, Regex::Empty) => r,
            (a, b) if a == b => a,
            (a, b) => {
                let (a, b) = if a <= b { (a, b) } else { (b, a) };
                Regex::Union(Box::new(a), Box::new(b))
            }
        }
    }

    pub fn star(self) -> Regex {
        match self {
            Regex::Empty | Regex::Epsilon => Regex::Epsilon,
            r @ Regex::Star(_) => r,
            r => Regex::Star(Box::new(r)),
        }
    }

    pub fn plus(self) -> Regex {
        self.clone().concat(self.star())
    }

    pub fn optional(self) -> Regex {
        Regex::Epsilon.union(self)
    }

    /// Whether the empty string is in the language.
    pub fn is_nullable(&self) -> bool {
        match self {
            Regex::Empty | Regex::Range(..) | Regex::AnyChar => false,
            Regex::Epsilon | Regex::Star(_) => true,
            Regex::Concat(a, b) => a.is_nullable() && b.is_nullable(),
            Regex::Union(a, b) => a.is_nullable() || b.is_nullable(),
        }
    }

    /// Brzozowski derivative with respect to the code point `c`.
    pub fn derive(&self, c: u32) -> Regex {
        match self {
            Regex::Empty | Regex::Epsilon => Regex::Empty,
            Regex::Range(lo, hi) => {
                if *lo <= c && c <= *hi {
                    Regex::Epsilon
                } else {
                    Regex::Empty
                }
            }
            Regex::AnyChar => Regex::Epsilon,
            Regex::Concat(a, b) => {
                let left = a.derive(c).concat(b.as_ref().clone());
                if a.is_nullable() {
                    left.union(b.derive(c))
                } else {
                    left
                }
            }
            Regex::Union(a, b) => a.derive(c).union(b.derive(c)),
            Regex::Star(r) => r.derive(c).concat(self.clone()),
        }
    }

    pub fn matches(&self, input: impl IntoIterator<Item = u32>) -> bool {
        let mut current = self.clone();
        for c in input {
            current = current.derive(c);
            if current == Regex::Empty {
                return false;
            }
        }
        current.is_nullable()
    }
}

impl fmt::Display for Regex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regex::Empty => write!(f, "∅"),
            Regex::Epsilon => write!(f, "ε"),
            Regex::Range(lo, hi) if lo == hi => write!(f, "{}", char::from_u32(*lo).unwrap_or('?')),
            Regex::Range(lo, hi) => write!(
                f,
                "[{}-{}]",
                char::from_u32(*lo).unwrap_or('?'),
                char::from_u32(*hi).unwrap_or('?')
            ),
            Regex::AnyChar => write!(f, "."),
            Regex::Concat(a, b) => write!(f, "{}{}", a, b),
            Regex::Union(a, b) => write!(f, "({}|{})", a, b),
            Regex::Star(r) => write!(f, "({})*", r),
        }
    }
}
