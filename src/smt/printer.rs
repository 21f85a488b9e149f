//! SMT-LIB2 rendering of sorts, terms and scripts.

use std::fmt::{self, Display};

use num_bigint::BigUint;
use num_traits::{Signed, Zero};

use super::term::{Command, Sort, Term};

impl Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::Int => write!(f, "Int"),
            Sort::Real => write!(f, "Real"),
            Sort::BitVec(w) => write!(f, "(_ BitVec {})", w),
            Sort::String => write!(f, "String"),
            Sort::RegLan => write!(f, "RegLan"),
            Sort::Seq(s) => write!(f, "(Seq {})", s),
            Sort::Array(index, element) => {
                write!(f, "(Array")?;
                for s in index {
                    write!(f, " {}", s)?;
                }
                write!(f, " {})", element)
            }
        }
    }
}

/// Quote a string literal: printable ASCII stays, the rest becomes `\u{..}`.
pub fn quote_string(codes: &[u32]) -> String {
    let mut out = String::with_capacity(codes.len() + 2);
    out.push('"');
    for &code in codes {
        match code {
            0x22 => out.push_str("\"\""),
            0x5c => out.push_str("\\u{5c}"),
            0x20..=0x7e => out.push(code as u8 as char),
            _ => out.push_str(&format!("\\u{{{:x}}}", code)),
        }
    }
    out.push('"');
    out
}

fn bv_literal(width: u32, value: &BigUint) -> String {
    if width % 4 == 0 {
        format!("#x{:0>w$}", value.to_str_radix(16), w = (width / 4) as usize)
    } else {
        format!("#b{:0>w$}", value.to_str_radix(2), w = width as usize)
    }
}

fn decimal(n: &num_bigint::BigInt) -> String {
    if n.is_negative() {
        format!("(- {}.0)", -n)
    } else {
        format!("{}.0", n)
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Sym(s) => write!(f, "{}", s),
            Term::Bool(b) => write!(f, "{}", b),
            Term::Int(n) => {
                if n.is_negative() {
                    write!(f, "(- {})", -n)
                } else {
                    write!(f, "{}", n)
                }
            }
            Term::Real(r) => {
                if r.denom().is_zero() || *r.denom() == 1.into() {
                    write!(f, "{}", decimal(r.numer()))
                } else {
                    write!(f, "(/ {} {})", decimal(r.numer()), decimal(r.denom()))
                }
            }
            Term::BitVec { width, value } => write!(f, "{}", bv_literal(*width, value)),
            Term::Str(s) => write!(f, "{}", quote_string(s)),
            Term::App(head, args) => {
                if args.is_empty() {
                    return write!(f, "{}", head);
                }
                write!(f, "({}", head)?;
                for a in args {
                    write!(f, " {}", a)?;
                }
                write!(f, ")")
            }
            Term::ForAll(bindings, body) => {
                write!(f, "(forall (")?;
                for (i, (name, sort)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "({} {})", name, sort)?;
                }
                write!(f, ") {})", body)
            }
            Term::ConstArray(sort, value) => write!(f, "((as const {}) {})", sort, value),
            Term::SeqEmpty(sort) => write!(f, "(as seq.empty {})", sort),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetOption(key, value) => write!(f, "(set-option :{} {})", key, value),
            Command::DeclareConst(name, sort) => write!(f, "(declare-const {} {})", name, sort),
            Command::DefineFun(name, sort, body) => write!(f, "(define-fun {} () {} {})", name, sort, body),
            Command::Assert(t) => write!(f, "(assert {})", t),
            Command::Maximize(t) => write!(f, "(maximize {})", t),
            Command::Minimize(t) => write!(f, "(minimize {})", t),
            Command::CheckSat => write!(f, "(check-sat)"),
            Command::GetInfo(key) => write!(f, "(get-info :{})", key),
            Command::GetValue(terms) => {
                write!(f, "(get-value (")?;
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "))")
            }
        }
    }
}

/// Print a script, one command per line.
pub fn to_smtlib(script: &[Command]) -> String {
    let mut out = String::new();
    for command in script {
        out.push_str(&command.to_string());
        out.push('\n');
    }
    out
}
