use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;

/// SMT-LIB sorts used by the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    Int,
    Real,
    BitVec(u32),
    String,
    RegLan,
    Seq(Box<Sort>),
    /// Possibly multi-index array.
    Array(Vec<Sort>, Box<Sort>),
}

/// Solver-agnostic SMT term.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Symbol reference: variable, defined function, or nullary constant.
    Sym(String),
    Bool(bool),
    Int(BigInt),
    Real(BigRational),
    BitVec { width: u32, value: BigUint },
    /// String literal as code points.
    Str(Vec<u32>),
    /// Function application; `head` may be an indexed identifier such as
    /// `(_ extract 7 0)`.
    App(String, Vec<Term>),
    ForAll(Vec<(String, Sort)>, Box<Term>),
    ConstArray(Sort, Box<Term>),
    SeqEmpty(Sort),
}

#[allow(clippy::should_implement_trait)]
impl Term {
    pub fn sym(name: impl Into<String>) -> Self {
        Term::Sym(name.into())
    }

    pub fn app(head: impl Into<String>, args: Vec<Term>) -> Self {
        Term::App(head.into(), args)
    }

    pub fn str(s: &str) -> Self {
        Term::Str(s.chars().map(|c| c as u32).collect())
    }

    pub fn bv(width: u32, value: BigUint) -> Self {
        Term::BitVec { width, value }
    }

    pub fn bv_u64(width: u32, value: u64) -> Self {
        Term::BitVec {
            width,
            value: BigUint::from(value),
        }
    }

    pub fn not(self) -> Self {
        match self {
            Term::Bool(b) => Term::Bool(!b),
            t => Term::app("not", vec![t]),
        }
    }

    pub fn eq(self, other: Term) -> Self {
        if self == other {
            return Term::Bool(true);
        }
        Term::app("=", vec![self, other])
    }

    pub fn ite(self, then: Term, otherwise: Term) -> Self {
        match self {
            Term::Bool(true) => then,
            Term::Bool(false) => otherwise,
            _ if then == otherwise => then,
            c => Term::app("ite", vec![c, then, otherwise]),
        }
    }

    pub fn implies(self, other: Term) -> Self {
        match (&self, &other) {
            (Term::Bool(true), _) => other,
            (Term::Bool(false), _) | (_, Term::Bool(true)) => Term::Bool(true),
            _ => Term::app("=>", vec![self, other]),
        }
    }

    /// Conjunction, dropping `true` and collapsing on `false`.
    pub fn and(terms: impl IntoIterator<Item = Term>) -> Self {
        let mut out = Vec::new();
        for t in terms {
            match t {
                Term::Bool(true) => {}
                Term::Bool(false) => return Term::Bool(false),
                t => out.push(t),
            }
        }
        match out.len() {
            0 => Term::Bool(true),
            1 => out.pop().unwrap_or(Term::Bool(true)),
            _ => Term::App("and".into(), out),
        }
    }

    /// Disjunction, dropping `false` and collapsing on `true`.
    pub fn or(terms: impl IntoIterator<Item = Term>) -> Self {
        let mut out = Vec::new();
        for t in terms {
            match t {
                Term::Bool(false) => {}
                Term::Bool(true) => return Term::Bool(true),
                t => out.push(t),
            }
        }
        match out.len() {
            0 => Term::Bool(false),
            1 => out.pop().unwrap_or(Term::Bool(false)),
            _ => Term::App("or".into(), out),
        }
    }

    pub fn forall(bindings: Vec<(String, Sort)>, body: Term) -> Self {
        if bindings.is_empty() || matches!(body, Term::Bool(_)) {
            return body;
        }
        Term::ForAll(bindings, Box::new(body))
    }

    /// Whether printing this term costs about as much as printing a symbol.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Term::App(..) | Term::ForAll(..) | Term::ConstArray(..))
    }
}

/// Top-level commands of a query script.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetOption(String, String),
    DeclareConst(String, Sort),
    DefineFun(String, Sort, Term),
    Assert(Term),
    Maximize(Term),
    Minimize(Term),
    CheckSat,
    GetInfo(String),
    GetValue(Vec<Term>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_or_folding() {
        let x = Term::sym("x");
        assert_eq!(Term::and([Term::Bool(true), x.clone()]), x);
        assert_eq!(Term::and([x.clone(), Term::Bool(false)]), Term::Bool(false));
        assert_eq!(Term::and(Vec::new()), Term::Bool(true));
        assert_eq!(Term::or([Term::Bool(false), x.clone()]), x);
        assert_eq!(Term::or([x.clone(), Term::Bool(true)]), Term::Bool(true));
    }

    #[test]
    fn test_ite_folding() {
        let (c, a, b) = (Term::sym("c"), Term::sym("a"), Term::sym("b"));
        assert_eq!(Term::Bool(true).ite(a.clone(), b.clone()), a);
        assert_eq!(c.clone().ite(a.clone(), a.clone()), a);
        assert_eq!(Term::Bool(true).implies(b.clone()), b);
        assert_eq!(a.clone().eq(a), Term::Bool(true));
    }
}
