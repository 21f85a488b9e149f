//! Operand checking and result types.

use super::{Expr, Op};
use crate::error::{Error, Result};
use crate::types::Type;

fn arity(op: &Op, args: &[Expr], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(Error::InvalidValue(format!(
            "`{}` takes {} operands, got {}",
            op.name(),
            n,
            args.len()
        )));
    }
    Ok(())
}

fn expect(op: &Op, arg: &Expr, ty: &Type) -> Result<()> {
    if arg.ty() != ty {
        return Err(Error::mismatch(op.name(), ty.to_string(), arg.ty()));
    }
    Ok(())
}

fn same(op: &Op, a: &Expr, b: &Expr) -> Result<()> {
    expect(op, b, a.ty())
}

fn option_inner<'a>(op: &Op, arg: &'a Expr) -> Result<&'a Type> {
    match arg.ty() {
        Type::Option(t) => Ok(t),
        other => Err(Error::mismatch(op.name(), "an option", other)),
    }
}

fn map_types<'a>(op: &Op, arg: &'a Expr) -> Result<(&'a Type, &'a Type)> {
    match arg.ty() {
        Type::Map(k, v) => Ok((k, v)),
        other => Err(Error::mismatch(op.name(), "a map", other)),
    }
}

fn set_element<'a>(op: &Op, arg: &'a Expr) -> Result<&'a Type> {
    match arg.ty() {
        Type::Set(t) => Ok(t),
        other => Err(Error::mismatch(op.name(), "a set", other)),
    }
}

fn seq_element<'a>(op: &Op, arg: &'a Expr) -> Result<&'a Type> {
    match arg.ty() {
        Type::Seq(t) => Ok(t),
        other => Err(Error::mismatch(op.name(), "a sequence", other)),
    }
}

fn fseq_types<'a>(op: &Op, arg: &'a Expr) -> Result<(&'a Type, u32)> {
    match arg.ty() {
        Type::FSeq(t, cap) => Ok((t, *cap)),
        other => Err(Error::mismatch(op.name(), "a bounded sequence", other)),
    }
}

/// Result type of `op` applied to `args`, checking operand types.
pub(super) fn result_type(op: &Op, args: &[Expr]) -> Result<Type> {
    match op {
        Op::Const(_) | Op::Var { .. } => Err(Error::InvalidValue(format!(
            "`{}` nodes are built by the context, not by `make`",
            op.name()
        ))),
        Op::Cast | Op::Create => Err(Error::InvalidValue(format!(
            "`{}` needs an explicit result type",
            op.name()
        ))),

        Op::Not => {
            arity(op, args, 1)?;
            expect(op, &args[0], &Type::Bool)?;
            Ok(Type::Bool)
        }
        Op::And | Op::Or => {
            arity(op, args, 2)?;
            expect(op, &args[0], &Type::Bool)?;
            expect(op, &args[1], &Type::Bool)?;
            Ok(Type::Bool)
        }
        Op::Ite => {
            arity(op, args, 3)?;
            expect(op, &args[0], &Type::Bool)?;
            same(op, &args[1], &args[2])?;
            Ok(args[1].ty().clone())
        }
        Op::Eq => {
            arity(op, args, 2)?;
            same(op, &args[0], &args[1])?;
            Ok(Type::Bool)
        }
        Op::Lt | Op::Le => {
            arity(op, args, 2)?;
            if !args[0].ty().is_ordered() {
                return Err(Error::mismatch(op.name(), "an ordered type", args[0].ty()));
            }
            same(op, &args[0], &args[1])?;
            Ok(Type::Bool)
        }
        Op::Add | Op::Sub | Op::Mul => {
            arity(op, args, 2)?;
            if !args[0].ty().is_arithmetic() {
                return Err(Error::mismatch(op.name(), "a numeric type", args[0].ty()));
            }
            same(op, &args[0], &args[1])?;
            Ok(args[0].ty().clone())
        }
        Op::BitAnd | Op::BitOr | Op::BitXor | Op::BitNot => {
            arity(op, args, if *op == Op::BitNot { 1 } else { 2 })?;
            if !args[0].ty().is_bitvec() {
                return Err(Error::mismatch(op.name(), "a bit-vector", args[0].ty()));
            }
            if args.len() == 2 {
                same(op, &args[0], &args[1])?;
            }
            Ok(args[0].ty().clone())
        }

        Op::GetField(i) => {
            arity(op, args, 1)?;
            args[0]
                .ty()
                .field_type(*i)
                .ok_or_else(|| Error::mismatch(op.name(), format!("a tuple or record with field {}", i), args[0].ty()))
        }
        Op::WithField(i) => {
            arity(op, args, 2)?;
            let field = args[0].ty().field_type(*i).ok_or_else(|| {
                Error::mismatch(op.name(), format!("a tuple or record with field {}", i), args[0].ty())
            })?;
            expect(op, &args[1], &field)?;
            Ok(args[0].ty().clone())
        }

        Op::Some => {
            arity(op, args, 1)?;
            Ok(Type::option(args[0].ty().clone()))
        }
        Op::IsSome => {
            arity(op, args, 1)?;
            option_inner(op, &args[0])?;
            Ok(Type::Bool)
        }
        Op::OptionValue => {
            arity(op, args, 1)?;
            Ok(option_inner(op, &args[0])?.clone())
        }

        Op::MapGet => {
            arity(op, args, 2)?;
            let (k, v) = map_types(op, &args[0])?;
            expect(op, &args[1], k)?;
            Ok(v.clone())
        }
        Op::MapSet => {
            arity(op, args, 3)?;
            let (k, v) = map_types(op, &args[0])?;
            expect(op, &args[1], k)?;
            expect(op, &args[2], v)?;
            Ok(args[0].ty().clone())
        }

        Op::SetAdd | Op::SetRemove | Op::SetContains => {
            arity(op, args, 2)?;
            let t = set_element(op, &args[0])?;
            expect(op, &args[1], t)?;
            Ok(if *op == Op::SetContains {
                Type::Bool
            } else {
                args[0].ty().clone()
            })
        }
        Op::SetUnion | Op::SetIntersect | Op::SetDifference => {
            arity(op, args, 2)?;
            set_element(op, &args[0])?;
            same(op, &args[0], &args[1])?;
            Ok(args[0].ty().clone())
        }

        Op::SeqUnit => {
            arity(op, args, 1)?;
            Type::seq(args[0].ty().clone())
        }
        Op::SeqConcat => {
            arity(op, args, 2)?;
            seq_element(op, &args[0])?;
            same(op, &args[0], &args[1])?;
            Ok(args[0].ty().clone())
        }
        Op::SeqLength => {
            arity(op, args, 1)?;
            seq_element(op, &args[0])?;
            Ok(Type::BigInt)
        }
        Op::SeqAt => {
            arity(op, args, 2)?;
            seq_element(op, &args[0])?;
            expect(op, &args[1], &Type::BigInt)?;
            Ok(args[0].ty().clone())
        }
        Op::SeqContains | Op::SeqStartsWith | Op::SeqEndsWith => {
            arity(op, args, 2)?;
            seq_element(op, &args[0])?;
            same(op, &args[0], &args[1])?;
            Ok(Type::Bool)
        }
        Op::SeqReplaceFirst => {
            arity(op, args, 3)?;
            seq_element(op, &args[0])?;
            same(op, &args[0], &args[1])?;
            same(op, &args[0], &args[2])?;
            Ok(args[0].ty().clone())
        }
        Op::SeqSlice => {
            arity(op, args, 3)?;
            seq_element(op, &args[0])?;
            expect(op, &args[1], &Type::BigInt)?;
            expect(op, &args[2], &Type::BigInt)?;
            Ok(args[0].ty().clone())
        }
        Op::SeqIndexOf => {
            arity(op, args, 3)?;
            seq_element(op, &args[0])?;
            same(op, &args[0], &args[1])?;
            expect(op, &args[2], &Type::BigInt)?;
            Ok(Type::BigInt)
        }
        Op::RegexMatch(_) => {
            arity(op, args, 1)?;
            expect(op, &args[0], &Type::string())?;
            Ok(Type::Bool)
        }

        Op::FSeqPushBack | Op::FSeqContains => {
            arity(op, args, 2)?;
            let (t, _) = fseq_types(op, &args[0])?;
            expect(op, &args[1], t)?;
            Ok(if *op == Op::FSeqContains {
                Type::Bool
            } else {
                args[0].ty().clone()
            })
        }
        Op::FSeqLength => {
            arity(op, args, 1)?;
            fseq_types(op, &args[0])?;
            Ok(Type::u32())
        }
        Op::FSeqGet(i) => {
            arity(op, args, 1)?;
            let (t, cap) = fseq_types(op, &args[0])?;
            if *i >= cap {
                return Err(Error::InvalidValue(format!(
                    "index {} is out of bounds for capacity {}",
                    i, cap
                )));
            }
            Ok(Type::option(t.clone()))
        }
    }
}

/// Check operands against an explicitly requested result type.
pub(super) fn check_typed(op: &Op, args: &[Expr], ty: &Type) -> Result<()> {
    match op {
        Op::Cast => {
            arity(op, args, 1)?;
            if !args[0].ty().is_bitvec() {
                return Err(Error::mismatch(op.name(), "a bit-vector", args[0].ty()));
            }
            if !ty.is_bitvec() {
                return Err(Error::InvalidType(format!("cannot cast to {}", ty)));
            }
            ty.validate()
        }
        Op::Create => {
            ty.validate()?;
            let fields = ty
                .field_types()
                .ok_or_else(|| Error::InvalidType(format!("{} is not a tuple or record", ty)))?;
            arity(op, args, fields.len())?;
            for (arg, field) in args.iter().zip(&fields) {
                expect(op, arg, field)?;
            }
            Ok(())
        }
        _ => {
            let expected = result_type(op, args)?;
            if expected != *ty {
                return Err(Error::mismatch(op.name(), expected.to_string(), ty));
            }
            Ok(())
        }
    }
}
