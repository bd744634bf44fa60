//! BoundArrayAccessors: clamps every dynamic index into its bounds.
//!
//! Arrays, vectors and matrices with a known size `N` get
//! `min(i, N - 1u)` for a `u32` index and `clamp(i, 0i, N - 1i)` for an
//! `i32` one. A literal index already in range is left alone and one out
//! of range becomes `N - 1`. Runtime-sized arrays are bounded by
//! `arrayLength(&a) - 1u`.
//!
//! Indices that already have the clamped shape are recognized, so a
//! second run is a `Skip`.

use crate::builtin::BuiltinFn;
use crate::diagnostic::{Diagnostic, System};
use crate::program::{BinaryOp, CallTarget, CloneContext, Expr, ExprId, Literal, Program, Sem};
use crate::types::{ArrayCount, Type, TypeId};

use super::{Applied, ApplyResult, DataMap, Transform};

#[derive(Clone, Copy, Debug, Default)]
pub struct BoundArrayAccessors;

/// How far an index may go.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Limit {
    /// The last valid index.
    Fixed(u32),
    /// The last element of a runtime-sized array.
    Runtime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Signedness {
    Signed,
    Unsigned,
}

/// A pending rewrite of one index operand.
struct Clamp {
    object: ExprId,
    index: ExprId,
    limit: Limit,
    sign: Signedness,
}

impl Transform for BoundArrayAccessors {
    fn name(&self) -> &'static str {
        "BoundArrayAccessors"
    }

    fn apply(&self, input: &Program, _inputs: &DataMap, _outputs: &mut DataMap) -> ApplyResult<Program> {
        let sem = Sem::analyze(input)?;
        let mut clamps = Vec::new();
        let mut diagnostics = Vec::new();
        for (i, expr) in input.exprs.iter().enumerate() {
            let Expr::Index { object, index } = *expr else {
                continue;
            };
            let access = ExprId(i as u32);
            let Some(limit) = limit(&sem, object) else {
                continue;
            };
            let sign = match sem.types()[sem.type_of(index)] {
                Type::I32 => Signedness::Signed,
                Type::U32 => Signedness::Unsigned,
                _ => continue,
            };
            if in_bounds(input, index, limit, sign) {
                continue;
            }
            if limit == Limit::Runtime {
                if sign == Signedness::Signed {
                    diagnostics.push(unclamped(input, access, "an i32 index into a runtime-sized array"));
                    continue;
                }
                if has_call(input, object) {
                    diagnostics.push(unclamped(input, access, "its array expression calls a function"));
                    continue;
                }
            }
            clamps.push(Clamp {
                object,
                index,
                limit,
                sign,
            });
        }
        if clamps.is_empty() {
            return Ok(Applied::Skip);
        }

        let mut ctx = CloneContext::new(input, &sem);
        for clamp in clamps {
            let Clamp {
                object,
                index,
                limit,
                sign,
            } = clamp;
            let pointer = !sem.is_reference(object);
            ctx.replace_expr(index, move |ctx| {
                if let Expr::Literal(_) = ctx.src.expr(index) {
                    if let Limit::Fixed(last) = limit {
                        return ctx.dst.push_expr(Expr::Literal(typed(last, sign)));
                    }
                }
                let value = ctx.clone_expr_without_transform(index);
                match (limit, sign) {
                    (Limit::Fixed(last), Signedness::Unsigned) => {
                        let last = ctx.dst.lit_u32(last);
                        ctx.dst.call_builtin(BuiltinFn::Min, vec![value, last])
                    }
                    (Limit::Fixed(last), Signedness::Signed) => {
                        let zero = ctx.dst.lit_i32(0);
                        let last = ctx.dst.lit_i32(last as i32);
                        ctx.dst.call_builtin(BuiltinFn::Clamp, vec![value, zero, last])
                    }
                    (Limit::Runtime, _) => {
                        let array = ctx.clone_expr(object);
                        let array = if pointer { array } else { ctx.dst.address_of(array) };
                        let length = ctx.dst.call_builtin(BuiltinFn::ArrayLength, vec![array]);
                        let one = ctx.dst.lit_u32(1);
                        let last = ctx.dst.binary(BinaryOp::Subtract, length, one);
                        ctx.dst.call_builtin(BuiltinFn::Min, vec![value, last])
                    }
                }
            });
        }
        let (output, mut cloned) = ctx.finish();
        diagnostics.append(&mut cloned);
        Ok(Applied::Changed { output, diagnostics })
    }
}

/// The last valid index into `object`, if its size bounds it.
fn limit(sem: &Sem, object: ExprId) -> Option<Limit> {
    let types = sem.types();
    let mut ty: TypeId = sem.type_of(object);
    if let Type::Pointer { store, .. } = types[ty] {
        if !sem.is_reference(object) {
            ty = store;
        }
    }
    let count = match &types[ty] {
        Type::Array { count, .. } => match count {
            ArrayCount::Constant(n) => *n,
            ArrayCount::Runtime => return Some(Limit::Runtime),
            // Unknown until pipeline creation.
            ArrayCount::Override(_) => return None,
        },
        Type::Vector { width, .. } => *width,
        Type::Matrix { columns, .. } => *columns,
        _ => return None,
    };
    count.checked_sub(1).map(Limit::Fixed)
}

fn typed(value: u32, sign: Signedness) -> Literal {
    match sign {
        Signedness::Signed => Literal::I32(value as i32),
        Signedness::Unsigned => Literal::U32(value),
    }
}

fn literal_u32(program: &Program, e: ExprId) -> Option<u32> {
    match program.expr(e) {
        Expr::Literal(Literal::U32(v)) => Some(*v),
        Expr::Literal(Literal::I32(v)) => u32::try_from(*v).ok(),
        _ => None,
    }
}

fn builtin_args(program: &Program, e: ExprId, builtin: BuiltinFn) -> Option<&[ExprId]> {
    match program.expr(e) {
        Expr::Call {
            target: CallTarget::Builtin(b),
            args,
        } if *b == builtin => Some(args),
        _ => None,
    }
}

/// True for a literal in range and for an index this transform already clamped.
fn in_bounds(program: &Program, index: ExprId, limit: Limit, sign: Signedness) -> bool {
    if let (Expr::Literal(_), Limit::Fixed(last)) = (program.expr(index), limit) {
        return literal_u32(program, index).is_some_and(|v| v <= last);
    }
    match (limit, sign) {
        (Limit::Fixed(last), Signedness::Unsigned) => builtin_args(program, index, BuiltinFn::Min)
            .is_some_and(|args| args.len() == 2 && literal_u32(program, args[1]) == Some(last)),
        (Limit::Fixed(last), Signedness::Signed) => builtin_args(program, index, BuiltinFn::Clamp)
            .is_some_and(|args| {
                args.len() == 3
                    && literal_u32(program, args[1]) == Some(0)
                    && literal_u32(program, args[2]) == Some(last)
            }),
        (Limit::Runtime, _) => builtin_args(program, index, BuiltinFn::Min).is_some_and(|args| {
            args.len() == 2
                && matches!(
                    program.expr(args[1]),
                    Expr::Binary { op: BinaryOp::Subtract, lhs, rhs }
                        if builtin_args(program, *lhs, BuiltinFn::ArrayLength).is_some()
                            && literal_u32(program, *rhs) == Some(1)
                )
        }),
    }
}

fn has_call(program: &Program, e: ExprId) -> bool {
    match program.expr(e) {
        Expr::Call { .. } => true,
        Expr::Literal(_) | Expr::Ident(_) => false,
        Expr::Member { object, .. } | Expr::Unary { expr: object, .. } => has_call(program, *object),
        Expr::Index { object, index } => has_call(program, *object) || has_call(program, *index),
        Expr::Binary { lhs, rhs, .. } => has_call(program, *lhs) || has_call(program, *rhs),
    }
}

fn unclamped(program: &Program, access: ExprId, why: &str) -> Diagnostic {
    let d = Diagnostic::warning(System::Transform, format!("index left unclamped: {}", why));
    match program.expr_span(access) {
        Some(span) => d.with_span(span),
        None => d,
    }
}
