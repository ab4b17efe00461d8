//! Constant-folding evaluator: reduces a pure expression tree to a single
//! [`ConstantValue`] when every leaf resolves to a constant.
//!
//! Grounded in `AstEvaluator.cpp`'s visitor: type promotion always widens
//! toward float, then toward signed, and vector/scalar mixes broadcast the
//! scalar. Anything impure (increment/decrement, `sample`, user function
//! calls, an unresolved variable) makes the whole subtree non-constant.

use std::collections::HashMap;

use crate::ast::{BinaryOp, BuiltInFunction, ConstantValue, Expression, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum NumKind {
    U32,
    I32,
    F32,
}

fn value_kind(v: &ConstantValue) -> Option<(NumKind, usize)> {
    use ConstantValue::*;
    Some(match v {
        U32(_) => (NumKind::U32, 1),
        I32(_) => (NumKind::I32, 1),
        F32(_) => (NumKind::F32, 1),
        Vec2U(_) => (NumKind::U32, 2),
        Vec3U(_) => (NumKind::U32, 3),
        Vec4U(_) => (NumKind::U32, 4),
        Vec2I(_) => (NumKind::I32, 2),
        Vec3I(_) => (NumKind::I32, 3),
        Vec4I(_) => (NumKind::I32, 4),
        Vec2F(_) => (NumKind::F32, 2),
        Vec3F(_) => (NumKind::F32, 3),
        Vec4F(_) => (NumKind::F32, 4),
        Bool(_) => return None,
    })
}

fn extract_f64(v: &ConstantValue, broadcast_to: usize) -> Option<Vec<f64>> {
    use ConstantValue::*;
    let raw: Vec<f64> = match v {
        U32(x) => vec![*x as f64],
        I32(x) => vec![*x as f64],
        F32(x) => vec![*x as f64],
        Vec2U(a) => a.iter().map(|x| *x as f64).collect(),
        Vec3U(a) => a.iter().map(|x| *x as f64).collect(),
        Vec4U(a) => a.iter().map(|x| *x as f64).collect(),
        Vec2I(a) => a.iter().map(|x| *x as f64).collect(),
        Vec3I(a) => a.iter().map(|x| *x as f64).collect(),
        Vec4I(a) => a.iter().map(|x| *x as f64).collect(),
        Vec2F(a) => a.iter().map(|x| *x as f64).collect(),
        Vec3F(a) => a.iter().map(|x| *x as f64).collect(),
        Vec4F(a) => a.iter().map(|x| *x as f64).collect(),
        Bool(_) => return None,
    };
    if raw.len() == broadcast_to {
        Some(raw)
    } else if raw.len() == 1 {
        Some(vec![raw[0]; broadcast_to])
    } else {
        None
    }
}

fn build_value(kind: NumKind, comps: &[f64]) -> ConstantValue {
    use ConstantValue::*;
    match (kind, comps.len()) {
        (NumKind::U32, 1) => U32(comps[0] as u32),
        (NumKind::I32, 1) => I32(comps[0] as i32),
        (NumKind::F32, 1) => F32(comps[0] as f32),
        (NumKind::U32, 2) => Vec2U([comps[0] as u32, comps[1] as u32]),
        (NumKind::U32, 3) => Vec3U([comps[0] as u32, comps[1] as u32, comps[2] as u32]),
        (NumKind::U32, 4) => Vec4U([comps[0] as u32, comps[1] as u32, comps[2] as u32, comps[3] as u32]),
        (NumKind::I32, 2) => Vec2I([comps[0] as i32, comps[1] as i32]),
        (NumKind::I32, 3) => Vec3I([comps[0] as i32, comps[1] as i32, comps[2] as i32]),
        (NumKind::I32, 4) => Vec4I([comps[0] as i32, comps[1] as i32, comps[2] as i32, comps[3] as i32]),
        (NumKind::F32, 2) => Vec2F([comps[0] as f32, comps[1] as f32]),
        (NumKind::F32, 3) => Vec3F([comps[0] as f32, comps[1] as f32, comps[2] as f32]),
        (NumKind::F32, 4) => Vec4F([comps[0] as f32, comps[1] as f32, comps[2] as f32, comps[3] as f32]),
        _ => unreachable!("component count is always 1..=4"),
    }
}

/// Fold `expr` to a constant value, resolving bare variables against `bindings`.
/// Returns `None` if any leaf is unresolved or any interior node is impure.
pub fn evaluate(expr: &Expression, bindings: &HashMap<String, ConstantValue>) -> Option<ConstantValue> {
    match expr {
        Expression::Constant(v) => Some(v.clone()),
        Expression::Variable(name) => bindings.get(name).cloned(),
        Expression::AccessIndex { base, index } => {
            let base = evaluate(base, bindings)?;
            let index = evaluate(index, bindings)?;
            let (kind, count) = value_kind(&base)?;
            let idx = match index {
                ConstantValue::I32(i) => i as usize,
                ConstantValue::U32(i) => i as usize,
                _ => return None,
            };
            if idx >= count {
                return None;
            }
            let comps = extract_f64(&base, count)?;
            Some(build_value(kind, &[comps[idx]]))
        }
        // No struct-typed constant literal exists in this AST, so a plain
        // field access never resolves to a constant.
        Expression::AccessIdentifier { .. } => None,
        Expression::Swizzle { base, components } => {
            let base = evaluate(base, bindings)?;
            let (kind, count) = value_kind(&base)?;
            let comps = extract_f64(&base, count)?;
            let mut out = Vec::with_capacity(components.len());
            for c in components {
                let i = c.index();
                if i >= count {
                    return None;
                }
                out.push(comps[i]);
            }
            Some(build_value(kind, &out))
        }
        // Assignment mutates; not a pure expression.
        Expression::Assignment { .. } => None,
        Expression::Unary { op, operand } => evaluate_unary(*op, operand, bindings),
        Expression::Binary { op, lhs, rhs } => evaluate_binary(*op, lhs, rhs, bindings),
        Expression::FunctionCall { .. } => None,
        Expression::BuiltInFunctionCall { function, args } => evaluate_builtin(function, args, bindings),
        Expression::Cast { target, args } => evaluate_cast(target, args, bindings),
        Expression::Ternary { condition, then_branch, else_branch } => {
            let cond = evaluate(condition, bindings)?;
            let cond = match cond {
                ConstantValue::Bool(b) => b,
                _ => return None,
            };
            let then_val = evaluate(then_branch, bindings)?;
            let else_val = evaluate(else_branch, bindings)?;
            let selected = if cond { then_val } else { else_val };
            // Promotion applies to the branch types even though only one
            // branch's value is produced.
            if let (Some((lk, lc)), Some((rk, rc))) = (value_kind(&then_val), value_kind(&else_val)) {
                if lc == rc {
                    let kind = lk.max(rk);
                    let comps = extract_f64(&selected, lc)?;
                    return Some(build_value(kind, &comps));
                }
            }
            Some(selected)
        }
    }
}

fn evaluate_unary(op: UnaryOp, operand: &Expression, bindings: &HashMap<String, ConstantValue>) -> Option<ConstantValue> {
    let value = evaluate(operand, bindings)?;
    match op {
        UnaryOp::PreIncrement | UnaryOp::PreDecrement | UnaryOp::PostIncrement | UnaryOp::PostDecrement => None,
        UnaryOp::Not => match value {
            ConstantValue::Bool(b) => Some(ConstantValue::Bool(!b)),
            _ => None,
        },
        UnaryOp::Plus => {
            let (kind, count) = value_kind(&value)?;
            let comps = extract_f64(&value, count)?;
            Some(build_value(kind, &comps))
        }
        UnaryOp::Negate => {
            let (kind, count) = value_kind(&value)?;
            let comps = extract_f64(&value, count)?;
            let negated: Vec<f64> = comps.iter().map(|v| -v).collect();
            // Unsigned negation yields a signed result.
            let result_kind = if kind == NumKind::U32 { NumKind::I32 } else { kind };
            Some(build_value(result_kind, &negated))
        }
    }
}

fn evaluate_binary(
    op: BinaryOp,
    lhs: &Expression,
    rhs: &Expression,
    bindings: &HashMap<String, ConstantValue>,
) -> Option<ConstantValue> {
    let lval = evaluate(lhs, bindings)?;
    let rval = evaluate(rhs, bindings)?;

    if op.is_logical() {
        return match (lval, rval) {
            (ConstantValue::Bool(a), ConstantValue::Bool(b)) => {
                Some(ConstantValue::Bool(if op == BinaryOp::And { a && b } else { a || b }))
            }
            _ => None,
        };
    }

    if op == BinaryOp::Equal || op == BinaryOp::NotEqual {
        if let (ConstantValue::Bool(a), ConstantValue::Bool(b)) = (&lval, &rval) {
            let eq = a == b;
            return Some(ConstantValue::Bool(if op == BinaryOp::Equal { eq } else { !eq }));
        }
    }

    let (lk, lc) = value_kind(&lval)?;
    let (rk, rc) = value_kind(&rval)?;
    let count = if lc == rc {
        lc
    } else if lc == 1 {
        rc
    } else if rc == 1 {
        lc
    } else {
        return None;
    };
    let kind = lk.max(rk);
    let lcomps = extract_f64(&lval, count)?;
    let rcomps = extract_f64(&rval, count)?;

    if op.is_comparison() {
        // Ordering comparisons only make sense on scalars; equality/inequality
        // fold component-wise over vectors into a single bool.
        return match op {
            BinaryOp::Less | BinaryOp::Greater | BinaryOp::LessEqual | BinaryOp::GreaterEqual if count != 1 => None,
            BinaryOp::Less => Some(ConstantValue::Bool(lcomps[0] < rcomps[0])),
            BinaryOp::Greater => Some(ConstantValue::Bool(lcomps[0] > rcomps[0])),
            BinaryOp::LessEqual => Some(ConstantValue::Bool(lcomps[0] <= rcomps[0])),
            BinaryOp::GreaterEqual => Some(ConstantValue::Bool(lcomps[0] >= rcomps[0])),
            BinaryOp::Equal => Some(ConstantValue::Bool(lcomps.iter().zip(&rcomps).all(|(a, b)| a == b))),
            BinaryOp::NotEqual => Some(ConstantValue::Bool(lcomps.iter().zip(&rcomps).any(|(a, b)| a != b))),
            _ => None,
        };
    }

    let is_bitwise = matches!(
        op,
        BinaryOp::BitXor | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::ShiftLeft | BinaryOp::ShiftRight
    );
    if is_bitwise && kind == NumKind::F32 {
        return None;
    }

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let a = lcomps[i];
        let b = rcomps[i];
        let r = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Power => a.powf(b),
            BinaryOp::Modulo => {
                if kind == NumKind::F32 {
                    a - b * (a / b).floor()
                } else {
                    ((a as i64) % (b as i64)) as f64
                }
            }
            BinaryOp::BitXor => ((a as i64) ^ (b as i64)) as f64,
            BinaryOp::BitAnd => ((a as i64) & (b as i64)) as f64,
            BinaryOp::BitOr => ((a as i64) | (b as i64)) as f64,
            BinaryOp::ShiftLeft => ((a as i64) << (b as i64)) as f64,
            BinaryOp::ShiftRight => ((a as i64) >> (b as i64)) as f64,
            _ => unreachable!("comparisons and logical ops handled above"),
        };
        out.push(r);
    }
    Some(build_value(kind, &out))
}

fn evaluate_cast(target: &crate::ast::Type, args: &[Expression], bindings: &HashMap<String, ConstantValue>) -> Option<ConstantValue> {
    use crate::ast::{PrimitiveType, Type};
    let mut comps = Vec::with_capacity(4);
    for arg in args {
        let v = evaluate(arg, bindings)?;
        let (_, c) = value_kind(&v)?;
        comps.extend(extract_f64(&v, c)?);
    }
    match target {
        Type::Primitive(p) => {
            if comps.len() != 1 {
                return None;
            }
            Some(scalar_from_primitive(*p, comps[0]))
        }
        Type::Vector { component, size } => {
            if comps.len() != *size as usize {
                return None;
            }
            let kind = match component {
                PrimitiveType::Bool => return None,
                PrimitiveType::I32 => NumKind::I32,
                PrimitiveType::U32 => NumKind::U32,
                PrimitiveType::F32 => NumKind::F32,
            };
            Some(build_value(kind, &comps))
        }
        _ => None,
    }
}

fn scalar_from_primitive(p: crate::ast::PrimitiveType, v: f64) -> ConstantValue {
    use crate::ast::PrimitiveType::*;
    match p {
        Bool => ConstantValue::Bool(v != 0.0),
        I32 => ConstantValue::I32(v as i32),
        U32 => ConstantValue::U32(v as u32),
        F32 => ConstantValue::F32(v as f32),
    }
}

fn evaluate_builtin(
    function: &BuiltInFunction,
    args: &[Expression],
    bindings: &HashMap<String, ConstantValue>,
) -> Option<ConstantValue> {
    let values: Vec<ConstantValue> = args.iter().map(|a| evaluate(a, bindings)).collect::<Option<_>>()?;
    match function {
        BuiltInFunction::Min | BuiltInFunction::Max => {
            let [a, b] = <[ConstantValue; 2]>::try_from(values).ok()?;
            let (lk, lc) = value_kind(&a)?;
            let (rk, rc) = value_kind(&b)?;
            if lc != rc {
                return None;
            }
            let kind = lk.max(rk);
            let av = extract_f64(&a, lc)?;
            let bv = extract_f64(&b, lc)?;
            let out: Vec<f64> = av
                .iter()
                .zip(&bv)
                .map(|(x, y)| if matches!(function, BuiltInFunction::Min) { x.min(*y) } else { x.max(*y) })
                .collect();
            Some(build_value(kind, &out))
        }
        BuiltInFunction::Abs => {
            let [a] = <[ConstantValue; 1]>::try_from(values).ok()?;
            let (kind, count) = value_kind(&a)?;
            let v = extract_f64(&a, count)?;
            Some(build_value(kind, &v.iter().map(|x| x.abs()).collect::<Vec<_>>()))
        }
        BuiltInFunction::Dot => {
            let [a, b] = <[ConstantValue; 2]>::try_from(values).ok()?;
            let (_, lc) = value_kind(&a)?;
            let (_, rc) = value_kind(&b)?;
            if lc != rc {
                return None;
            }
            let av = extract_f64(&a, lc)?;
            let bv = extract_f64(&b, lc)?;
            let sum: f64 = av.iter().zip(&bv).map(|(x, y)| x * y).sum();
            Some(ConstantValue::F32(sum as f32))
        }
        BuiltInFunction::Cross => {
            let [a, b] = <[ConstantValue; 2]>::try_from(values).ok()?;
            let av = extract_f64(&a, 3)?;
            let bv = extract_f64(&b, 3)?;
            let r = [
                av[1] * bv[2] - av[2] * bv[1],
                av[2] * bv[0] - av[0] * bv[2],
                av[0] * bv[1] - av[1] * bv[0],
            ];
            Some(ConstantValue::Vec3F([r[0] as f32, r[1] as f32, r[2] as f32]))
        }
        BuiltInFunction::Length => {
            let [a] = <[ConstantValue; 1]>::try_from(values).ok()?;
            let (_, count) = value_kind(&a)?;
            let v = extract_f64(&a, count)?;
            let sum: f64 = v.iter().map(|x| x * x).sum();
            Some(ConstantValue::F32(sum.sqrt() as f32))
        }
        BuiltInFunction::Pow => {
            let [a, b] = <[ConstantValue; 2]>::try_from(values).ok()?;
            let (kind, count) = value_kind(&a)?;
            let av = extract_f64(&a, count)?;
            let bv = extract_f64(&b, count)?;
            let out: Vec<f64> = av.iter().zip(&bv).map(|(x, y)| x.powf(*y)).collect();
            Some(build_value(kind, &out))
        }
        BuiltInFunction::Sqrt | BuiltInFunction::Floor | BuiltInFunction::Ceil => {
            let [a] = <[ConstantValue; 1]>::try_from(values).ok()?;
            let (_, count) = value_kind(&a)?;
            let v = extract_f64(&a, count)?;
            let out: Vec<f64> = v
                .iter()
                .map(|x| match function {
                    BuiltInFunction::Sqrt => x.sqrt(),
                    BuiltInFunction::Floor => x.floor(),
                    _ => x.ceil(),
                })
                .collect();
            Some(build_value(NumKind::F32, &out))
        }
        BuiltInFunction::Clamp => {
            let [a, lo, hi] = <[ConstantValue; 3]>::try_from(values).ok()?;
            let (kind, count) = value_kind(&a)?;
            let av = extract_f64(&a, count)?;
            let lov = extract_f64(&lo, count)?;
            let hiv = extract_f64(&hi, count)?;
            let out: Vec<f64> = av.iter().zip(&lov).zip(&hiv).map(|((x, l), h)| x.max(*l).min(*h)).collect();
            Some(build_value(kind, &out))
        }
        BuiltInFunction::Mix => {
            let [a, b, t] = <[ConstantValue; 3]>::try_from(values).ok()?;
            let (_, count) = value_kind(&a)?;
            let av = extract_f64(&a, count)?;
            let bv = extract_f64(&b, count)?;
            let tv = extract_f64(&t, count)?;
            let out: Vec<f64> = av.iter().zip(&bv).zip(&tv).map(|((x, y), s)| x + s * (y - x)).collect();
            Some(build_value(NumKind::F32, &out))
        }
        // Not pure: reads external texture state / writes a pipeline output.
        BuiltInFunction::Sample | BuiltInFunction::SetVertexPosition | BuiltInFunction::Normalize | BuiltInFunction::Distance | BuiltInFunction::Reflect | BuiltInFunction::Other(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Type};

    #[test]
    fn s1_scaled_vector() {
        // (2 + 3) * vec2f(1.0, 2.0) -> vec2f(5.0, 10.0)
        let sum = Expression::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expression::Constant(ConstantValue::I32(2))),
            rhs: Box::new(Expression::Constant(ConstantValue::I32(3))),
        };
        let vec = Expression::Cast {
            target: Type::Vector { component: crate::ast::PrimitiveType::F32, size: 2 },
            args: vec![Expression::Constant(ConstantValue::F32(1.0)), Expression::Constant(ConstantValue::F32(2.0))],
        };
        let expr = Expression::Binary { op: BinaryOp::Multiply, lhs: Box::new(sum), rhs: Box::new(vec) };
        let result = evaluate(&expr, &HashMap::new());
        assert_eq!(result, Some(ConstantValue::Vec2F([5.0, 10.0])));
    }

    #[test]
    fn ternary_with_non_constant_condition_is_none() {
        let expr = Expression::Ternary {
            condition: Box::new(Expression::Variable("unbound".into())),
            then_branch: Box::new(Expression::Constant(ConstantValue::I32(1))),
            else_branch: Box::new(Expression::Constant(ConstantValue::I32(2))),
        };
        assert_eq!(evaluate(&expr, &HashMap::new()), None);
    }

    #[test]
    fn unsigned_negation_yields_signed() {
        let expr = Expression::Unary { op: UnaryOp::Negate, operand: Box::new(Expression::Constant(ConstantValue::U32(5))) };
        assert_eq!(evaluate(&expr, &HashMap::new()), Some(ConstantValue::I32(-5)));
    }

    #[test]
    fn modulo_picks_float_or_integer_rule() {
        let int_mod = Expression::Binary {
            op: BinaryOp::Modulo,
            lhs: Box::new(Expression::Constant(ConstantValue::I32(7))),
            rhs: Box::new(Expression::Constant(ConstantValue::I32(3))),
        };
        assert_eq!(evaluate(&int_mod, &HashMap::new()), Some(ConstantValue::I32(1)));

        let float_mod = Expression::Binary {
            op: BinaryOp::Modulo,
            lhs: Box::new(Expression::Constant(ConstantValue::F32(7.5))),
            rhs: Box::new(Expression::Constant(ConstantValue::F32(2.0))),
        };
        assert_eq!(evaluate(&float_mod, &HashMap::new()), Some(ConstantValue::F32(1.5)));
    }

    #[test]
    fn variable_resolves_through_bindings() {
        let mut bindings = HashMap::new();
        bindings.insert("N".to_string(), ConstantValue::I32(4));
        let expr = Expression::Variable("N".to_string());
        assert_eq!(evaluate(&expr, &bindings), Some(ConstantValue::I32(4)));
    }
}
