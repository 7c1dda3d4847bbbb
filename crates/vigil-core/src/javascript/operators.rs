//! Operator semantics over known scalars.

use std::cmp::Ordering;

use swc_ecma_ast::BinaryOp;

use super::value::{Literal, MAX_STRING_LEN};

const TWO_32: f64 = 4_294_967_296.0;
const TWO_31: f64 = 2_147_483_648.0;

/// Applies a non-short-circuiting binary operator. Returns `None` for
/// operators whose result depends on more than the two scalars.
pub fn binary(op: BinaryOp, left: &Literal, right: &Literal) -> Option<Literal> {
    let numeric = |apply: fn(f64, f64) -> f64| {
        Some(Literal::Number(apply(left.to_number(), right.to_number())))
    };
    let int32 = |apply: fn(i32, u32) -> f64| {
        Some(Literal::Number(apply(
            to_int32(left.to_number()),
            to_uint32(right.to_number()),
        )))
    };
    let ordered = |accept: fn(Ordering) -> bool| {
        Some(Literal::Bool(compare(left, right).is_some_and(accept)))
    };

    match op {
        BinaryOp::Add => add(left, right),
        BinaryOp::Sub => numeric(|a, b| a - b),
        BinaryOp::Mul => numeric(|a, b| a * b),
        BinaryOp::Div => numeric(|a, b| a / b),
        BinaryOp::Mod => numeric(|a, b| a % b),
        BinaryOp::Exp => numeric(f64::powf),
        BinaryOp::BitAnd => int32(|a, b| f64::from(a & b as i32)),
        BinaryOp::BitOr => int32(|a, b| f64::from(a | b as i32)),
        BinaryOp::BitXor => int32(|a, b| f64::from(a ^ b as i32)),
        BinaryOp::LShift => int32(|a, b| f64::from(a.wrapping_shl(b & 31))),
        BinaryOp::RShift => int32(|a, b| f64::from(a.wrapping_shr(b & 31))),
        BinaryOp::ZeroFillRShift => Some(Literal::Number(f64::from(
            to_uint32(left.to_number()) >> (to_uint32(right.to_number()) & 31),
        ))),
        BinaryOp::EqEqEq => Some(Literal::Bool(strict_equals(left, right))),
        BinaryOp::NotEqEq => Some(Literal::Bool(!strict_equals(left, right))),
        BinaryOp::EqEq => Some(Literal::Bool(loose_equals(left, right))),
        BinaryOp::NotEq => Some(Literal::Bool(!loose_equals(left, right))),
        BinaryOp::Lt => ordered(|o| o == Ordering::Less),
        BinaryOp::LtEq => ordered(|o| o != Ordering::Greater),
        BinaryOp::Gt => ordered(|o| o == Ordering::Greater),
        BinaryOp::GtEq => ordered(|o| o != Ordering::Less),
        BinaryOp::In
        | BinaryOp::InstanceOf
        | BinaryOp::LogicalAnd
        | BinaryOp::LogicalOr
        | BinaryOp::NullishCoalescing => None,
    }
}

/// Concatenations longer than [`MAX_STRING_LEN`] are not modeled.
fn add(left: &Literal, right: &Literal) -> Option<Literal> {
    match (left, right) {
        (Literal::String(_), _) | (_, Literal::String(_)) => {
            let (left, right) = (left.to_js_string(), right.to_js_string());
            (left.len() + right.len() <= MAX_STRING_LEN).then(|| Literal::String(left + right.as_str()))
        }
        _ => Some(Literal::Number(left.to_number() + right.to_number())),
    }
}

fn compare(left: &Literal, right: &Literal) -> Option<Ordering> {
    match (left, right) {
        (Literal::String(a), Literal::String(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

pub fn strict_equals(left: &Literal, right: &Literal) -> bool {
    match (left, right) {
        (Literal::Undefined, Literal::Undefined) | (Literal::Null, Literal::Null) => true,
        (Literal::Bool(a), Literal::Bool(b)) => a == b,
        (Literal::Number(a), Literal::Number(b)) => a == b,
        (Literal::String(a), Literal::String(b)) => a == b,
        _ => false,
    }
}

pub fn loose_equals(left: &Literal, right: &Literal) -> bool {
    let nullish = |l: &Literal| matches!(l, Literal::Undefined | Literal::Null);
    match (nullish(left), nullish(right)) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) if std::mem::discriminant(left) == std::mem::discriminant(right) => {
            strict_equals(left, right)
        }
        (false, false) => left.to_number() == right.to_number(),
    }
}

/// `ToInt32`.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(TWO_32);
    if wrapped >= TWO_31 {
        (wrapped - TWO_32) as i32
    } else {
        wrapped as i32
    }
}

/// `ToUint32`.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(TWO_32) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Literal {
        Literal::Number(n)
    }

    fn string(s: &str) -> Literal {
        Literal::String(s.to_string())
    }

    #[test]
    fn addition_concatenates_when_either_side_is_a_string() {
        assert_eq!(binary(BinaryOp::Add, &string("a"), &num(1.0)), Some(string("a1")));
        assert_eq!(binary(BinaryOp::Add, &num(1.0), &num(2.0)), Some(num(3.0)));
        assert_eq!(
            binary(BinaryOp::Add, &Literal::Bool(true), &Literal::Null),
            Some(num(1.0))
        );
    }

    #[test]
    fn oversized_concatenation_is_not_modeled() {
        let half = string(&"x".repeat(MAX_STRING_LEN / 2));
        assert_eq!(
            binary(BinaryOp::Add, &half, &half),
            Some(string(&"x".repeat(MAX_STRING_LEN)))
        );
        assert_eq!(binary(BinaryOp::Add, &half, &string(&"x".repeat(MAX_STRING_LEN / 2 + 1))), None);
    }

    #[test]
    fn bitwise_operators_use_32_bit_integers() {
        assert_eq!(binary(BinaryOp::BitOr, &num(4_294_967_297.0), &num(0.0)), Some(num(1.0)));
        assert_eq!(binary(BinaryOp::LShift, &num(1.0), &num(33.0)), Some(num(2.0)));
        assert_eq!(binary(BinaryOp::ZeroFillRShift, &num(-1.0), &num(0.0)), Some(num(4_294_967_295.0)));
        assert_eq!(to_int32(f64::NAN), 0);
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
    }

    #[test]
    fn equality_follows_coercion_rules() {
        assert!(loose_equals(&Literal::Null, &Literal::Undefined));
        assert!(!strict_equals(&Literal::Null, &Literal::Undefined));
        assert!(loose_equals(&string("1"), &num(1.0)));
        assert!(!loose_equals(&num(f64::NAN), &num(f64::NAN)));
        assert!(!loose_equals(&Literal::Null, &num(0.0)));
    }

    #[test]
    fn comparisons_with_nan_are_false() {
        assert_eq!(binary(BinaryOp::Lt, &num(f64::NAN), &num(1.0)), Some(Literal::Bool(false)));
        assert_eq!(binary(BinaryOp::GtEq, &num(f64::NAN), &num(1.0)), Some(Literal::Bool(false)));
        assert_eq!(binary(BinaryOp::Lt, &string("a"), &string("b")), Some(Literal::Bool(true)));
    }

    #[test]
    fn membership_is_not_modeled() {
        assert_eq!(binary(BinaryOp::In, &string("a"), &num(1.0)), None);
    }
}
