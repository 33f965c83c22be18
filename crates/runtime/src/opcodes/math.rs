//! Base and extended math handlers. All operands coerce through the
//! number table; null coerces to NaN, which then propagates.

use sylva_tree::NodeId;

use crate::interpreter::Interpreter;
use crate::opcodes::{number_result, operands};
use crate::value::Eval;

pub(crate) fn op_add(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut sum = 0.0;
    for op in ops {
        sum += it.interpret_into_number(Some(op));
    }
    number_result(it, sum, immediate)
}

pub(crate) fn op_subtract(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    if ops.is_empty() {
        return number_result(it, f64::NAN, immediate);
    }
    let first = it.interpret_into_number(Some(ops[0]));
    if ops.len() == 1 {
        return number_result(it, -first, immediate);
    }
    let mut value = first;
    for &op in &ops[1..] {
        value -= it.interpret_into_number(Some(op));
    }
    number_result(it, value, immediate)
}

pub(crate) fn op_multiply(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let mut product = 1.0;
    for op in ops {
        product *= it.interpret_into_number(Some(op));
    }
    number_result(it, product, immediate)
}

pub(crate) fn op_divide(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    if ops.is_empty() {
        return number_result(it, f64::NAN, immediate);
    }
    let first = it.interpret_into_number(Some(ops[0]));
    if ops.len() == 1 {
        return number_result(it, 1.0 / first, immediate);
    }
    let mut value = first;
    for &op in &ops[1..] {
        value /= it.interpret_into_number(Some(op));
    }
    number_result(it, value, immediate)
}

pub(crate) fn op_modulus(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    if ops.is_empty() {
        return number_result(it, f64::NAN, immediate);
    }
    let mut value = it.interpret_into_number(Some(ops[0]));
    for &op in &ops[1..] {
        value %= it.interpret_into_number(Some(op));
    }
    number_result(it, value, immediate)
}

pub(crate) fn op_get_digits(it: &mut Interpreter, node: NodeId, _immediate: bool) -> Eval {
    let ops = operands(it, node);
    let value = it.interpret_into_number(ops.first().copied());
    let list = it.pool_mut().alloc(sylva_tree::Opcode::List);
    if value.is_finite() {
        let mut remaining = value.abs().trunc() as u64;
        let mut digits = Vec::new();
        loop {
            digits.push((remaining % 10) as f64);
            remaining /= 10;
            if remaining == 0 {
                break;
            }
        }
        for digit in digits.into_iter().rev() {
            let d = it.pool_mut().alloc_number(digit);
            it.pool_mut().append_child(list, d);
        }
    }
    Eval::Value(crate::value::ValueRef::node(list, true))
}

pub(crate) fn op_set_digits(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let base = it.interpret_into_number(ops.first().copied());
    let digits = it.interpret_node_ref(ops.get(1).copied());
    let Some(id) = digits.id else {
        return number_result(it, base, immediate);
    };
    let mut value = 0.0;
    for child in it.pool().children(id) {
        let digit = sylva_tree::tree_ops::node_to_number(it.pool(), Some(child));
        if !digit.is_finite() {
            continue;
        }
        value = value * 10.0 + digit.trunc();
    }
    if base.is_sign_negative() {
        value = -value;
    }
    it.pool_mut().free_tree_if_possible(digits);
    number_result(it, value, immediate)
}

/// Unary math handler over the first operand.
fn unary(
    it: &mut Interpreter,
    node: NodeId,
    immediate: bool,
    f: impl FnOnce(f64) -> f64,
) -> Eval {
    let ops = operands(it, node);
    let value = it.interpret_into_number(ops.first().copied());
    number_result(it, f(value), immediate)
}

pub(crate) fn op_floor(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::floor)
}

pub(crate) fn op_ceiling(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::ceil)
}

pub(crate) fn op_round(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::round)
}

pub(crate) fn op_exponent(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::exp)
}

pub(crate) fn op_log(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let value = it.interpret_into_number(ops.first().copied());
    let result = match ops.get(1) {
        Some(&base_op) => {
            let base = it.interpret_into_number(Some(base_op));
            value.log(base)
        }
        None => value.ln(),
    };
    number_result(it, result, immediate)
}

pub(crate) fn op_sin(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::sin)
}

pub(crate) fn op_asin(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::asin)
}

pub(crate) fn op_cos(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::cos)
}

pub(crate) fn op_acos(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::acos)
}

pub(crate) fn op_tan(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::tan)
}

pub(crate) fn op_atan(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let y = it.interpret_into_number(ops.first().copied());
    let result = match ops.get(1) {
        Some(&x_op) => {
            let x = it.interpret_into_number(Some(x_op));
            y.atan2(x)
        }
        None => y.atan(),
    };
    number_result(it, result, immediate)
}

pub(crate) fn op_sinh(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::sinh)
}

pub(crate) fn op_asinh(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::asinh)
}

pub(crate) fn op_cosh(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::cosh)
}

pub(crate) fn op_acosh(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::acosh)
}

pub(crate) fn op_tanh(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::tanh)
}

pub(crate) fn op_atanh(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::atanh)
}

pub(crate) fn op_erf(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, erf)
}

/// Abramowitz & Stegun 7.1.26 approximation; max absolute error 1.5e-7.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let y = 1.0
        - (((((1.061405429 * t - 1.453152027) * t) + 1.421413741) * t - 0.284496736) * t
            + 0.254829592)
            * t
            * (-x * x).exp();
    sign * y
}

pub(crate) fn op_tgamma(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, tgamma)
}

pub(crate) fn op_lgamma(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, |x| tgamma(x).abs().ln())
}

/// Lanczos approximation of the gamma function.
fn tgamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * tgamma(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut acc = COEFFICIENTS[0];
        for (i, &c) in COEFFICIENTS.iter().enumerate().skip(1) {
            acc += c / (x + i as f64);
        }
        let t = x + G + 0.5;
        (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * acc
    }
}

pub(crate) fn op_sqrt(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::sqrt)
}

pub(crate) fn op_pow(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let base = it.interpret_into_number(ops.first().copied());
    let exponent = it.interpret_into_number(ops.get(1).copied());
    number_result(it, base.powf(exponent), immediate)
}

pub(crate) fn op_abs(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    unary(it, node, immediate, f64::abs)
}

pub(crate) fn op_max(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    fold_extreme(it, node, immediate, f64::max)
}

pub(crate) fn op_min(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    fold_extreme(it, node, immediate, f64::min)
}

fn fold_extreme(
    it: &mut Interpreter,
    node: NodeId,
    immediate: bool,
    f: impl Fn(f64, f64) -> f64,
) -> Eval {
    let ops = operands(it, node);
    let mut result = f64::NAN;
    for op in ops {
        let v = it.interpret_into_number(Some(op));
        if v.is_nan() {
            continue;
        }
        result = if result.is_nan() { v } else { f(result, v) };
    }
    number_result(it, result, immediate)
}

pub(crate) fn op_dot_product(it: &mut Interpreter, node: NodeId, immediate: bool) -> Eval {
    let ops = operands(it, node);
    let a = it.interpret_node_ref(ops.first().copied());
    if let Some(a_id) = a.id {
        it.pin(a_id);
    }
    let b = it.interpret_node_ref(ops.get(1).copied());
    if a.id.is_some() {
        it.unpin(1);
    }
    let (Some(a_id), Some(b_id)) = (a.id, b.id) else {
        return number_result(it, f64::NAN, immediate);
    };
    let xs = it.pool().children(a_id);
    let ys = it.pool().children(b_id);
    let mut sum = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        sum += sylva_tree::tree_ops::node_to_number(it.pool(), Some(*x))
            * sylva_tree::tree_ops::node_to_number(it.pool(), Some(*y));
    }
    it.pool_mut().free_tree_if_possible(a);
    it.pool_mut().free_tree_if_possible(b);
    number_result(it, sum, immediate)
}
