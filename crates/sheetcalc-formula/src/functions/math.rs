//! Math and aggregate functions

use super::{numeric_args, scalar_arg};
use crate::error::FormulaResult;
use crate::evaluator::FormulaValue;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// SUM function
pub fn fn_sum(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(numeric_args(args).sum()))
}

/// AVERAGE function (0 when there is nothing to average)
pub fn fn_average(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    let (sum, count) = numeric_args(args).fold((0.0, 0usize), |(sum, count), n| (sum + n, count + 1));

    if count == 0 {
        Ok(FormulaValue::Number(0.0))
    } else {
        Ok(FormulaValue::Number(sum / count as f64))
    }
}

/// MIN function (0 when empty)
pub fn fn_min(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(
        numeric_args(args).reduce(f64::min).unwrap_or(0.0),
    ))
}

/// MAX function (0 when empty)
pub fn fn_max(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(
        numeric_args(args).reduce(f64::max).unwrap_or(0.0),
    ))
}

/// COUNT function
pub fn fn_count(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(numeric_args(args).count() as f64))
}

/// ABS function
pub fn fn_abs(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    Ok(FormulaValue::Number(scalar_arg(args, 0, "ABS")?.abs()))
}

/// ROUND(number, [num_digits]) - Rounds a number to a specified number of digits
///
/// Half away from zero on the decimal representation, so ROUND(2.345, 2) is
/// 2.35 even though the nearest double to 2.345 lies just below it. Negative
/// digits round to the left of the decimal point: ROUND(1234, -2) is 1200.
pub fn fn_round(args: &[FormulaValue]) -> FormulaResult<FormulaValue> {
    let number = scalar_arg(args, 0, "ROUND")?;
    let num_digits = scalar_arg(args, 1, "ROUND")?.trunc();

    // Beyond these the result is the input (or zero) at f64 precision
    let num_digits = num_digits.clamp(-308.0, 308.0) as i32;

    Ok(FormulaValue::Number(round_half_away_from_zero(
        number, num_digits,
    )))
}

pub(crate) fn round_half_away_from_zero(number: f64, num_digits: i32) -> f64 {
    if num_digits < 0 {
        let factor = 10_f64.powi(-num_digits);
        return round_half_away_from_zero(number / factor, 0) * factor;
    }

    // Decimal carries at most 28 fractional digits
    let dp = num_digits.min(28) as u32;
    Decimal::from_str(&number.to_string())
        .ok()
        .and_then(|d| {
            d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
                .to_string()
                .parse::<f64>()
                .ok()
        })
        .unwrap_or_else(|| float_round(number, num_digits))
}

/// Multiplier rounding for values outside the Decimal range
fn float_round(number: f64, num_digits: i32) -> f64 {
    let multiplier = 10_f64.powi(num_digits);
    if !multiplier.is_finite() {
        return number;
    }
    let result = if number >= 0.0 {
        (number * multiplier + 0.5).floor() / multiplier
    } else {
        (number * multiplier - 0.5).ceil() / multiplier
    };
    if result.is_finite() {
        result
    } else {
        number
    }
}
