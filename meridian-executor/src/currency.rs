//! Fixed-point currency arithmetic for contracts
//!
//! Monetary math inside the sandbox goes through `rust_decimal`; binary
//! floating point never touches an amount. Amounts cross the sandbox
//! boundary as strings, and every operation takes an explicit precision.

use std::str::FromStr;

use rhai::{EvalAltResult, Module};
use rust_decimal::{Decimal, RoundingStrategy};

fn parse(amount: &str) -> Result<Decimal, Box<EvalAltResult>> {
    Decimal::from_str(amount.trim())
        .map_err(|e| format!("invalid amount '{amount}': {e}").into())
}

fn format(amount: Decimal, precision: i64) -> Result<String, Box<EvalAltResult>> {
    if !(0..=28).contains(&precision) {
        return Err(format!("invalid precision {precision}").into());
    }
    let rounded = amount.round_dp_with_strategy(
        precision as u32,
        RoundingStrategy::MidpointAwayFromZero,
    );
    Ok(format!("{rounded:.prec$}", prec = precision as usize))
}

/// Build the `currency` module registered into every sandbox.
pub fn currency_module() -> Module {
    let mut module = Module::new();

    module.set_native_fn("add", |a: &str, b: &str, precision: i64| {
        format(parse(a)? + parse(b)?, precision)
    });
    module.set_native_fn("sub", |a: &str, b: &str, precision: i64| {
        format(parse(a)? - parse(b)?, precision)
    });
    module.set_native_fn("mul", |a: &str, b: &str, precision: i64| {
        format(parse(a)? * parse(b)?, precision)
    });
    module.set_native_fn("div", |a: &str, b: &str, precision: i64| {
        let divisor = parse(b)?;
        if divisor.is_zero() {
            return Err("division by zero".into());
        }
        format(parse(a)? / divisor, precision)
    });
    module.set_native_fn("round", |a: &str, precision: i64| {
        format(parse(a)?, precision)
    });
    module.set_native_fn("cmp", |a: &str, b: &str| -> Result<i64, Box<EvalAltResult>> {
        Ok(match parse(a)?.cmp(&parse(b)?) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        })
    });

    module
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_requested_precision() {
        assert_eq!(format(parse("1.5").unwrap() + parse("2.3").unwrap(), 3).unwrap(), "3.800");
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(format(parse("0.125").unwrap(), 2).unwrap(), "0.13");
        assert_eq!(format(parse("-0.125").unwrap(), 2).unwrap(), "-0.13");
    }

    #[test]
    fn zero_precision_formats_integers() {
        assert_eq!(format(parse("5.4").unwrap(), 0).unwrap(), "5");
    }

    #[test]
    fn bad_amounts_are_rejected() {
        assert!(parse("not a number").is_err());
        assert!(format(Decimal::ONE, 99).is_err());
    }
}
