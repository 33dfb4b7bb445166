use std::str::FromStr;

use rand::Rng;
use serde_json::{Number, Value};

use crate::{Error, Result};

/// Operators accepted by [`Collection::math`](crate::Collection::math).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
    Mod,
    /// Replaces the value with a uniformly random integer in `[0, operand]`.
    Random,
}

impl FromStr for MathOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s.to_ascii_lowercase().as_str() {
            "+" | "add" | "addition" => MathOp::Add,
            "-" | "sub" | "subtract" => MathOp::Sub,
            "*" | "mult" | "multiply" => MathOp::Mul,
            "/" | "div" | "divide" => MathOp::Div,
            "^" | "exp" | "exponent" => MathOp::Exp,
            "%" | "mod" | "modulo" => MathOp::Mod,
            "rand" | "random" => MathOp::Random,
            _ => return Err(Error::Argument(format!("unknown math operator `{}`", s))),
        };
        Ok(op)
    }
}

impl MathOp {
    pub fn apply(self, base: f64, operand: f64) -> Result<f64> {
        let result = match self {
            MathOp::Add => base + operand,
            MathOp::Sub => base - operand,
            MathOp::Mul => base * operand,
            MathOp::Div => base / operand,
            MathOp::Exp => base.powf(operand),
            MathOp::Mod => base % operand,
            MathOp::Random => {
                if !(operand >= 0.0) || !operand.is_finite() {
                    return Err(Error::Argument(format!(
                        "random upper bound must be a non-negative number, got {}",
                        operand
                    )));
                }
                rand::thread_rng().gen_range(0..=operand.floor() as i64) as f64
            }
        };
        Ok(result)
    }
}

// Integers above this lose precision as f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Converts a math result back into a JSON number. Integral results are stored as integers.
pub fn to_number(n: f64) -> Result<Value> {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Ok(Value::from(n as i64));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| Error::Argument(format!("math result {} is not a finite number", n)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aliases() {
        for alias in ["+", "add", "addition", "ADD"] {
            assert_eq!(alias.parse::<MathOp>().unwrap(), MathOp::Add);
        }
        for alias in ["%", "mod", "modulo"] {
            assert_eq!(alias.parse::<MathOp>().unwrap(), MathOp::Mod);
        }
        assert_eq!("rand".parse::<MathOp>().unwrap(), MathOp::Random);
        assert!(matches!("sqrt".parse::<MathOp>(), Err(Error::Argument(_))));
    }

    #[test]
    fn test_apply() {
        assert_eq!(MathOp::Div.apply(42.0, 2.0).unwrap(), 21.0);
        assert_eq!(MathOp::Exp.apply(2.0, 10.0).unwrap(), 1024.0);
        assert_eq!(MathOp::Mod.apply(26.0, 3.0).unwrap(), 2.0);
        assert_eq!(MathOp::Mod.apply(-7.0, 3.0).unwrap(), -1.0);
    }

    #[test]
    fn test_random_range() {
        for _ in 0..50 {
            let n = MathOp::Random.apply(123.0, 5.0).unwrap();
            assert!((0.0..=5.0).contains(&n));
            assert_eq!(n.fract(), 0.0);
        }
        assert!(MathOp::Random.apply(0.0, -1.0).is_err());
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(21.0).unwrap(), json!(21));
        assert_eq!(to_number(0.5).unwrap(), json!(0.5));
        assert!(to_number(f64::INFINITY).is_err());
        assert!(to_number(f64::NAN).is_err());
    }
}
