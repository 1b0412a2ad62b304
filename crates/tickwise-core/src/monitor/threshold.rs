use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, Symbol};

/// Comparison applied between an observed price and a threshold.
///
/// `Eq` compares the two decimals exactly: `500` matches `500.00` but not
/// `500.001`. Prices carrying more precision than the threshold will rarely
/// match, so prefer `gte`/`lte` for ranges.
///
/// Tokens are matched after trimming and ASCII lowercasing, so `GTE` and
/// `Gte` are accepted as `gte`; the canonical form is always lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Gt,
    Lt,
    Gte,
    Lte,
    Eq,
}

impl Operator {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "gt" => Some(Self::Gt),
            "lt" => Some(Self::Lt),
            "gte" => Some(Self::Gte),
            "lte" => Some(Self::Lte),
            "eq" => Some(Self::Eq),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Gt => "gt",
            Self::Lt => "lt",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::Eq => "eq",
        }
    }

    pub fn holds(self, observed: Decimal, threshold: Decimal) -> bool {
        match self {
            Self::Gt => observed > threshold,
            Self::Lt => observed < threshold,
            Self::Gte => observed >= threshold,
            Self::Lte => observed <= threshold,
            Self::Eq => observed == threshold,
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `TICKER:OPERATOR:VALUE`, e.g. `AAPL:gt:150`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThresholdRule {
    pub symbol: Symbol,
    pub operator: Operator,
    pub value: Decimal,
}

impl ThresholdRule {
    pub fn new(symbol: Symbol, operator: Operator, value: Decimal) -> Self {
        Self {
            symbol,
            operator,
            value,
        }
    }

    pub fn matches(&self, observed: Decimal) -> bool {
        self.operator.holds(observed, self.value)
    }
}

impl FromStr for ThresholdRule {
    type Err = ConfigError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidThreshold {
            input: input.to_owned(),
            reason,
        };

        let parts: Vec<&str> = input.split(':').map(str::trim).collect();
        let [ticker, operator, value] = parts.as_slice() else {
            return Err(invalid(format!(
                "expected TICKER:OPERATOR:VALUE, found {} part(s)",
                parts.len()
            )));
        };

        let symbol = Symbol::parse(ticker).map_err(|e| invalid(e.to_string()))?;
        let operator = Operator::parse(operator).ok_or_else(|| {
            invalid(format!(
                "unknown operator '{operator}', expected gt, lt, gte, lte or eq"
            ))
        })?;
        // Values that do not fit a Decimal are rejected, never rounded.
        let value = Decimal::from_str_exact(value).map_err(|e| {
            invalid(format!("value '{value}' is not an exactly representable decimal: {e}"))
        })?;

        Ok(Self::new(symbol, operator, value))
    }
}

impl Display for ThresholdRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.symbol, self.operator, self.value)
    }
}

/// Parse every expression, failing on the first malformed one.
pub fn parse_rules<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<ThresholdRule>, ConfigError> {
    inputs.iter().map(|input| input.as_ref().parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rule(input: &str) -> ThresholdRule {
        input.parse().expect("valid rule")
    }

    #[test]
    fn parses_trimmed_case_insensitive_parts() {
        let parsed = rule(" aapl : GTE : 150.25 ");
        assert_eq!(parsed.symbol.as_str(), "AAPL");
        assert_eq!(parsed.operator, Operator::Gte);
        assert_eq!(parsed.value, dec!(150.25));
        assert_eq!(parsed.to_string(), "AAPL:gte:150.25");
    }

    #[test]
    fn accepts_negative_and_high_precision_values() {
        assert_eq!(rule("SPY:lt:-0.000125").value, dec!(-0.000125));
    }

    #[test]
    fn rejects_malformed_expressions() {
        for input in [
            "AAPL>150",
            "AAPL:gt",
            "AAPL:gt:150:extra",
            "AAPL:above:150",
            "AAPL:gt:abc",
            "AAPL:gt:",
            "1AAPL:gt:150",
            ":gt:150",
            "NVDA:eq:500.000000000000000000000000000001",
            "NVDA:eq:99999999999999999999999999999999",
        ] {
            let err = input.parse::<ThresholdRule>().expect_err(input);
            assert!(
                matches!(err, ConfigError::InvalidThreshold { .. }),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn value_beyond_decimal_precision_is_not_rounded_into_a_match() {
        let err = "NVDA:eq:500.000000000000000000000000000001"
            .parse::<ThresholdRule>()
            .expect_err("must not round to 500");
        assert!(err.to_string().contains("exactly representable"), "{err}");
        assert_eq!(
            rule("NVDA:eq:500.0000000000000000000000001").value,
            dec!(500.0000000000000000000000001)
        );
    }

    #[test]
    fn operators_compare_as_documented() {
        let price = dec!(150);
        assert!(!rule("AAPL:gt:150").matches(price));
        assert!(rule("AAPL:gt:150").matches(dec!(150.01)));
        assert!(rule("AAPL:gte:150").matches(price));
        assert!(rule("AAPL:lte:150").matches(price));
        assert!(!rule("AAPL:lt:150").matches(price));
        assert!(rule("AAPL:lt:150").matches(dec!(149.99)));
    }

    #[test]
    fn eq_is_exact_decimal_equality() {
        let eq = rule("NVDA:eq:500");
        assert!(eq.matches(dec!(500)));
        assert!(eq.matches(dec!(500.00)));
        assert!(!eq.matches(dec!(500.001)));
        assert!(!eq.matches(dec!(499.999999)));
    }

    #[test]
    fn parse_rules_fails_on_first_bad_rule() {
        let ok = parse_rules(&["AAPL:gt:100", "AAPL:lt:200"]).expect("valid rules");
        assert_eq!(ok.len(), 2);
        assert!(parse_rules(&["AAPL:gt:100", "AAPL>150"]).is_err());
    }
}
