//! Wire encoding helpers: boolean tokens, symbol tables, number formats and
//! reply parsing.

use super::cache::{AttributeValue, CachedValue};
use crate::error::{IviError, IviResult};

/// Token pair used for boolean arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoolTokens {
    /// Sent for `true`.
    pub on: &'static str,
    /// Sent for `false`.
    pub off: &'static str,
}

/// `1` / `0`.
pub const NUMERIC_BOOL: BoolTokens = BoolTokens { on: "1", off: "0" };

/// `ON` / `OFF`.
pub const WORD_BOOL: BoolTokens = BoolTokens { on: "ON", off: "OFF" };

impl BoolTokens {
    /// Token for `value`.
    pub fn encode(&self, value: bool) -> &'static str {
        if value {
            self.on
        } else {
            self.off
        }
    }
}

/// Parse a boolean reply. Both numeric and word forms are accepted since
/// instruments echo either regardless of how the value was written.
pub fn parse_bool(command: &str, reply: &str) -> IviResult<bool> {
    let token = reply.trim();
    if token == "1" || token.eq_ignore_ascii_case("ON") {
        Ok(true)
    } else if token == "0" || token.eq_ignore_ascii_case("OFF") {
        Ok(false)
    } else {
        Err(IviError::invalid_response(command, reply))
    }
}

/// Parse a bare numeric reply. `command` is only used in the error.
pub fn parse_f64(command: &str, reply: &str) -> IviResult<f64> {
    reply
        .trim()
        .parse::<f64>()
        .map_err(|_| IviError::invalid_response(command, reply))
}

/// Parse an integer reply, also accepting an integral float.
pub fn parse_i64(command: &str, reply: &str) -> IviResult<i64> {
    let trimmed = reply.trim();
    trimmed
        .parse::<i64>()
        .or_else(|_| {
            // Some firmware reports integers as "3.000000E+00"
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && v.is_finite())
                .map(|v| v as i64)
                .ok_or(())
        })
        .map_err(|_| IviError::invalid_response(command, reply))
}

/// The value part of a reply carrying a header (`":CH1:AMPLITUDE 1.0"`).
pub fn strip_header<'a>(command: &str, reply: &'a str) -> IviResult<&'a str> {
    reply
        .trim()
        .split_once(char::is_whitespace)
        .map(|(_, value)| value.trim())
        .ok_or_else(|| IviError::invalid_response(command, reply))
}

/// Two-decimal fixed notation, as DC supplies expect (`10.00`).
pub fn fixed2(value: f64) -> String {
    format!("{:.2}", value)
}

/// C-style `%e` notation (`1.000000e+03`).
pub fn scientific(value: f64) -> String {
    let formatted = format!("{:.6e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}e{}{:02}", mantissa, sign, exp.abs())
            }
            Err(_) => formatted,
        },
        None => formatted,
    }
}

/// A closed set of symbolic values with fixed wire spellings.
pub trait Symbol: Copy + Eq + std::fmt::Debug + 'static {
    /// Every variant with its wire token.
    const TABLE: &'static [(Self, &'static str)];

    /// Stable lowercase name used in the cache and in generic access.
    fn name(self) -> &'static str;

    /// Symbol for a lowercase name, case-insensitive.
    fn from_name(name: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .map(|(symbol, _)| *symbol)
            .find(|symbol| symbol.name().eq_ignore_ascii_case(name))
    }

    /// Wire token for this symbol.
    fn to_wire(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(symbol, _)| *symbol == self)
            .map(|(_, token)| *token)
            .unwrap_or_else(|| self.name())
    }

    /// Symbol for a wire token, case-insensitive.
    fn from_wire(token: &str) -> Option<Self> {
        let token = token.trim().trim_matches('"');
        Self::TABLE
            .iter()
            .find(|(_, wire)| wire.eq_ignore_ascii_case(token))
            .map(|(symbol, _)| *symbol)
    }

    /// Like [`Symbol::from_wire`], but an unknown token is an
    /// [`IviError::InvalidResponse`] for `command`.
    fn parse_reply(command: &str, reply: &str) -> IviResult<Self> {
        Self::from_wire(reply).ok_or_else(|| IviError::invalid_response(command, reply))
    }
}

impl<T: Symbol> CachedValue for T {
    fn into_value(self) -> AttributeValue {
        AttributeValue::Text(self.name().to_string())
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Text(name) => T::from_name(name),
            _ => None,
        }
    }
}

/// Reject `value` unless it is one of `supported`.
pub fn ensure_supported<T: Symbol>(value: T, supported: &[T]) -> IviResult<()> {
    if supported.contains(&value) {
        Ok(())
    } else {
        Err(IviError::UnsupportedValue(format!(
            "'{}' is not supported by this instrument",
            value.name()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Source {
        Internal,
        External,
    }

    impl Symbol for Source {
        const TABLE: &'static [(Self, &'static str)] =
            &[(Source::Internal, "INT"), (Source::External, "EXT")];

        fn name(self) -> &'static str {
            match self {
                Source::Internal => "internal",
                Source::External => "external",
            }
        }
    }

    #[test]
    fn test_scientific_matches_printf() {
        assert_eq!(scientific(1000.0), "1.000000e+03");
        assert_eq!(scientific(0.00025), "2.500000e-04");
        assert_eq!(scientific(0.0), "0.000000e+00");
        assert_eq!(scientific(-12.5), "-1.250000e+01");
        assert_eq!(scientific(1e-100), "1.000000e-100");
    }

    #[test]
    fn test_fixed2() {
        assert_eq!(fixed2(10.0), "10.00");
        assert_eq!(fixed2(1.005), "1.00");
        assert_eq!(fixed2(-3.456), "-3.46");
    }

    #[test]
    fn test_bool_tokens() {
        assert_eq!(NUMERIC_BOOL.encode(true), "1");
        assert_eq!(WORD_BOOL.encode(false), "OFF");
        assert!(parse_bool("OUTP?", "ON\n").unwrap());
        assert!(!parse_bool("OUTP?", "0").unwrap());
        assert!(parse_bool("OUTP?", "maybe").is_err());
    }

    #[test]
    fn test_numeric_parsing() {
        assert_eq!(parse_f64("VOLT?", " 1.2345E+01 ").unwrap(), 12.345);
        assert!(parse_f64("VOLT?", "ERR").is_err());
        assert_eq!(parse_i64("*TST?", "0").unwrap(), 0);
        assert_eq!(parse_i64("BURS?", "3.000000E+00").unwrap(), 3);
        assert!(parse_i64("BURS?", "2.5").is_err());
    }

    #[test]
    fn test_strip_header() {
        assert_eq!(strip_header(":ch1:offset?", ":CH1:OFFSET 0.25").unwrap(), "0.25");
        assert!(strip_header(":ch1:offset?", "0.25").is_err());
    }

    #[test]
    fn test_symbol_mapping_both_directions() {
        assert_eq!(Source::External.to_wire(), "EXT");
        assert_eq!(Source::from_wire("int"), Some(Source::Internal));
        assert_eq!(Source::from_name("External"), Some(Source::External));
        assert!(Source::parse_reply(":ROSC:SOUR?", "PLL").is_err());

        let cached = Source::External.into_value();
        assert_eq!(cached, AttributeValue::Text("external".into()));
        assert_eq!(Source::from_value(&cached), Some(Source::External));
    }

    #[test]
    fn test_ensure_supported() {
        assert!(ensure_supported(Source::Internal, &[Source::Internal]).is_ok());
        assert!(matches!(
            ensure_supported(Source::External, &[Source::Internal]),
            Err(IviError::UnsupportedValue(_))
        ));
    }
}
