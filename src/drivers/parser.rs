//! Line parser for the two-reading voltage protocol.
//!
//! Each line looks like `Voltaje entrada: 3.27 V\tVoltaje filtrado: 3.10 V`.
//! Labels are ignored; only field order matters (raw first, filtered second).

use crate::drivers::error::ParseError;

const FIELD_SEPARATOR: char = '\t';
const LABEL_SEPARATOR: &str = ": ";
const UNIT_SUFFIX: &str = " V";

/// One decoded line: raw and filtered voltage, in field order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoltagePair {
    pub raw: f64,
    pub filtered: f64,
}

pub fn parse_line(line: &str) -> Result<VoltagePair, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::MissingField { found: 0 });
    }
    let mut fields = line.split(FIELD_SEPARATOR);
    let (Some(first), Some(second)) = (fields.next(), fields.next()) else {
        return Err(ParseError::MissingField { found: 1 });
    };
    Ok(VoltagePair {
        raw: parse_field(0, first)?,
        filtered: parse_field(1, second)?,
    })
}

/// Decodes raw serial bytes first; invalid UTF-8 is a parse failure like any other.
pub fn parse_bytes(bytes: &[u8]) -> Result<VoltagePair, ParseError> {
    let line = std::str::from_utf8(bytes).map_err(|_| ParseError::Encoding)?;
    parse_line(line)
}

fn parse_field(field: usize, text: &str) -> Result<f64, ParseError> {
    let value = text
        .split(LABEL_SEPARATOR)
        .nth(1)
        .ok_or(ParseError::MissingSeparator { field })?;
    let trimmed = value.trim_end();
    let number = trimmed.strip_suffix(UNIT_SUFFIX).unwrap_or(trimmed).trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ParseError::InvalidNumber {
            field,
            value: number.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_line() {
        let pair = parse_line("Voltaje entrada: 3.27 V\tVoltaje filtrado: 3.10 V").unwrap();
        assert_eq!(pair.raw, 3.27);
        assert_eq!(pair.filtered, 3.10);
    }

    #[test]
    fn ignores_surrounding_whitespace_and_line_endings() {
        let pair = parse_line("  Vin: -0.5 V\tVout: 12 V \r\n").unwrap();
        assert_eq!(pair, VoltagePair { raw: -0.5, filtered: 12.0 });
    }

    #[test]
    fn extra_fields_are_ignored() {
        let pair = parse_line("a: 1.0 V\tb: 2.0 V\tc: 3.0 V").unwrap();
        assert_eq!(pair, VoltagePair { raw: 1.0, filtered: 2.0 });
    }

    #[test]
    fn accepts_values_without_unit() {
        let pair = parse_line("a: 1.5\tb: 0.25").unwrap();
        assert_eq!(pair, VoltagePair { raw: 1.5, filtered: 0.25 });
    }

    #[test]
    fn empty_line_fails() {
        assert_eq!(parse_line(""), Err(ParseError::MissingField { found: 0 }));
        assert_eq!(parse_line("   \r\n"), Err(ParseError::MissingField { found: 0 }));
    }

    #[test]
    fn missing_tab_fails() {
        assert_eq!(
            parse_line("Voltaje entrada: 3.27 V Voltaje filtrado: 3.10 V"),
            Err(ParseError::MissingField { found: 1 })
        );
        assert!(parse_line("garbage").is_err());
    }

    #[test]
    fn missing_label_separator_fails() {
        assert_eq!(
            parse_line("Vin 3.27 V\tVout: 3.10 V"),
            Err(ParseError::MissingSeparator { field: 0 })
        );
        assert_eq!(
            parse_line("Vin: 3.27 V\tVout:3.10 V"),
            Err(ParseError::MissingSeparator { field: 1 })
        );
    }

    #[test]
    fn non_numeric_value_fails() {
        assert_eq!(
            parse_line("Vin: abc V\tVout: 3.10 V"),
            Err(ParseError::InvalidNumber { field: 0, value: "abc".into() })
        );
        assert_eq!(
            parse_line("Vin: 1.0 V\tVout:  V"),
            Err(ParseError::InvalidNumber { field: 1, value: "".into() })
        );
        assert!(parse_line("Vin: NaN V\tVout: 1.0 V").is_err());
    }

    #[test]
    fn invalid_utf8_fails() {
        assert_eq!(parse_bytes(&[0xff, 0xfe, b'\n']), Err(ParseError::Encoding));
        assert!(parse_bytes(b"a: 1 V\tb: 2 V\n").is_ok());
    }
}
