//! Binary wire format of PostgreSQL `numeric`.
//!
//! Layout: `ndigits: i16, weight: i16, sign: u16, dscale: u16`, then
//! `ndigits` base-10000 digits as `i16`. The value is
//! `sum(digit[i] * 10000^(weight - i))`.

use bytes::{BufMut, BytesMut};
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, Type};

type BoxError = Box<dyn Error + Sync + Send>;

const SIGN_POS: u16 = 0x0000;
const SIGN_NEG: u16 = 0x4000;
const SIGN_NAN: u16 = 0xC000;
const SIGN_PINF: u16 = 0xD000;
const SIGN_NINF: u16 = 0xF000;

const NBASE: f64 = 10_000.0;

/// A `numeric` value read as `f64`. Precision beyond `f64` is lost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgNumeric(pub f64);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode(raw).map(PgNumeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], offset: usize) -> Result<u16, BoxError> {
    raw.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "numeric value truncated".into())
}

pub(crate) fn decode(raw: &[u8]) -> Result<f64, BoxError> {
    let ndigits = read_u16(raw, 0)? as i16;
    let weight = read_u16(raw, 2)? as i16;
    let sign = read_u16(raw, 4)?;

    match sign {
        SIGN_NAN => return Ok(f64::NAN),
        SIGN_PINF => return Ok(f64::INFINITY),
        SIGN_NINF => return Ok(f64::NEG_INFINITY),
        SIGN_POS | SIGN_NEG => {}
        other => return Err(format!("invalid numeric sign 0x{:04X}", other).into()),
    }
    if ndigits < 0 {
        return Err("negative numeric digit count".into());
    }

    let mut value = 0.0_f64;
    for i in 0..ndigits as usize {
        let digit = read_u16(raw, 8 + i * 2)? as f64;
        let exponent = i32::from(weight) - i as i32;
        // Dividing keeps fractional digits exact where f64 allows
        value += if exponent >= 0 {
            digit * NBASE.powi(exponent)
        } else {
            digit / NBASE.powi(-exponent)
        };
    }

    Ok(if sign == SIGN_NEG { -value } else { value })
}

fn write_header(out: &mut BytesMut, ndigits: i16, weight: i16, sign: u16, dscale: u16) {
    out.put_i16(ndigits);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
}

/// Encode a plain decimal literal (`-12.345`, `NaN`, `Infinity`).
/// Exponent notation is not accepted.
pub(crate) fn encode(text: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let text = text.trim();
    match text.to_ascii_lowercase().as_str() {
        "nan" => {
            write_header(out, 0, 0, SIGN_NAN, 0);
            return Ok(IsNull::No);
        }
        "infinity" | "+infinity" | "inf" => {
            write_header(out, 0, 0, SIGN_PINF, 0);
            return Ok(IsNull::No);
        }
        "-infinity" | "-inf" => {
            write_header(out, 0, 0, SIGN_NINF, 0);
            return Ok(IsNull::No);
        }
        _ => {}
    }

    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
    {
        return Err(format!("invalid numeric literal '{}'", text).into());
    }

    let int_part = int_part.trim_start_matches('0');
    let dscale = u16::try_from(frac_part.len())?;

    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let padded = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        int_part,
        frac_part,
        "0".repeat(frac_pad)
    );

    let mut groups: Vec<i16> = padded
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0_i16, |acc, b| acc * 10 + i16::from(b - b'0'))
        })
        .collect();
    let mut weight = i16::try_from((int_pad + int_part.len()) / 4)? - 1;

    while groups.first() == Some(&0) {
        groups.remove(0);
        weight -= 1;
    }
    while groups.last() == Some(&0) {
        groups.pop();
    }

    let (sign, weight) = if groups.is_empty() {
        (SIGN_POS, 0)
    } else if negative {
        (SIGN_NEG, weight)
    } else {
        (SIGN_POS, weight)
    };

    write_header(out, i16::try_from(groups.len())?, weight, sign, dscale);
    for digit in groups {
        out.put_i16(digit);
    }
    Ok(IsNull::No)
}

pub(crate) fn encode_f64(value: f64, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if value.is_nan() {
        return encode("NaN", out);
    }
    if value.is_infinite() {
        return encode(if value > 0.0 { "Infinity" } else { "-Infinity" }, out);
    }
    // Display for f64 never uses exponent notation
    encode(&value.to_string(), out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(text: &str) -> Vec<u8> {
        let mut out = BytesMut::new();
        encode(text, &mut out).unwrap();
        out.to_vec()
    }

    #[test]
    fn test_decode_known_wire_value() {
        // 123.45 => digits [123, 4500], weight 0, dscale 2
        let raw = [0, 2, 0, 0, 0, 0, 0, 2, 0, 123, 0x11, 0x94];
        assert!((decode(&raw).unwrap() - 123.45).abs() < 1e-9);
    }

    #[test]
    fn test_decode_negative_fraction() {
        // -0.0001 => digits [1], weight -1
        let raw = [0, 1, 0xFF, 0xFF, 0x40, 0x00, 0, 4, 0, 1];
        assert!((decode(&raw).unwrap() + 0.0001).abs() < 1e-12);
    }

    #[test]
    fn test_decode_special_values() {
        assert!(decode(&[0, 0, 0, 0, 0xC0, 0, 0, 0]).unwrap().is_nan());
        assert_eq!(decode(&[0, 0, 0, 0, 0xD0, 0, 0, 0]).unwrap(), f64::INFINITY);
        assert_eq!(
            decode(&[0, 0, 0, 0, 0xF0, 0, 0, 0]).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_decode_truncated_input_fails() {
        assert!(decode(&[0, 2, 0, 0, 0, 0, 0, 2, 0, 123]).is_err());
        assert!(decode(&[0, 1]).is_err());
    }

    #[test]
    fn test_encode_matches_server_layout() {
        assert_eq!(
            encoded("123.45"),
            vec![0, 2, 0, 0, 0, 0, 0, 2, 0, 123, 0x11, 0x94]
        );
        // 10000 => single digit 1 at weight 1, trailing zero group dropped
        assert_eq!(encoded("10000"), vec![0, 1, 0, 1, 0, 0, 0, 0, 0, 1]);
        // zero keeps its scale but has no digits
        assert_eq!(encoded("0.00"), vec![0, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_encoded_values_decode_back() {
        for (text, expected) in [("-12.5", -12.5), ("0.0001", 0.0001), ("987654321", 987654321.0)] {
            let bytes = encoded(text);
            assert!((decode(&bytes).unwrap() - expected).abs() < 1e-9, "{}", text);
        }
    }

    #[test]
    fn test_encode_rejects_garbage() {
        let mut out = BytesMut::new();
        assert!(encode("1e5", &mut out).is_err());
        assert!(encode("12a", &mut out).is_err());
        assert!(encode(".", &mut out).is_err());
    }
}
