//! Kubernetes resource quantity parsing for storage sizes
//!
//! Accepts `<number><suffix>` where the number is an unsigned decimal with an
//! optional fraction and the suffix is a binary SI suffix (`Ki`..`Ei`), a
//! decimal SI suffix (`m`, `k`, `M`..`E`), a decimal exponent (`e3`, `E6`)
//! or nothing.

use crate::Error;

/// Parse a storage quantity into a byte count
///
/// Surrounding whitespace is rejected, as the API server would reject it in
/// the volume claim.
pub fn parse_bytes(input: &str) -> Result<f64, Error> {
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (number, suffix) = input.split_at(split);

    if !is_decimal(number) {
        return Err(invalid(input));
    }
    let value: f64 = number.parse().map_err(|_| invalid(input))?;
    let multiplier = multiplier(suffix).ok_or_else(|| invalid(input))?;

    Ok(value * multiplier)
}

fn is_decimal(number: &str) -> bool {
    let mut parts = number.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    match fraction {
        None => !whole.is_empty(),
        Some(f) => !(whole.is_empty() && f.is_empty()) && !f.contains('.'),
    }
}

fn multiplier(suffix: &str) -> Option<f64> {
    let binary = |exp: i32| Some(1024f64.powi(exp));
    let decimal = |exp: i32| Some(10f64.powi(exp));

    match suffix {
        "" => decimal(0),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        _ => {
            let exp = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            decimal(exp.parse().ok()?)
        }
    }
}

fn invalid(input: &str) -> Error {
    Error::validation(format!("invalid storage quantity: {input:?}"))
}
