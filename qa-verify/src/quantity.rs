use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::{Number, Value};

/// Stock quantities are fixed-point decimals on the server (scale 4), so
/// `5` and `5.0` must compare equal and neither may be read as an integer.
pub type Quantity = BigDecimal;

/// Reads a quantity from a JSON number, or from a numeric string.
pub fn quantity_from_json(value: &Value) -> Option<Quantity> {
    match value {
        Value::Number(number) => BigDecimal::from_str(&number.to_string()).ok(),
        Value::String(text) => BigDecimal::from_str(text.trim()).ok(),
        _ => None,
    }
}

/// Renders a quantity as a JSON number for request payloads.
pub fn quantity_to_json(qty: &Quantity) -> Value {
    let text = qty.to_string();
    match Number::from_str(&text) {
        Ok(number) => Value::Number(number),
        Err(_) => Value::String(text),
    }
}

/// Display form without trailing fractional zeros (`5.0000` -> `5`).
pub fn format_quantity(qty: &Quantity) -> String {
    let text = qty.to_string();
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
