use std::fmt;

/// Money is kept as integer cents, e.g. 1.85 per liter = 185.
pub type Cents = i64;

/// Mass is kept as integer grams.
pub type Grams = i64;

/// Render a fixed-point integer with `decimals` fractional digits.
/// Example: (5000, 2) -> "50.00", (-720, 3) -> "-0.720"
pub fn format_scaled(value: i64, decimals: u32) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let factor = 10_i64.pow(decimals);
    let abs = value.unsigned_abs();
    let units = abs / factor as u64;
    let fraction = abs % factor as u64;
    if decimals == 0 {
        format!("{}{}", sign, units)
    } else {
        format!(
            "{}{}.{:0width$}",
            sign,
            units,
            fraction,
            width = decimals as usize
        )
    }
}

pub fn format_cents(cents: Cents) -> String {
    format_scaled(cents, 2)
}

/// Grams rendered as kilograms.
pub fn format_kg(grams: Grams) -> String {
    format_scaled(grams, 3)
}

/// Parse a decimal string into a fixed-point integer with `decimals` fractional digits.
/// Extra fractional digits are truncated.
/// Example: ("12.5", 2) -> 1250, ("0.72", 3) -> 720, ("3", 2) -> 300
pub fn parse_scaled(input: &str, decimals: u32) -> Result<i64, ParseAmountError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseAmountError::InvalidFormat);
    }

    let factor = 10_i64.pow(decimals);
    let whole: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| ParseAmountError::Overflow)?
    };

    let mut fraction: String = fraction.chars().take(decimals as usize).collect();
    while fraction.len() < decimals as usize {
        fraction.push('0');
    }
    let fraction: i64 = if fraction.is_empty() {
        0
    } else {
        fraction.parse().map_err(|_| ParseAmountError::InvalidFormat)?
    };

    let value = whole
        .checked_mul(factor)
        .and_then(|v| v.checked_add(fraction))
        .ok_or(ParseAmountError::Overflow)?;
    Ok(if negative { -value } else { value })
}

pub fn parse_cents(input: &str) -> Result<Cents, ParseAmountError> {
    parse_scaled(input, 2)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid number format"),
            ParseAmountError::Overflow => write!(f, "number is too large"),
        }
    }
}

impl std::error::Error for ParseAmountError {}
