//! Korean price string normalization.
//!
//! All values are returned in 만원 (10,000 KRW). One 억 is 10,000 만원, so
//! `"15억 5,000"` becomes `155000`.

use crate::error::ParseError;
use crate::land::models::TradeType;

/// Number of 만원 in one 억.
pub const EOK: i64 = 10_000;

const EOK_MARKER: char = '억';
const RENT_SEPARATOR: char = '/';

/// A parsed price in 만원.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedPrice {
    /// Sale price, lease deposit, or rent deposit
    pub amount: i64,
    /// Monthly rent, only for deposit/rent prices
    pub monthly_rent: Option<i64>,
}

/// Parses a single-value price such as `"1억 2000"`, `"15억"` or `"5,000"`.
///
/// Commas and whitespace are ignored. The 억 term and the remainder are both
/// optional but at least one must be present.
pub fn parse_price(raw: &str) -> Result<i64, ParseError> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    if compact.is_empty() {
        return Err(ParseError::Empty);
    }

    let unexpected = || ParseError::UnexpectedToken { input: raw.to_string() };
    let overflow = || ParseError::Overflow { input: raw.to_string() };

    let (eok_part, rest) = match compact.split_once(EOK_MARKER) {
        Some((eok, rest)) => (Some(eok), rest),
        None => (None, compact.as_str()),
    };

    let eok = match eok_part {
        Some(digits) => parse_digits(digits).ok_or_else(unexpected)?,
        None => 0,
    };

    let remainder = if rest.is_empty() {
        if eok_part.is_none() {
            return Err(unexpected());
        }
        0
    } else {
        parse_digits(rest).ok_or_else(unexpected)?
    };

    eok.checked_mul(EOK).and_then(|v| v.checked_add(remainder)).ok_or_else(overflow)
}

/// Parses a deposit/monthly-rent price such as `"5,000/50"` or `"1억/120"`.
pub fn parse_deposit_rent(raw: &str) -> Result<(i64, i64), ParseError> {
    let mut parts = raw.split(RENT_SEPARATOR);
    let (deposit, rent) = match (parts.next(), parts.next(), parts.next()) {
        (Some(deposit), Some(rent), None) => (deposit, rent),
        (_, Some(_), Some(_)) => {
            return Err(ParseError::ExtraSeparator { input: raw.to_string() });
        }
        _ => {
            if raw.trim().is_empty() {
                return Err(ParseError::Empty);
            }
            return Err(ParseError::MissingSeparator { input: raw.to_string() });
        }
    };

    Ok((parse_price(deposit)?, parse_price(rent)?))
}

/// Parses a price according to the format its trade type uses.
pub fn parse_for_trade(raw: &str, trade_type: TradeType) -> Result<ParsedPrice, ParseError> {
    if trade_type.has_monthly_rent() {
        let (deposit, rent) = parse_deposit_rent(raw)?;
        Ok(ParsedPrice { amount: deposit, monthly_rent: Some(rent) })
    } else {
        Ok(ParsedPrice { amount: parse_price(raw)?, monthly_rent: None })
    }
}

fn parse_digits(s: &str) -> Option<i64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
