//! Amounts are stored as whole paisa (1 NPR = 100 paisa) and only turned into
//! rupee decimals at the edges.
use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Paisa(pub i64);

impl Paisa {
    pub const ZERO: Paisa = Paisa(0);

    pub fn to_rupees(self) -> Decimal {
        paisa_to_rupees(self)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Paisa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_npr(self.to_rupees()))
    }
}

/// Rounds half-up to the nearest paisa. `None` when the amount does not fit.
pub fn rupees_to_paisa(rupees: Decimal) -> Option<Paisa> {
    (rupees * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .map(Paisa)
}

pub fn paisa_to_rupees(paisa: Paisa) -> Decimal {
    Decimal::new(paisa.0, 2)
}

pub fn calculate_percentage(amount: Decimal, percentage: Decimal) -> Decimal {
    (amount * percentage / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn format_npr(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let text = format!("{:.2}", rounded.abs());
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, digit) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };

    format!("Rs. {sign}{grouped}.{fraction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rupees_to_paisa_rounds_half_up() {
        assert_eq!(rupees_to_paisa(Decimal::new(150075, 2)), Some(Paisa(150075)));
        assert_eq!(rupees_to_paisa(Decimal::new(10005, 3)), Some(Paisa(1001)));
        assert_eq!(rupees_to_paisa(Decimal::new(10004, 3)), Some(Paisa(1000)));
        assert_eq!(rupees_to_paisa(Decimal::ZERO), Some(Paisa::ZERO));
    }

    #[test]
    fn test_paisa_to_rupees() {
        assert_eq!(paisa_to_rupees(Paisa(123456)), Decimal::new(123456, 2));
        assert_eq!(Paisa(5).to_rupees().to_string(), "0.05");
    }

    #[test]
    fn test_calculate_percentage() {
        assert_eq!(
            calculate_percentage(Decimal::new(1000, 0), Decimal::new(25, 1)),
            Decimal::new(2500, 2)
        );
        // 0.125 rounds up, not to even
        assert_eq!(
            calculate_percentage(Decimal::new(125, 1), Decimal::ONE),
            Decimal::new(13, 2)
        );
    }

    #[test]
    fn test_format_npr() {
        assert_eq!(format_npr(Decimal::new(123456, 2)), "Rs. 1,234.56");
        assert_eq!(format_npr(Decimal::new(1000000, 0)), "Rs. 1,000,000.00");
        assert_eq!(format_npr(Decimal::new(999, 0)), "Rs. 999.00");
        assert_eq!(format_npr(Decimal::ZERO), "Rs. 0.00");
        assert_eq!(format_npr(Decimal::new(-150050, 2)), "Rs. -1,500.50");
    }

    #[test]
    fn test_paisa_display() {
        assert_eq!(Paisa(250000).to_string(), "Rs. 2,500.00");
    }
}
