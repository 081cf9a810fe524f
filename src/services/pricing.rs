use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::config::AppConfig;
use crate::entities::{discount, variant};

/// A cart line joined with its variant and the product's discount, ready for
/// pricing. Quantity comes from the cart row, everything else from the
/// catalog.
#[derive(Debug, Clone, Copy)]
pub struct CartLine<'a> {
    pub variant: &'a variant::Model,
    pub discount: Option<&'a discount::Model>,
    pub quantity: i32,
}

/// Returns the discount percent if the discount exists and has not expired
/// at `now`. Expired discounts are treated as absent everywhere.
pub fn effective_discount_percent(
    discount: Option<&discount::Model>,
    now: DateTime<Utc>,
) -> Option<i32> {
    discount.filter(|d| d.is_active_at(now)).map(|d| d.percent)
}

/// Unit price in minor units after applying a percent discount, rounded to
/// the nearest minor unit (halves round away from zero).
pub fn discounted_unit_price(price: i64, percent: i32) -> i64 {
    let factor = dec!(1) - Decimal::from(percent) / dec!(100);
    (Decimal::from(price) * factor)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(price)
}

/// Effective unit price of a line: the variant price with any active discount
/// applied, or zero when the variant is no longer available for sale.
pub fn line_unit_price(line: &CartLine<'_>, now: DateTime<Utc>) -> i64 {
    if !line.variant.available_for_sale {
        return 0;
    }
    match effective_discount_percent(line.discount, now) {
        Some(percent) => discounted_unit_price(line.variant.price, percent),
        None => line.variant.price,
    }
}

/// Effective quantity of a line: zero when the requested quantity exceeds
/// the stock on hand, so an over-stock line contributes nothing.
pub fn line_quantity(line: &CartLine<'_>) -> i64 {
    if line.quantity > line.variant.quantity_in_stock {
        0
    } else {
        i64::from(line.quantity)
    }
}

/// A line that must block order placement: its variant was pulled from sale
/// or the requested quantity can no longer be fulfilled.
pub fn line_is_invalid(line: &CartLine<'_>) -> bool {
    !line.variant.available_for_sale || line.quantity > line.variant.quantity_in_stock
}

/// Subtotal of a cart in minor units. Unavailable variants price at zero and
/// over-stock lines count as zero quantity, so the subtotal never reflects
/// merchandise that cannot ship.
pub fn cart_subtotal(lines: &[CartLine<'_>], now: DateTime<Utc>) -> i64 {
    lines
        .iter()
        .map(|line| line_unit_price(line, now) * line_quantity(line))
        .sum()
}

pub fn has_invalid_lines(lines: &[CartLine<'_>]) -> bool {
    lines.iter().any(line_is_invalid)
}

/// Shipping pricing knobs, taken from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ShippingRates {
    pub free_threshold: i64,
    pub flat_rate: i64,
    pub international_surcharge: i64,
}

impl From<&AppConfig> for ShippingRates {
    fn from(config: &AppConfig) -> Self {
        Self {
            free_threshold: config.free_shipping_threshold,
            flat_rate: config.flat_shipping_rate,
            international_surcharge: config.international_surcharge,
        }
    }
}

/// Shipping cost for a destination country and items subtotal.
///
/// Orders at or above the free-shipping threshold ship free; everything else
/// pays the flat rate, plus a surcharge for non-domestic destinations.
pub fn shipping_cost(rates: &ShippingRates, domestic_country: &str, country: &str, subtotal: i64) -> i64 {
    if subtotal >= rates.free_threshold {
        return 0;
    }
    let mut cost = rates.flat_rate;
    if !country.eq_ignore_ascii_case(domestic_country) {
        cost += rates.international_surcharge;
    }
    cost
}

/// Formats minor units as a major-unit decimal string, e.g. `1999` -> `"19.99"`.
/// PayPal order amounts are expressed this way.
pub fn minor_units_to_decimal_string(amount: i64) -> String {
    let mut value = Decimal::from(amount) / dec!(100);
    value.rescale(2);
    value.to_string()
}
