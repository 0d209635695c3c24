//! Money calculation using rust_decimal
//!
//! All amounts are rounded to 2 decimal places, half away from zero.

use crate::error::{FulfillmentError, FulfillmentResult};
use rust_decimal::prelude::*;
use shared::order::{LineItem, OrderTotals};

const DECIMAL_PLACES: u32 = 2;

/// Maximum quantity per line
pub const MAX_QUANTITY: u32 = 9999;

/// Maximum unit price accepted from the catalog
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Maximum delivery fee or discount accepted on an order
pub const MAX_ADJUSTMENT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

fn overflow(what: &str) -> FulfillmentError {
    FulfillmentError::InvalidAmount(format!("{what} out of range"))
}

pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

pub fn line_total(unit_price: Decimal, quantity: u32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// Compute order totals from snapshotted lines
///
/// `tax = round(tax_rate × (subtotal − discount))` and
/// `total = subtotal − discount + tax + delivery_fee`.
pub fn compute_totals(
    items: &[LineItem],
    delivery_fee: Decimal,
    discount: Decimal,
    tax_rate: Decimal,
) -> FulfillmentResult<OrderTotals> {
    if delivery_fee.is_sign_negative() && !delivery_fee.is_zero() {
        return Err(FulfillmentError::InvalidAmount(format!(
            "delivery fee must be non-negative, got {}",
            delivery_fee
        )));
    }
    if discount.is_sign_negative() && !discount.is_zero() {
        return Err(FulfillmentError::InvalidAmount(format!(
            "discount must be non-negative, got {}",
            discount
        )));
    }
    if tax_rate.is_sign_negative() && !tax_rate.is_zero() {
        return Err(FulfillmentError::InvalidAmount(format!(
            "tax rate must be non-negative, got {}",
            tax_rate
        )));
    }
    if delivery_fee > MAX_ADJUSTMENT || discount > MAX_ADJUSTMENT {
        return Err(FulfillmentError::InvalidAmount(format!(
            "delivery fee and discount must not exceed {}",
            MAX_ADJUSTMENT
        )));
    }

    let subtotal = items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| acc.checked_add(item.line_total))
        .ok_or_else(|| overflow("subtotal"))?;
    let delivery_fee = round_money(delivery_fee);
    let discount = round_money(discount);
    if discount > subtotal {
        return Err(FulfillmentError::InvalidAmount(format!(
            "discount {} exceeds subtotal {}",
            discount, subtotal
        )));
    }

    let taxable = subtotal - discount;
    let tax = round_money(tax_rate.checked_mul(taxable).ok_or_else(|| overflow("tax"))?);
    let total = taxable
        .checked_add(tax)
        .and_then(|t| t.checked_add(delivery_fee))
        .ok_or_else(|| overflow("total"))?;
    Ok(OrderTotals {
        subtotal,
        delivery_fee,
        discount,
        tax,
        total,
    })
}

/// Currency value of redeemed points
pub fn points_to_amount(points: i64, points_per_unit: i64) -> Decimal {
    if points_per_unit <= 0 {
        return Decimal::ZERO;
    }
    round_money(Decimal::from(points) / Decimal::from(points_per_unit))
}

/// Points earned for an order total: `floor(total × base_rate)`
pub fn base_points(total: Decimal, base_rate: Decimal) -> i64 {
    (total * base_rate).floor().to_i64().unwrap_or(0).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, qty: u32) -> LineItem {
        let unit_price = Decimal::new(price, 2);
        LineItem {
            item_id: format!("item-{}", price),
            name: "Dish".into(),
            unit_price,
            quantity: qty,
            line_total: line_total(unit_price, qty),
        }
    }

    #[test]
    fn test_totals_identity() {
        let items = vec![line(20000, 2), line(10000, 1)];
        let totals = compute_totals(
            &items,
            Decimal::new(50, 0),
            Decimal::new(25, 0),
            Decimal::new(10, 2),
        )
        .unwrap();
        assert_eq!(totals.subtotal, Decimal::new(500, 0));
        assert_eq!(totals.tax, Decimal::new(4750, 2));
        assert_eq!(
            totals.total,
            totals.subtotal - totals.discount + totals.tax + totals.delivery_fee
        );
        assert_eq!(totals.total, Decimal::new(57250, 2));
    }

    #[test]
    fn test_tax_rounds_half_away_from_zero() {
        // 0.05 * 0.70 = 0.035 -> 0.04
        let items = vec![line(70, 1)];
        let totals =
            compute_totals(&items, Decimal::ZERO, Decimal::ZERO, Decimal::new(5, 2)).unwrap();
        assert_eq!(totals.tax, Decimal::new(4, 2));
    }

    #[test]
    fn test_rejects_negative_fee_and_oversized_discount() {
        let items = vec![line(1000, 1)];
        assert!(matches!(
            compute_totals(&items, Decimal::new(-1, 0), Decimal::ZERO, Decimal::ZERO),
            Err(FulfillmentError::InvalidAmount(_))
        ));
        assert!(matches!(
            compute_totals(&items, Decimal::ZERO, Decimal::new(11, 0), Decimal::ZERO),
            Err(FulfillmentError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_range_adjustments() {
        let items = vec![line(1000, 1)];
        assert!(matches!(
            compute_totals(&items, Decimal::MAX, Decimal::ZERO, Decimal::ZERO),
            Err(FulfillmentError::InvalidAmount(_))
        ));
        assert!(matches!(
            compute_totals(&items, MAX_ADJUSTMENT + Decimal::ONE, Decimal::ZERO, Decimal::ZERO),
            Err(FulfillmentError::InvalidAmount(_))
        ));
        assert!(matches!(
            compute_totals(&items, Decimal::ZERO, Decimal::ZERO, Decimal::MAX),
            Err(FulfillmentError::InvalidAmount(_))
        ));
        assert!(compute_totals(&items, MAX_ADJUSTMENT, Decimal::ZERO, Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_points_conversions() {
        assert_eq!(points_to_amount(250, 100), Decimal::new(250, 2));
        assert_eq!(points_to_amount(10, 0), Decimal::ZERO);
        assert_eq!(base_points(Decimal::new(55099, 2), Decimal::ONE), 550);
        assert_eq!(base_points(Decimal::new(100, 0), Decimal::new(15, 1)), 150);
    }
}
