//! Sales pricing and payment-status rules, kept free of I/O.

use chrono::NaiveDate;
use rand::Rng;
use rust_decimal::Decimal;

use crate::entities::sales_order::PaymentStatus;
use crate::errors::ServiceError;

fn amount_overflow() -> ServiceError {
    ServiceError::ValidationError("Order amount is too large".to_string())
}

/// `unit_price * quantity + transport_cost`, refusing values past the decimal range.
pub fn order_value(
    unit_price: Decimal,
    quantity: i32,
    transport_cost: Decimal,
) -> Result<Decimal, ServiceError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .and_then(|goods| goods.checked_add(transport_cost))
        .ok_or_else(amount_overflow)
}

/// `unit_price * quantity + transport_cost - discount_amount`
pub fn final_amount(
    unit_price: Decimal,
    quantity: i32,
    transport_cost: Decimal,
    discount_amount: Decimal,
) -> Result<Decimal, ServiceError> {
    order_value(unit_price, quantity, transport_cost)?
        .checked_sub(discount_amount)
        .ok_or_else(amount_overflow)
}

/// Rejects negative prices and discounts larger than the order value.
pub fn validate_amounts(
    unit_price: Decimal,
    quantity: i32,
    transport_cost: Decimal,
    discount_amount: Decimal,
) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(format!(
            "Quantity must be positive, got {}",
            quantity
        )));
    }
    if unit_price < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Unit price cannot be negative".to_string(),
        ));
    }
    if transport_cost < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Transport cost cannot be negative".to_string(),
        ));
    }
    if discount_amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Discount cannot be negative".to_string(),
        ));
    }
    if discount_amount > order_value(unit_price, quantity, transport_cost)? {
        return Err(ServiceError::ValidationError(format!(
            "Discount {} exceeds the order value",
            discount_amount
        )));
    }
    Ok(())
}

/// Payment status implied by the approved payments on file.
pub fn payment_status_for(paid: Decimal, final_amount: Decimal) -> PaymentStatus {
    if paid >= final_amount {
        PaymentStatus::Completed
    } else if paid > Decimal::ZERO {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Pending
    }
}

/// Re-derives the payment status after a price change, leaving a payment that is still under
/// finance review untouched.
pub fn settle_payment_status(
    current: PaymentStatus,
    paid: Decimal,
    final_amount: Decimal,
) -> PaymentStatus {
    if current == PaymentStatus::PendingFinanceApproval {
        current
    } else {
        payment_status_for(paid, final_amount)
    }
}

/// Upper-case first letters of each word, digits and letters only.
pub fn initials(text: &str) -> String {
    text.split_whitespace()
        .filter_map(|word| word.chars().find(|c| c.is_ascii_alphanumeric()))
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// `<customer initials><product initials>-<YYYYMMDD>-<suffix>`
pub fn order_number(customer: &str, product: &str, date: NaiveDate, suffix: &str) -> String {
    let mut prefix = format!("{}{}", initials(customer), initials(product));
    if prefix.is_empty() {
        prefix.push_str("SO");
    }
    format!("{}-{}-{}", prefix, date.format("%Y%m%d"), suffix)
}

pub fn random_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn final_amount_includes_transport_and_discount() {
        assert_eq!(
            final_amount(dec!(1200), 2, dec!(150), dec!(100)).unwrap(),
            dec!(2450)
        );
    }

    #[test]
    fn amounts_past_the_decimal_range_are_refused() {
        assert_matches!(
            final_amount(Decimal::MAX, 2, dec!(0), dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            validate_amounts(Decimal::MAX, 1, Decimal::MAX, dec!(0)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn discount_cannot_exceed_order_value() {
        assert!(validate_amounts(dec!(100), 1, dec!(0), dec!(100)).is_ok());
        assert!(validate_amounts(dec!(100), 1, dec!(0), dec!(100.01)).is_err());
        assert!(validate_amounts(dec!(100), 0, dec!(0), dec!(0)).is_err());
        assert!(validate_amounts(dec!(-1), 1, dec!(0), dec!(0)).is_err());
    }

    #[test]
    fn payment_status_thresholds() {
        assert_eq!(payment_status_for(dec!(0), dec!(500)), PaymentStatus::Pending);
        assert_eq!(payment_status_for(dec!(200), dec!(500)), PaymentStatus::Partial);
        assert_eq!(payment_status_for(dec!(500), dec!(500)), PaymentStatus::Completed);
        assert_eq!(payment_status_for(dec!(650), dec!(500)), PaymentStatus::Completed);
    }

    #[test]
    fn settle_keeps_review_in_progress() {
        assert_eq!(
            settle_payment_status(PaymentStatus::PendingFinanceApproval, dec!(500), dec!(500)),
            PaymentStatus::PendingFinanceApproval
        );
        assert_eq!(
            settle_payment_status(PaymentStatus::Completed, dec!(500), dec!(650)),
            PaymentStatus::Partial
        );
    }

    #[test]
    fn order_number_uses_initials_and_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            order_number("ravi kumar", "Teak Dining Table", date, "0042"),
            "RKTDT-20260307-0042"
        );
        assert_eq!(order_number("", "", date, "1234"), "SO-20260307-1234");
    }

    #[test]
    fn suffix_has_requested_digits() {
        let mut rng = rand::thread_rng();
        let suffix = random_suffix(&mut rng, 6);
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    }

    proptest! {
        #[test]
        fn status_tracks_sum_not_last_payment(
            payments in proptest::collection::vec(1u32..500, 0..6),
            total in 1u32..2000,
        ) {
            let paid: Decimal = payments.iter().map(|p| Decimal::from(*p)).sum();
            let final_amount = Decimal::from(total);
            let status = payment_status_for(paid, final_amount);
            if paid >= final_amount {
                prop_assert_eq!(status, PaymentStatus::Completed);
            } else if paid > Decimal::ZERO {
                prop_assert_eq!(status, PaymentStatus::Partial);
            } else {
                prop_assert_eq!(status, PaymentStatus::Pending);
            }
        }
    }
}
