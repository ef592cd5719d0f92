use partshub_api::entities::DiscountType;
use partshub_api::services::invoices::compute_totals;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

proptest! {
    /// subtotal = Σ(qty × price); discount never exceeds the subtotal;
    /// total = max(subtotal − discount + service, 0)
    #[test]
    fn totals_respect_the_invoice_invariants(
        lines in prop::collection::vec((1i32..=50, 0i64..=100_000), 1..8),
        use_percentage in any::<bool>(),
        discount_cents in 0i64..=50_000,
        service_cents in 0i64..=20_000,
    ) {
        let decimal_lines: Vec<(i32, Decimal)> =
            lines.iter().map(|(q, c)| (*q, money(*c))).collect();
        let discount_type = if use_percentage {
            DiscountType::Percentage
        } else {
            DiscountType::Amount
        };
        let discount_value = money(discount_cents);
        let service = money(service_cents);

        let totals = compute_totals(&decimal_lines, discount_type, discount_value, service);

        let expected_subtotal: Decimal = decimal_lines
            .iter()
            .map(|(q, p)| Decimal::from(*q) * *p)
            .sum();
        prop_assert_eq!(totals.subtotal, expected_subtotal.round_dp(2));

        prop_assert!(totals.discount_amount >= Decimal::ZERO);
        prop_assert!(totals.discount_amount <= totals.subtotal);

        prop_assert!(totals.total >= Decimal::ZERO);
        prop_assert_eq!(
            totals.total,
            (totals.subtotal - totals.discount_amount + service)
                .max(Decimal::ZERO)
                .round_dp(2)
        );
    }

    /// An amount discount larger than the subtotal zeroes the goods value
    /// but never produces a negative total
    #[test]
    fn oversized_discounts_clamp(
        qty in 1i32..=10,
        price_cents in 0i64..=10_000,
        extra_cents in 0i64..=100_000,
    ) {
        let price = money(price_cents);
        let subtotal = Decimal::from(qty) * price;
        let discount = subtotal + money(extra_cents);

        let totals = compute_totals(&[(qty, price)], DiscountType::Amount, discount, Decimal::ZERO);
        prop_assert_eq!(totals.discount_amount, subtotal.round_dp(2));
        prop_assert_eq!(totals.total, Decimal::ZERO);
    }
}
