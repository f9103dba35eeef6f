// Property-based tests for the aggregator.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_core::{aggregate, category_breakdown, Flow, Transaction};

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Amounts in cents, mostly non-zero, sometimes exactly zero.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        8 => (-500_000i64..500_000).prop_map(|c| Decimal::new(c, 2)),
        1 => Just(Decimal::ZERO),
    ]
}

/// Any second within roughly three years, so day and year boundaries get hit.
fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (0u32..1000, arb_amount(), 0i64..(3 * 365 * 86_400), prop::sample::select(vec!["Food", "Rent", "Salary", ""]))
        .prop_map(|(id, amount, secs, category)| {
            let base = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
            Transaction::new(format!("t{id}"), "u1", amount, base + Duration::seconds(secs), category)
        })
}

fn arb_records() -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec(arb_transaction(), 0..60)
}

/// A record set together with a permutation of it.
fn arb_records_and_permutation() -> impl Strategy<Value = (Vec<Transaction>, Vec<Transaction>)> {
    arb_records().prop_flat_map(|r| (Just(r.clone()), Just(r).prop_shuffle()))
}

fn arb_flow() -> impl Strategy<Value = Flow> {
    prop_oneof![Just(Flow::Income), Just(Flow::Expense)]
}

fn filtered_sum(records: &[Transaction], flow: Flow) -> Decimal {
    records.iter().filter_map(|t| flow.contribution(t)).sum()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    #[test]
    fn labels_strictly_increase(records in arb_records(), flow in arb_flow()) {
        let s = aggregate(&records, flow, Tz::UTC);
        prop_assert!(s.is_well_formed());
        prop_assert!(s.labels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn totals_are_conserved(records in arb_records(), flow in arb_flow()) {
        let s = aggregate(&records, flow, Tz::UTC);
        prop_assert_eq!(s.total(), filtered_sum(&records, flow));
        prop_assert_eq!(category_breakdown(&records, flow).total(), filtered_sum(&records, flow));
    }

    #[test]
    fn input_order_does_not_matter((records, shuffled) in arb_records_and_permutation(), flow in arb_flow()) {
        prop_assert_eq!(aggregate(&records, flow, Tz::UTC), aggregate(&shuffled, flow, Tz::UTC));
        prop_assert_eq!(category_breakdown(&records, flow), category_breakdown(&shuffled, flow));
    }

    #[test]
    fn buckets_never_hold_zero_or_negative_totals(records in arb_records(), flow in arb_flow()) {
        let s = aggregate(&records, flow, Tz::UTC);
        prop_assert!(s.values.iter().all(|v| *v > Decimal::ZERO));
    }
}

#[test]
fn empty_snapshot_is_empty_series() {
    let s = aggregate(&[], Flow::Income, Tz::UTC);
    assert!(s.labels.is_empty());
    assert!(s.values.is_empty());
}
