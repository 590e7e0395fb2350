// In crates/core-types/src/fees.rs

use rust_decimal::Decimal;

/// Fee charged on one fill of `quantity` at `price`.
pub fn fill_fee(price: Decimal, quantity: Decimal, fee_rate: Decimal) -> Decimal {
    price * quantity * fee_rate
}

/// Modeled round-trip fee in price terms, per unit of size.
pub fn round_trip_fee_per_unit(entry: Decimal, fee_rate: Decimal) -> Decimal {
    Decimal::TWO * entry * fee_rate
}

/// Smallest reward distance a target may have: `multiple` round-trip fees.
pub fn profit_floor_distance(entry: Decimal, fee_rate: Decimal, multiple: Decimal) -> Decimal {
    multiple * round_trip_fee_per_unit(entry, fee_rate)
}
