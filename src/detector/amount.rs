use alloy::primitives::{Address, U256};
use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Number of decimals of the native asset (and its wrapped form) on every
/// supported chain.
pub const NATIVE_DECIMALS: u32 = 18;

/// Convert a raw uint256 into an exact decimal, without going through floats.
pub fn u256_to_decimal(value: U256) -> BigDecimal {
    let int = BigInt::from_bytes_be(Sign::Plus, &value.to_be_bytes::<32>());
    BigDecimal::from(int)
}

/// Convert a wei amount into native units (10^18 wei = 1 native unit).
/// The division is exact; no precision is lost across any number of additions.
pub fn wei_to_native(value: U256) -> BigDecimal {
    u256_to_decimal(value) / BigDecimal::from(10u64.pow(NATIVE_DECIMALS))
}

/// Parse an address string into its canonical binary form.
/// All map keys and comparisons use `Address`, so source casing never matters.
pub fn parse_address(raw: &str) -> eyre::Result<Address> {
    Address::from_str(raw).map_err(|e| eyre::eyre!("Invalid address '{}': {}", raw, e))
}
