//! 256-bit balances and the mining complexity scalar.

use crate::types::encoding::{read_bytes, Decode, DecodeError, Encode, EncodeSink};
use peerchain_derive::BinaryCodec;
use primitive_types::U256;

/// Unsigned 256-bit account balance.
///
/// All balance arithmetic goes through the checked helpers below; overflow
/// and underflow fail the operation instead of wrapping.
pub type Balance = U256;

impl Encode for U256 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        let mut buf = [0u8; 32];
        self.to_big_endian(&mut buf);
        out.write(&buf);
    }
}

impl Decode for U256 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        let bytes = read_bytes(input, 32)?;
        Ok(U256::from_big_endian(bytes))
    }
}

/// Adds `amount` to `balance`, failing on overflow.
pub fn checked_add(balance: Balance, amount: Balance) -> Option<Balance> {
    balance.checked_add(amount)
}

/// Subtracts `amount` from `balance`, failing on underflow.
pub fn checked_sub(balance: Balance, amount: Balance) -> Option<Balance> {
    balance.checked_sub(amount)
}

/// Total cost a transaction imposes on its sender.
pub fn transaction_cost(amount: Balance, fee: u64) -> Option<Balance> {
    amount.checked_add(Balance::from(fee))
}

/// Opaque monotone scalar consumed by miners.
///
/// Chain selection itself is depth-based; the complexity only has to grow
/// with depth so miners can detect a stale template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, BinaryCodec)]
pub struct Complexity(pub u64);

impl Complexity {
    /// Complexity of the candidate block at the given depth.
    pub fn for_depth(depth: u64) -> Complexity {
        Complexity(depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn u256_codec_is_32_bytes_big_endian() {
        let value = Balance::from(0x0102030405060708u64);
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[24..], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(Balance::from_bytes(bytes.as_slice()).unwrap(), value);
    }

    #[test]
    fn u256_max_roundtrip() {
        let value = Balance::MAX;
        let decoded = Balance::from_bytes(value.to_bytes().as_slice()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn checked_add_detects_overflow() {
        assert_eq!(checked_add(Balance::MAX, Balance::from(1)), None);
        assert_eq!(
            checked_add(Balance::from(2), Balance::from(3)),
            Some(Balance::from(5))
        );
    }

    #[test]
    fn checked_sub_detects_underflow() {
        assert_eq!(checked_sub(Balance::from(1), Balance::from(2)), None);
        assert_eq!(
            checked_sub(Balance::from(5), Balance::from(3)),
            Some(Balance::from(2))
        );
    }

    #[test]
    fn transaction_cost_adds_fee() {
        assert_eq!(
            transaction_cost(Balance::from(100), 7),
            Some(Balance::from(107))
        );
        assert_eq!(transaction_cost(Balance::MAX, 1), None);
    }

    #[test]
    fn complexity_monotone_in_depth() {
        assert!(Complexity::for_depth(10) < Complexity::for_depth(11));
    }
}
