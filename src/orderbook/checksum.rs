//! Top-of-book checksum for integrity verification.
//!
//! Format: CRC32 over `bid1_price:bid1_amount:ask1_price:ask1_amount:bid2...`
//! for the top N levels of each side, interleaved. When one side runs out
//! the other keeps contributing alone. Decimals are written normalised
//! (no trailing zeros).

use crc32fast::Hasher;

use super::types::PriceLevel;

/// Default number of levels per side covered by the checksum.
pub const DEFAULT_CHECKSUM_LEVELS: usize = 25;

/// Compute the checksum over the top `levels` of each side, best first.
pub fn compute<'a, B, A>(bids: B, asks: A, levels: usize) -> u32
where
    B: IntoIterator<Item = &'a PriceLevel>,
    A: IntoIterator<Item = &'a PriceLevel>,
{
    let mut bids = bids.into_iter().take(levels);
    let mut asks = asks.into_iter().take(levels);
    let mut payload = String::with_capacity(levels * 32);

    loop {
        let bid = bids.next();
        let ask = asks.next();
        if bid.is_none() && ask.is_none() {
            break;
        }
        for level in [bid, ask].into_iter().flatten() {
            if !payload.is_empty() {
                payload.push(':');
            }
            payload.push_str(&format!(
                "{}:{}",
                level.price.normalize(),
                level.amount.normalize()
            ));
        }
    }

    let mut hasher = Hasher::new();
    hasher.update(payload.as_bytes());
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const NONE: [PriceLevel; 0] = [];

    #[test]
    fn empty_book_hashes_empty_payload() {
        assert_eq!(compute(&NONE, &NONE, 25), crc32fast::hash(b""));
    }

    #[test]
    fn interleaves_bids_and_asks() {
        let bids = [
            PriceLevel::new(dec!(100.10), dec!(1.500)),
            PriceLevel::new(dec!(100), dec!(2)),
        ];
        let asks = [PriceLevel::new(dec!(100.5), dec!(3))];

        let expected = crc32fast::hash(b"100.1:1.5:100.5:3:100:2");
        assert_eq!(compute(&bids, &asks, 25), expected);
    }

    #[test]
    fn only_top_levels_contribute() {
        let bids = [
            PriceLevel::new(dec!(2), dec!(1)),
            PriceLevel::new(dec!(1), dec!(1)),
        ];
        let deeper = [
            PriceLevel::new(dec!(2), dec!(1)),
            PriceLevel::new(dec!(1), dec!(9)),
        ];

        assert_eq!(compute(&bids, &NONE, 1), compute(&deeper, &NONE, 1));
        assert_ne!(compute(&bids, &NONE, 2), compute(&deeper, &NONE, 2));
    }
}
