//! `GasPriceEstimator` (spec.md §4.5.1): fits an exponential curve through
//! `(MAX_BLOCKS, MAX_PRICE)` and `(endBlock - H_floor, P0)` and evaluates it
//! at the request's current distance to its deadline.

use pisa_primitives::BlockNumber;

/// Estimates the gas price a response transaction should carry given how
/// many blocks remain before `endBlock`.
#[derive(Debug, Clone, Copy)]
pub struct GasPriceEstimator {
    max_blocks: u64,
    max_price: u128,
    h_floor: u64,
}

impl GasPriceEstimator {
    pub const fn new(max_blocks: u64, max_price: u128, h_floor: u64) -> Self {
        Self { max_blocks, max_price, h_floor }
    }

    /// The ideal gas price for a request with the given `endBlock`, observed
    /// at chain tip `head`, given the node's current spot price `spot_price`.
    /// Never exceeds `max_price`; `spot_price = 0` is treated as `1`.
    pub fn ideal_gas_price(&self, end_block: BlockNumber, head: BlockNumber, spot_price: u128) -> u128 {
        let blocks_left = end_block.saturating_sub(head);
        if blocks_left <= self.max_blocks {
            return self.max_price;
        }

        let p0 = if spot_price == 0 { 1 } else { spot_price }.min(self.max_price);
        let x1 = self.max_blocks as f64;
        let y1 = self.max_price as f64;
        let x2 = end_block.saturating_sub(self.h_floor) as f64;
        let y2 = p0 as f64;

        if x2 <= x1 || y2 <= 0.0 {
            return self.max_price;
        }

        let k = (y2 / y1).ln() / (x2 - x1);
        let a = y1 / (k * x1).exp();
        let raw = a * (k * blocks_left as f64).exp();

        if !raw.is_finite() || raw <= 0.0 {
            return self.max_price;
        }

        (raw.round() as u128).min(self.max_price)
    }
}
