//! Randomized mock venue.
//!
//! Quotes are drawn per call: a price offset with magnitude inside the
//! venue's variance envelope (random sign) around a reference price shared
//! by both venues, and a liquidity figure inside the liquidity envelope.
//! Settlement declines with the configured transient failure rate and
//! otherwise fills at the quoted price shifted by a uniform slippage offset
//! within the order's tolerance.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use tracing::debug;

use crate::config::{SettlementConfig, VenueConfig};
use crate::domain::{Order, Quote, VenueId};
use crate::error::{Result, SwapError};
use crate::venues::{QuoteSource, SettlementEngine, SettlementReceipt};

/// Reference price both venues quote around, keyed by pair. Unknown pairs
/// fall back to a stable symbol-derived price so quoting never fails.
pub fn reference_price(asset_in: &str, asset_out: &str) -> Decimal {
    match (asset_in, asset_out) {
        ("SOL", "USDC") | ("SOL", "USDT") => dec!(150),
        ("USDC", "SOL") | ("USDT", "SOL") => dec!(0.0067),
        ("ETH", "USDC") | ("ETH", "USDT") => dec!(3200),
        ("BTC", "USDC") | ("BTC", "USDT") => dec!(97000),
        _ => {
            let seed: u32 = asset_in
                .bytes()
                .chain(asset_out.bytes())
                .fold(17u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
            // Something in [1, 1000], stable for a given pair
            Decimal::from(seed % 1000 + 1)
        }
    }
}

pub struct MockVenue {
    id: VenueId,
    config: VenueConfig,
    settlement: SettlementConfig,
    rng: Mutex<StdRng>,
}

impl MockVenue {
    pub fn new(id: VenueId, config: VenueConfig, settlement: SettlementConfig) -> Self {
        Self {
            id,
            config,
            settlement,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Seeded constructor for deterministic tests.
    pub fn with_seed(
        id: VenueId,
        config: VenueConfig,
        settlement: SettlementConfig,
        seed: u64,
    ) -> Self {
        Self {
            id,
            config,
            settlement,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn sample_quote(&self, asset_in: &str, asset_out: &str, amount: Decimal) -> Quote {
        let reference = reference_price(asset_in, asset_out);
        let (offset, liquidity) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            let magnitude = rng.gen_range(self.config.variance_min..=self.config.variance_max);
            let signed = if rng.gen_bool(0.5) { magnitude } else { -magnitude };
            let liquidity =
                rng.gen_range(self.config.liquidity_min..=self.config.liquidity_max);
            (signed, liquidity)
        };

        let offset = Decimal::from_f64_retain(offset).unwrap_or_default();
        let liquidity = Decimal::from_f64_retain(liquidity)
            .unwrap_or_default()
            .round_dp(2);
        let price = (reference * (Decimal::ONE + offset)).round_dp(9);

        Quote::new(self.id, price, self.config.fee, amount, liquidity)
    }
}

#[async_trait]
impl QuoteSource for MockVenue {
    async fn quote(&self, asset_in: &str, asset_out: &str, amount: Decimal) -> Result<Quote> {
        tokio::time::sleep(self.config.latency()).await;

        let quote = self.sample_quote(asset_in, asset_out, amount);
        debug!(
            venue = %self.id,
            pair = %format!("{asset_in}/{asset_out}"),
            price = %quote.price,
            estimated_output = %quote.estimated_output,
            liquidity = %quote.liquidity,
            "quote sampled"
        );
        Ok(quote)
    }
}

#[async_trait]
impl SettlementEngine for MockVenue {
    async fn settle(&self, order: &Order, quote: &Quote) -> Result<SettlementReceipt> {
        tokio::time::sleep(self.config.latency()).await;

        let tolerance = order.slippage_tolerance.to_f64().unwrap_or(0.01);
        let (declined, slippage, reference) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            let declined = rng.gen_bool(self.settlement.failure_rate);
            let slippage = rng.gen_range(-tolerance..=tolerance);
            (declined, slippage, rng.gen::<u128>())
        };

        if declined {
            return Err(SwapError::Settlement {
                venue: self.id,
                reason: format!("{} rejected the transaction: insufficient liquidity at quoted price", self.id),
            });
        }

        let offset = Decimal::from_f64_retain(slippage).unwrap_or_default();
        let executed_price = (quote.price * (Decimal::ONE + offset)).round_dp(9);
        let actual_output =
            (order.amount * executed_price * (Decimal::ONE - quote.fee)).round_dp(9);

        Ok(SettlementReceipt {
            settlement_ref: format!("0x{reference:032x}"),
            executed_price,
            actual_output,
        })
    }
}
