//! Venue capability traits and adapters.
//!
//! A venue exposes two seams: quoting and settlement. The state machine
//! only ever talks to these traits, so the randomized mocks can be swapped
//! for deterministic fakes in tests (or a real venue API in production)
//! without touching execution logic.

pub mod mock;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::{Order, Quote, VenueId};
use crate::error::Result;

pub use mock::MockVenue;

/// Asynchronous quote capability for one venue. Expected to answer within
/// the engine's configured timeout or the call is treated as
/// `VenueUnavailable`.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn quote(&self, asset_in: &str, asset_out: &str, amount: Decimal) -> Result<Quote>;
}

/// Outcome of a successful settlement.
#[derive(Debug, Clone)]
pub struct SettlementReceipt {
    pub settlement_ref: String,
    pub executed_price: Decimal,
    pub actual_output: Decimal,
}

/// Settlement capability for one venue. Failures are transient by contract
/// and converted into the retry-or-fail decision by the engine.
#[async_trait]
pub trait SettlementEngine: Send + Sync {
    async fn settle(&self, order: &Order, quote: &Quote) -> Result<SettlementReceipt>;
}

/// One venue's adapters bundled with its identity.
#[derive(Clone)]
pub struct VenueAdapter {
    pub id: VenueId,
    pub quotes: Arc<dyn QuoteSource>,
    pub settlement: Arc<dyn SettlementEngine>,
}

impl VenueAdapter {
    pub fn new(
        id: VenueId,
        quotes: Arc<dyn QuoteSource>,
        settlement: Arc<dyn SettlementEngine>,
    ) -> Self {
        Self {
            id,
            quotes,
            settlement,
        }
    }

    /// Build an adapter backed by the randomized mock venue.
    pub fn mock(
        id: VenueId,
        venue_config: &crate::config::VenueConfig,
        settlement_config: &crate::config::SettlementConfig,
    ) -> Self {
        let venue = Arc::new(MockVenue::new(id, venue_config.clone(), settlement_config.clone()));
        Self {
            id,
            quotes: venue.clone(),
            settlement: venue,
        }
    }
}
