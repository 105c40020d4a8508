//! Core domain types: orders, quotes, and routing decisions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Result, SwapError};

/// Identity of a liquidity venue.
///
/// `VenueA` comes first in the preference order: when the selector has to
/// break an exact liquidity tie, Venue A wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueId {
    VenueA,
    VenueB,
}

impl VenueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::VenueA => "venue_a",
            VenueId::VenueB => "venue_b",
        }
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VenueId::VenueA => write!(f, "Venue A"),
            VenueId::VenueB => write!(f, "Venue B"),
        }
    }
}

impl FromStr for VenueId {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "venue_a" | "venue-a" | "a" => Ok(VenueId::VenueA),
            "venue_b" | "venue-b" | "b" => Ok(VenueId::VenueB),
            _ => Err("unknown venue id"),
        }
    }
}

/// Order lifecycle status.
///
/// `Confirmed` and `Failed` are terminal; `Failed` is reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Routing,
    Building,
    Submitted,
    Confirmed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Routing => "routing",
            OrderStatus::Building => "building",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Confirmed | OrderStatus::Failed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "routing" => Ok(OrderStatus::Routing),
            "building" => Ok(OrderStatus::Building),
            "submitted" => Ok(OrderStatus::Submitted),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "failed" => Ok(OrderStatus::Failed),
            _ => Err("unknown order status"),
        }
    }
}

/// A single venue's offer for a requested swap. Ephemeral — only persisted
/// embedded in a [`RoutingDecision`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub venue: VenueId,
    pub price: Decimal,
    /// Fee as a fraction (0.003 = 0.3%)
    pub fee: Decimal,
    /// `amount * price * (1 - fee)`
    pub estimated_output: Decimal,
    pub liquidity: Decimal,
}

impl Quote {
    pub fn new(venue: VenueId, price: Decimal, fee: Decimal, amount: Decimal, liquidity: Decimal) -> Self {
        Self {
            venue,
            price,
            fee,
            estimated_output: amount * price * (Decimal::ONE - fee),
            liquidity,
        }
    }
}

/// Client submission payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SwapRequest {
    pub asset_in: String,
    pub asset_out: String,
    pub amount: Decimal,
    /// Maximum fractional deviation between quoted and executed price,
    /// in (0, 1]. Defaults to 1%.
    pub slippage: Option<Decimal>,
}

pub const DEFAULT_SLIPPAGE: Decimal = dec!(0.01);

impl SwapRequest {
    /// Validate the submission. Rejected orders never enter the state machine.
    pub fn validate(&self) -> Result<()> {
        if self.asset_in.trim().is_empty() {
            return Err(SwapError::Validation("asset_in is required".into()));
        }
        if self.asset_out.trim().is_empty() {
            return Err(SwapError::Validation("asset_out is required".into()));
        }
        if self.asset_in.trim().eq_ignore_ascii_case(self.asset_out.trim()) {
            return Err(SwapError::Validation(
                "asset_in and asset_out must differ".into(),
            ));
        }
        if self.amount <= Decimal::ZERO {
            return Err(SwapError::Validation("amount must be positive".into()));
        }
        if let Some(slippage) = self.slippage {
            if slippage <= Decimal::ZERO || slippage > Decimal::ONE {
                return Err(SwapError::Validation(
                    "slippage must be in (0, 1]".into(),
                ));
            }
        }
        Ok(())
    }
}

/// A swap order and its full execution state.
///
/// Field nullability tracks the state machine: `executed_price` and
/// `settlement_ref` are set iff the order is `confirmed`; a terminal
/// `failed` order carries `last_error` and the retry count that exhausted.
/// Orders are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub asset_in: String,
    pub asset_out: String,
    pub amount: Decimal,
    pub slippage_tolerance: Decimal,
    /// Only market orders are supported.
    pub kind: String,
    pub status: OrderStatus,
    pub selected_venue: Option<VenueId>,
    pub quote_venue_a: Option<Decimal>,
    pub quote_venue_b: Option<Decimal>,
    pub executed_price: Option<Decimal>,
    pub settlement_ref: Option<String>,
    pub last_error: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a pending order from a validated submission.
    pub fn from_request(request: &SwapRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            asset_in: request.asset_in.trim().to_uppercase(),
            asset_out: request.asset_out.trim().to_uppercase(),
            amount: request.amount,
            slippage_tolerance: request.slippage.unwrap_or(DEFAULT_SLIPPAGE),
            kind: "market".to_string(),
            status: OrderStatus::Pending,
            selected_venue: None,
            quote_venue_a: None,
            quote_venue_b: None,
            executed_price: None,
            settlement_ref: None,
            last_error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pair(&self) -> String {
        format!("{}/{}", self.asset_in, self.asset_out)
    }
}

/// Append-only record of one routing phase: both quotes, the winner, and
/// the human-readable justification. Retries append a fresh record rather
/// than updating the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub order_id: Uuid,
    /// Swap amount the quotes were computed for
    pub amount: Decimal,
    pub quote_a: Quote,
    pub quote_b: Quote,
    pub selected_venue: VenueId,
    pub justification: String,
    pub decided_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: Decimal) -> SwapRequest {
        SwapRequest {
            asset_in: "SOL".into(),
            asset_out: "USDC".into(),
            amount,
            slippage: None,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request(dec!(1.5)).validate().is_ok());
        assert!(request(Decimal::ZERO).validate().is_err());
        assert!(request(dec!(-1)).validate().is_err());

        let mut bad = request(dec!(1));
        bad.asset_in = "  ".into();
        assert!(bad.validate().is_err());

        let mut same = request(dec!(1));
        same.asset_out = "sol".into();
        assert!(same.validate().is_err());

        let mut slip = request(dec!(1));
        slip.slippage = Some(dec!(1.5));
        assert!(slip.validate().is_err());
        slip.slippage = Some(Decimal::ONE);
        assert!(slip.validate().is_ok());
    }

    #[test]
    fn test_order_from_request_defaults() {
        let order = Order::from_request(&request(dec!(1.5)));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.retry_count, 0);
        assert_eq!(order.slippage_tolerance, dec!(0.01));
        assert_eq!(order.kind, "market");
        assert_eq!(order.pair(), "SOL/USDC");
        assert!(order.selected_venue.is_none());
        assert!(order.executed_price.is_none());
    }

    #[test]
    fn test_quote_estimated_output() {
        let quote = Quote::new(
            VenueId::VenueA,
            dec!(100),
            dec!(0.003),
            dec!(2),
            dec!(1000000),
        );
        // 2 * 100 * (1 - 0.003) = 199.4
        assert_eq!(quote.estimated_output, dec!(199.400));
    }

    #[test]
    fn test_status_terminality_and_roundtrip() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Routing,
            OrderStatus::Building,
            OrderStatus::Submitted,
        ] {
            assert!(!status.is_terminal());
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!(OrderStatus::Confirmed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
    }

    #[test]
    fn test_venue_preference_order() {
        // Selector tie-break leans on this ordering
        assert!(VenueId::VenueA < VenueId::VenueB);
        assert_eq!("venue_b".parse::<VenueId>().unwrap(), VenueId::VenueB);
    }
}
