//! Venue selection.
//!
//! Pure comparison of two quotes. When estimated outputs are within 0.1%
//! of each other the venues are considered equivalently priced and the
//! deeper book wins; otherwise the better output wins outright.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{Quote, RoutingDecision, VenueId};

/// Outputs closer than this (percent of the mean) are "similar prices".
const SIMILAR_OUTPUT_THRESHOLD_PCT: Decimal = dec!(0.1);

/// Result of comparing two quotes.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueChoice {
    pub venue: VenueId,
    pub justification: String,
}

/// Pick the venue that should execute the order.
///
/// Deterministic given the two quotes: equal estimated outputs fall through
/// to liquidity, and an exact liquidity tie goes to Venue A (fixed
/// preference order, never map iteration order).
pub fn select_venue(quote_a: &Quote, quote_b: &Quote) -> VenueChoice {
    let diff_pct = output_diff_pct(quote_a, quote_b);

    if diff_pct < SIMILAR_OUTPUT_THRESHOLD_PCT {
        let winner = if quote_b.liquidity > quote_a.liquidity {
            quote_b
        } else {
            quote_a
        };
        return VenueChoice {
            venue: winner.venue,
            justification: format!(
                "similar prices ({:.3}% apart); {} has higher liquidity ({:.0} vs {:.0})",
                diff_pct,
                winner.venue,
                winner.liquidity,
                other(winner, quote_a, quote_b).liquidity,
            ),
        };
    }

    let (winner, loser) = if quote_a.estimated_output >= quote_b.estimated_output {
        (quote_a, quote_b)
    } else {
        (quote_b, quote_a)
    };
    let advantage_pct =
        (winner.estimated_output - loser.estimated_output) / loser.estimated_output * dec!(100);

    VenueChoice {
        venue: winner.venue,
        justification: format!(
            "{} offers {:.3}% better output ({:.6} vs {:.6})",
            winner.venue, advantage_pct, winner.estimated_output, loser.estimated_output,
        ),
    }
}

fn other<'a>(winner: &Quote, quote_a: &'a Quote, quote_b: &'a Quote) -> &'a Quote {
    if winner.venue == quote_a.venue {
        quote_b
    } else {
        quote_a
    }
}

/// `|outA - outB| / mean(outA, outB) * 100`
fn output_diff_pct(quote_a: &Quote, quote_b: &Quote) -> Decimal {
    let mean = (quote_a.estimated_output + quote_b.estimated_output) / dec!(2);
    if mean.is_zero() {
        return Decimal::ZERO;
    }
    (quote_a.estimated_output - quote_b.estimated_output).abs() / mean * dec!(100)
}

/// Build the append-only routing record for a decision.
pub fn routing_decision(
    order_id: uuid::Uuid,
    amount: Decimal,
    quote_a: Quote,
    quote_b: Quote,
    choice: &VenueChoice,
) -> RoutingDecision {
    RoutingDecision {
        order_id,
        amount,
        quote_a,
        quote_b,
        selected_venue: choice.venue,
        justification: choice.justification.clone(),
        decided_at: chrono::Utc::now(),
    }
}
