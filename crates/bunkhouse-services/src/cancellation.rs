//! Refund tiers for cancelled bookings

use bunkhouse_core::config::CancellationConfig;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::pricing::round_money;

/// Which refund rule applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundTier {
    /// More than 30 days out: everything back except the processing fee
    Full,
    /// 15 to 30 days out
    Half,
    /// Under 15 days
    None,
    /// Carnival stays are never refunded
    Carnival,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundDecision {
    pub tier: RefundTier,
    pub days_before: i64,
    pub refund: Decimal,
}

#[derive(Debug, Clone)]
pub struct CancellationPolicy {
    processing_fee: Decimal,
}

impl CancellationPolicy {
    pub fn new(config: &CancellationConfig) -> Self {
        Self {
            processing_fee: config.processing_fee,
        }
    }

    /// Refund owed on `amount_paid` when cancelling `days_before` check-in
    pub fn refund_for(&self, amount_paid: Decimal, days_before: i64, is_carnival: bool) -> RefundDecision {
        let (tier, refund) = if is_carnival {
            (RefundTier::Carnival, Decimal::ZERO)
        } else if days_before > 30 {
            (
                RefundTier::Full,
                (amount_paid - self.processing_fee).max(Decimal::ZERO),
            )
        } else if days_before >= 15 {
            (RefundTier::Half, round_money(amount_paid * Decimal::new(5, 1)))
        } else {
            (RefundTier::None, Decimal::ZERO)
        };

        RefundDecision {
            tier,
            days_before,
            refund,
        }
    }
}
