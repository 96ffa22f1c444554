//! Pricing engine
//!
//! `total = Σ(beds in room × room price × nights) × (1 − group discount) × season multiplier`
//!
//! The season is chosen by the check-in date alone. Money values are rounded
//! to cents, midpoint away from zero.

use bunkhouse_core::config::PricingConfig;
use bunkhouse_core::models::{BedSelection, RoomId};
use bunkhouse_core::{AppError, AppResult};
use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::catalog::RoomCatalog;

/// Round a money amount to cents
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Pricing season of a check-in date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    High,
    Medium,
    Low,
    Carnival,
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Season::High => write!(f, "high"),
            Season::Medium => write!(f, "medium"),
            Season::Low => write!(f, "low"),
            Season::Carnival => write!(f, "carnival"),
        }
    }
}

/// Itemised price of a stay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBreakdown {
    pub base: Decimal,
    pub discount_rate: Decimal,
    pub discount_amount: Decimal,
    pub after_discount: Decimal,
    pub season: Season,
    pub multiplier: Decimal,
    pub total: Decimal,
}

/// Deposit due at booking time and the balance charged later
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositSplit {
    pub rate: Decimal,
    pub deposit: Decimal,
    pub remaining: Decimal,
}

/// Group size from which the larger deposit applies
pub const LARGE_GROUP_DEPOSIT_THRESHOLD: u32 = 15;

pub struct PricingEngine {
    catalog: Arc<RoomCatalog>,
    config: PricingConfig,
    remaining_charge_lead_days: i64,
}

impl PricingEngine {
    pub fn new(catalog: Arc<RoomCatalog>, config: PricingConfig, remaining_charge_lead_days: i64) -> Self {
        Self {
            catalog,
            config,
            remaining_charge_lead_days,
        }
    }

    /// Discount rate for a group occupying `total_beds`
    pub fn group_discount(&self, total_beds: u32) -> Decimal {
        match total_beds {
            0..=6 => Decimal::ZERO,
            7..=15 => Decimal::new(10, 2),
            16..=25 => Decimal::new(15, 2),
            _ => Decimal::new(20, 2),
        }
    }

    pub fn is_carnival(&self, check_in: NaiveDate) -> bool {
        self.config
            .carnival_periods
            .iter()
            .any(|period| period.contains(check_in))
    }

    pub fn season_for(&self, check_in: NaiveDate) -> Season {
        if self.is_carnival(check_in) {
            return Season::Carnival;
        }
        match check_in.month() {
            12 | 1 | 2 | 3 => Season::High,
            4 | 5 | 10 | 11 => Season::Medium,
            _ => Season::Low,
        }
    }

    pub fn multiplier_for(&self, season: Season) -> Decimal {
        match season {
            Season::High => self.config.high_season_multiplier,
            Season::Medium => self.config.medium_season_multiplier,
            Season::Low => self.config.low_season_multiplier,
            Season::Carnival => self.config.carnival_multiplier,
        }
    }

    pub fn season_multiplier(&self, check_in: NaiveDate) -> Decimal {
        self.multiplier_for(self.season_for(check_in))
    }

    /// Carnival stays have a hard minimum length
    pub fn validate_min_stay(&self, check_in: NaiveDate, nights: u32) -> AppResult<()> {
        if self.is_carnival(check_in) && nights < self.config.carnival_min_nights {
            return Err(AppError::Validation(format!(
                "carnival stays require at least {} nights, got {}",
                self.config.carnival_min_nights, nights
            )));
        }
        Ok(())
    }

    pub fn calculate_price(
        &self,
        beds: &[BedSelection],
        nights: u32,
        check_in: NaiveDate,
    ) -> AppResult<PriceBreakdown> {
        if beds.is_empty() {
            return Err(AppError::Validation("no beds selected".to_string()));
        }
        if nights == 0 {
            return Err(AppError::Validation("stay must be at least one night".to_string()));
        }
        self.validate_min_stay(check_in, nights)?;

        let mut per_room: BTreeMap<RoomId, u32> = BTreeMap::new();
        for bed in beds {
            *per_room.entry(bed.room_id).or_default() += 1;
        }

        let mut base = Decimal::ZERO;
        for (room_id, count) in per_room {
            let room = self.catalog.require(room_id)?;
            base += room.base_price * Decimal::from(count) * Decimal::from(nights);
        }
        let base = round_money(base);

        let discount_rate = self.group_discount(beds.len() as u32);
        let discount_amount = round_money(base * discount_rate);
        let after_discount = base - discount_amount;

        let season = self.season_for(check_in);
        let multiplier = self.multiplier_for(season);
        let total = round_money(after_discount * multiplier);

        debug!(
            "Priced {} beds x {} nights from {}: base {} -> {} ({} season)",
            beds.len(),
            nights,
            check_in,
            base,
            total,
            season
        );

        Ok(PriceBreakdown {
            base,
            discount_rate,
            discount_amount,
            after_discount,
            season,
            multiplier,
            total,
        })
    }

    /// 50% deposit for groups of 15 or more, 30% otherwise
    pub fn calculate_deposit(&self, total: Decimal, total_people: u32) -> DepositSplit {
        let rate = if total_people >= LARGE_GROUP_DEPOSIT_THRESHOLD {
            Decimal::new(50, 2)
        } else {
            Decimal::new(30, 2)
        };
        let deposit = round_money(total * rate);
        DepositSplit {
            rate,
            deposit,
            remaining: total - deposit,
        }
    }

    /// Date the remaining balance is charged; never before `today`
    pub fn remaining_charge_date(&self, check_in: NaiveDate, today: NaiveDate) -> NaiveDate {
        (check_in - Duration::days(self.remaining_charge_lead_days)).max(today)
    }
}
