//! Hold manager
//!
//! Temporary reservations of specific beds while a guest pays.
//!
//! Holds live in the shared [`LockStore`], never in the durable database:
//! - `hold:{id}` stores the serialized record
//! - `bed_claim:{room}:{bed}:{night}` stores the id of the hold owning that
//!   bed for that night, written with set-if-absent
//!
//! The per-night claims are what make two overlapping `start_hold` calls
//! mutually exclusive across engine instances. A claim expires together with
//! its hold, and a claim whose owner is no longer live may be taken over.
//!
//! Status changes on a stored record are compare-and-set against the exact
//! value that was read, so a hold leaves `Active` at most once.

use bunkhouse_cache::keys;
use bunkhouse_core::{
    config::HoldConfig,
    models::{BedSelection, Hold, HoldStatus, PaymentStatus, StayRange},
    traits::{BookingRepository, LockStore},
    AppError, AppResult, Clock,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::RoomCatalog;

/// Re-reads allowed when a hold record changes under a status update
const TRANSITION_ATTEMPTS: usize = 5;

/// Typed access to hold records in the lock store
#[derive(Clone)]
pub struct HoldStore {
    store: Arc<dyn LockStore>,
}

impl HoldStore {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, id: Uuid) -> AppResult<Option<Hold>> {
        Ok(self.load_versioned(id).await?.map(|(hold, _)| hold))
    }

    /// A hold together with the raw record it was decoded from
    pub async fn load_versioned(&self, id: Uuid) -> AppResult<Option<(Hold, String)>> {
        match self.store.get(&keys::hold_key(id)).await? {
            Some(raw) => Ok(Some((serde_json::from_str(&raw)?, raw))),
            None => Ok(None),
        }
    }

    pub async fn save(&self, hold: &Hold, ttl_secs: u64) -> AppResult<()> {
        let raw = serde_json::to_string(hold)?;
        self.store
            .set_ex(&keys::hold_key(hold.id), &raw, ttl_secs)
            .await
    }

    /// Overwrite a hold only while its record still reads `expected`
    pub async fn replace(&self, hold: &Hold, expected: &str, ttl_secs: u64) -> AppResult<bool> {
        let raw = serde_json::to_string(hold)?;
        self.store
            .replace_if_eq(&keys::hold_key(hold.id), expected, &raw, ttl_secs)
            .await
    }

    pub async fn remove(&self, id: Uuid) -> AppResult<bool> {
        self.store.delete(&keys::hold_key(id)).await
    }

    /// Delete a hold only while its record still reads `expected`
    pub async fn remove_if_unchanged(&self, id: Uuid, expected: &str) -> AppResult<bool> {
        self.store.delete_if_eq(&keys::hold_key(id), expected).await
    }

    /// Every stored hold record, whatever its status
    pub async fn list_all(&self) -> AppResult<Vec<Hold>> {
        Ok(self
            .list_versioned()
            .await?
            .into_iter()
            .map(|(hold, _)| hold)
            .collect())
    }

    /// Every stored hold with the raw record it was decoded from
    pub async fn list_versioned(&self) -> AppResult<Vec<(Hold, String)>> {
        let entries = self
            .store
            .list_by_prefix(&keys::prefix(keys::HOLD_PREFIX))
            .await?;

        let mut holds = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            match serde_json::from_str::<Hold>(&raw) {
                Ok(hold) => holds.push((hold, raw)),
                Err(e) => warn!("Skipping unreadable hold record {}: {}", key, e),
            }
        }
        Ok(holds)
    }

    /// Live holds overlapping `range`, oldest first
    pub async fn list_live(&self, range: StayRange, now: DateTime<Utc>) -> AppResult<Vec<Hold>> {
        let mut holds: Vec<Hold> = self
            .list_all()
            .await?
            .into_iter()
            .filter(|hold| hold.is_live(now) && hold.stay().overlaps(&range))
            .collect();
        holds.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(holds)
    }
}

/// Hold lifecycle: start, confirm, release, sweep
pub struct HoldManager {
    holds: HoldStore,
    store: Arc<dyn LockStore>,
    bookings: Arc<dyn BookingRepository>,
    catalog: Arc<RoomCatalog>,
    clock: Arc<dyn Clock>,
    config: HoldConfig,
}

impl HoldManager {
    pub fn new(
        store: Arc<dyn LockStore>,
        bookings: Arc<dyn BookingRepository>,
        catalog: Arc<RoomCatalog>,
        clock: Arc<dyn Clock>,
        config: HoldConfig,
    ) -> Self {
        Self {
            holds: HoldStore::new(store.clone()),
            store,
            bookings,
            catalog,
            clock,
            config,
        }
    }

    pub fn hold_store(&self) -> &HoldStore {
        &self.holds
    }

    /// Reserve `beds` for every night of `range`
    ///
    /// # Arguments
    ///
    /// * `beds` - Beds to reserve
    /// * `range` - Stay dates, check-out exclusive
    /// * `ttl_minutes` - Hold lifetime (default: configured TTL)
    /// * `payload` - Caller context stored with the hold
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The bed list is empty, has duplicates or names unknown beds
    /// - The range is empty, or the TTL is not positive or exceeds the configured maximum
    /// - A bed is booked (`BedUnavailable`) or held (`HoldConflict`) for an overlapping night
    #[instrument(skip(self, beds, payload), fields(beds = beds.len(), range = %range))]
    pub async fn start_hold(
        &self,
        beds: Vec<BedSelection>,
        range: StayRange,
        ttl_minutes: Option<i64>,
        payload: serde_json::Value,
    ) -> AppResult<Hold> {
        let ttl_minutes = ttl_minutes.unwrap_or(self.config.ttl_minutes);
        self.validate_request(&beds, range, ttl_minutes)?;

        let booked = self.bookings.find_active_overlapping(range).await?;
        for booking in &booked {
            if let Some(bed) = beds.iter().find(|bed| booking.beds.contains(bed)) {
                debug!("{} already booked by {}", bed, booking.id);
                return Err(AppError::BedUnavailable { bed: *bed });
            }
        }

        let now = self.clock.now();
        let (expires_at, claim_ttl) = hold_lifetime(now, ttl_minutes)?;
        let hold = Hold {
            id: Uuid::new_v4(),
            beds,
            check_in: range.check_in,
            check_out: range.check_out,
            status: HoldStatus::Active,
            created_at: now,
            expires_at,
            payload,
            payment_status: None,
        };

        // Record first, so a competing claimant always finds a live owner
        self.holds
            .save(&hold, claim_ttl.saturating_add(self.config.record_grace_secs))
            .await?;

        if let Err(e) = self.claim_all(&hold, claim_ttl, now).await {
            if let Err(cleanup) = self.holds.remove(hold.id).await {
                error!("Failed to remove rejected hold {}: {}", hold.id, cleanup);
            }
            return Err(e);
        }

        info!(
            "Hold {} started for {} beds {} (expires {})",
            hold.id,
            hold.beds.len(),
            range,
            hold.expires_at
        );
        Ok(hold)
    }

    /// Mark a hold confirmed once its booking is durable
    ///
    /// Confirming twice is a no-op. The bed claims are dropped, since the
    /// booking row now guards those beds.
    #[instrument(skip(self))]
    pub async fn confirm_hold(&self, hold_id: Uuid, payment_status: PaymentStatus) -> AppResult<Hold> {
        for _ in 0..TRANSITION_ATTEMPTS {
            let (mut hold, raw) = self
                .holds
                .load_versioned(hold_id)
                .await?
                .ok_or(AppError::HoldNotFound(hold_id))?;

            match hold.status {
                HoldStatus::Confirmed => {
                    debug!("Hold {} already confirmed", hold_id);
                    return Ok(hold);
                }
                HoldStatus::Released | HoldStatus::Expired => {
                    return Err(AppError::InvalidTransition(format!(
                        "hold {} is {} and cannot be confirmed",
                        hold_id, hold.status
                    )));
                }
                HoldStatus::Active => {}
            }

            if hold.is_expired_at(self.clock.now()) {
                warn!("Hold {} expired before confirmation", hold_id);
                return Err(AppError::HoldExpired(hold_id));
            }

            hold.status = HoldStatus::Confirmed;
            hold.payment_status = Some(payment_status);
            if !self
                .holds
                .replace(&hold, &raw, self.config.confirmed_retention_secs)
                .await?
            {
                debug!("Hold {} changed during confirmation, re-reading", hold_id);
                continue;
            }
            self.release_claims(&hold).await;

            info!("Hold {} confirmed ({})", hold_id, payment_status);
            return Ok(hold);
        }

        Err(contended(hold_id))
    }

    /// Give up a hold. Unknown, released and expired holds are ignored.
    #[instrument(skip(self))]
    pub async fn release_hold(&self, hold_id: Uuid) -> AppResult<()> {
        for _ in 0..TRANSITION_ATTEMPTS {
            let Some((mut hold, raw)) = self.holds.load_versioned(hold_id).await? else {
                debug!("Hold {} not found, nothing to release", hold_id);
                return Ok(());
            };

            match hold.status {
                HoldStatus::Confirmed => {
                    info!("Hold {} is confirmed, release ignored", hold_id);
                    return Ok(());
                }
                HoldStatus::Released | HoldStatus::Expired => return Ok(()),
                HoldStatus::Active => {}
            }

            hold.status = HoldStatus::Released;
            if !self
                .holds
                .replace(&hold, &raw, self.config.record_grace_secs)
                .await?
            {
                debug!("Hold {} changed during release, re-reading", hold_id);
                continue;
            }
            self.release_claims(&hold).await;
            info!("Hold {} released", hold_id);
            return Ok(());
        }

        Err(contended(hold_id))
    }

    /// Remove every active hold past its expiry
    ///
    /// Driven by an external trigger. Confirmed holds are never touched: a
    /// record is only deleted while it still matches the listed snapshot.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let mut swept = 0;

        for (hold, raw) in self.holds.list_versioned().await? {
            if hold.status != HoldStatus::Active || !hold.is_expired_at(now) {
                continue;
            }
            match self.holds.remove_if_unchanged(hold.id, &raw).await {
                Ok(true) => {
                    self.release_claims(&hold).await;
                    debug!("Swept hold {} (expired {})", hold.id, hold.expires_at);
                    swept += 1;
                }
                Ok(false) => debug!("Hold {} changed since listing, left in place", hold.id),
                Err(e) => warn!("Failed to sweep hold {}: {}", hold.id, e),
            }
        }

        if swept > 0 {
            info!("Swept {} expired holds", swept);
        }
        Ok(swept)
    }

    /// Current state of a hold; an active hold past expiry reads as expired
    pub async fn get_hold(&self, hold_id: Uuid) -> AppResult<Hold> {
        let mut hold = self
            .holds
            .load(hold_id)
            .await?
            .ok_or(AppError::HoldNotFound(hold_id))?;

        if hold.status == HoldStatus::Active && hold.is_expired_at(self.clock.now()) {
            hold.status = HoldStatus::Expired;
        }
        Ok(hold)
    }

    pub async fn list_active_holds(&self, range: StayRange) -> AppResult<Vec<Hold>> {
        self.holds.list_live(range, self.clock.now()).await
    }

    fn validate_request(&self, beds: &[BedSelection], range: StayRange, ttl_minutes: i64) -> AppResult<()> {
        if beds.is_empty() {
            return Err(AppError::Validation("a hold needs at least one bed".to_string()));
        }
        if !range.is_valid() {
            return Err(AppError::Validation(format!(
                "check-out must be after check-in, got {}",
                range
            )));
        }
        if ttl_minutes <= 0 {
            return Err(AppError::Validation(format!(
                "hold TTL must be positive, got {} minutes",
                ttl_minutes
            )));
        }
        if ttl_minutes > self.config.max_ttl_minutes {
            return Err(AppError::Validation(format!(
                "hold TTL of {} minutes exceeds the {} minute maximum",
                ttl_minutes, self.config.max_ttl_minutes
            )));
        }

        let mut seen = BTreeSet::new();
        for bed in beds {
            let room = self.catalog.require(bed.room_id)?;
            if !room.has_bed(bed.bed_number) {
                return Err(AppError::Validation(format!("{} does not exist", bed)));
            }
            if !seen.insert(*bed) {
                return Err(AppError::Validation(format!("{} is listed twice", bed)));
            }
        }
        Ok(())
    }

    /// Claim every (bed, night) of `hold`, rolling back on the first failure
    async fn claim_all(&self, hold: &Hold, ttl_secs: u64, now: DateTime<Utc>) -> AppResult<()> {
        let owner = hold.id.to_string();
        let mut claimed: Vec<String> = Vec::new();

        for bed in &hold.beds {
            for night in hold.stay().nights_iter() {
                let key = keys::bed_claim_key(bed.room_id, bed.bed_number, night);
                let outcome = self.claim(&key, &owner, ttl_secs, now).await;

                let failure = match outcome {
                    Ok(true) => {
                        claimed.push(key);
                        continue;
                    }
                    Ok(false) => conflict(*bed, night),
                    Err(e) => e,
                };

                self.rollback(&claimed, &owner).await;
                return Err(failure);
            }
        }
        Ok(())
    }

    /// Take one claim, replacing it if its owner is no longer live
    async fn claim(&self, key: &str, owner: &str, ttl_secs: u64, now: DateTime<Utc>) -> AppResult<bool> {
        if self.store.set_nx_ex(key, owner, ttl_secs).await? {
            return Ok(true);
        }

        let Some(current) = self.store.get(key).await? else {
            return self.store.set_nx_ex(key, owner, ttl_secs).await;
        };
        if current == owner {
            return Ok(true);
        }

        let current_live = match Uuid::parse_str(&current) {
            Ok(id) => self
                .holds
                .load(id)
                .await?
                .map(|h| h.is_live(now))
                .unwrap_or(false),
            Err(_) => false,
        };
        if current_live {
            return Ok(false);
        }

        debug!("Taking over stale claim {} from {}", key, current);
        self.store.delete_if_eq(key, &current).await?;
        self.store.set_nx_ex(key, owner, ttl_secs).await
    }

    async fn rollback(&self, claimed: &[String], owner: &str) {
        let results = join_all(claimed.iter().map(|key| self.store.delete_if_eq(key, owner))).await;
        for (key, result) in claimed.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to roll back claim {}: {}", key, e);
            }
        }
    }

    /// Drop the claims a hold still owns
    async fn release_claims(&self, hold: &Hold) {
        let claims: Vec<String> = hold
            .beds
            .iter()
            .flat_map(|bed| {
                hold.stay()
                    .nights_iter()
                    .map(move |night| keys::bed_claim_key(bed.room_id, bed.bed_number, night))
            })
            .collect();
        self.rollback(&claims, &hold.id.to_string()).await;
    }
}

/// Expiry instant and claim TTL in seconds for a hold started at `now`
fn hold_lifetime(now: DateTime<Utc>, ttl_minutes: i64) -> AppResult<(DateTime<Utc>, u64)> {
    let out_of_range =
        || AppError::Validation(format!("hold TTL of {} minutes is out of range", ttl_minutes));

    let expires_at = Duration::try_minutes(ttl_minutes)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(out_of_range)?;
    let claim_ttl = u64::try_from(ttl_minutes)
        .ok()
        .and_then(|minutes| minutes.checked_mul(60))
        .ok_or_else(out_of_range)?;
    Ok((expires_at, claim_ttl))
}

fn contended(hold_id: Uuid) -> AppError {
    warn!("Hold {} kept changing under a status update", hold_id);
    AppError::Conflict(format!("hold {} is being updated concurrently", hold_id))
}

fn conflict(bed: BedSelection, night: NaiveDate) -> AppError {
    debug!("{} already held for {}", bed, night);
    AppError::HoldConflict { bed, night }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunkhouse_cache::MemoryLockStore;
    use bunkhouse_core::models::{GenderPolicy, Room};
    use bunkhouse_core::FixedClock;
    use bunkhouse_db::MemoryBookingRepository;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<MemoryLockStore>,
        manager: HoldManager,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryLockStore::new(clock.clone()));
        let catalog = RoomCatalog::new(
            vec![Room {
                id: 1,
                name: None,
                capacity: 4,
                gender_policy: GenderPolicy::Mixed,
                is_flexible: false,
                auto_convert_hours: 0,
                base_price: dec!(40),
            }],
            14,
        )
        .unwrap();
        let manager = HoldManager::new(
            store.clone(),
            Arc::new(MemoryBookingRepository::new()),
            Arc::new(catalog),
            clock.clone(),
            HoldConfig::default(),
        );
        Fixture {
            clock,
            store,
            manager,
        }
    }

    fn range(from: u32, to: u32) -> StayRange {
        StayRange::new(
            NaiveDate::from_ymd_opt(2025, 7, from).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, to).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_rejected_hold_leaves_no_claims() {
        let f = fixture();
        f.manager
            .start_hold(vec![BedSelection::new(1, 2)], range(3, 4), None, serde_json::Value::Null)
            .await
            .unwrap();
        let before = f.store.len();

        // Bed 1 is free on both nights, bed 2 collides on the 3rd
        let err = f
            .manager
            .start_hold(
                vec![BedSelection::new(1, 1), BedSelection::new(1, 2)],
                range(2, 4),
                None,
                serde_json::Value::Null,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::HoldConflict { .. }));
        assert_eq!(f.store.len(), before);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let f = fixture();
        let bed = BedSelection::new(1, 1);

        for (beds, stay, ttl) in [
            (vec![], range(1, 2), None),
            (vec![bed, bed], range(1, 2), None),
            (vec![bed], range(2, 2), None),
            (vec![bed], range(1, 2), Some(0)),
            (vec![bed], range(1, 2), Some(HoldConfig::default().max_ttl_minutes + 1)),
            (vec![bed], range(1, 2), Some(i64::MAX)),
            (vec![BedSelection::new(1, 5)], range(1, 2), None),
        ] {
            let err = f
                .manager
                .start_hold(beds, stay, ttl, serde_json::Value::Null)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), bunkhouse_core::ErrorKind::Validation, "{}", err);
        }

        assert!(matches!(
            f.manager
                .start_hold(vec![BedSelection::new(2, 1)], range(1, 2), None, serde_json::Value::Null)
                .await,
            Err(AppError::RoomNotFound(2))
        ));
    }

    #[tokio::test]
    async fn test_confirm_transitions() {
        let f = fixture();
        let hold = f
            .manager
            .start_hold(vec![BedSelection::new(1, 1)], range(1, 3), Some(5), serde_json::Value::Null)
            .await
            .unwrap();

        let confirmed = f
            .manager
            .confirm_hold(hold.id, PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(confirmed.status, HoldStatus::Confirmed);
        assert_eq!(confirmed.payment_status, Some(PaymentStatus::Paid));

        // Second confirmation is a no-op, release is ignored
        f.manager.confirm_hold(hold.id, PaymentStatus::Paid).await.unwrap();
        f.manager.release_hold(hold.id).await.unwrap();
        assert_eq!(
            f.manager.get_hold(hold.id).await.unwrap().status,
            HoldStatus::Confirmed
        );

        let released = f
            .manager
            .start_hold(vec![BedSelection::new(1, 2)], range(1, 3), None, serde_json::Value::Null)
            .await
            .unwrap();
        f.manager.release_hold(released.id).await.unwrap();
        assert!(matches!(
            f.manager.confirm_hold(released.id, PaymentStatus::Paid).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            f.manager.confirm_hold(Uuid::new_v4(), PaymentStatus::Paid).await,
            Err(AppError::HoldNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_hold_cannot_be_confirmed() {
        let f = fixture();
        let hold = f
            .manager
            .start_hold(vec![BedSelection::new(1, 1)], range(1, 3), Some(5), serde_json::Value::Null)
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(5));
        assert_eq!(
            f.manager.get_hold(hold.id).await.unwrap().status,
            HoldStatus::Expired
        );
        assert!(matches!(
            f.manager.confirm_hold(hold.id, PaymentStatus::Paid).await,
            Err(AppError::HoldExpired(_))
        ));
    }

    #[test]
    fn test_hold_lifetime_bounds() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let (expires_at, claim_ttl) = hold_lifetime(now, 15).unwrap();
        assert_eq!(expires_at, now + Duration::minutes(15));
        assert_eq!(claim_ttl, 900);

        for ttl in [-1, i64::MAX / 60, i64::MAX] {
            assert!(matches!(hold_lifetime(now, ttl), Err(AppError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn test_sweep_leaves_changed_record_in_place() {
        let f = fixture();
        let hold = f
            .manager
            .start_hold(vec![BedSelection::new(1, 1)], range(1, 3), Some(5), serde_json::Value::Null)
            .await
            .unwrap();
        let (_, stale) = f.manager.hold_store().load_versioned(hold.id).await.unwrap().unwrap();

        f.manager.confirm_hold(hold.id, PaymentStatus::Paid).await.unwrap();
        assert!(!f
            .manager
            .hold_store()
            .remove_if_unchanged(hold.id, &stale)
            .await
            .unwrap());
        assert_eq!(
            f.manager.get_hold(hold.id).await.unwrap().status,
            HoldStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_stale_claim_is_taken_over() {
        let f = fixture();
        let night = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        f.store
            .set_ex(&keys::bed_claim_key(1, 1, night), &Uuid::new_v4().to_string(), 600)
            .await
            .unwrap();

        f.manager
            .start_hold(vec![BedSelection::new(1, 1)], range(1, 2), None, serde_json::Value::Null)
            .await
            .unwrap();
    }
}
