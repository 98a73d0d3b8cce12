//! Late-return penalty calculation.
//!
//! Pure and deterministic: identical inputs always produce identical
//! settlements, and the computation never touches a clock or a lock.
//!
//! With the default schedule a return within one whole minute refunds the
//! full deposit, every further started minute up to the fifth costs one daily
//! price (capped at the deposit), and anything later forfeits the deposit.

use chrono::{DateTime, Utc};
use rental_types::{Amount, Settlement};
use serde::{Deserialize, Serialize};

/// Whole minutes of free rental before penalties accrue.
pub const GRACE_MINUTES: u64 = 1;

/// Past this many whole minutes the entire deposit is forfeited.
pub const FORFEIT_AFTER_MINUTES: u64 = 5;

/// Thresholds of the penalty policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltySchedule {
    pub grace_minutes: u64,
    pub forfeit_after_minutes: u64,
}

impl Default for PenaltySchedule {
    fn default() -> Self {
        Self {
            grace_minutes: GRACE_MINUTES,
            forfeit_after_minutes: FORFEIT_AFTER_MINUTES,
        }
    }
}

impl PenaltySchedule {
    /// Split `daily_price + deposit` between renter and lister.
    pub fn settle(&self, daily_price: Amount, deposit: Amount, elapsed_minutes: u64) -> Settlement {
        let penalty = if elapsed_minutes <= self.grace_minutes {
            0
        } else if elapsed_minutes <= self.forfeit_after_minutes {
            Amount::from(elapsed_minutes - self.grace_minutes)
                .saturating_mul(daily_price)
                .min(deposit)
        } else {
            deposit
        };

        Settlement {
            elapsed_minutes,
            penalty,
            renter_refund: deposit - penalty,
            lister_credit: daily_price.saturating_add(penalty),
        }
    }
}

/// Settle a return under the default schedule.
pub fn compute_settlement(daily_price: Amount, deposit: Amount, elapsed_minutes: u64) -> Settlement {
    PenaltySchedule::default().settle(daily_price, deposit, elapsed_minutes)
}

/// Whole minutes from `rented_at` to `now`, truncated. A `now` earlier than
/// `rented_at` counts as zero.
pub fn elapsed_minutes(rented_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let seconds = (now - rented_at).num_seconds();
    u64::try_from(seconds / 60).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    // 0.01 and 0.05 of a 10^18 unit currency.
    const PRICE: Amount = 10_000_000_000_000_000;
    const DEPOSIT: Amount = 50_000_000_000_000_000;

    #[test]
    fn within_grace_refunds_full_deposit() {
        for elapsed in [0, 1] {
            let s = compute_settlement(PRICE, DEPOSIT, elapsed);
            assert_eq!(s.renter_refund, DEPOSIT);
            assert_eq!(s.lister_credit, PRICE);
            assert!(s.is_full_refund());
        }
    }

    #[test]
    fn each_late_minute_costs_one_daily_price() {
        let s = compute_settlement(PRICE, DEPOSIT, 2);
        assert_eq!(s.penalty, PRICE);
        assert_eq!(s.renter_refund, 40_000_000_000_000_000);
        assert_eq!(s.lister_credit, 2 * PRICE);

        let s = compute_settlement(PRICE, DEPOSIT, 5);
        assert_eq!(s.penalty, 4 * PRICE);
        assert_eq!(s.renter_refund, PRICE);
    }

    #[test]
    fn penalty_is_capped_at_deposit() {
        let s = compute_settlement(30, 50, 4);
        assert_eq!(s.penalty, 50);
        assert_eq!(s.renter_refund, 0);
        assert_eq!(s.lister_credit, 80);
    }

    #[test]
    fn past_five_minutes_forfeits_everything() {
        for elapsed in [6, 60, u64::MAX] {
            let s = compute_settlement(PRICE, DEPOSIT, elapsed);
            assert_eq!(s.renter_refund, 0);
            assert_eq!(s.lister_credit, PRICE + DEPOSIT);
        }
    }

    #[test]
    fn settlement_always_sums_to_escrow() {
        for elapsed in 0..10 {
            let s = compute_settlement(7, 20, elapsed);
            assert_eq!(s.total(), Some(27), "elapsed {elapsed}");
        }
    }

    #[test]
    fn custom_schedule_moves_thresholds() {
        let schedule = PenaltySchedule {
            grace_minutes: 3,
            forfeit_after_minutes: 10,
        };
        assert_eq!(schedule.settle(5, 100, 3).penalty, 0);
        assert_eq!(schedule.settle(5, 100, 4).penalty, 5);
        assert_eq!(schedule.settle(5, 100, 11).penalty, 100);
    }

    #[test]
    fn elapsed_truncates_to_whole_minutes() {
        let start = Utc::now();
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(50)), 0);
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(130)), 2);
        assert_eq!(elapsed_minutes(start, start + Duration::seconds(360)), 6);
        assert_eq!(elapsed_minutes(start, start - Duration::seconds(90)), 0);
    }
}
