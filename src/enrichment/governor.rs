//! Spend and request-rate governor for metered providers.
//!
//! Every billable call must be admitted first. Admission checks the
//! provider's daily and monthly spend caps and its request rate, and on
//! success charges the estimated cost in the same critical section, so
//! concurrent callers can never jointly overshoot a cap.
//!
//! Spend buckets roll over on UTC calendar day and month boundaries.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::domain::EnrichmentError;

/// Width of the request-rate window
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Per-provider caps. `None` disables a limit.
#[derive(Debug, Clone, Default)]
pub struct GovernorConfig {
    /// Credits allowed per UTC day
    pub daily_cap: Option<u64>,
    /// Credits allowed per UTC month
    pub monthly_cap: Option<u64>,
    /// Calls allowed in any 60 second window
    pub requests_per_minute: Option<u32>,
}

/// Why a call was not admitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    DailyCapExceeded { spent: u64, cap: u64 },
    MonthlyCapExceeded { spent: u64, cap: u64 },
    RequestRateExceeded { limit: u32 },
}

impl DenyReason {
    pub fn into_error(self, provider: &str) -> EnrichmentError {
        let provider = provider.to_string();
        match self {
            Self::DailyCapExceeded { spent, cap } => {
                EnrichmentError::DailyCapExceeded { provider, spent, cap }
            }
            Self::MonthlyCapExceeded { spent, cap } => {
                EnrichmentError::MonthlyCapExceeded { provider, spent, cap }
            }
            Self::RequestRateExceeded { limit } => {
                EnrichmentError::RequestRateExceeded { provider, limit }
            }
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny(DenyReason),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Cumulative spend for one provider.
#[derive(Debug)]
struct SpendLedger {
    day: NaiveDate,
    daily_spent: u64,
    month: (i32, u32),
    monthly_spent: u64,
    recent_calls: VecDeque<Instant>,
    total_calls: u64,
    total_spent: u64,
}

impl SpendLedger {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            daily_spent: 0,
            month: (now.year(), now.month()),
            monthly_spent: 0,
            recent_calls: VecDeque::new(),
            total_calls: 0,
            total_spent: 0,
        }
    }

    fn roll(&mut self, now: DateTime<Utc>, tick: Instant) {
        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.daily_spent = 0;
        }
        let month = (now.year(), now.month());
        if month != self.month {
            self.month = month;
            self.monthly_spent = 0;
        }
        while self
            .recent_calls
            .front()
            .is_some_and(|t| tick.duration_since(*t) >= RATE_WINDOW)
        {
            self.recent_calls.pop_front();
        }
    }
}

/// Point-in-time view of a provider's ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendSnapshot {
    pub provider: String,
    pub day: NaiveDate,
    pub daily_spent: u64,
    pub monthly_spent: u64,
    pub calls_last_minute: usize,
    pub total_calls: u64,
    pub total_spent: u64,
}

/// Admission control shared by every caller of a provider.
#[derive(Debug)]
pub struct RateGovernor {
    config: GovernorConfig,
    ledgers: Mutex<HashMap<String, SpendLedger>>,
}

impl RateGovernor {
    pub fn new(config: GovernorConfig) -> Self {
        Self {
            config,
            ledgers: Mutex::new(HashMap::new()),
        }
    }

    /// Check the caps and, if within them, charge `estimated_cost`.
    pub fn admit(&self, provider: &str, estimated_cost: u64) -> Admission {
        self.admit_at(provider, estimated_cost, Utc::now(), Instant::now())
    }

    /// [`admit`](Self::admit) with explicit wall-clock and monotonic time.
    pub fn admit_at(
        &self,
        provider: &str,
        estimated_cost: u64,
        now: DateTime<Utc>,
        tick: Instant,
    ) -> Admission {
        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers
            .entry(provider.to_string())
            .or_insert_with(|| SpendLedger::new(now));
        ledger.roll(now, tick);

        if let Some(cap) = self.config.daily_cap
            && ledger.daily_spent + estimated_cost > cap
        {
            return self.deny(provider, DenyReason::DailyCapExceeded {
                spent: ledger.daily_spent,
                cap,
            });
        }
        if let Some(cap) = self.config.monthly_cap
            && ledger.monthly_spent + estimated_cost > cap
        {
            return self.deny(provider, DenyReason::MonthlyCapExceeded {
                spent: ledger.monthly_spent,
                cap,
            });
        }
        if let Some(limit) = self.config.requests_per_minute
            && ledger.recent_calls.len() >= limit as usize
        {
            return self.deny(provider, DenyReason::RequestRateExceeded { limit });
        }

        ledger.daily_spent += estimated_cost;
        ledger.monthly_spent += estimated_cost;
        ledger.total_spent += estimated_cost;
        ledger.total_calls += 1;
        ledger.recent_calls.push_back(tick);
        Admission::Allow
    }

    /// Admit as many of `count` lookups as the caps allow, charging
    /// `unit_cost` for each.
    ///
    /// Returns how many leading lookups were admitted and, when that is fewer
    /// than `count`, the reason the rest were not. An admission with at least
    /// one lookup counts as one request against the rate limit.
    pub fn admit_up_to(
        &self,
        provider: &str,
        unit_cost: u64,
        count: usize,
    ) -> (usize, Option<DenyReason>) {
        self.admit_up_to_at(provider, unit_cost, count, Utc::now(), Instant::now())
    }

    /// [`admit_up_to`](Self::admit_up_to) with explicit wall-clock and monotonic time.
    pub fn admit_up_to_at(
        &self,
        provider: &str,
        unit_cost: u64,
        count: usize,
        now: DateTime<Utc>,
        tick: Instant,
    ) -> (usize, Option<DenyReason>) {
        if count == 0 {
            return (0, None);
        }

        let mut ledgers = self.ledgers.lock();
        let ledger = ledgers
            .entry(provider.to_string())
            .or_insert_with(|| SpendLedger::new(now));
        ledger.roll(now, tick);

        let mut admitted = count as u64;
        let mut reason = None;
        let affordable = |spent: u64, cap: u64| match unit_cost {
            0 => u64::MAX,
            cost => cap.saturating_sub(spent) / cost,
        };

        if let Some(cap) = self.config.daily_cap {
            let fit = affordable(ledger.daily_spent, cap);
            if fit < admitted {
                admitted = fit;
                reason = Some(DenyReason::DailyCapExceeded {
                    spent: ledger.daily_spent,
                    cap,
                });
            }
        }
        if let Some(cap) = self.config.monthly_cap {
            let fit = affordable(ledger.monthly_spent, cap);
            if fit < admitted {
                admitted = fit;
                reason = Some(DenyReason::MonthlyCapExceeded {
                    spent: ledger.monthly_spent,
                    cap,
                });
            }
        }
        if let Some(limit) = self.config.requests_per_minute
            && ledger.recent_calls.len() >= limit as usize
        {
            admitted = 0;
            reason = Some(DenyReason::RequestRateExceeded { limit });
        }

        if admitted == 0 {
            if let Some(reason) = &reason {
                tracing::warn!(provider, ?reason, "Provider call denied by governor");
            }
            return (0, reason);
        }

        let cost = admitted * unit_cost;
        ledger.daily_spent += cost;
        ledger.monthly_spent += cost;
        ledger.total_spent += cost;
        ledger.total_calls += 1;
        ledger.recent_calls.push_back(tick);

        if let Some(reason) = &reason {
            tracing::warn!(
                provider,
                admitted,
                denied = count as u64 - admitted,
                ?reason,
                "Lookups beyond the cap were denied"
            );
        }
        (admitted as usize, reason)
    }

    /// Give back credits charged for a call that never reached the provider.
    pub fn refund(&self, provider: &str, cost: u64) {
        let mut ledgers = self.ledgers.lock();
        if let Some(ledger) = ledgers.get_mut(provider) {
            ledger.daily_spent = ledger.daily_spent.saturating_sub(cost);
            ledger.monthly_spent = ledger.monthly_spent.saturating_sub(cost);
            ledger.total_spent = ledger.total_spent.saturating_sub(cost);
            ledger.total_calls = ledger.total_calls.saturating_sub(1);
            ledger.recent_calls.pop_back();
        }
    }

    pub fn snapshot(&self, provider: &str) -> Option<SpendSnapshot> {
        let ledgers = self.ledgers.lock();
        ledgers.get(provider).map(|ledger| SpendSnapshot {
            provider: provider.to_string(),
            day: ledger.day,
            daily_spent: ledger.daily_spent,
            monthly_spent: ledger.monthly_spent,
            calls_last_minute: ledger.recent_calls.len(),
            total_calls: ledger.total_calls,
            total_spent: ledger.total_spent,
        })
    }

    fn deny(&self, provider: &str, reason: DenyReason) -> Admission {
        tracing::warn!(provider, ?reason, "Provider call denied by governor");
        Admission::Deny(reason)
    }
}
