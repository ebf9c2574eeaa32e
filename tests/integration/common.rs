//! Shared harness: a manual clock, a controllable upstream source behind the
//! real fallback feed, and every lifecycle component wired to one store.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use updown_rounds::clock::ManualClock;
use updown_rounds::feed::{FallbackFeed, PriceFeed, PriceSource, SourceError};
use updown_rounds::ledger::BetLedger;
use updown_rounds::query::RoundQueries;
use updown_rounds::round::{CapturePolicy, RoundNumber, RoundSchedule, RoundScheduler};
use updown_rounds::settlement::SettlementEngine;
use updown_rounds::store::{MemoryStore, RoundStore};

/// 2025-01-01T00:00:00Z
pub const ANCHOR: i64 = 1_735_689_600_000;
pub const MINUTE: i64 = 60_000;

/// Round the harness clock starts in
pub const FIRST_ROUND: RoundNumber = 10;

/// Upstream source whose price the test controls; `None` means it fails
#[derive(Clone)]
pub struct ControlledSource {
    price: Arc<Mutex<Option<Decimal>>>,
}

impl ControlledSource {
    pub fn new(price: Decimal) -> Self {
        Self {
            price: Arc::new(Mutex::new(Some(price))),
        }
    }

    pub fn set(&self, price: Decimal) {
        *self.price.lock() = Some(price);
    }

    pub fn fail(&self) {
        *self.price.lock() = None;
    }
}

#[async_trait]
impl PriceSource for ControlledSource {
    fn name(&self) -> &str {
        "controlled"
    }

    async fn fetch(&self) -> Result<Decimal, SourceError> {
        self.price
            .lock()
            .ok_or_else(|| SourceError::Parse("upstream down".to_string()))
    }
}

pub fn fast_capture() -> CapturePolicy {
    CapturePolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

pub fn schedule() -> RoundSchedule {
    RoundSchedule::new(ANCHOR, MINUTE).unwrap()
}

pub fn minute(n: RoundNumber) -> i64 {
    ANCHOR + n as i64 * MINUTE
}

pub struct Harness {
    pub store: Arc<dyn RoundStore>,
    pub source: ControlledSource,
    pub feed: Arc<FallbackFeed>,
    pub clock: Arc<ManualClock>,
    pub engine: Arc<SettlementEngine>,
    pub ledger: BetLedger,
    pub scheduler: RoundScheduler,
    pub queries: RoundQueries,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn RoundStore>) -> Self {
        let source = ControlledSource::new(rust_decimal_macros::dec!(0.6250));
        let feed = Arc::new(FallbackFeed::new(vec![Box::new(source.clone())]));
        let clock = Arc::new(ManualClock::new(minute(FIRST_ROUND)));
        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            feed.clone(),
            clock.clone(),
            fast_capture(),
            3,
        ));
        let ledger = BetLedger::new(store.clone(), clock.clone(), 3);
        let scheduler = RoundScheduler::new(
            store.clone(),
            feed.clone() as Arc<dyn PriceFeed>,
            engine.clone(),
            clock.clone(),
            schedule(),
            fast_capture(),
        );
        let queries = RoundQueries::new(store.clone(), clock.clone(), schedule());

        Self {
            store,
            source,
            feed,
            clock,
            engine,
            ledger,
            scheduler,
            queries,
        }
    }

    /// Move the clock into round `n`, `offset_ms` after its start
    pub fn enter_round(&self, n: RoundNumber, offset_ms: i64) {
        self.clock.set(minute(n) + offset_ms);
    }
}
