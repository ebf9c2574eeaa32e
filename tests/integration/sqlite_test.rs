//! Lifecycle against the SQLite store, including two processes sharing a file

use crate::common::{Harness, FIRST_ROUND};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio_test::assert_ok;
use updown_rounds::ledger::BetError;
use updown_rounds::round::{Direction, RoundResult, RoundStatus, Token};
use updown_rounds::store::{RoundStore, SqliteStore};

fn sqlite_harness(path: &std::path::Path) -> Harness {
    let store: Arc<dyn RoundStore> = Arc::new(SqliteStore::open(path).unwrap());
    Harness::with_store(store)
}

#[tokio::test]
async fn test_sqlite_round_trip_through_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let h = sqlite_harness(&dir.path().join("rounds.db"));

    assert_ok!(h.scheduler.tick().await);
    h.ledger
        .place_bet(FIRST_ROUND, "a", Direction::Up, dec!(10), Token::Xrp)
        .await
        .unwrap();
    h.ledger
        .place_bet(FIRST_ROUND, "b", Direction::Down, dec!(20), Token::Xrp)
        .await
        .unwrap();

    h.source.set(dec!(0.6300));
    h.enter_round(FIRST_ROUND + 1, 0);
    let report = assert_ok!(h.scheduler.tick().await);
    assert_eq!(report.settled, vec![FIRST_ROUND]);

    let a = h.store.get_bet(FIRST_ROUND, "a").await.unwrap().unwrap();
    assert_eq!(a.payout, Some(dec!(30)));
    let b = h.store.get_bet(FIRST_ROUND, "b").await.unwrap().unwrap();
    assert_eq!(b.payout, Some(dec!(0)));
}

#[tokio::test]
async fn test_restart_recovers_unsettled_rounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rounds.db");

    {
        let h = sqlite_harness(&path);
        h.scheduler.tick().await.unwrap();
        h.ledger
            .place_bet(FIRST_ROUND, "a", Direction::Down, dec!(1.5), Token::Brett)
            .await
            .unwrap();
        h.ledger
            .place_bet(FIRST_ROUND, "b", Direction::Up, dec!(0.5), Token::Brett)
            .await
            .unwrap();
    }

    // new process, two rounds later
    let h = sqlite_harness(&path);
    h.source.set(dec!(0.6000));
    h.enter_round(FIRST_ROUND + 2, 500);
    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.settled, vec![FIRST_ROUND, FIRST_ROUND + 1]);

    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.result, Some(RoundResult::Down));
    let a = h.store.get_bet(FIRST_ROUND, "a").await.unwrap().unwrap();
    assert_eq!(a.payout, Some(dec!(2)));
}

#[tokio::test]
async fn test_two_handles_settle_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let first = sqlite_harness(&path);
    let second = sqlite_harness(&path);

    first.scheduler.tick().await.unwrap();
    first
        .ledger
        .place_bet(FIRST_ROUND, "a", Direction::Up, dec!(3), Token::Xrp)
        .await
        .unwrap();
    second
        .ledger
        .place_bet(FIRST_ROUND, "b", Direction::Down, dec!(7), Token::Xrp)
        .await
        .unwrap();

    // one user, two handles: only one bet survives
    let dup = second
        .ledger
        .place_bet(FIRST_ROUND, "a", Direction::Down, dec!(1), Token::Xrp)
        .await;
    assert!(matches!(dup, Err(BetError::DuplicateBet { .. })));

    for h in [&first, &second] {
        h.source.set(dec!(0.7));
        h.enter_round(FIRST_ROUND + 1, 0);
    }
    let (x, y) = tokio::join!(
        first.engine.settle_round(FIRST_ROUND),
        second.engine.settle_round(FIRST_ROUND)
    );
    let (x, y) = (x.unwrap(), y.unwrap());

    assert_eq!(
        [x.is_already_settled(), y.is_already_settled()]
            .iter()
            .filter(|s| !**s)
            .count(),
        1
    );
    assert_eq!(x.result(), y.result());

    let round = second.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.status, RoundStatus::Settled);
    let a = first.store.get_bet(FIRST_ROUND, "a").await.unwrap().unwrap();
    assert_eq!(a.payout, Some(dec!(10)));
}
