//! Round lifecycle scenarios driven through the scheduler

use crate::common::{minute, Harness, FIRST_ROUND, MINUTE};
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};
use updown_rounds::ledger::BetError;
use updown_rounds::round::{Direction, RoundResult, RoundStatus, Token};
use updown_rounds::settlement::SettlementError;

#[tokio::test]
async fn test_basic_win_scenario() {
    let h = Harness::new();
    let report = assert_ok!(h.scheduler.tick().await);
    assert_eq!(report.opened, vec![FIRST_ROUND]);

    h.enter_round(FIRST_ROUND, 5_000);
    let a = assert_ok!(
        h.ledger
            .place_bet(FIRST_ROUND, "user-a", Direction::Up, dec!(10), Token::Xrp)
            .await
    );
    let b = assert_ok!(
        h.ledger
            .place_bet(FIRST_ROUND, "user-b", Direction::Down, dec!(20), Token::Xrp)
            .await
    );

    h.source.set(dec!(0.6300));
    h.enter_round(FIRST_ROUND + 1, 0);
    let report = assert_ok!(h.scheduler.tick().await);
    assert_eq!(report.settled, vec![FIRST_ROUND]);
    assert_eq!(report.opened, vec![FIRST_ROUND + 1]);

    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.status, RoundStatus::Settled);
    assert_eq!(round.start_price, Some(dec!(0.6250)));
    assert_eq!(round.end_price, Some(dec!(0.6300)));
    assert_eq!(round.result, Some(RoundResult::Up));

    let a = h.store.get_bet(FIRST_ROUND, &a.user_id).await.unwrap().unwrap();
    let b = h.store.get_bet(FIRST_ROUND, &b.user_id).await.unwrap().unwrap();
    assert!(a.settled && b.settled);
    assert_eq!(a.payout, Some(dec!(30)));
    assert_eq!(b.payout, Some(dec!(0)));

    // the next round opened at the settlement price
    let next = h.store.get_round(FIRST_ROUND + 1).await.unwrap().unwrap();
    assert_eq!(next.status, RoundStatus::Live);
    assert_eq!(next.start_price, Some(dec!(0.6300)));
}

#[tokio::test]
async fn test_no_opposing_stakes_scenario() {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();

    for (user, stake) in [("a", dec!(4)), ("b", dec!(6.5))] {
        h.ledger
            .place_bet(FIRST_ROUND, user, Direction::Up, stake, Token::Xrp)
            .await
            .unwrap();
    }

    h.source.set(dec!(0.70));
    h.enter_round(FIRST_ROUND + 1, 10);
    h.scheduler.tick().await.unwrap();

    let bets = h.store.bets_for_round(FIRST_ROUND).await.unwrap();
    assert_eq!(bets.len(), 2);
    for bet in bets {
        assert_eq!(bet.payout, Some(bet.stake));
    }
}

#[tokio::test]
async fn test_flat_result_refunds_every_stake() {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();

    let stakes = [
        ("a", Direction::Up, dec!(10), Token::Xrp),
        ("b", Direction::Down, dec!(25), Token::Xrp),
        ("c", Direction::Up, dec!(0.125), Token::Brett),
    ];
    for (user, direction, stake, token) in stakes {
        h.ledger
            .place_bet(FIRST_ROUND, user, direction, stake, token)
            .await
            .unwrap();
    }

    // price unchanged at the boundary
    h.enter_round(FIRST_ROUND + 1, 0);
    h.scheduler.tick().await.unwrap();

    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.result, Some(RoundResult::Flat));
    for bet in h.store.bets_for_round(FIRST_ROUND).await.unwrap() {
        assert_eq!(bet.payout, Some(bet.stake), "bet of {}", bet.user_id);
    }
}

#[tokio::test]
async fn test_missed_ticks_settle_in_order() {
    let h = Harness::new();
    let first = h.scheduler.tick().await.unwrap();
    assert_eq!(first.created.len(), 7);

    h.ledger
        .place_bet(FIRST_ROUND, "early", Direction::Down, dec!(3), Token::Xrp)
        .await
        .unwrap();

    // scheduler asleep for three round durations
    h.source.set(dec!(0.61));
    h.enter_round(FIRST_ROUND + 3, 1_000);
    let report = h.scheduler.tick().await.unwrap();

    assert_eq!(
        report.settled,
        vec![FIRST_ROUND, FIRST_ROUND + 1, FIRST_ROUND + 2]
    );
    assert_eq!(
        report.opened,
        vec![FIRST_ROUND + 1, FIRST_ROUND + 2, FIRST_ROUND + 3]
    );
    assert_eq!(report.opened.last(), Some(&(FIRST_ROUND + 3)));

    for n in FIRST_ROUND..FIRST_ROUND + 3 {
        let round = h.store.get_round(n).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Settled, "round {}", n);
    }
    let live = h.store.get_round(FIRST_ROUND + 3).await.unwrap().unwrap();
    assert_eq!(live.status, RoundStatus::Live);

    // settled exactly once: another pass has nothing left to do
    let again = h.scheduler.tick().await.unwrap();
    assert!(again.settled.is_empty());
    assert!(again.opened.is_empty());

    let early = h.store.get_bet(FIRST_ROUND, "early").await.unwrap().unwrap();
    assert_eq!(early.payout, Some(dec!(3)));
}

#[tokio::test]
async fn test_outage_serves_stale_but_never_captures_it() {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();
    h.ledger
        .place_bet(FIRST_ROUND, "a", Direction::Up, dec!(1), Token::Xrp)
        .await
        .unwrap();

    h.source.fail();
    let point = h.feed.last_good().unwrap();
    assert_eq!(point.price, dec!(0.6250));

    h.enter_round(FIRST_ROUND + 1, 0);
    assert_err!(h.scheduler.tick().await);

    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.status, RoundStatus::Live);
    assert!(round.end_price.is_none());

    let direct = h.engine.settle_round(FIRST_ROUND).await;
    assert!(matches!(direct, Err(SettlementError::PriceCaptureFailed(_))));

    h.source.set(dec!(0.64));
    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.settled, vec![FIRST_ROUND]);
    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.end_price, Some(dec!(0.64)));
}

#[tokio::test]
async fn test_bets_rejected_outside_live_window() {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();

    let upcoming = h
        .ledger
        .place_bet(FIRST_ROUND + 1, "a", Direction::Up, dec!(1), Token::Xrp)
        .await;
    assert!(matches!(upcoming, Err(BetError::RoundNotLive(_))));

    // window closed but settlement has not run yet
    h.clock.set(minute(FIRST_ROUND) + MINUTE);
    let late = h
        .ledger
        .place_bet(FIRST_ROUND, "a", Direction::Up, dec!(1), Token::Xrp)
        .await;
    assert!(matches!(late, Err(BetError::RoundNotLive(_))));

    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.total_pool(Token::Xrp), dec!(0));
}

#[tokio::test]
async fn test_display_projections_follow_lifecycle() {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();
    h.ledger
        .place_bet(FIRST_ROUND, "viewer", Direction::Up, dec!(2), Token::Brett)
        .await
        .unwrap();

    h.enter_round(FIRST_ROUND, 20_000);
    let live = h.queries.live_round().await.unwrap().unwrap();
    assert_eq!(live.round_number, FIRST_ROUND);
    assert_eq!(live.time_left_ms, 40_000);
    assert_eq!(live.pools[&Token::Brett].up, dec!(2));
    assert!(h.queries.user_live_bet("viewer").await.unwrap().is_some());

    let upcoming = h.queries.upcoming(6).await.unwrap();
    assert_eq!(upcoming.len(), 6);

    h.source.set(dec!(0.5));
    h.enter_round(FIRST_ROUND + 1, 0);
    h.scheduler.tick().await.unwrap();

    let recent = h.queries.recent_settled(10).await.unwrap();
    assert_eq!(recent[0].round_number, FIRST_ROUND);
    assert_eq!(recent[0].result, Some(RoundResult::Down));
    assert_eq!(recent[0].percentage_change, Some(dec!(-20)));

    let stats = h.queries.user_stats("viewer").await.unwrap();
    let brett = stats.iter().find(|s| s.token == Token::Brett).unwrap();
    assert_eq!(brett.predictions, 1);
    // alone on the losing side, so refunded
    assert_eq!(brett.refunds, 1);
    assert_eq!(brett.net_profit, dec!(0));
}
