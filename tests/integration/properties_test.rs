//! Invariants that must hold for any bet mix

use crate::common::{Harness, FIRST_ROUND};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tokio_test::assert_ok;
use updown_rounds::ledger::BetError;
use updown_rounds::round::{Direction, Pool, RoundSchedule, Token};
use updown_rounds::settlement::pools_from_bets;

/// Small deterministic generator so runs are reproducible
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }

    fn stake(&mut self) -> Decimal {
        // 0.00000001 ..= 1000 with eight decimal places
        let units = self.next() % 100_000_000_000 + 1;
        Decimal::new(units as i64, 8)
    }
}

async fn settle_random_round(seed: u64, bettors: usize, end_price: Decimal) -> Harness {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();

    let mut rng = Lcg(seed);
    for i in 0..bettors {
        let direction = if rng.next() % 2 == 0 {
            Direction::Up
        } else {
            Direction::Down
        };
        let token = Token::ALL[(rng.next() % 2) as usize];
        let stake = rng.stake();
        h.ledger
            .place_bet(FIRST_ROUND, &format!("user-{}", i), direction, stake, token)
            .await
            .unwrap();
    }

    h.source.set(end_price);
    h.enter_round(FIRST_ROUND + 1, 0);
    let report = h.scheduler.tick().await.unwrap();
    assert_eq!(report.settled, vec![FIRST_ROUND]);
    h
}

#[tokio::test]
async fn test_payouts_never_exceed_pool() {
    let cases = [
        (1, dec!(0.70)),
        (7, dec!(0.55)),
        (42, dec!(0.6251)),
        (99, dec!(0.6250)),
    ];
    for (seed, price) in cases {
        let h = settle_random_round(seed, 40, price).await;
        let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
        let bets = h.store.bets_for_round(FIRST_ROUND).await.unwrap();

        for token in Token::ALL {
            let paid: Decimal = bets
                .iter()
                .filter(|b| b.token == token)
                .map(|b| b.payout.unwrap())
                .sum();
            let pool = round.total_pool(token);
            assert!(paid <= pool, "seed {} {}: paid {} > pool {}", seed, token, paid, pool);

            // truncation leaves less than one unit per winner undistributed
            let winners = bets
                .iter()
                .filter(|b| b.token == token && b.payout.unwrap() > Decimal::ZERO)
                .count();
            if winners > 0 {
                let bound = Decimal::new(winners as i64, 8);
                assert!(pool - paid < bound, "seed {} {}: dust {}", seed, token, pool - paid);
            }
        }
        assert!(bets.iter().all(|b| b.settled));
        assert!(bets.iter().all(|b| !b.payout.unwrap().is_sign_negative()));
    }
}

#[tokio::test]
async fn test_pools_match_committed_bets() {
    let h = settle_random_round(2024, 60, dec!(0.64)).await;
    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    let bets = h.store.bets_for_round(FIRST_ROUND).await.unwrap();
    assert_eq!(bets.len(), 60);

    let derived = pools_from_bets(&bets);
    for token in Token::ALL {
        let expected = derived.get(&token).copied().unwrap_or_default();
        assert_eq!(round.pool(token), expected, "{}", token);
    }
}

#[tokio::test]
async fn test_rejected_duplicates_leave_pools_unchanged() {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();

    assert_ok!(
        h.ledger
            .place_bet(FIRST_ROUND, "dup", Direction::Up, dec!(5), Token::Xrp)
            .await
    );
    let before = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();

    for (direction, token) in [
        (Direction::Up, Token::Xrp),
        (Direction::Down, Token::Xrp),
        (Direction::Down, Token::Brett),
    ] {
        let again = h
            .ledger
            .place_bet(FIRST_ROUND, "dup", direction, dec!(9), token)
            .await;
        assert!(matches!(again, Err(BetError::DuplicateBet { .. })));
    }

    let after = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(before.pools, after.pools);
    assert_eq!(h.store.bets_for_round(FIRST_ROUND).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_invalid_stake_rejected() {
    let h = Harness::new();
    h.scheduler.tick().await.unwrap();

    for stake in [dec!(0), dec!(-1)] {
        let result = h
            .ledger
            .place_bet(FIRST_ROUND, "zero", Direction::Up, stake, Token::Xrp)
            .await;
        assert!(matches!(result, Err(BetError::InvalidStake(_))));
    }
    let round = h.store.get_round(FIRST_ROUND).await.unwrap().unwrap();
    assert_eq!(round.pool(Token::Xrp), Pool::default());
}

#[tokio::test]
async fn test_settling_twice_returns_equal_results() {
    let h = settle_random_round(5, 12, dec!(0.66)).await;

    let first = h.engine.settle_round(FIRST_ROUND).await.unwrap();
    let second = h.engine.settle_round(FIRST_ROUND).await.unwrap();
    assert!(first.is_already_settled());
    assert!(second.is_already_settled());
    assert_eq!(first.result(), second.result());
    assert!(first.result().conserves_pools());

    let payouts: BTreeMap<_, _> = h
        .store
        .bets_for_round(FIRST_ROUND)
        .await
        .unwrap()
        .into_iter()
        .map(|b| (b.user_id, b.payout))
        .collect();
    for p in &first.result().payouts {
        assert_eq!(payouts[&p.user_id], Some(p.payout));
    }
}

#[test]
fn test_boundaries_are_deterministic() {
    let anchor = crate::common::ANCHOR;
    let a = RoundSchedule::new(anchor, 60_000).unwrap();
    let b = RoundSchedule::new(anchor, 60_000).unwrap();

    for n in [0, 1, 59, 1_000, 525_600] {
        assert_eq!(a.start_time(n), b.start_time(n));
        assert_eq!(a.end_time(n), a.start_time(n + 1));
        assert_eq!(a.end_time(n) - a.start_time(n), 60_000);
        assert_eq!(a.round_at(a.start_time(n)), Some(n));
        assert_eq!(a.round_at(a.end_time(n) - 1), Some(n));
    }
    assert_eq!(a.round_at(anchor - 1), None);
}
