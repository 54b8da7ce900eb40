use std::collections::HashMap;
use std::sync::Barrier;
use std::thread;

use card_vault::engine::{FixedClock, OpenError, PurchaseError};
use card_vault::model::VaultTransactionType;
use card_vault::{Credits, Market, NewCard, NewPack, Rarity, RarityOdds};
use chrono::{TimeZone, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const STANDARD: RarityOdds = RarityOdds::new(60.0, 25.0, 10.0, 3.0, 1.5, 0.5);

fn market(seed: u64) -> Market {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
    Market::new(clock, ChaCha8Rng::seed_from_u64(seed))
}

fn stock_every_rarity(market: &Market) {
    for rarity in Rarity::ALL {
        for n in 0..3 {
            market.add_card(NewCard::new(format!("{rarity} #{n}"), rarity));
        }
    }
}

#[test]
fn purchase_then_open_end_to_end() {
    let market = market(1);
    stock_every_rarity(&market);
    let pack = market
        .create_pack(NewPack::new("Starter", 5, STANDARD, Credits::new(100)))
        .unwrap();
    market.grant_credits(1, Credits::new(150), "signup").unwrap();

    let user_pack = market.purchase_pack(1, pack.id).unwrap();
    assert_eq!(market.balance(1), Credits::new(50));

    let cards = market.open_pack(1, user_pack.id).unwrap();
    assert_eq!(cards.len(), 5);
    assert!(market.user_packs(1, None)[0].is_opened);

    let collection = market.collection(1);
    assert_eq!(collection.len(), 5);
    assert!(collection.iter().all(|o| o.level == 1 && o.experience == 0));

    let ledger = market.vault_history(1);
    let purchase = ledger.last().unwrap();
    assert_eq!(purchase.kind, VaultTransactionType::PackPurchase);
    assert_eq!(purchase.amount, Credits::new(-100));
    assert_eq!(purchase.balance_after, market.balance(1));
}

#[test]
fn ledger_balance_after_tracks_every_change() {
    let market = market(2);
    let pack = market
        .create_pack(NewPack::new("Cheap", 5, STANDARD, Credits::new(30)))
        .unwrap();
    market.grant_credits(1, Credits::new(100), "signup").unwrap();
    for _ in 0..3 {
        market.purchase_pack(1, pack.id).unwrap();
    }
    assert!(market.purchase_pack(1, pack.id).is_err());
    market.grant_credits(1, Credits::new(5), "bonus").unwrap();

    let mut running = Credits::ZERO;
    for row in market.vault_history(1) {
        running += row.amount;
        assert_eq!(row.balance_after, running);
        assert!(!row.balance_after.is_negative());
    }
    assert_eq!(running, market.balance(1));
    assert_eq!(running, Credits::new(15));
}

#[test]
fn concurrent_purchases_of_last_pack_sell_exactly_one() {
    for round in 0..20 {
        let market = market(round);
        let mut new = NewPack::new("One of one", 1, STANDARD, Credits::new(10));
        new.limited_quantity = Some(1);
        let pack = market.create_pack(new).unwrap();
        market.grant_credits(1, Credits::new(10), "test").unwrap();
        market.grant_credits(2, Credits::new(10), "test").unwrap();

        let barrier = Barrier::new(2);
        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = [1, 2]
                .into_iter()
                .map(|user| {
                    let market = &market;
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        market.purchase_pack(user, pack.id)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let sold_out = results
            .iter()
            .filter(|r| **r == Err(PurchaseError::SoldOut(pack.id)))
            .count();
        assert_eq!((successes, sold_out), (1, 1), "round {round}");

        let total = market.balance(1) + market.balance(2);
        assert_eq!(total, Credits::new(10));
    }
}

#[test]
fn concurrent_opens_of_same_pack_succeed_once() {
    let market = market(3);
    stock_every_rarity(&market);
    let pack = market
        .create_pack(NewPack::new("Free", 5, STANDARD, Credits::ZERO))
        .unwrap();
    let user_pack = market.purchase_pack(1, pack.id).unwrap();

    let barrier = Barrier::new(4);
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let market = &market;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    market.open_pack(1, user_pack.id)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| **r == Err(OpenError::AlreadyOpened(user_pack.id)))
            .count(),
        3
    );
    assert_eq!(market.collection(1).len(), 5);
}

#[test]
fn drawn_rarities_follow_pack_odds() {
    let market = market(4);
    stock_every_rarity(&market);
    let pack = market
        .create_pack(NewPack::new("Bulk", 1_000, STANDARD, Credits::ZERO))
        .unwrap();

    let mut counts: HashMap<Rarity, u32> = HashMap::new();
    let mut total: u32 = 0;
    for _ in 0..50 {
        let user_pack = market.purchase_pack(1, pack.id).unwrap();
        for card in market.open_pack(1, user_pack.id).unwrap() {
            *counts.entry(card.rarity).or_default() += 1;
            total += 1;
        }
    }

    for rarity in Rarity::ALL {
        let observed = f64::from(counts.get(&rarity).copied().unwrap_or(0)) * 100.0
            / f64::from(total);
        assert!(
            (observed - STANDARD.get(rarity)).abs() < 1.0,
            "{rarity}: observed {observed:.3}%"
        );
    }
}

#[test]
fn serials_stay_unique_across_users() {
    let market = market(5);
    let card = market.add_card(NewCard::new("Solo", Rarity::Common));
    let odds = RarityOdds::new(100.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    let pack = market
        .create_pack(NewPack::new("Twins", 2, odds, Credits::ZERO))
        .unwrap();

    for user in [1, 2, 1] {
        let user_pack = market.purchase_pack(user, pack.id).unwrap();
        market.open_pack(user, user_pack.id).unwrap();
    }

    let mut serials: Vec<u32> = [1, 2]
        .into_iter()
        .flat_map(|user| market.collection(user))
        .filter(|o| o.card_id == card.id)
        .map(|o| o.serial_number)
        .collect();
    serials.sort_unstable();
    assert_eq!(serials, [1, 2, 3, 4, 5, 6]);

    let second_user: Vec<u32> = market
        .collection(2)
        .iter()
        .map(|o| o.serial_number)
        .collect();
    assert_eq!(second_user, [3, 4]);
}
