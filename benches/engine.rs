use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use card_vault::{Credits, Market, NewCard, NewPack, Operation, PackId, Rarity, RarityOdds, UserId};

const STANDARD: RarityOdds = RarityOdds::new(60.0, 25.0, 10.0, 3.0, 1.5, 0.5);

/// Market with `cards_per_rarity` cards in each tier and one 5-card pack.
fn stocked_market(cards_per_rarity: u32) -> (Market, PackId) {
    let market = Market::seeded(42);
    for rarity in Rarity::ALL {
        for n in 0..cards_per_rarity {
            market.add_card(NewCard::new(format!("{rarity} {n}"), rarity));
        }
    }
    let pack = market
        .create_pack(NewPack::new("Starter", 5, STANDARD, Credits::new(100)))
        .expect("valid pack");
    (market, pack.id)
}

/// Generates a grant, then purchase/open pairs per user.
///
/// User packs are issued in order, so the n-th purchase creates user pack n.
pub struct OperationGenerator {
    pack: PackId,
    num_users: UserId,
    packs_per_user: u64,
    current_user: UserId,
    current_step: u64,
    next_user_pack: u64,
}

impl OperationGenerator {
    pub fn new(pack: PackId, num_users: UserId, packs_per_user: u64) -> Self {
        Self {
            pack,
            num_users,
            packs_per_user,
            current_user: 1,
            current_step: 0,
            next_user_pack: 1,
        }
    }
}

impl Iterator for OperationGenerator {
    type Item = Operation;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_user > self.num_users {
            return None;
        }

        // Pattern: grant, then (purchase, open) x packs_per_user
        let operation = match self.current_step {
            0 => Operation::Grant {
                user: self.current_user,
                amount: Credits::new(100 * self.packs_per_user as i64),
            },
            step if step % 2 == 1 => Operation::Purchase {
                user: self.current_user,
                pack: self.pack,
            },
            _ => {
                let user_pack = self.next_user_pack;
                self.next_user_pack += 1;
                Operation::Open {
                    user: self.current_user,
                    user_pack,
                }
            }
        };

        self.current_step += 1;

        if self.current_step > self.packs_per_user * 2 {
            self.current_step = 0;
            self.current_user += 1;
        }

        Some(operation)
    }
}

fn bench_purchase_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("purchases");

    for count in [1_000u64, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let (market, pack) = stocked_market(10);
                market
                    .grant_credits(1, Credits::new(100 * count as i64), "bench")
                    .expect("positive grant");
                for _ in 0..count {
                    let _ = black_box(market.purchase_pack(1, pack));
                }
                market
            });
        });
    }

    group.finish();
}

fn bench_purchase_and_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("purchase_and_open");

    for (users, packs_per) in [(10, 100), (100, 10)] {
        let label = format!("{users}u_{packs_per}p");
        group.bench_with_input(
            BenchmarkId::from_parameter(&label),
            &(users, packs_per),
            |b, &(users, packs_per)| {
                b.iter(|| {
                    let (market, pack) = stocked_market(50);
                    for operation in OperationGenerator::new(pack, users, packs_per) {
                        let _ = black_box(market.apply(operation));
                    }
                    market
                });
            },
        );
    }

    group.finish();
}

fn bench_large_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("large_pool");
    group.sample_size(10);

    group.bench_function("open_1k_packs_10k_cards", |b| {
        b.iter(|| {
            let (market, pack) = stocked_market(10_000 / Rarity::ALL.len() as u32);
            for operation in OperationGenerator::new(pack, 1, 1_000) {
                let _ = black_box(market.apply(operation));
            }
            market
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_purchase_only,
    bench_purchase_and_open,
    bench_large_pool,
);

criterion_main!(benches);
