use common::{CustomerId, Money, OrderId, OrderItemId, Percent};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use domain::inventory::transitions;
use domain::{InventoryLevel, Offer, OfferEngine, Order, OrderItem};

fn sample_order(lines: usize) -> Order {
    let mut order = Order::new(CustomerId::new(), "USD");
    for i in 0..lines {
        let item = OrderItem::new(
            format!("SKU-{i:03}"),
            "PROD-BENCH",
            "Benchmark Widget",
            (i % 4 + 1) as u32,
            Money::from_cents(1_000 + i as i64 * 25),
            None,
        )
        .with_tax_rate(Percent::from_basis_points(825));
        order.add_item(item).unwrap();
    }
    order
}

fn sample_offers() -> Vec<Offer> {
    vec![
        Offer::percent_off("Ten percent", Percent::from_percent(10))
            .automatic()
            .with_priority(1),
        Offer::amount_off("Five off", Money::from_dollars(5))
            .automatic()
            .with_priority(2)
            .with_minimum_order(Money::from_dollars(50)),
        Offer::amount_off("Dollar off widgets", Money::from_dollars(1))
            .item_scoped()
            .automatic()
            .targeting_skus(["SKU-001", "SKU-002", "SKU-003"]),
        Offer::percent_off("Capped", Percent::from_percent(25))
            .automatic()
            .with_priority(3)
            .with_max_discount(Money::from_dollars(20)),
    ]
}

fn bench_offer_recompute(c: &mut Criterion) {
    let engine = OfferEngine::default();
    let offers = sample_offers();

    for lines in [1usize, 10, 50] {
        let order = sample_order(lines);
        c.bench_function(&format!("domain/offer_recompute_{lines}_lines"), |b| {
            b.iter_batched(
                || order.clone(),
                |mut order| engine.recompute(&mut order, &offers, None).unwrap(),
                BatchSize::SmallInput,
            );
        });
    }
}

fn bench_counter_math(c: &mut Criterion) {
    c.bench_function("domain/reserve_release_cycle", |b| {
        b.iter_batched(
            || InventoryLevel::new("SKU-BENCH", 1_000),
            |mut level| {
                for _ in 0..100 {
                    level.reserve(3).unwrap();
                    level.allocate(2).unwrap();
                    level.release(1).unwrap();
                    level.decrement(2).unwrap();
                    level.increment(2).unwrap();
                }
                level
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_reservation_lifecycle(c: &mut Criterion) {
    let level = InventoryLevel::new("SKU-BENCH", 1_000);

    c.bench_function("domain/reservation_lifecycle", |b| {
        b.iter(|| {
            let now = chrono::Utc::now();
            let entry =
                transitions::reserve(&level, OrderId::new(), OrderItemId::new(), 2, None, now)
                    .unwrap();
            let entry = transitions::confirm(&entry.level, &entry.reservation, None, now).unwrap();
            let entry = transitions::allocate(&entry.level, &entry.reservation, now).unwrap();
            transitions::fulfill(&entry.level, &entry.reservation, now).unwrap()
        });
    });
}

criterion_group!(
    benches,
    bench_offer_recompute,
    bench_counter_math,
    bench_reservation_lifecycle
);
criterion_main!(benches);
