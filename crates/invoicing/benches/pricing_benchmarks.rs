use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, TimeZone, Utc};
use portbill_catalog::{PricingMode, RedevanceRate, ServiceDefinition, TierRates};
use portbill_core::ServiceId;
use portbill_invoicing::{
    BillingInputs, DateRange, LineItemCommand, LineItemGroup, ServiceLineItem, ShipmentCode,
    price,
};

fn storage_service() -> ServiceDefinition {
    ServiceDefinition::new(
        ServiceId::new(),
        "MAG",
        "Magasinage",
        PricingMode::TieredPerDay,
        1500,
    )
    .unwrap()
    .with_tiers(TierRates::all(1500))
}

fn period(nights: i64) -> DateRange {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
    DateRange::new(start, start + Duration::days(nights)).unwrap()
}

fn bench_price(c: &mut Criterion) {
    let mut group = c.benchmark_group("price");
    let service = storage_service();

    for nights in [5i64, 30, 365] {
        let range = period(nights);
        group.bench_with_input(BenchmarkId::new("tiered_per_day", nights), &range, |b, range| {
            b.iter(|| price(black_box(&service), black_box(3), None, Some(range)));
        });
    }

    let tonnage =
        ServiceDefinition::new(ServiceId::new(), "TON", "Tonnage", PricingMode::Tonnage, 900)
            .unwrap();
    group.bench_function("tonnage", |b| {
        b.iter(|| price(black_box(&tonnage), 1, black_box(Some(25_750)), None));
    });

    group.finish();
}

fn bench_group_edits(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_item_group");

    for size in [4usize, 16, 64] {
        let services: Vec<ServiceDefinition> = (0..size)
            .map(|i| {
                ServiceDefinition::new(
                    ServiceId::new(),
                    format!("S{i}"),
                    format!("Service {i}"),
                    PricingMode::Flat,
                    1000,
                )
                .unwrap()
            })
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("build_and_edit", size), &services, |b, services| {
            b.iter(|| {
                let shipment = ShipmentCode::new("LT-BENCH").unwrap();
                let mut lines = LineItemGroup::new(shipment.clone(), RedevanceRate::new(5000));
                for service in services {
                    let item = ServiceLineItem::draft(
                        shipment.clone(),
                        service.clone(),
                        BillingInputs::new(2),
                    );
                    lines.add(item).unwrap();
                }
                for service in services {
                    lines.apply(service.id, &LineItemCommand::SetQuantity(3)).unwrap();
                }
                lines.remove(services[0].id).unwrap();
                black_box(lines.total_amount())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_price, bench_group_edits);
criterion_main!(benches);
