use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::{Duration, NaiveTime, TimeZone, Utc};
use tradeflow_contracts::Recurrence;

fn recurrences() -> Vec<(&'static str, Recurrence)> {
    let six = NaiveTime::from_hms_opt(6, 0, 0).expect("valid time");
    vec![
        ("daily", Recurrence::daily(six)),
        ("weekly", Recurrence::weekly(3, six)),
        ("monthly_clamped", Recurrence::monthly(31, six)),
    ]
}

/// Walk a year of runs: one `next_after` per generation.
fn bench_next_after(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_after");
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();

    for (name, recurrence) in recurrences() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &recurrence, |b, r| {
            b.iter(|| {
                let mut last = start;
                while last < start + Duration::days(365) {
                    last = r.next_after(black_box(last));
                }
                last
            })
        });
    }
    group.finish();
}

fn bench_first_run(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2024, 2, 29, 12, 30, 0).unwrap();
    let monthly = Recurrence::monthly(31, NaiveTime::from_hms_opt(6, 0, 0).unwrap());
    c.bench_function("first_on_or_after_monthly", |b| {
        b.iter(|| monthly.first_on_or_after(black_box(start)))
    });
}

criterion_group!(benches, bench_next_after, bench_first_run);
criterion_main!(benches);
