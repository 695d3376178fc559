use std::hint::black_box;

use chrono::Duration;
use chrono::NaiveDate;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use frontier_rs::portfolio::AllocationMethod;
use frontier_rs::portfolio::EfficientFrontier;
use frontier_rs::portfolio::PriceSeries;
use frontier_rs::portfolio::allocate_with;
use frontier_rs::portfolio::estimate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

fn random_prices(assets: usize, days: usize) -> PriceSeries {
  let mut rng = StdRng::seed_from_u64(42);
  let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
  let dates = (0..days).map(|t| start + Duration::days(t as i64)).collect();
  let closes = (0..assets)
    .map(|i| {
      let step = Normal::new(0.0004 + 0.0001 * i as f64, 0.01 + 0.001 * i as f64).unwrap();
      let mut p = 50.0 + i as f64;
      (0..days)
        .map(|_| {
          p *= 1.0 + step.sample(&mut rng);
          Some(p)
        })
        .collect()
    })
    .collect();
  let names = (0..assets).map(|i| format!("A{i:03}")).collect();
  PriceSeries::new(dates, names, closes).unwrap()
}

fn bench_estimate(c: &mut Criterion) {
  let mut group = c.benchmark_group("estimate");
  for &n in &[10, 50, 100] {
    let prices = random_prices(n, 756);
    group.bench_with_input(BenchmarkId::from_parameter(n), &prices, |b, prices| {
      b.iter(|| black_box(estimate(prices).unwrap()))
    });
  }
  group.finish();
}

fn bench_optimize(c: &mut Criterion) {
  let mut group = c.benchmark_group("optimize");
  for &n in &[10, 50, 100] {
    let (mu, sigma) = estimate(&random_prices(n, 756)).unwrap();
    let ef = EfficientFrontier::new(&mu, &sigma).unwrap();
    let vols = sigma.volatilities();
    let target = 0.5 * (vols.iter().copied().fold(f64::INFINITY, f64::min)
      + vols.iter().copied().fold(0.0, f64::max));

    group.bench_with_input(BenchmarkId::new("efficient_risk", n), &target, |b, &t| {
      b.iter(|| black_box(ef.efficient_risk(t).unwrap()))
    });
    group.bench_function(BenchmarkId::new("max_sharpe", n), |b| {
      b.iter(|| black_box(ef.max_sharpe(-1.0).unwrap()))
    });
  }
  group.finish();
}

fn bench_allocate(c: &mut Criterion) {
  let mut group = c.benchmark_group("allocate");
  let prices = random_prices(20, 252);
  let (mu, sigma) = estimate(&prices).unwrap();
  let w = EfficientFrontier::new(&mu, &sigma).unwrap().max_sharpe(-1.0).unwrap();
  let latest = prices.latest_prices();

  for method in [AllocationMethod::Greedy, AllocationMethod::IntegerProgram] {
    group.bench_function(format!("{method:?}"), |b| {
      b.iter(|| black_box(allocate_with(&w, &latest, 100_000.0, method, 500).unwrap()))
    });
  }
  group.finish();
}

criterion_group!(benches, bench_estimate, bench_optimize, bench_allocate);
criterion_main!(benches);
