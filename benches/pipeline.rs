use std::hint::black_box;
use std::time::Duration;

use chrono::NaiveDate;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use forecast_portfolio::CovarianceMatrix;
use forecast_portfolio::PortfolioOptimizer;
use forecast_portfolio::ReturnVector;
use forecast_portfolio::SeriesForecaster;
use forecast_portfolio::TimeSeries;
use nalgebra::DMatrix;

fn synthetic_series(n: usize) -> TimeSeries {
  let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap_or_default();
  TimeSeries::new(
    "BENCH",
    (0..n)
      .map(|i| {
        let x = i as f64;
        let price = 100.0 + 0.05 * x + 3.0 * (x * 0.9).sin() + 1.5 * (x / 58.0).cos();
        (start + chrono::Duration::days(i as i64), price)
      })
      .collect(),
  )
  .unwrap()
}

fn synthetic_inputs(n: usize) -> (ReturnVector, CovarianceMatrix) {
  let assets: Vec<String> = (0..n).map(|i| format!("A{i}")).collect();
  let mu = (0..n).map(|i| 0.01 * ((i as f64 * 1.7).sin())).collect();
  let cov = DMatrix::from_fn(n, n, |i, j| {
    if i == j {
      0.02 + 0.001 * i as f64
    } else {
      0.004 * (-((i as f64 - j as f64).abs()) / 3.0).exp()
    }
  });
  (
    ReturnVector::new(assets.clone(), mu).unwrap(),
    CovarianceMatrix::new(assets, cov).unwrap(),
  )
}

fn bench_forecaster(c: &mut Criterion) {
  let mut group = c.benchmark_group("forecaster");
  group.measurement_time(Duration::from_secs(3));
  let forecaster = SeriesForecaster::default();

  for n in [120usize, 500, 1000] {
    let series = synthetic_series(n);
    group.bench_with_input(BenchmarkId::new("fit_and_forecast", n), &series, |b, s| {
      b.iter(|| black_box(forecaster.fit_and_forecast(s).unwrap()))
    });
  }
  group.finish();
}

fn bench_optimizer(c: &mut Criterion) {
  let mut group = c.benchmark_group("optimizer");
  group.measurement_time(Duration::from_secs(3));
  let optimizer = PortfolioOptimizer::default();

  for n in [6usize, 25, 100] {
    let (mu, cov) = synthetic_inputs(n);
    let floor = 0.5 / n as f64;
    group.bench_with_input(BenchmarkId::new("sqp", n), &n, |b, _| {
      b.iter(|| black_box(optimizer.optimize(&mu, &cov, 3.0, floor).unwrap()))
    });
  }
  group.finish();
}

criterion_group!(benches, bench_forecaster, bench_optimizer);
criterion_main!(benches);
