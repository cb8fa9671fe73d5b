use chrono::{Duration, TimeZone, Utc};
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use pointing_model_builder::astro::{AtmosphericConditions, HorizonProfile, ObserverSite};
use pointing_model_builder::dome::DomeGeometry;
use pointing_model_builder::generator::{
    MeridianLimits, PointBounds, PointGenerator, SiderealPathRequest,
};
use pointing_model_builder::models::EquatorialCoordinates;
use pointing_model_builder::ordering::PointOrdering;

fn bench_golden_spiral(c: &mut Criterion) {
    let mut group = c.benchmark_group("golden_spiral");

    let open = PointGenerator::default();
    let obstructed = PointGenerator::new(
        PointBounds::default(),
        HorizonProfile::from_points([(0.0, 20.0), (90.0, 35.0), (180.0, 15.0), (270.0, 30.0)]),
    );
    for n in [20usize, 100, 500] {
        group.bench_with_input(BenchmarkId::new("open_sky", n), &n, |b, &n| {
            b.iter(|| open.golden_spiral(black_box(n)));
        });
        group.bench_with_input(BenchmarkId::new("with_horizon", n), &n, |b, &n| {
            b.iter(|| obstructed.golden_spiral(black_box(n)));
        });
    }

    group.finish();
}

fn bench_sidereal_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("sidereal_path");

    let start = Utc.with_ymd_and_hms(2024, 9, 15, 21, 0, 0).unwrap();
    let request = |ra_delta_deg: f64| SiderealPathRequest {
        target: EquatorialCoordinates::new(5.5, 20.0),
        ra_delta_deg,
        start,
        end: start + Duration::hours(6),
        site: ObserverSite::new(40.4, -3.7),
        conditions: AtmosphericConditions::default(),
        meridian_limits: MeridianLimits::default(),
    };
    let generator = PointGenerator::default();

    let coarse = request(1.5);
    group.bench_function("coarse_step", |b| {
        b.iter(|| generator.sidereal_path(black_box(&coarse)));
    });

    // fine step forces widening restarts
    let fine = request(0.05);
    group.bench_function("fine_step_widened", |b| {
        b.iter(|| generator.sidereal_path(black_box(&fine)));
    });

    group.finish();
}

fn bench_ordering(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordering");

    let geometry = DomeGeometry::default();
    let mut points = PointGenerator::default().golden_spiral(200).unwrap();
    for p in points.iter_mut() {
        geometry.annotate(p, 40.4, 900.0);
    }

    group.bench_function("plan_azimuth_200", |b| {
        let ordering = PointOrdering::new(false, false);
        b.iter(|| ordering.plan(black_box(&points)));
    });
    group.bench_function("plan_dome_aware_200", |b| {
        let ordering = PointOrdering::new(false, true);
        b.iter(|| ordering.plan(black_box(&points)));
    });
    group.bench_function("annotate_200", |b| {
        b.iter(|| {
            let mut copy = points.clone();
            for p in copy.iter_mut() {
                geometry.annotate(p, black_box(40.4), black_box(900.0));
            }
            copy
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_golden_spiral,
    bench_sidereal_path,
    bench_ordering
);
criterion_main!(benches);
