// benches/bench_geospatial.rs

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use intersection_preemption::geospatial::{
    direction_of_heading, distance_meters, GeoPoint, LocalFrame, LocalPoint,
};
use std::time::Duration;

fn bench_geospatial(c: &mut Criterion) {
    let mut group = c.benchmark_group("geospatial");
    group.measurement_time(Duration::from_secs(5));

    let center = GeoPoint::new(40.6329, -8.6585);
    let frame = LocalFrame::new(center);
    let points: Vec<GeoPoint> = (0..360)
        .map(|deg| {
            let rad = (deg as f64).to_radians();
            frame.to_geo(LocalPoint::new(150.0 * rad.sin(), 150.0 * rad.cos()))
        })
        .collect();

    group.bench_function("distance_meters", |b| {
        b.iter(|| {
            for p in &points {
                black_box(distance_meters(center, *p));
            }
        });
    });

    group.bench_function("to_local_and_back", |b| {
        b.iter(|| {
            for p in &points {
                black_box(frame.to_geo(frame.to_local(*p)));
            }
        });
    });

    group.bench_function("direction_of_heading", |b| {
        b.iter(|| {
            for deg in 0..360 {
                black_box(direction_of_heading(black_box(deg as f64 + 0.5)));
            }
        });
    });
    group.finish();
}

criterion_group!(benches, bench_geospatial);
criterion_main!(benches);
