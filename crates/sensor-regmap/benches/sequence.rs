use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sensor_regmap::{delta, validate, PixelFormat, RegisterFile, RegisterMap, SensorConfig};

fn bench_validate(c: &mut Criterion) {
    let config = SensorConfig::new(PixelFormat::Yuv422, true, false);
    c.bench_function("validate", |b| b.iter(|| validate(black_box(&config))));
}

fn bench_delta(c: &mut Criterion) {
    let before = SensorConfig::new(PixelFormat::Rgb565, false, false);
    let after = SensorConfig::new(PixelFormat::Rgb565, true, true);

    let mut file = RegisterFile::new(RegisterMap::gc2145());
    if let Ok(writes) = validate(&before) {
        let _ = file.apply(&writes);
    }
    let next = validate(&after).unwrap_or_default();

    c.bench_function("delta", |b| b.iter(|| delta(black_box(&file), black_box(&next))));
}

criterion_group!(benches, bench_validate, bench_delta);
criterion_main!(benches);
