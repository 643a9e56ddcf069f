use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, Rgba, RgbaImage};
use sekai_chart_render::{
    build_work_plan, crop, format_duration, ChartDrawing, CropRect, DifficultyRecord, MusicRecord,
    Region, Score,
};
use std::fmt::Write;
use std::path::Path;
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

/// A synthetic score with taps, flicks and one long slide per measure
fn synthetic_score(measures: u32) -> String {
    let mut sus = String::from(
        "#TITLE \"Benchmark\"\n#REQUEST \"ticks_per_beat 480\"\n#BPM01: 160\n#00008: 01\n",
    );
    for measure in 0..measures {
        let _ = writeln!(sus, "#{measure:03}13: 2300230023002300");
        let _ = writeln!(sus, "#{measure:03}18: 1200001200001200");
        let _ = writeln!(sus, "#{measure:03}55: 3400000034000000");
        let _ = writeln!(sus, "#{measure:03}36a: 1300005300002300");
    }
    sus
}

fn benchmark_score_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");
    configure_fast_group(&mut group);

    let sus = synthetic_score(120);
    group.bench_function("parse_120_measures", |b| {
        b.iter(|| {
            let score = Score::parse(black_box(&sus)).unwrap();
            black_box(score);
        });
    });

    group.finish();
}

fn benchmark_svg_drawing(c: &mut Criterion) {
    let mut group = c.benchmark_group("chart");
    configure_fast_group(&mut group);

    let score = Score::parse(&synthetic_score(120)).unwrap();
    group.bench_function("svg_120_measures", |b| {
        b.iter(|| {
            let svg = ChartDrawing::new(black_box(&score)).svg().unwrap();
            black_box(svg);
        });
    });

    group.finish();
}

fn benchmark_crop(c: &mut Criterion) {
    let mut group = c.benchmark_group("crop");
    configure_fast_group(&mut group);

    let frame = DynamicImage::ImageRgba8(RgbaImage::from_fn(1920, 1080, |x, y| {
        Rgba([x as u8, y as u8, 0, 255])
    }));
    group.bench_function("crop_1920x1080", |b| {
        b.iter(|| {
            let cropped = crop(black_box(&frame), CropRect::new(8, 8, 1400, 1000)).unwrap();
            black_box(cropped);
        });
    });

    group.finish();
}

fn benchmark_work_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("work_plan");
    configure_fast_group(&mut group);

    let musics: Vec<MusicRecord> = (1..=500)
        .map(|id| MusicRecord {
            id,
            title: format!("Song {id}"),
            composer: None,
            lyricist: None,
            arranger: None,
            assetbundle_name: None,
        })
        .collect();
    let variants: Vec<DifficultyRecord> = musics
        .iter()
        .flat_map(|m| {
            ["easy", "normal", "hard", "expert", "master"]
                .into_iter()
                .map(|d| DifficultyRecord {
                    id: None,
                    music_id: m.id,
                    music_difficulty: d.to_string(),
                    play_level: None,
                    total_note_count: None,
                })
        })
        .collect();

    group.bench_function("build_2500_items", |b| {
        b.iter(|| {
            let plan = build_work_plan(
                black_box(&musics),
                black_box(&variants),
                Region::Jp,
                Path::new("/tmp/out"),
            );
            black_box(plan);
        });
    });

    group.finish();
}

fn benchmark_format_utilities(c: &mut Criterion) {
    let mut group = c.benchmark_group("format_utilities");
    configure_fast_group(&mut group);

    group.bench_function("format_duration", |b| {
        b.iter(|| {
            let formatted = format_duration(black_box(Duration::from_millis(12345)));
            black_box(formatted);
        });
    });

    group.finish();
}

criterion_group!(
    unit_benches,
    benchmark_score_parse,
    benchmark_svg_drawing,
    benchmark_crop,
    benchmark_work_plan,
    benchmark_format_utilities
);

criterion_main!(unit_benches);
