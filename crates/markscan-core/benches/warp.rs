use criterion::{black_box, criterion_group, criterion_main, Criterion};
use markscan_core::{
    find_blob, solve_homography, warp_region, BlobSearch, BlobSelection, DarkThreshold, Region,
    RgbaImage, Sampling,
};
use nalgebra::Point2;

fn synthetic_page() -> RgbaImage {
    let mut page = RgbaImage::filled(1000, 1400, 245);
    for (x, y) in [(40, 40), (940, 40), (940, 1340), (40, 1340)] {
        page.fill_rect(x, y, 20, 20, 0);
    }
    for k in 0..4 {
        page.fill_rect(300 + k * 60, 600, 30, 30, if k == 1 { 20 } else { 200 });
    }
    page
}

fn bench_warp(c: &mut Criterion) {
    let page = synthetic_page();
    let ideal = [
        Point2::new(50.0, 50.0),
        Point2::new(950.0, 50.0),
        Point2::new(950.0, 1350.0),
        Point2::new(50.0, 1350.0),
    ];
    let detected = ideal.map(|p| Point2::new(p.x + 3.5, p.y - 2.0));
    let h = solve_homography(&ideal, &detected).expect("solvable");
    let target = Region::new(280.0, 580.0, 260.0, 70.0);

    c.bench_function("warp_region_nearest_260x70", |b| {
        b.iter(|| warp_region(black_box(&page.view()), &h, &target, Sampling::Nearest))
    });
    c.bench_function("warp_region_bilinear_260x70", |b| {
        b.iter(|| warp_region(black_box(&page.view()), &h, &target, Sampling::Bilinear))
    });
}

fn bench_blob(c: &mut Criterion) {
    let page = synthetic_page();
    let search = BlobSearch {
        region: Region::new(0.0, 0.0, 250.0, 350.0),
        threshold: DarkThreshold::Adaptive {
            cap: 128.0,
            factor: 0.7,
        },
        min_size: 20,
        max_size: 20_000,
        selection: BlobSelection::NearestTo(Point2::new(0.0, 0.0)),
        max_aspect_ratio: None,
    };
    c.bench_function("find_blob_corner_quadrant", |b| {
        b.iter(|| find_blob(black_box(&page.view()), &search))
    });
}

criterion_group!(benches, bench_warp, bench_blob);
criterion_main!(benches);
