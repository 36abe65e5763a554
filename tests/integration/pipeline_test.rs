// Pipeline integration tests
//
// Drives the public API end to end with an in-memory fetcher that serves
// PNGs after a per-locator delay, so load order and completion order differ.

use async_trait::async_trait;
use bytes::Bytes;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use watermark::encode::{encode_image, OutputFormat};
use watermark::loader::FetchError;
use watermark::style;
use watermark::{
    Composed, DecodedImage, Pipeline, PipelineOpts, RemoteRequest, Resource, ResourceFetcher,
    Surface, SurfacePool, WatermarkError, WatermarkResult,
};

const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

fn png(width: u32, height: u32, color: Rgba<u8>) -> Bytes {
    let img = RgbaImage::from_pixel(width, height, color);
    Bytes::from(encode_image(&img, OutputFormat::Png, 100).unwrap())
}

/// Serves registered locators after their delay; unknown locators 404.
#[derive(Default, Clone)]
struct DelayedFetcher {
    routes: Arc<HashMap<String, (Duration, Bytes)>>,
}

impl DelayedFetcher {
    fn new(routes: Vec<(&str, u64, Bytes)>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(locator, delay_ms, bytes)| {
                (locator.to_string(), (Duration::from_millis(delay_ms), bytes))
            })
            .collect();
        Self {
            routes: Arc::new(routes),
        }
    }
}

#[async_trait]
impl ResourceFetcher for DelayedFetcher {
    async fn fetch(&self, request: &RemoteRequest) -> Result<Bytes, FetchError> {
        match self.routes.get(&request.locator) {
            Some((delay, bytes)) => {
                tokio::time::sleep(*delay).await;
                Ok(bytes.clone())
            }
            None => Err(FetchError::Status(404)),
        }
    }
}

fn opts(fetcher: DelayedFetcher) -> PipelineOpts {
    PipelineOpts::new()
        .with_fetcher(fetcher)
        .with_pool(SurfacePool::new())
}

#[tokio::test]
async fn test_image_mark_at_fixed_position() {
    let fetcher = DelayedFetcher::new(vec![
        ("mem://base", 0, png(100, 50, BLUE)),
        ("mem://mark", 0, png(20, 20, RED)),
    ]);
    let pipeline = Pipeline::create(
        vec![Resource::remote("mem://base"), Resource::remote("mem://mark")],
        opts(fetcher),
    );

    let result = pipeline
        .image(style::image::at_pos(|_, _| 10, |_, _| 10, 1.0))
        .await
        .unwrap();

    assert_eq!((result.width(), result.height()), (100, 50));
    for (x, y, px) in result.pixels().enumerate_pixels() {
        let inside = (10..30).contains(&x) && (10..30).contains(&y);
        assert_eq!(*px, if inside { RED } else { BLUE }, "pixel ({x}, {y})");
    }
}

#[tokio::test]
async fn test_images_keep_input_order_regardless_of_completion() {
    let fetcher = DelayedFetcher::new(vec![
        ("mem://slow", 60, png(3, 3, RED)),
        ("mem://medium", 30, png(2, 2, BLUE)),
        ("mem://fast", 0, png(1, 1, RED)),
    ]);
    let images = Pipeline::create(
        vec![
            Resource::remote("mem://slow"),
            Resource::remote("mem://medium"),
            Resource::remote("mem://fast"),
        ],
        opts(fetcher),
    )
    .await
    .unwrap();

    let widths: Vec<u32> = images.iter().map(DecodedImage::width).collect();
    assert_eq!(widths, vec![3, 2, 1]);
}

#[tokio::test]
async fn test_one_failed_reference_fails_the_whole_load() {
    let fetcher = DelayedFetcher::new(vec![("mem://ok", 0, png(4, 4, BLUE))]);
    let err = Pipeline::create(
        vec![Resource::remote("mem://ok"), Resource::remote("mem://missing")],
        opts(fetcher),
    )
    .await
    .unwrap_err();

    match &err {
        WatermarkError::AggregateLoad { total, .. } => assert_eq!(*total, 2),
        other => panic!("expected aggregate load error, got {other:?}"),
    }
    assert!(matches!(
        err.first_failure(),
        Some(WatermarkError::Load { index: 1, .. })
    ));
}

#[tokio::test]
async fn test_failure_returns_before_slow_siblings_finish() {
    let fetcher = DelayedFetcher::new(vec![
        ("mem://slow", 2000, png(4, 4, BLUE)),
        ("mem://fast", 0, png(2, 2, RED)),
    ]);
    let mut resources = vec![Resource::remote("mem://slow")];
    resources.extend((0..35).map(|_| Resource::remote("mem://fast")));
    resources.push(Resource::remote("mem://missing"));

    let started = std::time::Instant::now();
    let err = Pipeline::create(resources, opts(fetcher)).await.unwrap_err();

    assert!(
        started.elapsed() < Duration::from_millis(1000),
        "failure took {:?}",
        started.elapsed()
    );
    assert!(matches!(
        err.first_failure(),
        Some(WatermarkError::Load { index: 36, .. })
    ));
}

#[tokio::test]
async fn test_failed_load_skips_drawing() {
    let fetcher = DelayedFetcher::new(vec![]);
    let pool = SurfacePool::new();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let result = Pipeline::create(
        vec![Resource::remote("mem://missing")],
        PipelineOpts::new()
            .with_fetcher(fetcher)
            .with_pool(pool.clone()),
    )
    .data_url(move |_: &mut [Surface]| -> WatermarkResult<Composed> {
        seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(Composed::Source(0))
    })
    .await;

    assert!(result.is_err());
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(pool.stats().allocated, 0);
}

#[tokio::test]
async fn test_chained_loads_append_in_order() {
    let fetcher = DelayedFetcher::new(vec![
        ("mem://a", 40, png(5, 5, RED)),
        ("mem://b", 0, png(7, 7, BLUE)),
    ]);
    let images = Pipeline::create(vec![], opts(fetcher))
        .load(vec![Resource::remote("mem://a")])
        .load(vec![Resource::remote("mem://b")])
        .await
        .unwrap();

    assert_eq!(images.len(), 2);
    assert_eq!(images[0].width(), 5);
    assert_eq!(images[1].width(), 7);
}

#[tokio::test]
async fn test_pipeline_is_reusable_after_composition() {
    let fetcher = DelayedFetcher::new(vec![
        ("mem://base", 0, png(40, 40, BLUE)),
        ("mem://mark", 0, png(10, 10, RED)),
    ]);
    let pipeline = Pipeline::create(
        vec![Resource::remote("mem://base"), Resource::remote("mem://mark")],
        opts(fetcher),
    );

    let first = pipeline.image(style::image::upper_left(1.0)).await.unwrap();
    let second = pipeline.image(style::image::lower_right(1.0)).await.unwrap();

    assert_eq!(first.pixels().get_pixel(10, 10), &RED);
    assert_eq!(first.pixels().get_pixel(25, 25), &BLUE);
    assert_eq!(second.pixels().get_pixel(10, 10), &BLUE);
    assert_eq!(second.pixels().get_pixel(25, 25), &RED);

    // Both compositions reuse the same two surfaces.
    assert_eq!(pipeline.pool().stats().allocated, 2);
    assert_eq!(pipeline.pool().len(), 2);
}

#[tokio::test]
async fn test_blob_round_trip_is_pixel_identical() {
    let base = RgbaImage::from_fn(16, 8, |x, y| Rgba([x as u8 * 10, y as u8 * 20, 128, 255]));
    let pipeline = Pipeline::create(
        vec![Resource::from(DecodedImage::from_rgba(base.clone()))],
        opts(DelayedFetcher::default()),
    );

    let blob = pipeline
        .blob(|_: &mut [Surface]| -> WatermarkResult<Composed> { Ok(Composed::Source(0)) })
        .await
        .unwrap();
    assert_eq!(blob.mime_type, "image/png");
    assert_eq!(blob.decode().unwrap().pixels(), &base);
}

#[tokio::test]
async fn test_text_and_image_marks_in_sequence() {
    let fetcher = DelayedFetcher::new(vec![
        ("mem://base", 0, png(60, 60, BLUE)),
        ("mem://mark", 0, png(10, 10, RED)),
    ]);
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let seen = Arc::clone(&calls);

    let draw = watermark::Sequence::new()
        .then(style::image::center(1.0))
        .then(move |surfaces: &mut [Surface]| -> WatermarkResult<Composed> {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            assert_eq!(surfaces.len(), 2);
            Ok(Composed::Source(0))
        });

    let image = Pipeline::create(
        vec![Resource::remote("mem://base"), Resource::remote("mem://mark")],
        opts(fetcher),
    )
    .image(draw)
    .await
    .unwrap();

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(image.pixels().get_pixel(30, 30), &RED);
}

#[tokio::test]
async fn test_destroy_empties_shared_pool() {
    let shared = SurfacePool::shared();
    let pipeline = Pipeline::create(
        vec![Resource::from(DecodedImage::from_rgba(RgbaImage::new(4, 4)))],
        PipelineOpts::new().with_fetcher(DelayedFetcher::default()),
    );
    assert!(pipeline.pool().same_pool(&shared));

    pipeline
        .data_url(|_: &mut [Surface]| -> WatermarkResult<Composed> { Ok(Composed::Source(0)) })
        .await
        .unwrap();
    assert!(!shared.is_empty());

    watermark::destroy();
    assert_eq!(shared.len(), 0);

    // Popping from an empty pool still hands out a fresh surface.
    let surface = shared.pop();
    assert_eq!(surface.width(), 0);
    assert_eq!(shared.len(), 0);
}
