// Job file integration tests
//
// Writes real images to a temp directory, loads a job file that points at
// them and runs the composition the way the CLI does.

use image::{Rgba, RgbaImage};
use std::path::Path;
use tempfile::TempDir;
use watermark::config::JobConfig;
use watermark::{OutputFormat, Pipeline, WatermarkError};

const GREEN: Rgba<u8> = Rgba([0, 200, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn write_png(path: &Path, width: u32, height: u32, color: Rgba<u8>) {
    RgbaImage::from_pixel(width, height, color)
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

fn write_job(dir: &TempDir, yaml: &str) -> std::path::PathBuf {
    let path = dir.path().join("job.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

#[tokio::test]
async fn test_job_file_composes_relative_resources() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("photo.png"), 80, 60, GREEN);
    write_png(&dir.path().join("logo.png"), 10, 10, WHITE);

    let job = write_job(
        &dir,
        r#"
pool_size: 2
base:
  path: photo.png
marks:
  - type: image
    path: logo.png
    position: top-left
    opacity: 1.0
output:
  path: out/result.png
"#,
    );

    let config = JobConfig::from_file(&job).unwrap();
    config.validate().unwrap();
    assert_eq!(config.output.resolved_format(), OutputFormat::Png);

    let blob = Pipeline::create(config.resources().unwrap(), config.pipeline_opts().unwrap())
        .blob(config.draw_strategy().unwrap())
        .await
        .unwrap();

    let image = blob.decode().unwrap();
    assert_eq!((image.width(), image.height()), (80, 60));
    assert_eq!(image.pixels().get_pixel(12, 12), &WHITE);
    assert_eq!(image.pixels().get_pixel(40, 40), &GREEN);
}

#[tokio::test]
async fn test_job_with_data_url_mark() {
    let dir = TempDir::new().unwrap();
    write_png(&dir.path().join("photo.png"), 30, 30, GREEN);

    let mark = watermark::encode::image_to_data_url(
        &RgbaImage::from_pixel(4, 4, WHITE),
        OutputFormat::Png,
        100,
    )
    .unwrap();
    let job = write_job(
        &dir,
        &format!(
            "pool_size: 2\nbase:\n  path: photo.png\nmarks:\n  - type: image\n    url: \"{mark}\"\n    position: center\n    opacity: 1.0\noutput:\n  format: jpeg\n"
        ),
    );

    let config = JobConfig::from_file(&job).unwrap();
    let url = Pipeline::create(config.resources().unwrap(), config.pipeline_opts().unwrap())
        .data_url(config.draw_strategy().unwrap())
        .await
        .unwrap();
    assert!(url.starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_job_with_missing_file_reports_load_failure() {
    let dir = TempDir::new().unwrap();
    let job = write_job(&dir, "pool_size: 1\nbase:\n  path: nowhere.png\n");

    let config = JobConfig::from_file(&job).unwrap();
    let err = Pipeline::create(config.resources().unwrap(), config.pipeline_opts().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err.first_failure(),
        Some(WatermarkError::Load { index: 0, .. })
    ));
}

#[test]
fn test_job_file_with_unknown_field_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    let job = write_job(&dir, "base:\n  path: a.png\nmarks: not-a-list\n");
    assert!(JobConfig::from_file(&job).is_err());
}
