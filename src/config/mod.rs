// Job configuration for the watermark CLI
//
// A job names a base resource, an ordered list of marks (images or text) and
// where the result goes. `${VAR}` references are replaced with environment
// variables before parsing.

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_FONT_SIZE, DEFAULT_OPACITY, DEFAULT_QUALITY, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_TEXT_COLOR, DEFAULT_TILE_SPACING, MAX_RESOURCE_BYTES,
};
use crate::encode::OutputFormat;
use crate::error::{WatermarkError, WatermarkResult};
use crate::loader::{HttpFetcher, HttpFetcherConfig, LocalHandle, Resource};
use crate::pipeline::{PipelineOpts, Sequence};
use crate::style::{self, Anchor, Placement};

fn default_opacity() -> f32 {
    DEFAULT_OPACITY
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_font_size() -> f32 {
    DEFAULT_FONT_SIZE
}

fn default_color() -> String {
    DEFAULT_TEXT_COLOR.to_string()
}

fn default_spacing() -> u32 {
    DEFAULT_TILE_SPACING
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Directory relative paths are resolved against. Defaults to the
    /// directory of the job file when loaded with `from_file`.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Dedicated surface pool size. Uses the shared pool when absent.
    #[serde(default)]
    pub pool_size: Option<usize>,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub base: SourceConfig,
    #[serde(default)]
    pub marks: Vec<MarkConfig>,
}

/// Settings applied to remote fetches.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra headers sent with every remote request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Output file. Without one the CLI prints the data URL.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Explicit format; otherwise taken from the path extension, then PNG.
    #[serde(default)]
    pub format: Option<OutputFormat>,
    #[serde(default = "default_quality")]
    pub quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: None,
            format: None,
            quality: default_quality(),
        }
    }
}

impl OutputConfig {
    pub fn resolved_format(&self) -> OutputFormat {
        self.format
            .or_else(|| {
                self.path
                    .as_ref()
                    .and_then(|p| OutputFormat::from_extension(&p.to_string_lossy()))
            })
            .unwrap_or_default()
    }
}

/// Where a resource comes from: exactly one of `url` or `path`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<(), String> {
        match (&self.url, &self.path) {
            (Some(url), None) if url.trim().is_empty() => Err("Source url cannot be empty".to_string()),
            (Some(_), None) => Ok(()),
            (None, Some(path)) if path.as_os_str().is_empty() => {
                Err("Source path cannot be empty".to_string())
            }
            (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err("Source must set either url or path, not both".to_string()),
            (None, None) => Err("Source must set url or path".to_string()),
        }
    }

    /// Turn the source into a pipeline resource. URLs are fetched remotely;
    /// paths become local handles resolved against `base_dir`.
    pub fn to_resource(&self, base_dir: Option<&Path>) -> WatermarkResult<Resource> {
        self.validate().map_err(WatermarkError::UnsupportedResource)?;
        match (&self.url, &self.path) {
            (Some(url), _) => Ok(Resource::remote(url.clone())),
            (None, Some(path)) => Ok(Resource::Local(LocalHandle::from_path(resolve(
                base_dir, path,
            )))),
            (None, None) => Err(WatermarkError::UnsupportedResource(
                "Source must set url or path".to_string(),
            )),
        }
    }
}

fn resolve(base_dir: Option<&Path>, path: &Path) -> PathBuf {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

/// A single watermark, tagged by `type` in YAML:
///
/// ```yaml
/// marks:
///   - type: image
///     path: logo.png
///     position: bottom-right
///   - type: text
///     text: "(c) ACME"
///     font: fonts/DejaVuSans.ttf
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarkConfig {
    Image(ImageMarkConfig),
    Text(TextMarkConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageMarkConfig {
    #[serde(flatten)]
    pub source: SourceConfig,
    #[serde(default)]
    pub position: Placement,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    /// Gap between copies for repeating positions.
    #[serde(default = "default_spacing")]
    pub spacing: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextMarkConfig {
    pub text: String,
    /// TrueType/OpenType font file.
    pub font: PathBuf,
    #[serde(default = "default_font_size")]
    pub size: f32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub position: Placement,
    #[serde(default = "default_spacing")]
    pub spacing: u32,
    /// Clockwise rotation in degrees.
    #[serde(default)]
    pub rotation: Option<f32>,
}

fn validate_opacity(opacity: f32) -> Result<(), String> {
    if !opacity.is_finite() || !(0.0..=1.0).contains(&opacity) {
        return Err(format!("Opacity must be between 0.0 and 1.0, got {opacity}"));
    }
    Ok(())
}

impl MarkConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MarkConfig::Image(image) => {
                image.source.validate()?;
                validate_opacity(image.opacity)
            }
            MarkConfig::Text(text) => {
                if text.text.is_empty() {
                    return Err("Text watermark cannot be empty".to_string());
                }
                if text.font.as_os_str().is_empty() {
                    return Err("Text watermark requires a font path".to_string());
                }
                if !text.size.is_finite() || text.size <= 0.0 {
                    return Err(format!("Font size must be positive, got {}", text.size));
                }
                if let Some(rotation) = text.rotation {
                    if !rotation.is_finite() {
                        return Err("Rotation must be a finite number".to_string());
                    }
                }
                style::text::parse_hex_color(&text.color).map_err(|e| e.to_string())?;
                validate_opacity(text.opacity)
            }
        }
    }
}

fn anchor(position: Placement, spacing: u32) -> Anchor {
    Anchor::Placement {
        placement: position,
        spacing,
    }
}

impl JobConfig {
    /// Parse YAML, replacing `${VAR}` with environment variables first.
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, String> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").map_err(|e| e.to_string())?;

        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            })
        });
        if let Some(var_name) = missing {
            return Err(format!(
                "Environment variable '{var_name}' is referenced but not set"
            ));
        }

        serde_yaml::from_str(&substituted).map_err(|e| e.to_string())
    }

    /// Load a job file. A missing `base_dir` defaults to the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read job file: {e}"))?;
        let mut config = Self::from_yaml_with_env(&yaml)?;
        config.base_dir = match config.base_dir.take() {
            Some(base_dir) => Some(resolve(path.parent(), &base_dir)),
            None => path.parent().map(Path::to_path_buf),
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.base
            .validate()
            .map_err(|e| format!("Invalid base resource: {e}"))?;

        for (index, mark) in self.marks.iter().enumerate() {
            mark.validate()
                .map_err(|e| format!("Invalid mark #{index}: {e}"))?;
        }

        if !(1..=100).contains(&self.output.quality) {
            return Err(format!(
                "Output quality must be between 1 and 100, got {}",
                self.output.quality
            ));
        }

        if self.request.timeout_secs == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Resources in pipeline order: the base, then every image mark.
    pub fn resources(&self) -> WatermarkResult<Vec<Resource>> {
        let base_dir = self.base_dir.as_deref();
        let mut resources = vec![self.base.to_resource(base_dir)?];
        for mark in &self.marks {
            if let MarkConfig::Image(image) = mark {
                resources.push(image.source.to_resource(base_dir)?);
            }
        }
        Ok(resources)
    }

    /// One draw step per mark, in order, all targeting the base surface.
    pub fn draw_strategy(&self) -> WatermarkResult<Sequence> {
        let base_dir = self.base_dir.as_deref();
        let mut sequence = Sequence::new();
        let mut next_image = 1;

        for mark in &self.marks {
            match mark {
                MarkConfig::Image(image) => {
                    let step = style::image::ImageMark::new(
                        anchor(image.position, image.spacing),
                        image.opacity,
                    )
                    .with_mark(next_image);
                    next_image += 1;
                    sequence.push(Box::new(step));
                }
                MarkConfig::Text(text) => {
                    let font = style::text::Font::from_file(resolve(base_dir, &text.font))?;
                    let mut text_style = style::text::TextStyle::new(font)
                        .with_size(text.size)
                        .with_color(style::text::parse_hex_color(&text.color)?);
                    if let Some(rotation) = text.rotation {
                        text_style = text_style.with_rotation(rotation);
                    }
                    sequence.push(Box::new(style::text::TextMark::new(
                        text.text.clone(),
                        text_style,
                        anchor(text.position, text.spacing),
                        text.opacity,
                    )));
                }
            }
        }
        Ok(sequence)
    }

    /// Pipeline options: fetcher, headers, pool and output settings.
    pub fn pipeline_opts(&self) -> WatermarkResult<PipelineOpts> {
        let fetcher = HttpFetcher::new(HttpFetcherConfig {
            base_dir: self.base_dir.clone(),
            timeout: Duration::from_secs(self.request.timeout_secs),
            max_bytes: MAX_RESOURCE_BYTES,
        })
        .map_err(|e| WatermarkError::config(e.to_string()))?;

        let headers = self.request.headers.clone();
        let mut opts = PipelineOpts::new()
            .with_fetcher(fetcher)
            .with_output(self.output.resolved_format())
            .with_quality(self.output.quality)
            .with_initializer(move |request| {
                for (name, value) in &headers {
                    request.header(name.clone(), value.clone());
                }
            });
        if let Some(size) = self.pool_size {
            opts = opts.with_pool_size(size);
        }
        Ok(opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::RemoteRequest;

    const MINIMAL: &str = r#"
base:
  path: photo.jpg
marks:
  - type: image
    url: https://cdn.example.com/logo.png
    position: top-left
    opacity: 0.8
"#;

    #[test]
    fn test_parse_minimal_job() {
        let config = JobConfig::from_yaml_with_env(MINIMAL).unwrap();
        assert_eq!(config.base.path, Some(PathBuf::from("photo.jpg")));
        assert_eq!(config.marks.len(), 1);
        match &config.marks[0] {
            MarkConfig::Image(image) => {
                assert_eq!(image.position, Placement::TopLeft);
                assert_eq!(image.opacity, 0.8);
                assert_eq!(image.spacing, DEFAULT_TILE_SPACING);
            }
            other => panic!("expected image mark, got {other:?}"),
        }
        assert_eq!(config.output.quality, DEFAULT_QUALITY);
        assert_eq!(config.request.timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_text_mark_defaults() {
        let yaml = r#"
base:
  url: https://example.com/photo.png
marks:
  - type: text
    text: "(c) ACME"
    font: fonts/DejaVuSans.ttf
"#;
        let config = JobConfig::from_yaml_with_env(yaml).unwrap();
        match &config.marks[0] {
            MarkConfig::Text(text) => {
                assert_eq!(text.size, DEFAULT_FONT_SIZE);
                assert_eq!(text.color, DEFAULT_TEXT_COLOR);
                assert_eq!(text.opacity, DEFAULT_OPACITY);
                assert_eq!(text.position, Placement::BottomRight);
                assert!(text.rotation.is_none());
            }
            other => panic!("expected text mark, got {other:?}"),
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_substitution() {
        std::env::set_var("WATERMARK_TEST_TOKEN", "secret-token");
        let yaml = r#"
base:
  path: photo.jpg
request:
  headers:
    Authorization: "Bearer ${WATERMARK_TEST_TOKEN}"
"#;
        let config = JobConfig::from_yaml_with_env(yaml).unwrap();
        assert_eq!(
            config.request.headers.get("Authorization").map(String::as_str),
            Some("Bearer secret-token")
        );
    }

    #[test]
    fn test_env_substitution_missing_var() {
        let yaml = "base:\n  path: ${WATERMARK_TEST_DEFINITELY_UNSET}\n";
        let err = JobConfig::from_yaml_with_env(yaml).unwrap_err();
        assert!(err.contains("WATERMARK_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_validate_rejects_bad_sources() {
        let both = "base:\n  path: a.png\n  url: https://example.com/a.png\n";
        let config = JobConfig::from_yaml_with_env(both).unwrap();
        assert!(config.validate().unwrap_err().contains("not both"));

        let neither = "base: {}\n";
        let config = JobConfig::from_yaml_with_env(neither).unwrap();
        assert!(config.validate().is_err());
        assert!(matches!(
            config.resources(),
            Err(WatermarkError::UnsupportedResource(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_marks() {
        let bad_opacity = r#"
base:
  path: a.png
marks:
  - type: image
    path: b.png
    opacity: 1.5
"#;
        let err = JobConfig::from_yaml_with_env(bad_opacity)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.contains("mark #0"));

        let bad_color = r##"
base:
  path: a.png
marks:
  - type: text
    text: hi
    font: f.ttf
    color: "#12345"
"##;
        assert!(JobConfig::from_yaml_with_env(bad_color)
            .unwrap()
            .validate()
            .is_err());

        let empty_text = r#"
base:
  path: a.png
marks:
  - type: text
    text: ""
    font: f.ttf
"#;
        assert!(JobConfig::from_yaml_with_env(empty_text)
            .unwrap()
            .validate()
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_quality() {
        let yaml = "base:\n  path: a.png\noutput:\n  quality: 0\n";
        let config = JobConfig::from_yaml_with_env(yaml).unwrap();
        assert!(config.validate().unwrap_err().contains("quality"));
    }

    #[test]
    fn test_unknown_mark_type_fails_to_parse() {
        let yaml = "base:\n  path: a.png\nmarks:\n  - type: video\n    path: a.mp4\n";
        assert!(JobConfig::from_yaml_with_env(yaml).is_err());
    }

    #[test]
    fn test_resources_follow_mark_order() {
        let yaml = r#"
base_dir: /srv/assets
base:
  path: photo.jpg
marks:
  - type: text
    text: hi
    font: f.ttf
  - type: image
    path: /abs/logo.png
  - type: image
    url: https://example.com/badge.png
"#;
        let config = JobConfig::from_yaml_with_env(yaml).unwrap();
        let resources = config.resources().unwrap();
        assert_eq!(resources.len(), 3);
        assert_eq!(resources[0].describe(), "/srv/assets/photo.jpg");
        assert_eq!(resources[1].describe(), "/abs/logo.png");
        assert!(matches!(&resources[2], Resource::Remote(url) if url.ends_with("badge.png")));
    }

    #[test]
    fn test_output_format_resolution() {
        let mut output = OutputConfig::default();
        assert_eq!(output.resolved_format(), OutputFormat::Png);

        output.path = Some(PathBuf::from("out/result.jpg"));
        assert_eq!(output.resolved_format(), OutputFormat::Jpeg);

        output.format = Some(OutputFormat::WebP);
        assert_eq!(output.resolved_format(), OutputFormat::WebP);
    }

    #[test]
    fn test_pipeline_opts_apply_headers_and_pool_size() {
        let yaml = r#"
pool_size: 4
base:
  path: a.png
output:
  format: jpeg
  quality: 75
request:
  headers:
    X-Api-Key: abc
"#;
        let config = JobConfig::from_yaml_with_env(yaml).unwrap();
        let opts = config.pipeline_opts().unwrap();
        assert_eq!(opts.pool_size, Some(4));
        assert_eq!(opts.output, OutputFormat::Jpeg);
        assert_eq!(opts.quality, 75);

        let mut request = RemoteRequest::new("https://example.com/a.png");
        (opts.initializer)(&mut request);
        assert_eq!(
            request.headers,
            vec![("X-Api-Key".to_string(), "abc".to_string())]
        );
    }

    #[test]
    fn test_draw_strategy_needs_readable_font() {
        let yaml = r#"
base:
  path: a.png
marks:
  - type: text
    text: hi
    font: /nonexistent/font.ttf
"#;
        let config = JobConfig::from_yaml_with_env(yaml).unwrap();
        assert!(matches!(
            config.draw_strategy(),
            Err(WatermarkError::Config(_))
        ));
    }

    #[test]
    fn test_draw_strategy_one_step_per_mark() {
        let config = JobConfig::from_yaml_with_env(MINIMAL).unwrap();
        assert_eq!(config.draw_strategy().unwrap().len(), 1);
    }

    #[test]
    fn test_from_file_defaults_base_dir_to_job_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let job = dir.path().join("job.yaml");
        std::fs::write(&job, MINIMAL).unwrap();

        let config = JobConfig::from_file(&job).unwrap();
        assert_eq!(config.base_dir.as_deref(), Some(dir.path()));
        assert_eq!(
            config.resources().unwrap()[0].describe(),
            dir.path().join("photo.jpg").display().to_string()
        );
    }
}
