use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use watermark::config::JobConfig;
use watermark::logging::LogFormat;
use watermark::metrics::PipelineMetrics;
use watermark::Pipeline;

/// Watermark - compose watermarks onto images from a YAML job file
#[derive(Parser, Debug)]
#[command(name = "watermark")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the job file
    #[arg(short, long, default_value = "watermark.yaml")]
    config: PathBuf,

    /// Validate the job file and exit
    #[arg(long)]
    test: bool,

    /// Log format: pretty or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Print the result as a data URL instead of writing the output file
    #[arg(long)]
    data_url: bool,

    /// Print pipeline metrics in Prometheus text format when done
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = watermark::logging::init_subscriber(args.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let config = JobConfig::from_file(&args.config)
        .and_then(|config| config.validate().map(|_| config))
        .unwrap_or_else(|e| {
            eprintln!("Failed to load job file: {}", e);
            std::process::exit(1);
        });

    tracing::info!(
        config_file = %args.config.display(),
        marks = config.marks.len(),
        output = ?config.output.path,
        format = ?config.output.resolved_format(),
        "Job file loaded successfully"
    );

    if args.test {
        println!("Job file {} is valid", args.config.display());
        return;
    }

    if let Err(e) = run(&args, &config).await {
        tracing::error!(error = %format!("{:#}", e), "Composition failed");
        std::process::exit(1);
    }
}

async fn run(args: &Args, config: &JobConfig) -> anyhow::Result<()> {
    let resources = config.resources().context("Invalid job resources")?;
    let draw = config.draw_strategy().context("Invalid watermark marks")?;
    let opts = config.pipeline_opts().context("Invalid pipeline options")?;

    let pipeline = Pipeline::create(resources, opts);

    match (&config.output.path, args.data_url) {
        (Some(path), false) => {
            let blob = pipeline.blob(draw).await.context("Composition failed")?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(path, &blob.data)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                bytes = blob.len(),
                mime_type = %blob.mime_type,
                "Watermarked image written"
            );
        }
        _ => {
            let url = pipeline.data_url(draw).await.context("Composition failed")?;
            println!("{}", url);
        }
    }

    if args.metrics {
        print!("{}", PipelineMetrics::export());
    }

    watermark::destroy();
    Ok(())
}
