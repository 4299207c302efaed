//! Command-line uploader: sends one image to a running relay and prints the text.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use ocr_relay::upload::Upload;
use ocr_relay::uploader::{UploadError, UploadSession, Uploader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ocr-upload", about = "Extract text from an image via the OCR relay")]
struct Args {
    /// Image to upload (JPG, PNG or WEBP, at most 5MB)
    file: PathBuf,

    /// Relay endpoint
    #[arg(
        long,
        env = "OCR_RELAY_URL",
        default_value = "http://localhost:3000/api/extract-text"
    )]
    endpoint: String,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Send the file as-is instead of downsampling it first
    #[arg(long)]
    no_optimize: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_upload=info,ocr_relay=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let upload = Upload::from_path(&args.file)
        .with_context(|| format!("Failed to read {:?}", args.file))?;

    let uploader = Uploader::new(args.endpoint)
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .with_optimize(!args.no_optimize);
    let mut session = UploadSession::new(uploader);

    match session
        .submit(upload, |pct| info!("progress: {}%", pct))
        .await
    {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(UploadError::Relay {
            message,
            details: Some(details),
            ..
        }) => anyhow::bail!("{} ({})", message, details),
        Err(e) => anyhow::bail!("{}", e),
    }
}
