use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use clipper_media::probe_video;

#[derive(Args)]
pub struct ProbeArgs {
    /// Input video file
    pub file: PathBuf,

    /// Print the frame-loop view of the stream instead of the full probe
    #[arg(long)]
    pub stream: bool,
}

pub async fn run(args: &ProbeArgs) -> Result<()> {
    let info = probe_video(&args.file)
        .await
        .with_context(|| format!("failed to probe {}", args.file.display()))?;

    let json = if args.stream {
        serde_json::to_string_pretty(&info.stream_metadata()?)?
    } else {
        serde_json::to_string_pretty(&info)?
    };
    println!("{}", json);

    Ok(())
}
