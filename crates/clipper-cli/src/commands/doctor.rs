use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use clipper_media::reframe::{find_cascade_path, ReframeConfig};
use clipper_media::{check_ffmpeg, check_ffprobe, HaarCascadeLocator};

#[derive(Args)]
pub struct DoctorArgs {
    /// Haar cascade XML to check instead of the configured one
    #[arg(long)]
    pub cascade: Option<PathBuf>,
}

pub fn run(args: &DoctorArgs) -> Result<()> {
    let mut config = ReframeConfig::from_env();
    if let Some(ref cascade) = args.cascade {
        config.cascade_path = Some(cascade.clone());
    }

    let mut missing_tools = false;
    for (name, check) in [("ffmpeg", check_ffmpeg()), ("ffprobe", check_ffprobe())] {
        match check {
            Ok(path) => println!("{:<12} {}", name, path.display()),
            Err(e) => {
                println!("{:<12} MISSING ({})", name, e);
                missing_tools = true;
            }
        }
    }

    let opencv = cfg!(feature = "opencv");
    println!("{:<12} {}", "opencv", if opencv { "enabled" } else { "not compiled in" });

    match find_cascade_path(config.cascade_path.as_deref()) {
        Ok(path) => println!("{:<12} {}", "cascade", path.display()),
        Err(e) => println!("{:<12} {}", "cascade", e),
    }

    match HaarCascadeLocator::new(&config) {
        Ok(_) => println!("{:<12} ready", "detector"),
        Err(e) => println!("{:<12} unavailable: {} (center crop still works)", "detector", e),
    }

    if missing_tools {
        bail!("FFmpeg tools are required");
    }
    Ok(())
}
