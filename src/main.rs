mod cli;

use metatrack::{
    capture::{CaptureCoordinator, CaptureSettings, SyntheticDevice, VideoFrame},
    config,
    payload::{Bounds, MetadataPayload},
    playback::{PlaybackSession, PlaybackSynchronizer, PlayerEvent},
    store::{AssetStore, DirectoryAssetStore},
    Error,
};
use metatrack_common::{Clock, ManualClock, MediaTime, SystemClock, TimedSample};
use metatrack_media::MuxedAsset;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "metatrack=trace,metatrack_media=trace,metatrack_common=debug".to_string()
        } else {
            "metatrack=debug,metatrack_media=debug".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Record {
            frames,
            metadata_every,
            realtime,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(record(
                cli.config.as_deref(),
                frames,
                metadata_every,
                realtime,
            ))
        }
        Commands::Inspect { file, json } => inspect_file(&file, json),
        Commands::Play {
            file,
            step_ms,
            seek_ms,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(play_file(&file, step_ms, seek_ms))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("metatrack {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Synthetic metadata event for frame `index`.
fn synthetic_payload(index: u64) -> MetadataPayload {
    match index % 3 {
        0 => MetadataPayload::Location {
            latitude: 37.3349 + index as f64 * 1e-5,
            longitude: -122.0090,
            altitude: Some(12.0),
        },
        1 => MetadataPayload::DetectedFace {
            face_id: (index % 4) as i64,
            bounds: Bounds {
                x: 0.25,
                y: 0.2,
                width: 0.3,
                height: 0.4,
            },
        },
        _ => MetadataPayload::annotation(format!("frame {}", index)),
    }
}

async fn record(
    config_path: Option<&Path>,
    frames: u64,
    metadata_every: u64,
    realtime: bool,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let settings = CaptureSettings::from_config(&config)?;
    let store = Arc::new(
        DirectoryAssetStore::new(&config.store.root)
            .with_context(|| format!("Failed to open asset store at {:?}", config.store.root))?,
    );

    let frame_rate = config.video.frame_rate.max(1);
    let frame_duration = MediaTime::new(1, frame_rate as i32);
    let device =
        Arc::new(SyntheticDevice::new("synthetic").with_keyframe_interval(frame_rate as u64));

    let manual = Arc::new(ManualClock::new());
    let clock: Arc<dyn Clock> = if realtime {
        Arc::new(SystemClock::new())
    } else {
        manual.clone()
    };

    let coordinator =
        CaptureCoordinator::new(settings, device.clone(), store.clone()).with_clock(clock.clone());
    let session_id = coordinator.start_recording().await?;
    tracing::info!("Recording session {} ({} frames)", session_id, frames);

    let mut rejected = 0usize;
    for index in 0..frames {
        let frame = VideoFrame {
            data: device.frame_payload(index),
            capture_time: clock.now(),
            duration: frame_duration,
            is_keyframe: device.is_keyframe(index),
        };
        loop {
            match coordinator.push_video_frame(frame.clone()) {
                Err(Error::FrameQueueFull) => tokio::time::sleep(Duration::from_millis(1)).await,
                other => {
                    other?;
                    break;
                }
            }
        }

        if metadata_every > 0 && index % metadata_every == 0 {
            let payload = synthetic_payload(index).to_bytes()?;
            match coordinator.push_metadata(payload) {
                Ok(_) => {}
                Err(e) if e.is_transient() => rejected += 1,
                Err(e) => return Err(e.into()),
            }
        }

        if realtime {
            tokio::time::sleep(Duration::from_secs_f64(frame_duration.as_secs_f64())).await;
        } else {
            manual.advance(frame_duration);
            tokio::task::yield_now().await;
        }
    }

    let handle = coordinator.stop_recording().await?;
    let asset = store.fetch(&handle)?;

    println!("Asset: {}", handle.id);
    println!("Path: {}", store.path_for(&handle.id).display());
    println!("Duration: {:.3}s", asset.duration().as_secs_f64());
    println!("Metadata samples: {}", asset.metadata_track().len());
    if rejected > 0 {
        println!("Rejected metadata events: {}", rejected);
    }

    Ok(())
}

fn describe_payload(sample: &TimedSample) -> String {
    match MetadataPayload::from_bytes(sample.payload()) {
        Ok(payload) => payload.summary(),
        Err(_) => String::from_utf8_lossy(sample.payload()).into_owned(),
    }
}

fn inspect_file(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let asset = MuxedAsset::open(file).with_context(|| format!("Failed to read {:?}", file))?;
    let video = asset.video_track();

    if json {
        let samples: Vec<_> = asset
            .metadata_track()
            .iter()
            .map(|s| {
                let payload = serde_json::from_slice::<serde_json::Value>(s.payload())
                    .unwrap_or_else(|_| {
                        serde_json::Value::String(String::from_utf8_lossy(s.payload()).into_owned())
                    });
                serde_json::json!({
                    "time": s.presentation_time().as_secs_f64(),
                    "ticks": s.presentation_time().value(),
                    "size": s.payload().len(),
                    "payload": payload,
                })
            })
            .collect();
        let out = serde_json::json!({
            "file": file,
            "timescale": asset.timescale(),
            "duration": asset.duration().as_secs_f64(),
            "video": {
                "codec": video.sample_entry_str(),
                "width": video.width,
                "height": video.height,
                "samples": video.sample_table.sample_count,
                "keyframes": video.sample_table.keyframe_indices().len(),
                "bytes": video.sample_table.total_size(),
            },
            "metadata": {
                "mime_format": asset.metadata_mime(),
                "samples": samples,
            },
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("File: {}", file.display());
        println!("Timescale: {}", asset.timescale());
        println!("Duration: {:.3}s", asset.duration().as_secs_f64());

        println!(
            "\nVideo: {} {}x{}",
            video.sample_entry_str().unwrap_or("????"),
            video.width.unwrap_or(0),
            video.height.unwrap_or(0)
        );
        println!(
            "  {} samples, {} keyframes, {} bytes",
            video.sample_table.sample_count,
            video.sample_table.keyframe_indices().len(),
            video.sample_table.total_size()
        );

        println!(
            "\nMetadata: {} ({} samples)",
            asset.metadata_mime().unwrap_or("unknown"),
            asset.metadata_track().len()
        );
        for (i, sample) in asset.metadata_track().iter().enumerate() {
            println!(
                "  [{}] {:>9.3}s {}",
                i,
                sample.presentation_time().as_secs_f64(),
                describe_payload(sample)
            );
        }
    }

    Ok(())
}

async fn play_file(file: &Path, step_ms: u64, seek_ms: Option<u64>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    if step_ms == 0 {
        anyhow::bail!("--step-ms must be positive");
    }

    let asset = Arc::new(
        MuxedAsset::open(file).with_context(|| format!("Failed to read {:?}", file))?,
    );
    let duration = asset.duration();
    let session = PlaybackSession::new(PlaybackSynchronizer::new(asset));

    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let start_ms = seek_ms.unwrap_or(0) as i64;
    let end_ms = (duration.as_secs_f64() * 1000.0).ceil() as i64 + step_ms as i64;

    let feeder = tokio::spawn(async move {
        let mut events = vec![PlayerEvent::Play];
        if seek_ms.is_some() {
            events.push(PlayerEvent::Seek(MediaTime::from_millis(start_ms)));
        }
        for event in events {
            tx.send(event).await?;
        }
        let mut t = start_ms;
        while t <= end_ms {
            t += step_ms as i64;
            tx.send(PlayerEvent::Advance(MediaTime::from_millis(t))).await?;
        }
        tx.send(PlayerEvent::Pause).await?;
        Ok::<_, tokio::sync::mpsc::error::SendError<PlayerEvent>>(())
    });

    let mut delivered = 0usize;
    session
        .run(rx, |sample| {
            delivered += 1;
            println!(
                "[{:>9.3}s] {}",
                sample.presentation_time().as_secs_f64(),
                describe_payload(sample)
            );
        })
        .await;
    feeder.await??;

    println!("Delivered {} metadata samples", delivered);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Timescale: {}", config.capture.timescale);
            println!(
                "  Metadata buffer: {} samples ({:?})",
                config.capture.buffer_capacity, config.capture.backpressure
            );
            println!("  Output dir: {}", config.capture.output_dir.display());
            println!(
                "  Video: {} {}x{} @ {}fps",
                config.video.codec, config.video.width, config.video.height, config.video.frame_rate
            );
            println!("  Metadata format: {}", config.metadata.mime_format);
            println!("  Store root: {}", config.store.root.display());
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Timescale: {}", config.capture.timescale);
            println!("  Output dir: {}", config.capture.output_dir.display());
        }
    }

    Ok(())
}
