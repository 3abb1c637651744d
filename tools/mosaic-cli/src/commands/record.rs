//! Record a composite of test-pattern sections.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mosaic_codec::DirectorySink;
use mosaic_common::config::AppConfig;
use mosaic_compositor::SourceRegistry;
use mosaic_recorder::{default_backend, MediaBackend, PipelineEvent, Recorder, SessionConfig};

use crate::patterns::parse_sections;

pub struct RecordArgs {
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub mic: bool,
    pub system_audio: bool,
    pub output: Option<PathBuf>,
    pub sections: String,
}

pub async fn run(config: AppConfig, args: RecordArgs) -> anyhow::Result<()> {
    let registry = Arc::new(SourceRegistry::new());
    for (index, source) in parse_sections(&args.sections)?.into_iter().enumerate() {
        registry.assign(index, source)?;
    }

    let backend: Arc<dyn MediaBackend> = Arc::from(default_backend()?);
    let output = args.output.unwrap_or_else(|| config.output_dir.clone());
    let mut settings = config.recording.clone();
    settings.width = args.width.unwrap_or(settings.width);
    settings.height = args.height.unwrap_or(settings.height);
    settings.fps = args.fps.unwrap_or(settings.fps);
    settings.capture_mic = args.mic;
    settings.capture_system_audio = args.system_audio;

    let session = SessionConfig::from_defaults(registry.clone(), &settings);
    println!("Starting recording");
    println!("  Backend: {}", backend.name());
    println!("  Output: {}", output.display());
    println!("  Size: {}x{} @ {}fps", session.width, session.height, session.fps);
    println!("  Sections: {}", args.sections);
    println!("  Mic: {}", session.capture_mic);
    println!("  System audio: {}", session.capture_system_audio);
    println!();

    let recorder = Recorder::new(backend, Arc::new(DirectorySink::new(output.clone())), settings);
    let mut events = recorder.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            report(&event);
        }
    });

    let id = recorder.start(session).await?;
    tracing::info!(session = %id, "Recording started");

    match args.duration {
        Some(secs) => {
            println!("Recording for {secs:.1}s (Ctrl+C stops early)...");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))) => {}
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => {
            println!("Press Ctrl+C to stop recording...");
            tokio::signal::ctrl_c().await?;
        }
    }

    println!();
    let result = recorder.stop().await;
    if let Some(summary) = recorder.last_summary() {
        println!(
            "Frames: {} encoded, {} dropped; {} video / {} audio chunks ({}, {:?} audio)",
            summary.frames,
            summary.dropped,
            summary.video_chunks,
            summary.audio_chunks,
            summary.strategy,
            summary.audio_mix,
        );
    }
    registry.clear_all();
    drop(recorder);
    reporter.abort();

    let path = result?;
    println!("Recording saved to: {}", path.display());
    Ok(())
}

fn report(event: &PipelineEvent) {
    match event {
        PipelineEvent::StateChanged { state, .. } => tracing::debug!(%state, "Session state"),
        PipelineEvent::FrameError { section, message, .. } => {
            eprintln!("[WARN] Section {section}: {message}");
        }
        PipelineEvent::Stalled {
            since_last_frame_ms, ..
        } => eprintln!("[WARN] No frame for {since_last_frame_ms} ms"),
        PipelineEvent::EncoderError { message, .. } => eprintln!("[ERROR] Encoder: {message}"),
        PipelineEvent::SessionFailed { message, .. } => eprintln!("[ERROR] Session failed: {message}"),
        PipelineEvent::RecordingSaved { .. } => {}
    }
}
