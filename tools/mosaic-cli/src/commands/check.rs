//! Check encoders and capture devices.

use mosaic_media_model::{AudioCodec, VideoCodec};
use mosaic_recorder::default_backend;

pub fn run() -> anyhow::Result<()> {
    println!("Mosaic System Check");
    println!("{}", "=".repeat(50));

    let backend = match default_backend() {
        Ok(backend) => backend,
        Err(e) => {
            println!("[FAIL] Media backend: {e}");
            return Ok(());
        }
    };
    let report = backend.capabilities();
    println!("[OK] Media backend: {}", report.backend);

    println!();
    println!("Video encoders:");
    if report.video_encoders.is_empty() {
        println!("  (none)");
    }
    for encoder in &report.video_encoders {
        let kind = if encoder.hardware { "hardware" } else { "software" };
        println!("  {} [{}] ({kind})", encoder.name, encoder.element);
    }

    println!();
    println!("Audio encoders:");
    if report.audio_encoders.is_empty() {
        println!("  (none)");
    }
    for encoder in &report.audio_encoders {
        println!("  {} [{}]", encoder.name, encoder.element);
    }

    println!();
    print_line(report.microphone, "Microphone capture");
    print_line(report.system_audio, "System audio capture");

    let per_frame = report.supports_video(VideoCodec::H264);
    let stream = report.supports_video(VideoCodec::Vp8);
    println!();
    print_line(per_frame, "Per-frame strategy (H.264 -> Matroska)");
    print_line(stream, "Stream fallback (VP8 -> WebM)");
    print_line(report.supports_audio(AudioCodec::Aac), "AAC audio");
    print_line(report.supports_audio(AudioCodec::Opus), "Opus audio");

    println!();
    if per_frame || stream {
        println!("At least one video strategy is available. Mosaic is ready.");
    } else {
        println!("No video encoder found. Install x264 or libvpx GStreamer plugins.");
    }

    Ok(())
}

fn print_line(ok: bool, what: &str) {
    let tag = if ok { "[OK]  " } else { "[MISS]" };
    println!("{tag} {what}");
}
