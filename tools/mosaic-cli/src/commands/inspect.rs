//! Summarize a recording.

use std::path::PathBuf;

use anyhow::Context;
use mosaic_codec::inspect;
use mosaic_media_model::ChunkKind;

pub fn run(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let summary = inspect(&bytes).with_context(|| format!("{} is not a readable container", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("File: {}", path.display());
    println!("  Size: {} bytes", bytes.len());
    println!("  Doc type: {}", summary.doc_type);
    match summary.duration_ms {
        Some(ms) => println!("  Duration: {:.2}s", ms / 1000.0),
        None => println!("  Duration: unknown"),
    }
    println!("  Clusters: {}", summary.clusters);
    println!("  Cue points: {}", summary.cue_points);
    println!();

    println!("Tracks:");
    for track in &summary.tracks {
        match track.kind {
            Some(ChunkKind::Video) => println!(
                "  #{} video {} {}x{}: {} blocks, {} keyframes",
                track.number,
                track.codec_id,
                track.width.unwrap_or_default(),
                track.height.unwrap_or_default(),
                track.blocks,
                track.keyframes
            ),
            Some(ChunkKind::Audio) => println!(
                "  #{} audio {} {} Hz x{}: {} blocks",
                track.number,
                track.codec_id,
                track.sample_rate.unwrap_or_default(),
                track.channels.unwrap_or_default(),
                track.blocks
            ),
            None => println!("  #{} {}: {} blocks", track.number, track.codec_id, track.blocks),
        }
        if let (Some(first), Some(last)) = (track.first_ms, track.last_ms) {
            println!("      {first} ms .. {last} ms");
        }
    }

    Ok(())
}
