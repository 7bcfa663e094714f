//! Rendition ladder and ffmpeg invocation building.
//!
//! One live stream fans out into several quality tiers; each tier gets its
//! own subdirectory of segments plus an `index.m3u8`, and the master
//! playlist written at launch ties them together for adaptive playback.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Filename of the multi-rendition master playlist.
pub const MASTER_PLAYLIST: &str = "master.m3u8";

/// One quality rendition of a transcoded stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTier {
    /// Tier name, used as the output subdirectory.
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl QualityTier {
    pub fn new(name: &str, width: u32, height: u32, bitrate_kbps: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            bitrate_kbps,
        }
    }

    /// Resolution in `WIDTHxHEIGHT` form.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Peak bandwidth in bits per second, as advertised in the master
    /// playlist.
    pub fn bandwidth(&self) -> u32 {
        self.bitrate_kbps * 1000
    }
}

/// Default rendition ladder, source tier first.
pub fn default_ladder() -> Vec<QualityTier> {
    vec![
        QualityTier::new("source", 1920, 1080, 5000),
        QualityTier::new("720p", 1280, 720, 2800),
        QualityTier::new("480p", 854, 480, 1400),
        QualityTier::new("360p", 640, 360, 800),
    ]
}

/// Render the master playlist content for a ladder.
pub fn master_playlist(tiers: &[QualityTier]) -> String {
    let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
    for tier in tiers {
        out.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={},NAME=\"{}\"\n",
            tier.bandwidth(),
            tier.resolution(),
            tier.name
        ));
        out.push_str(&format!("{}/index.m3u8\n\n", tier.name));
    }
    out
}

/// Build the `-filter_complex` graph splitting the input into one scaled
/// branch per tier. The first tier passes through unscaled.
fn filter_graph(tiers: &[QualityTier]) -> String {
    let mut split = format!("[0:v]split={}[v0]", tiers.len());
    for i in 1..tiers.len() {
        split.push_str(&format!("[s{}]", i));
    }

    let mut chains = vec![split];
    for (i, tier) in tiers.iter().enumerate().skip(1) {
        chains.push(format!(
            "[s{i}]scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2[v{i}]",
            i = i,
            w = tier.width,
            h = tier.height,
        ));
    }
    chains.join(";")
}

/// Build the full ffmpeg argument list for one live stream.
///
/// Reads from `input_url` and writes HLS output for every tier under
/// `stream_dir/{tier}/`, with rolling segment windows
/// (`delete_segments+independent_segments`).
pub fn build_ffmpeg_args(
    input_url: &str,
    stream_dir: &Path,
    tiers: &[QualityTier],
    hls_time: u32,
    hls_list_size: u32,
) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        input_url.to_string(),
        "-y".to_string(),
        "-filter_complex".to_string(),
        filter_graph(tiers),
    ];

    for (i, tier) in tiers.iter().enumerate() {
        let tier_dir = stream_dir.join(&tier.name);
        let maxrate = (f64::from(tier.bitrate_kbps) * 1.1) as u32;

        args.extend(
            [
                "-map",
                &format!("[v{}]", i),
                "-map",
                "0:a",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-b:v",
                &format!("{}k", tier.bitrate_kbps),
                "-maxrate",
                &format!("{}k", maxrate),
                "-bufsize",
                &format!("{}k", tier.bitrate_kbps * 2),
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-ar",
                "44100",
                "-f",
                "hls",
                "-hls_time",
                &hls_time.to_string(),
                "-hls_list_size",
                &hls_list_size.to_string(),
                "-hls_flags",
                "delete_segments+independent_segments",
                "-hls_segment_filename",
                &tier_dir.join("segment_%d.ts").to_string_lossy(),
                &tier_dir.join("index.m3u8").to_string_lossy(),
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }

    args
}
