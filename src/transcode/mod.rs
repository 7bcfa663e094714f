//! Transcoding: rendition ladder, ffmpeg invocation, process supervision.

mod profiles;
mod supervisor;

pub use profiles::{
    build_ffmpeg_args, default_ladder, master_playlist, QualityTier, MASTER_PLAYLIST,
};
pub use supervisor::{JobStatus, StreamTranscoder, TranscodeError, TranscodeSupervisor};

use std::path::PathBuf;
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Check if a tool is available using a custom version argument.
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let result = Command::new(name).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(name).ok();

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the external tools hivecast shells out to.
pub fn check_tools() -> Vec<ToolInfo> {
    vec![check_tool_with_arg("ffmpeg", "-version")]
}
