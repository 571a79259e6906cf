//! [`FrameSource`] backed by the `ffprobe` and `ffmpeg` binaries.
//!
//! Probing reads `r_frame_rate` and `nb_frames` from the first video
//! stream, estimating the frame count from duration when the container
//! does not store it. Extraction runs one `ffmpeg` process per window
//! that selects the requested frame numbers, scales them to the target
//! size and streams them back as concatenated PNGs on stdout.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use v2t_core::types::FrameId;

use crate::frames::{FrameEncoding, FrameSource, FrameSourceError, VideoInfo};

/// PNG file signature.
const PNG_SIGNATURE: &[u8; 8] = b"\x89PNG\r\n\x1a\n";

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    #[serde(default)]
    pub streams: Vec<FfprobeStream>,
    #[serde(default)]
    pub format: Option<FfprobeFormat>,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub codec_type: Option<String>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
}

// ---------------------------------------------------------------------------
// FfmpegFrameSource
// ---------------------------------------------------------------------------

/// Frame source that shells out to `ffprobe`/`ffmpeg`.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameSource {
    encoding: FrameEncoding,
}

impl FfmpegFrameSource {
    pub fn new(encoding: FrameEncoding) -> Self {
        Self { encoding }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn open(&self, video: &Path) -> Result<VideoInfo, FrameSourceError> {
        let probe = probe_video(video).await?;
        Ok(video_info(&probe))
    }

    async fn extract_frames(
        &self,
        video: &Path,
        frame_ids: &[FrameId],
    ) -> Result<Vec<String>, FrameSourceError> {
        if frame_ids.is_empty() {
            return Ok(Vec::new());
        }
        ensure_exists(video)?;

        // `select` emits frames in stream order, so unique sorted ids line
        // up with the PNGs on stdout.
        let unique: Vec<FrameId> = {
            let mut ids = frame_ids.to_vec();
            ids.sort_unstable();
            ids.dedup();
            ids
        };

        let output = tokio::process::Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(video)
            .args([
                "-vf",
                &select_filter(&unique, &self.encoding),
                "-vsync",
                "0",
                "-f",
                "image2pipe",
                "-vcodec",
                "png",
                "-compression_level",
                &self.encoding.png_compression.to_string(),
                "-",
            ])
            .output()
            .await
            .map_err(FrameSourceError::NotFound)?;

        if !output.status.success() {
            return Err(FrameSourceError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let pngs = split_png_stream(&output.stdout);
        if pngs.len() < unique.len() {
            tracing::warn!(
                video = %video.display(),
                requested = unique.len(),
                decoded = pngs.len(),
                "Video ended before the last requested frame",
            );
        }
        assign_frames(frame_ids, &unique, &pngs)
    }
}

/// Pair decoded PNGs with the sorted unique ids they were selected for and
/// base64 them in the caller's order.
///
/// `select` matches on the decoder's running frame number, so a short
/// stream can only be missing the highest ids: the video ended early
/// (`nb_frames` overstated). Those ids come back as empty strings. More
/// images than requested means the filter did not do what we asked.
fn assign_frames(
    frame_ids: &[FrameId],
    unique: &[FrameId],
    pngs: &[&[u8]],
) -> Result<Vec<String>, FrameSourceError> {
    if pngs.len() > unique.len() {
        return Err(FrameSourceError::ParseError(format!(
            "ffmpeg produced {} frames for {} requested",
            pngs.len(),
            unique.len()
        )));
    }

    let encoded: BTreeMap<FrameId, String> = unique
        .iter()
        .zip(pngs)
        .map(|(&id, png)| (id, STANDARD.encode(png)))
        .collect();

    Ok(frame_ids
        .iter()
        .map(|id| encoded.get(id).cloned().unwrap_or_default())
        .collect())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn ensure_exists(path: &Path) -> Result<(), FrameSourceError> {
    if !path.exists() {
        return Err(FrameSourceError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

/// Run `ffprobe` on a video file and return the parsed JSON output.
pub async fn probe_video(path: &Path) -> Result<FfprobeOutput, FrameSourceError> {
    ensure_exists(path)?;

    let output = tokio::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(FrameSourceError::NotFound)?;

    if !output.status.success() {
        return Err(FrameSourceError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str::<FfprobeOutput>(&stdout)
        .map_err(|e| FrameSourceError::ParseError(format!("{e}: {stdout}")))
}

/// `select` + `scale` filter graph for the given sorted frame numbers.
fn select_filter(frame_ids: &[FrameId], encoding: &FrameEncoding) -> String {
    let terms: Vec<String> = frame_ids.iter().map(|id| format!("eq(n\\,{id})")).collect();
    format!(
        "select='{}',scale={}:{}",
        terms.join("+"),
        encoding.width,
        encoding.height
    )
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Frame rate and frame count; unknown values come back as zero.
pub fn video_info(probe: &FfprobeOutput) -> VideoInfo {
    VideoInfo {
        fps: parse_framerate(probe),
        frame_count: parse_total_frames(probe),
    }
}

/// Parse the video duration in seconds, stream first, then format.
fn parse_duration(probe: &FfprobeOutput) -> f64 {
    let stream = first_video_stream(probe).and_then(|s| s.duration.as_deref());
    let format = probe.format.as_ref().and_then(|f| f.duration.as_deref());
    stream
        .into_iter()
        .chain(format)
        .find_map(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Parse the `r_frame_rate` fraction of the first video stream.
fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_video_stream(probe)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().unwrap_or(0.0);
            let den = den.trim().parse::<f64>().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.trim().parse::<f64>().unwrap_or(0.0),
    }
}

/// Count frames: `nb_frames` if present, else duration times frame rate.
fn parse_total_frames(probe: &FfprobeOutput) -> usize {
    if let Some(n) = first_video_stream(probe)
        .and_then(|s| s.nb_frames.as_deref())
        .and_then(|nb| nb.parse::<usize>().ok())
    {
        return n;
    }
    let duration = parse_duration(probe);
    let fps = parse_framerate(probe);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as usize;
    }
    0
}

/// Split an `image2pipe` PNG stream into individual files by walking the
/// chunk structure up to each `IEND`. A truncated trailing image is
/// dropped.
fn split_png_stream(mut bytes: &[u8]) -> Vec<&[u8]> {
    let mut images = Vec::new();

    'images: while bytes.starts_with(PNG_SIGNATURE) {
        let mut pos = PNG_SIGNATURE.len();
        loop {
            let Some(header) = bytes.get(pos..pos + 8) else {
                break 'images;
            };
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let end = pos + 8 + len + 4;
            if end > bytes.len() {
                break 'images;
            }
            let is_end = &header[4..8] == b"IEND";
            pos = end;
            if is_end {
                break;
            }
        }
        images.push(&bytes[..pos]);
        bytes = &bytes[pos..];
    }

    images
}
