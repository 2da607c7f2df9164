// src/media.rs - FFmpeg/FFprobe plumbing for scene and lecture assembly
use std::path::Path;
use tokio::process::Command;

/// Format a duration as HH:MM:SS.mmm (WebVTT timestamp shape).
pub fn format_timestamp(seconds: f64) -> String {
    let hours = (seconds / 3600.0) as u32;
    let minutes = ((seconds % 3600.0) / 60.0) as u32;
    let secs = (seconds % 60.0) as u32;
    let millis = ((seconds % 1.0) * 1000.0) as u32;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, millis)
}

async fn execute_ffmpeg(args: &[&str]) -> Result<String, String> {
    let output = Command::new("ffmpeg")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("Failed to execute FFmpeg: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("FFmpeg error: {}", stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

async fn execute_ffprobe(args: &[&str]) -> Result<String, String> {
    let output = Command::new("ffprobe")
        .args(args)
        .output()
        .await
        .map_err(|e| format!("Failed to execute FFprobe: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("FFprobe error: {}", stderr));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Duration of a media file in seconds.
pub async fn probe_duration(path: &Path) -> Result<f64, String> {
    let path_str = path.to_string_lossy();
    let stdout = execute_ffprobe(&[
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        &path_str,
    ])
    .await?;

    stdout
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("Unparseable duration '{}': {}", stdout.trim(), e))
}

/// Extend a video to at least `target_secs` by holding its last frame.
/// The animation must always cover the narration; if it is already long
/// enough the file is copied through unchanged.
pub async fn pad_video_to_duration(
    input: &Path,
    output: &Path,
    target_secs: f64,
) -> Result<(), String> {
    let current = probe_duration(input).await?;
    let input_str = input.to_string_lossy();
    let output_str = output.to_string_lossy();

    if current >= target_secs {
        execute_ffmpeg(&["-i", &input_str, "-c", "copy", "-y", &output_str]).await?;
        return Ok(());
    }

    let pad = format!("tpad=stop_mode=clone:stop_duration={:.3}", target_secs - current);
    execute_ffmpeg(&[
        "-i",
        &input_str,
        "-vf",
        &pad,
        "-an",
        "-y",
        &output_str,
    ])
    .await?;
    Ok(())
}

/// Mux narration audio into a video (video copied, audio converted to AAC).
pub async fn mux_audio(video: &Path, audio: &Path, output: &Path) -> Result<(), String> {
    let video_str = video.to_string_lossy();
    let audio_str = audio.to_string_lossy();
    let output_str = output.to_string_lossy();
    execute_ffmpeg(&[
        "-i",
        &video_str,
        "-i",
        &audio_str,
        "-c:v",
        "copy",
        "-c:a",
        "aac",
        "-map",
        "0:v:0",
        "-map",
        "1:a:0",
        "-y",
        &output_str,
    ])
    .await?;
    Ok(())
}

/// Concatenate videos in the given order with the concat demuxer
/// (streams copied, no re-encode).
pub async fn concat_videos(inputs: &[std::path::PathBuf], output: &Path) -> Result<(), String> {
    let list_path = output.with_extension("concat.txt");
    let mut list = String::new();
    for input in inputs {
        list.push_str(&format!("file '{}'\n", input.to_string_lossy()));
    }
    tokio::fs::write(&list_path, list)
        .await
        .map_err(|e| format!("Failed to write concat list: {}", e))?;

    let list_str = list_path.to_string_lossy();
    let output_str = output.to_string_lossy();
    let result = execute_ffmpeg(&[
        "-f",
        "concat",
        "-safe",
        "0",
        "-i",
        &list_str,
        "-c",
        "copy",
        "-y",
        &output_str,
    ])
    .await;

    let _ = tokio::fs::remove_file(&list_path).await;
    result.map(|_| ())
}

/// Grab the first frame of a video as a PNG thumbnail.
pub async fn extract_first_frame(video: &Path, output: &Path) -> Result<(), String> {
    let video_str = video.to_string_lossy();
    let output_str = output.to_string_lossy();
    execute_ffmpeg(&[
        "-i",
        &video_str,
        "-vf",
        "select=eq(n\\,0)",
        "-frames:v",
        "1",
        "-y",
        &output_str,
    ])
    .await?;
    Ok(())
}
