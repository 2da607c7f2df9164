// src/subtitles.rs - WebVTT cues from per-scene narration durations
use crate::media::format_timestamp;

/// One scene's narration with its rendered duration, in playback order.
#[derive(Debug, Clone)]
pub struct SubtitleCue {
    pub text: String,
    pub duration_secs: f64,
}

/// Build a WebVTT document. Each scene becomes one cue covering its time
/// range; offsets are cumulative over the preceding scenes.
pub fn build_vtt(cues: &[SubtitleCue]) -> String {
    let mut vtt = String::from("WEBVTT\n");
    let mut offset = 0.0_f64;

    for (i, cue) in cues.iter().enumerate() {
        let start = offset;
        let end = offset + cue.duration_secs;
        vtt.push_str(&format!(
            "\n{}\n{} --> {}\n{}\n",
            i + 1,
            format_timestamp(start),
            format_timestamp(end),
            cue.text.trim()
        ));
        offset = end;
    }

    vtt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_cumulative() {
        let cues = vec![
            SubtitleCue {
                text: "first".to_string(),
                duration_secs: 4.5,
            },
            SubtitleCue {
                text: "second".to_string(),
                duration_secs: 10.0,
            },
        ];
        let vtt = build_vtt(&cues);
        assert!(vtt.starts_with("WEBVTT\n"));
        assert!(vtt.contains("00:00:00.000 --> 00:00:04.500"));
        assert!(vtt.contains("00:00:04.500 --> 00:00:14.500"));
        assert!(vtt.contains("first"));
        assert!(vtt.contains("second"));
    }

    #[test]
    fn identical_input_gives_identical_output() {
        let cues = vec![SubtitleCue {
            text: "hello".to_string(),
            duration_secs: 3.0,
        }];
        assert_eq!(build_vtt(&cues), build_vtt(&cues));
    }

    #[test]
    fn empty_input_is_a_bare_header() {
        assert_eq!(build_vtt(&[]), "WEBVTT\n");
    }
}
