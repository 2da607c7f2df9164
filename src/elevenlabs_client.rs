// Eleven Labs API Client
// Text-to-Speech for lecture narration

use reqwest::Client;
use serde::Serialize;

#[derive(Clone)]
pub struct ElevenLabsClient {
    api_key: String,
    client: Client,
    base_url: String,
}

#[derive(Serialize, Debug)]
pub struct TextToSpeechRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_settings: Option<VoiceSettings>,
}

#[derive(Serialize, Debug)]
pub struct VoiceSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_boost: Option<f64>,
}

/// Fallback narrator used when a lecture carries no voice selection.
pub const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

impl ElevenLabsClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: "https://api.elevenlabs.io/v1".to_string(),
        }
    }

    /// Generate narration audio (mp3) for a scene's voiceover text.
    pub async fn text_to_speech(
        &self,
        text: &str,
        voice_id: &str,
        language_code: Option<&str>,
    ) -> Result<Vec<u8>, String> {
        let url = format!("{}/text-to-speech/{}", self.base_url, voice_id);

        let request_body = TextToSpeechRequest {
            text: text.to_string(),
            model_id: Some("eleven_multilingual_v2".to_string()),
            language_code: language_code.map(|s| s.to_string()),
            voice_settings: None,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .query(&[("output_format", "mp3_44100_128")])
            .json(&request_body)
            .send()
            .await
            .map_err(|e| format!("Eleven Labs request error: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(format!("Eleven Labs TTS API error ({}): {}", status, error_text));
        }

        let audio_bytes = response
            .bytes()
            .await
            .map_err(|e| format!("Eleven Labs response error: {}", e))?;
        Ok(audio_bytes.to_vec())
    }
}
