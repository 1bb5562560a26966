use reqwest::multipart;

/// One Whisper call: where to send it and what to send.
pub struct WhisperRequest<'a> {
    pub endpoint: &'a str,
    pub api_key: &'a str,
    pub model: &'a str,
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub audio: Vec<u8>,
}

/// Posts audio to an OpenAI-compatible `audio/transcriptions` endpoint with
/// `response_format=text` and returns the transcript body unchanged.
pub async fn transcribe_audio(
    client: &reqwest::Client,
    req: WhisperRequest<'_>,
) -> Result<String, String> {
    let part = multipart::Part::bytes(req.audio)
        .file_name(req.file_name.to_string())
        .mime_str(req.mime_type)
        .map_err(|e| e.to_string())?;

    let form = multipart::Form::new()
        .text("model", req.model.to_string())
        .text("response_format", "text")
        .part("file", part);

    let mut builder = client.post(req.endpoint).multipart(form);
    if !req.api_key.trim().is_empty() {
        builder = builder.header("Authorization", format!("Bearer {}", req.api_key));
    }
    let resp = builder
        .send()
        .await
        .map_err(|e| format!("Whisper API request failed: {e}"))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| format!("Failed to read Whisper response: {e}"))?;

    transcript_from_response(status, body)
}

/// A successful body is the transcript exactly as the provider sent it,
/// trailing newline included.
pub fn transcript_from_response(
    status: reqwest::StatusCode,
    body: String,
) -> Result<String, String> {
    if !status.is_success() {
        return Err(provider_error_message(status, &body));
    }
    Ok(body)
}

/// Unwraps `{"error": {"message": ...}}` when the provider sends one.
pub fn provider_error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("Whisper API error HTTP {status}: {body}"))
}
