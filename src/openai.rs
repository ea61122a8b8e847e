//! OpenAI client: HTTP direct over reqwest, no vendor SDK. This is where
//! conversation turns are converted to the provider wire shape. Provider
//! failures are surfaced with the provider's own message text and are
//! never retried.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ParleyError;
use crate::models::{self, ReasoningEffort};
use crate::registry::{ContentPart, GenParams, Turn, TurnContent, TurnRole};

pub struct OpenAiClient {
    http: reqwest::Client,
    /// Bare client for fetching image URLs and chat attachments; must not
    /// carry the API authorization header.
    plain_http: reqwest::Client,
    base_url: String,
}

/// One generation call against the Responses API. When
/// `previous_response_id` is set the provider chains from that response
/// and `turns` should carry only the new turn.
pub struct ResponseRequest<'a> {
    pub model: &'a str,
    pub turns: &'a [Turn],
    pub params: &'a GenParams,
    pub previous_response_id: Option<&'a str>,
}

pub struct ResponseOutput {
    pub id: String,
    pub text: String,
}

pub struct ImageRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub n: u8,
    pub quality: &'a str,
    pub size: &'a str,
    /// Only applies to DALL-E 3.
    pub style: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
pub struct ImageData {
    pub url: Option<String>,
    pub b64_json: Option<String>,
}

pub struct SpeechRequest<'a> {
    pub input: &'a str,
    pub model: &'a str,
    pub voice: &'a str,
    pub instructions: Option<&'a str>,
    pub response_format: &'a str,
    pub speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscribeAction {
    Transcription,
    Translation,
}

impl TranscribeAction {
    fn endpoint(&self) -> &'static str {
        match self {
            TranscribeAction::Transcription => "audio/transcriptions",
            TranscribeAction::Translation => "audio/translations",
        }
    }
}

pub struct VideoRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub seconds: u8,
    pub size: &'a str,
}

impl OpenAiClient {
    pub fn new(api_key: &str, base_url: &str) -> Result<Self, ParleyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| ParleyError::Config("Invalid OpenAI API key format".into()))?,
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            plain_http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Generate a model response for an ordered turn history (or a new
    /// turn chained onto a prior response).
    pub async fn respond(&self, req: &ResponseRequest<'_>) -> Result<ResponseOutput, ParleyError> {
        let payload = build_response_payload(req);
        debug!("POST /responses model={}", req.model);
        let resp = self
            .http
            .post(self.url("responses"))
            .json(&payload)
            .send()
            .await?;
        let resp = check(resp).await?;
        let parsed: ResponsesApiResponse = resp.json().await?;
        let text = parsed.output_text();
        Ok(ResponseOutput {
            id: parsed.id,
            text: if text.is_empty() {
                "No response.".to_string()
            } else {
                text
            },
        })
    }

    pub async fn generate_image(
        &self,
        req: &ImageRequest<'_>,
    ) -> Result<Vec<ImageData>, ParleyError> {
        let mut payload = json!({
            "prompt": req.prompt,
            "model": req.model,
            "n": req.n,
            "quality": req.quality,
            "size": req.size,
        });
        if let Some(style) = req.style {
            payload["style"] = json!(style);
        }
        debug!("POST /images/generations model={}", req.model);
        let resp = self
            .http
            .post(self.url("images/generations"))
            .json(&payload)
            .send()
            .await?;
        let resp = check(resp).await?;
        let parsed: ImagesApiResponse = resp.json().await?;
        Ok(parsed.data)
    }

    /// Generate audio for the given text. Returns the raw audio bytes.
    pub async fn create_speech(&self, req: &SpeechRequest<'_>) -> Result<Vec<u8>, ParleyError> {
        let mut payload = json!({
            "input": req.input,
            "model": req.model,
            "voice": req.voice,
            "response_format": req.response_format,
            "speed": req.speed,
        });
        if let Some(instructions) = req.instructions {
            if !instructions.is_empty() {
                payload["instructions"] = json!(instructions);
            }
        }
        debug!("POST /audio/speech model={}", req.model);
        let resp = self
            .http
            .post(self.url("audio/speech"))
            .json(&payload)
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Transcribe (or translate into English) an uploaded audio file.
    pub async fn transcribe(
        &self,
        action: TranscribeAction,
        model: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String, ParleyError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part("file", part);
        debug!("POST /{} model={model}", action.endpoint());
        let resp = self
            .http
            .post(self.url(action.endpoint()))
            .multipart(form)
            .send()
            .await?;
        let resp = check(resp).await?;
        let parsed: TranscriptionApiResponse = resp.json().await?;
        Ok(parsed.text)
    }

    /// Create a video generation job, poll until it settles, and download
    /// the result. Polling is bounded; the provider owns any other
    /// timeout.
    pub async fn generate_video(
        &self,
        req: &VideoRequest<'_>,
        poll_interval: Duration,
        max_polls: usize,
    ) -> Result<Vec<u8>, ParleyError> {
        let payload = json!({
            "prompt": req.prompt,
            "model": req.model,
            "seconds": req.seconds.to_string(),
            "size": req.size,
        });
        debug!("POST /videos model={}", req.model);
        let resp = self
            .http
            .post(self.url("videos"))
            .json(&payload)
            .send()
            .await?;
        let resp = check(resp).await?;
        let mut job: VideoApiResponse = resp.json().await?;

        let mut polls = 0;
        while !job.is_settled() {
            if polls >= max_polls {
                return Err(ParleyError::OpenAi(
                    "Video generation did not finish in time.".into(),
                ));
            }
            polls += 1;
            tokio::time::sleep(poll_interval).await;
            let resp = self
                .http
                .get(self.url(&format!("videos/{}", job.id)))
                .send()
                .await?;
            let resp = check(resp).await?;
            job = resp.json().await?;
        }
        if job.status != "completed" {
            let detail = job
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("Video generation {}.", job.status));
            return Err(ParleyError::OpenAi(detail));
        }

        let resp = self
            .http
            .get(self.url(&format!("videos/{}/content", job.id)))
            .send()
            .await?;
        let resp = check(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Fetch an arbitrary URL (generated-image URL, chat attachment).
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ParleyError> {
        let resp = self.plain_http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ParleyError::OpenAi(format!(
                "Failed to download {url}: HTTP {}",
                resp.status().as_u16()
            )));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

/// Build the Responses API payload. The system turn becomes the
/// `instructions` field; other turns become input items. Reasoning models
/// get `reasoning.effort` instead of sampling parameters.
fn build_response_payload(req: &ResponseRequest<'_>) -> Value {
    let mut instructions: Option<&str> = None;
    let mut input = Vec::new();
    for turn in req.turns {
        match turn.role {
            TurnRole::System => {
                if let TurnContent::Text(t) = &turn.content {
                    instructions = Some(t);
                }
            }
            TurnRole::User | TurnRole::Assistant => input.push(turn_to_input_item(turn)),
        }
    }

    let mut payload = json!({
        "model": req.model,
        "input": input,
    });
    let obj = payload.as_object_mut().expect("payload is an object");
    if let Some(instructions) = instructions {
        obj.insert("instructions".into(), json!(instructions));
    }
    if let Some(prev) = req.previous_response_id {
        obj.insert("previous_response_id".into(), json!(prev));
    }

    if models::is_reasoning_model(req.model) {
        let effort = req
            .params
            .reasoning_effort
            .unwrap_or(ReasoningEffort::Medium);
        obj.insert("reasoning".into(), json!({ "effort": effort.as_str() }));
    } else {
        if let Some(v) = req.params.temperature {
            obj.insert("temperature".into(), json!(v));
        }
        if let Some(v) = req.params.top_p {
            obj.insert("top_p".into(), json!(v));
        }
    }
    if let Some(v) = req.params.frequency_penalty {
        obj.insert("frequency_penalty".into(), json!(v));
    }
    if let Some(v) = req.params.presence_penalty {
        obj.insert("presence_penalty".into(), json!(v));
    }
    if let Some(v) = req.params.seed {
        obj.insert("seed".into(), json!(v));
    }
    payload
}

fn turn_to_input_item(turn: &Turn) -> Value {
    let (role, text_type, image_type) = match turn.role {
        TurnRole::Assistant => ("assistant", "output_text", "output_image"),
        _ => ("user", "input_text", "input_image"),
    };
    let content = match &turn.content {
        TurnContent::Text(t) => vec![json!({ "type": text_type, "text": t })],
        TurnContent::Image(url) => vec![json!({ "type": image_type, "image_url": url })],
        TurnContent::Mixed(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(t) => json!({ "type": text_type, "text": t }),
                ContentPart::Image(url) => json!({ "type": image_type, "image_url": url }),
            })
            .collect(),
    };
    json!({ "role": role, "content": content })
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ParleyError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ParleyError::OpenAi(extract_error_message(status, &body)))
}

/// Pull the provider's human-readable message out of an error body.
/// Prefers `error.message`, then a top-level `message`, then the raw body.
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
        {
            return message.to_string();
        }
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    if body.trim().is_empty() {
        format!("OpenAI API returned HTTP {status}")
    } else {
        format!("OpenAI API returned HTTP {status}: {body}")
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    id: String,
    #[serde(default)]
    output: Vec<OutputItem>,
}

impl ResponsesApiResponse {
    fn output_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ImagesApiResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionApiResponse {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct VideoApiResponse {
    id: String,
    status: String,
    error: Option<VideoApiError>,
}

impl VideoApiResponse {
    fn is_settled(&self) -> bool {
        self.status == "completed" || self.status == "failed"
    }
}

#[derive(Debug, Deserialize)]
struct VideoApiError {
    message: String,
}
