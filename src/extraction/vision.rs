//! Vision-model backends.
//!
//! The extraction engine only needs "image plus prompt in, text out", so the
//! model sits behind the [`VisionModel`] trait with two backends:
//!
//! - **command**: a user-configured local command (e.g. `llm`, a wrapper
//!   script) that reads the prompt on stdin and prints the answer on stdout.
//!   The image is described through environment variables.
//! - **http**: a `generateContent`-style JSON endpoint that takes the image as a
//!   file URI or base64 inline data.
//!
//! One backend is built per process and shared across requests; see [`shared`].
use super::image::ResolvedImage;
use crate::config::{VisionBackend, VisionSettings};
use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Environment variable carrying a remote image URI to the command backend.
pub const IMAGE_URI_ENV: &str = "APPRAISE_IMAGE_URI";
/// Environment variable carrying a local image path to the command backend.
pub const IMAGE_FILE_ENV: &str = "APPRAISE_IMAGE_FILE";
/// Environment variable carrying the image MIME type to the command backend.
pub const IMAGE_MIME_ENV: &str = "APPRAISE_IMAGE_MIME";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

static SHARED_MODEL: OnceLock<Arc<dyn VisionModel>> = OnceLock::new();

/// Sampling parameters sent with every identification request.
///
/// Low temperature and a moderate nucleus threshold keep structured output
/// stable between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 2048,
            temperature: 0.2,
            top_p: 0.8,
        }
    }
}

/// Failures raised by the model call itself, before any parsing.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("vision model timed out: {0}")]
    Timeout(String),
    #[error("vision model unavailable: {0}")]
    Unavailable(String),
}

/// Anything that accepts an image and a prompt and answers with text.
pub trait VisionModel: Send + Sync {
    /// Backend label for logs.
    fn name(&self) -> &str;

    fn generate(
        &self,
        image: &ResolvedImage,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, ModelError>;
}

/// Process-wide model handle, built on first use and reused afterwards.
///
/// Construction errors are configuration problems and are reported to the
/// caller (the CLI fails at startup); later calls return the cached handle and
/// ignore `settings`.
pub fn shared(settings: &VisionSettings) -> Result<Arc<dyn VisionModel>> {
    if let Some(model) = SHARED_MODEL.get() {
        return Ok(Arc::clone(model));
    }
    let model = build_model(settings)?;
    Ok(Arc::clone(SHARED_MODEL.get_or_init(|| model)))
}

/// Build a fresh backend from settings.
pub fn build_model(settings: &VisionSettings) -> Result<Arc<dyn VisionModel>> {
    let timeout = settings.timeout_secs.map(Duration::from_secs);
    match settings.backend {
        VisionBackend::Command => {
            let command = settings
                .command
                .as_deref()
                .ok_or_else(|| anyhow!("command backend selected but no LM command configured"))?;
            Ok(Arc::new(CommandVision::new(command)?.with_timeout(timeout)))
        }
        VisionBackend::Http => {
            let endpoint = settings
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow!("http backend selected but no model endpoint configured"))?;
            let api_key = std::env::var(&settings.api_key_env).ok();
            if api_key.is_none() {
                tracing::warn!(env = %settings.api_key_env, "no API key set for model endpoint");
            }
            Ok(Arc::new(HttpVision::new(endpoint, api_key, timeout)))
        }
    }
}

/// Local command backend.
#[derive(Debug, Clone)]
pub struct CommandVision {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandVision {
    /// Parse the command with shell-words and resolve its program on `PATH`.
    pub fn new(command: &str) -> Result<Self> {
        let mut args =
            shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        if args.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        let name = args.remove(0);
        let program =
            which::which(&name).with_context(|| format!("resolve LM command program: {name}"))?;
        Ok(Self {
            program,
            args,
            timeout: None,
        })
    }

    /// Kill the command and report `Timeout` once it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn wait_for_exit(&self, child: &mut Child, start: Instant) -> Result<ExitStatus, ModelError> {
        let wait_failed =
            |err: std::io::Error| ModelError::Unavailable(format!("wait for LM command: {err}"));
        let Some(limit) = self.timeout else {
            return child.wait().map_err(wait_failed);
        };
        loop {
            if let Some(status) = child.try_wait().map_err(wait_failed)? {
                return Ok(status);
            }
            if start.elapsed() > limit {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ModelError::Timeout(format!(
                    "LM command exceeded {}ms",
                    limit.as_millis()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

impl VisionModel for CommandVision {
    fn name(&self) -> &str {
        "command"
    }

    fn generate(
        &self,
        image: &ResolvedImage,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, ModelError> {
        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(IMAGE_MIME_ENV, image.mime_type())
            .env("APPRAISE_MAX_OUTPUT_TOKENS", generation.max_output_tokens.to_string())
            .env("APPRAISE_TEMPERATURE", generation.temperature.to_string())
            .env("APPRAISE_TOP_P", generation.top_p.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        match image {
            ResolvedImage::Remote { uri, .. } => {
                command.env(IMAGE_URI_ENV, uri);
            }
            ResolvedImage::Inline { path, .. } => {
                command.env(IMAGE_FILE_ENV, path);
            }
        }

        let mut child = command.spawn().map_err(|err| {
            ModelError::Unavailable(format!("spawn {}: {err}", self.program.display()))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // Commands that ignore stdin may exit before the prompt is written
            if let Err(err) = stdin.write_all(prompt.as_bytes()) {
                if err.kind() != IoErrorKind::BrokenPipe {
                    return Err(ModelError::Unavailable(format!(
                        "write prompt to LM stdin: {err}"
                    )));
                }
                tracing::debug!("LM command closed stdin before reading the prompt");
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_reader = thread::spawn(move || read_pipe(stdout));
        let stderr_reader = thread::spawn(move || read_pipe(stderr));
        let status = self.wait_for_exit(&mut child, start)?;
        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        tracing::info!(
            backend = "command",
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = stdout.len(),
            "lm invoke complete"
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(ModelError::Unavailable(format!(
                "LM command failed with status {}: {}",
                status,
                stderr.trim()
            )));
        }

        String::from_utf8(stdout)
            .map_err(|err| ModelError::Unavailable(format!("decode LM stdout as UTF-8: {err}")))
    }
}

/// HTTP backend for `generateContent`-style endpoints.
#[derive(Clone)]
pub struct HttpVision {
    agent: ureq::Agent,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl HttpVision {
    pub fn new(endpoint: &str, api_key: Option<String>, timeout: Option<Duration>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build();
        Self {
            agent: config.into(),
            endpoint: endpoint.to_string(),
            api_key,
        }
    }

    fn request_body(
        image: &ResolvedImage,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> serde_json::Value {
        let image_part = match image {
            ResolvedImage::Remote { uri, mime_type } => json!({
                "fileData": { "mimeType": mime_type, "fileUri": uri }
            }),
            ResolvedImage::Inline {
                bytes, mime_type, ..
            } => json!({
                "inlineData": {
                    "mimeType": mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                }
            }),
        };
        json!({
            "contents": [{
                "role": "user",
                "parts": [image_part, { "text": prompt }],
            }],
            "generationConfig": generation,
        })
    }
}

impl VisionModel for HttpVision {
    fn name(&self) -> &str {
        "http"
    }

    fn generate(
        &self,
        image: &ResolvedImage,
        prompt: &str,
        generation: &GenerationConfig,
    ) -> Result<String, ModelError> {
        let start = Instant::now();
        let body = Self::request_body(image, prompt, generation);

        let mut request = self.agent.post(&self.endpoint);
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key.as_str());
        }
        let mut response = request.send_json(&body).map_err(classify_http_error)?;
        let payload: GenerateResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| ModelError::Unavailable(format!("decode model response: {err}")))?;

        let candidate = payload
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Unavailable("model response had no candidates".into()))?;
        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(
            backend = "http",
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = text.len(),
            "lm invoke complete"
        );
        Ok(text)
    }
}

fn classify_http_error(err: ureq::Error) -> ModelError {
    match err {
        ureq::Error::Timeout(which) => ModelError::Timeout(format!("{which:?}")),
        ureq::Error::StatusCode(code) => {
            ModelError::Unavailable(format!("model endpoint returned HTTP {code}"))
        }
        other => ModelError::Unavailable(other.to_string()),
    }
}
