//! Process configuration.
//!
//! Read once from the environment at startup (after `.env` is loaded) and
//! shared read-only afterwards.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.1;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// How the staged document reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Upload through the Gemini Files API and reference it by URI.
    Files,
    /// Embed the bytes base64-encoded in the request.
    Inline,
}

impl FromStr for UploadMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "files" => Ok(Self::Files),
            "inline" => Ok(Self::Inline),
            other => anyhow::bail!("expected 'files' or 'inline', got '{}'", other),
        }
    }
}

/// Settings for the Gemini client.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub api_key: String,
    /// API host, without a trailing path.
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub upload_mode: UploadMode,
    pub timeout: Duration,
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub upload_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    /// Build from process environment. A missing `GOOGLE_API_KEY` is fatal.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GOOGLE_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("GOOGLE_API_KEY environment variable not set")?;

        let model = ModelConfig {
            api_key,
            api_url: lookup("GEMINI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: parse_or(&lookup, "GEMINI_TEMPERATURE", DEFAULT_TEMPERATURE)?,
            upload_mode: parse_or(&lookup, "GEMINI_UPLOAD_MODE", UploadMode::Files)?,
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "GEMINI_TIMEOUT_SECS",
                DEFAULT_TIMEOUT_SECS,
            )?),
        };

        Ok(Self {
            model,
            upload_dir: lookup("UPLOAD_DIR")
                .unwrap_or_else(|| "uploads".to_string())
                .into(),
            prompts_dir: lookup("PROMPTS_DIR")
                .unwrap_or_else(|| "prompts".to_string())
                .into(),
            bind_addr: parse_or(
                &lookup,
                "BIND_ADDR",
                SocketAddr::from(([0, 0, 0, 0], 8000)),
            )?,
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, raw, e)),
        None => Ok(default),
    }
}
