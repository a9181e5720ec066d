use anyhow::{Context, Result};
use clap::Parser;
use firearm_appraiser::config::{
    apply_model_overrides, config_stub, resolve_config, validate_config, validate_vision_ready,
    AppConfig,
};
use firearm_appraiser::extraction::{vision, Extractor};
use firearm_appraiser::request::{parse_context_pair, AppraisalRequest, RequestError};
use firearm_appraiser::transcript::Transcript;
use firearm_appraiser::{AppraisalError, Appraiser, ValuationRouter};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Command, RootArgs, RunArgs, ValueArgs};

const EXIT_FAILED: u8 = 1;
const EXIT_INVALID_ARGUMENT: u8 = 2;

fn main() -> Result<ExitCode> {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Run(run) => run_appraisal(run),
        Command::Value(value) => run_valuation(value),
        Command::Config => {
            println!("{}", config_stub()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Logs go to stderr so stdout carries only the result JSON.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_appraisal(args: RunArgs) -> Result<ExitCode> {
    let request = match build_request(&args)? {
        Ok(request) => request,
        Err(err) => return invalid_argument(&err),
    };

    let mut config = load_validated_config(args.config.config.as_deref())?;
    apply_model_overrides(
        &mut config.vision,
        args.lm.as_deref(),
        args.endpoint.as_deref(),
        |name| std::env::var(name).ok(),
    );
    validate_vision_ready(&config.vision)?;
    let model = vision::shared(&config.vision).context("initialize vision model")?;
    tracing::debug!(backend = model.name(), "vision model ready");

    let mut extractor = Extractor::new(model, config.vision.generation.clone());
    if let Some(path) = &args.transcript {
        extractor = extractor.with_transcript(Arc::new(Transcript::new(path)));
    }
    let appraiser = Appraiser::new(extractor, ValuationRouter::from_config(&config.pricing));

    let result = match appraiser.appraise_request(&request) {
        Err(err) if args.retry && err.is_retryable() => {
            tracing::warn!(kind = %err.kind, stage = %err.stage, "retrying appraisal once");
            appraiser.appraise_request(&request)
        }
        other => other,
    };
    match result {
        Ok(response) => {
            print_json(&response)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report_failure(&err),
    }
}

/// Outer error is IO/plumbing; inner error is a caller mistake.
fn build_request(args: &RunArgs) -> Result<Result<AppraisalRequest, RequestError>> {
    let base = match &args.request {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("read request {}", path.display()))?;
            AppraisalRequest::from_json(&text)
        }
        None => AppraisalRequest::new(args.image.clone().unwrap_or_default(), Vec::new()),
    };
    let mut request = match base {
        Ok(request) => request,
        Err(err) => return Ok(Err(err)),
    };

    request.ocr_hints.extend(args.ocr_hints.iter().cloned());
    for pair in &args.context {
        match parse_context_pair(pair) {
            Ok((key, value)) => {
                request.context.insert(key, value);
            }
            Err(err) => return Ok(Err(err)),
        }
    }
    Ok(Ok(request))
}

fn run_valuation(args: ValueArgs) -> Result<ExitCode> {
    let config = load_validated_config(args.config.config.as_deref())?;
    let path = &args.identification;
    let text =
        fs::read_to_string(path).with_context(|| format!("read identification {}", path.display()))?;
    let payload: serde_json::Value = match serde_json::from_str(&text) {
        Ok(payload) => payload,
        Err(err) => {
            return invalid_argument(&RequestError::InvalidArgument(format!(
                "identification {}: {err}",
                path.display()
            )))
        }
    };

    let router = ValuationRouter::from_config(&config.pricing);
    match router.value_json(&payload) {
        Ok(valuation) => {
            print_json(&valuation)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => report_failure(&AppraisalError::from(err)),
    }
}

fn load_validated_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = resolve_config(path)?;
    validate_config(&config).context("invalid config")?;
    Ok(config)
}

fn report_failure(err: &AppraisalError) -> Result<ExitCode> {
    tracing::error!(stage = %err.stage, kind = %err.kind, "{}", err.cause);
    if let Some(raw) = err.raw_output() {
        tracing::debug!(raw_output = raw, "model output retained for diagnosis");
    }
    print_json(&err.to_public_json())?;
    Ok(ExitCode::from(EXIT_FAILED))
}

fn invalid_argument(err: &RequestError) -> Result<ExitCode> {
    let RequestError::InvalidArgument(message) = err;
    tracing::error!("{err}");
    print_json(&json!({
        "error": {
            "stage": "request",
            "kind": "InvalidArgument",
            "message": message,
        }
    }))?;
    Ok(ExitCode::from(EXIT_INVALID_ARGUMENT))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
