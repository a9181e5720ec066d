//! CLI argument parsing for the `appraise` binary.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "appraise",
    version,
    about = "Identify a firearm from a photo and estimate its market value",
    after_help = "Examples:\n  appraise run --image gs://uploads/glock19.jpg --ocr 'GLOCK 19 Gen5' --lm 'my-vision-cli --json'\n  appraise run --request request.json --endpoint https://models.example.com/v1/models/vision:generateContent\n  appraise value --identification identification.json\n  appraise config > ~/.config/firearm-appraiser/config.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level (RUST_LOG overrides)
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Value(ValueArgs),
    /// Print the default config file
    Config,
}

/// Model and config selection shared by commands that build a pipeline.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Config file (defaults to the per-user config when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
#[command(about = "Identify and value one photo; prints the appraisal JSON")]
pub struct RunArgs {
    /// Image reference: gs:// URI, http(s) URL or local path
    #[arg(long, value_name = "REF", required_unless_present = "request")]
    pub image: Option<String>,

    /// OCR text recovered from the photo (repeatable)
    #[arg(long = "ocr", value_name = "TEXT")]
    pub ocr_hints: Vec<String>,

    /// Owner-supplied context appended to the prompt (repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// JSON request body with imageReference, ocrHints and context
    #[arg(long, value_name = "FILE", conflicts_with = "image")]
    pub request: Option<PathBuf>,

    /// Local LM command; receives the prompt on stdin
    #[arg(long, value_name = "CMD", conflicts_with = "endpoint")]
    pub lm: Option<String>,

    /// HTTP generateContent endpoint for the vision model
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Append every extraction attempt to a JSONL transcript
    #[arg(long, value_name = "PATH")]
    pub transcript: Option<PathBuf>,

    /// Retry once on timeouts and upstream outages
    #[arg(long)]
    pub retry: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Value an identification JSON file without calling the vision model")]
pub struct ValueArgs {
    /// Identification record JSON
    #[arg(long, value_name = "FILE")]
    pub identification: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}
