//! Shared test infrastructure for integration tests.

use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

pub const GLOCK_JSON: &str = r#"{"make":"Glock","model":"19","variant":"Gen 5","caliber":"9mm","serialNumber":"BXYZ123","conditionGrade":"New","isCurrentProduction":true,"modifications":[],"confidence":0.93}"#;
pub const WINCHESTER_JSON: &str = r#"{"make":"Winchester","model":"Model 70","variant":"Pre-64","caliber":".30-06","conditionGrade":"Good","isCurrentProduction":false,"modifications":[],"confidence":0.81}"#;

/// Temp directory holding canned model responses for `tests/mock-lm.sh`.
pub struct MockFixture {
    dir: TempDir,
    responses: u32,
}

/// Output of one `appraise` run.
#[derive(Debug)]
pub struct RunOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.stdout).unwrap_or_else(|err| {
            panic!(
                "stdout is not JSON ({err}):\n{}\nstderr:\n{}",
                self.stdout, self.stderr
            )
        })
    }
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

impl MockFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        fs::create_dir_all(dir.path().join("responses")).expect("create responses dir");
        Self { dir, responses: 0 }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Queue the next model reply.
    pub fn respond(&mut self, text: &str) -> &mut Self {
        self.responses += 1;
        let path = self
            .path()
            .join(format!("responses/{:03}.txt", self.responses));
        fs::write(path, text).expect("write mock response");
        self
    }

    /// Queue a failing model call.
    pub fn fail(&mut self, stderr: &str) -> &mut Self {
        self.responses += 1;
        let path = self
            .path()
            .join(format!("responses/{:03}.fail", self.responses));
        fs::write(path, stderr).expect("write mock failure");
        self
    }

    /// `--lm` value that runs the mock script against this fixture.
    pub fn lm_command(&self) -> String {
        let script = manifest_dir().join("tests/mock-lm.sh");
        shell_words::join([
            "sh".to_string(),
            script.display().to_string(),
            self.path().display().to_string(),
        ])
    }

    /// Number of model calls the mock has served.
    pub fn calls(&self) -> u32 {
        fs::read_to_string(self.path().join("calls"))
            .ok()
            .and_then(|text| text.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn last_prompt(&self) -> String {
        fs::read_to_string(self.path().join("last-prompt.txt")).unwrap_or_default()
    }

    pub fn last_image(&self) -> String {
        fs::read_to_string(self.path().join("last-image.txt"))
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Run `appraise run` with the mock model plus `extra` arguments.
    pub fn run(&self, extra: &[&str]) -> RunOutput {
        let mut args = vec!["run".to_string(), "--lm".to_string(), self.lm_command()];
        args.extend(extra.iter().map(|arg| arg.to_string()));
        appraise(&args)
    }

    /// Write a file into the fixture directory.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }
}

/// Run the `appraise` binary with an isolated environment.
pub fn appraise<S: AsRef<std::ffi::OsStr>>(args: &[S]) -> RunOutput {
    let config_home = TempDir::new().expect("create config home");
    let output = Command::new(env!("CARGO_BIN_EXE_appraise"))
        .args(args)
        .env_remove("APPRAISE_LM_COMMAND")
        .env_remove("APPRAISE_MODEL_ENDPOINT")
        .env_remove("RUST_LOG")
        .env("XDG_CONFIG_HOME", config_home.path())
        .env("HOME", config_home.path())
        .output()
        .expect("run appraise");
    RunOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
