//! Schema-compiler collaborator: turns raw FlatBuffer tables into JSON by running `flatc`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::SyncError;
use crate::fsx;

#[derive(Debug, Clone)]
pub struct FlatcRunner {
    flatc: PathBuf,
    fbs_dir: PathBuf,
}

impl FlatcRunner {
    pub fn new(flatc: impl Into<PathBuf>, fbs_dir: impl Into<PathBuf>) -> Self {
        Self { flatc: flatc.into(), fbs_dir: fbs_dir.into() }
    }

    pub fn schema_path(&self, schema: &str) -> PathBuf {
        self.fbs_dir.join(format!("{}.fbs", schema))
    }

    /// Argument list for one decode: JSON output with defaults and natural UTF-8 strings.
    pub fn args(&self, out_dir: &Path, schema: &str, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), out_dir.into()];
        for flag in ["--no-warnings", "--json", "--strict-json", "--natural-utf8", "--defaults-json", "--raw-binary"] {
            args.push(flag.into());
        }
        args.push(self.schema_path(schema).into_os_string());
        args.push("--".into());
        args.push(input.into());
        args
    }

    /// Decodes `data` with `<fbs_dir>/<schema>.fbs`. Blocks; call from a worker thread.
    pub fn decode_blocking(&self, schema: &str, data: &[u8]) -> Result<serde_json::Value, SyncError> {
        let tmp = tempfile::tempdir()?;
        let input = tmp.path().join(format!("{}.bytes", schema));
        let out_dir = tmp.path().join("out");
        fsx::write(&input, data).map_err(|e| SyncError::io(e, &input))?;
        fsx::create_dir_all(&out_dir).map_err(|e| SyncError::io(e, &out_dir))?;

        let output = Command::new(&self.flatc)
            .args(self.args(&out_dir, schema, &input))
            .output()
            .map_err(|e| SyncError::collaborator("flatc", format!("cannot run {}: {}", self.flatc.display(), e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::collaborator("flatc", format!("{} exited with {}: {}", schema, output.status, stderr.trim())));
        }

        let json_path = out_dir.join(format!("{}.json", schema));
        let text = fsx::read(&json_path).map_err(|e| SyncError::io(e, &json_path))?;
        Ok(serde_json::from_slice(&text)?)
    }

    pub async fn decode(&self, schema: &str, data: Vec<u8>) -> Result<serde_json::Value, SyncError> {
        let runner = self.clone();
        let schema = schema.to_string();
        tokio::task::spawn_blocking(move || runner.decode_blocking(&schema, &data)).await?
    }
}
