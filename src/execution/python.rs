//! Python subprocess runner: a fresh interpreter per call, results over a
//! sentinel-line protocol on stdout.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

use super::{AnalyticsResult, ExecError};

/// Marker prefixing the single machine-readable outcome line the harness
/// prints after the generated script has run.
const OUTCOME_MARKER: &str = "__DGPT_OUTCOME__ ";

/// Trusted wrapper evaluated by the interpreter. Runs the generated script in
/// a namespace private to this process, then reports exactly one outcome
/// line: the `ANALYTICS_RESULT` mapping, or why there is none.
const HARNESS: &str = r#"
import json
import os


def emit(payload):
    print("__DGPT_OUTCOME__ " + json.dumps(payload, default=str), flush=True)


with open(os.environ["DGPT_SCRIPT"], "r", encoding="utf-8") as f:
    source = f.read()

namespace = {"__name__": "__main__"}
try:
    exec(compile(source, "generated.py", "exec"), namespace, namespace)
except BaseException as e:
    emit({"status": "error", "kind": type(e).__name__, "message": str(e)})
else:
    result = namespace.get("ANALYTICS_RESULT")
    if "ANALYTICS_RESULT" not in namespace:
        emit({"status": "missing"})
    elif not isinstance(result, dict):
        emit({"status": "not_mapping", "kind": type(result).__name__})
    else:
        try:
            emit({"status": "ok", "result": result})
        except (TypeError, ValueError) as e:
            emit({"status": "error", "kind": type(e).__name__, "message": str(e)})
"#;

/// Dataset-loading helper importable by generated scripts (`dataset_io` is
/// on the allow list). Written next to the script for every run.
const DATASET_HELPER: &str = r#"
import json
import os
from pathlib import Path

import pandas as pd


def load_records(path=None):
    """Load the records JSON into a DataFrame.

    Returns (df, structure, description): the frame, its dtypes, and
    df.describe(include="all").
    """
    if path is None:
        path = os.environ.get("DGPT_DATASET", "vacancies.json")
    raw = json.loads(Path(path).read_text(encoding="utf-8"))

    records = []
    for item in raw:
        if not isinstance(item, dict):
            continue
        base = {}
        if "id" in item:
            base["id"] = item["id"]
        data = item.get("data")
        if isinstance(data, dict):
            base.update(data)
        if base:
            records.append(base)

    df = pd.DataFrame.from_records(records)
    return df, df.dtypes, df.describe(include="all")
"#;

/// Everything the runner needs besides the script itself. Shared read-only
/// across attempts; the per-call scratch directory is never reused.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub python_bin: String,
    pub dataset_path: PathBuf,
    pub plots_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HarnessOutcome {
    Ok { result: serde_json::Value },
    Missing,
    NotMapping { kind: String },
    Error { kind: String, message: String },
}

/// Run a validator-accepted script and extract its `ANALYTICS_RESULT`.
///
/// Each call owns a fresh scratch directory holding the harness, the script,
/// and the dataset helper; nothing carries over between calls. Plots are the
/// only side effect that survives, written under `plots_dir` (the script's
/// working directory).
pub async fn run_script(source: &str, ctx: &ExecContext) -> Result<AnalyticsResult, ExecError> {
    let scratch = tempfile::Builder::new()
        .prefix("dgpt-run")
        .tempdir()
        .map_err(|e| ExecError::Interpreter(format!("scratch dir: {}", e)))?;

    let harness_path = scratch.path().join("harness.py");
    let script_path = scratch.path().join("generated.py");
    fs::write(&harness_path, HARNESS)
        .and_then(|_| fs::write(&script_path, source))
        .and_then(|_| fs::write(scratch.path().join("dataset_io.py"), DATASET_HELPER))
        .map_err(|e| ExecError::Interpreter(format!("scratch write: {}", e)))?;

    fs::create_dir_all(&ctx.plots_dir)
        .map_err(|e| ExecError::Interpreter(format!("plots dir: {}", e)))?;

    let output = Command::new(&ctx.python_bin)
        .arg(&harness_path)
        .env("DGPT_SCRIPT", &script_path)
        .env("DGPT_DATASET", absolute(&ctx.dataset_path))
        .env("MPLBACKEND", "Agg")
        .current_dir(&ctx.plots_dir)
        .output()
        .await
        .map_err(|e| ExecError::Interpreter(format!("spawn {}: {}", ctx.python_bin, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rev()
        .find_map(|l| l.strip_prefix(OUTCOME_MARKER))
        .ok_or_else(|| {
            let stderr = String::from_utf8_lossy(&output.stderr);
            ExecError::Interpreter(format!(
                "no outcome line ({}): {}",
                output.status,
                tail(&stderr, 400)
            ))
        })?;

    let outcome: HarnessOutcome = serde_json::from_str(line)
        .map_err(|e| ExecError::Interpreter(format!("bad outcome line: {}", e)))?;

    match outcome {
        HarnessOutcome::Ok { result } => serde_json::from_value(result)
            .map_err(|e| ExecError::Contract(format!("malformed result shape: {}", e))),
        HarnessOutcome::Missing => Err(ExecError::Contract(
            "generated code did not define 'ANALYTICS_RESULT'".to_string(),
        )),
        HarnessOutcome::NotMapping { kind } => Err(ExecError::Contract(format!(
            "'ANALYTICS_RESULT' must be a dict, got {}",
            kind
        ))),
        HarnessOutcome::Error { kind, message } => Err(ExecError::Runtime { kind, message }),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

fn tail(text: &str, max: usize) -> &str {
    let trimmed = text.trim();
    match trimmed.char_indices().nth_back(max.saturating_sub(1)) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}
