//! Prompt assembly for the analysis-script generation round.

use std::fmt::Write as _;

use crate::dataset::DatasetSummary;
use crate::safety::CodePolicy;

/// Reason and offending source carried over from a failed attempt.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub reason: String,
    pub source: String,
}

/// System role for the generation call: Python only, the result contract,
/// and what the admission policy will accept.
pub fn system_prompt(policy: &CodePolicy) -> String {
    let modules = policy
        .allowed_modules
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are a data analyst writing Python scripts.\n\
         Provide only Python code as output without any description.\n\
         Provide only code in plain text format without Markdown formatting.\n\
         Do not include symbols such as ``` or ```python.\n\
         The script must define a dict named ANALYTICS_RESULT with two keys:\n\
         \"metrics\" (a dict of computed values) and \"plots\" (a list of dicts,\n\
         each with at least \"name\" and \"path\").\n\
         Load the data with: from dataset_io import load_records\n\
         (it returns a pandas DataFrame, its dtypes, and a describe() frame).\n\
         Save plots as files in the current working directory and record them\n\
         in ANALYTICS_RESULT[\"plots\"].\n\
         You may import only these modules: {modules}.\n\
         Never call exec, eval, compile, open, system or popen, and never use\n\
         subprocess, sockets or HTTP clients."
    )
}

/// User message: the question, the dataset description, and (on retry) the
/// previous attempt's failure so the model can correct itself.
pub fn user_prompt(
    question: &str,
    summary: &DatasetSummary,
    failure: Option<&AttemptFailure>,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Question: {}\n", question);
    let _ = writeln!(out, "Dataset column types:\n{}", summary.render_types());
    let _ = writeln!(out, "Dataset statistics:\n{}", summary.render_stats());

    if let Some(failure) = failure {
        let _ = writeln!(
            out,
            "Your previous script failed. Reason: {}\n\nPrevious script:\n{}\n\n\
             Write a corrected script that avoids this error.",
            failure.reason, failure.source
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn empty_summary() -> DatasetSummary {
        DatasetSummary { rows: 0, columns: BTreeMap::new() }
    }

    #[test]
    fn test_system_prompt_names_allowed_modules() {
        let text = system_prompt(&CodePolicy::default());
        assert!(text.contains("pandas"));
        assert!(text.contains("ANALYTICS_RESULT"));
    }

    #[test]
    fn test_first_attempt_has_no_failure_section() {
        let text = user_prompt("average salary?", &empty_summary(), None);
        assert!(text.contains("average salary?"));
        assert!(!text.contains("previous script"));
    }

    #[test]
    fn test_retry_embeds_reason_and_source() {
        let failure = AttemptFailure {
            reason: "call to 'open' is not allowed".to_string(),
            source: "open('x')".to_string(),
        };
        let text = user_prompt("average salary?", &empty_summary(), Some(&failure));
        assert!(text.contains("call to 'open' is not allowed"));
        assert!(text.contains("open('x')"));
    }
}
