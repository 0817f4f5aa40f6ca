mod cli;
mod config;
mod dataset;
mod execution;
mod llm;
mod pipeline;
mod printer;
mod prompt;
mod report;
mod safety;
mod utils;

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Result};
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;

use crate::config::Config;
use crate::execution::python::ExecContext;
use crate::llm::{ChatOptions, LlmClient};
use crate::pipeline::{LlmGenerator, PipelineError, PythonExecutor};
use crate::printer::{MarkdownPrinter, TextPrinter};
use crate::safety::CodePolicy;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let cfg = Config::load();

    // Resolve model: CLI overrides config; fall back to DEFAULT_MODEL
    let model = args
        .model
        .clone()
        .or_else(|| cfg.get("DEFAULT_MODEL"))
        .unwrap_or_else(|| "gpt-4o".to_string());

    // stdin handling (pipe support)
    let mut question_from_stdin = String::new();
    if !io::stdin().is_terminal() {
        io::stdin().read_to_string(&mut question_from_stdin)?;
    }
    let arg_question = args.question.unwrap_or_default();
    let question = match (question_from_stdin.trim(), arg_question.trim()) {
        ("", "") => bail!("Provide a question as an argument or via stdin"),
        (stdin_q, "") => stdin_q.to_string(),
        ("", arg_q) => arg_q.to_string(),
        (stdin_q, arg_q) => format!("{}\n\n{}", stdin_q, arg_q),
    };

    let dataset_path = args
        .dataset
        .clone()
        .map(PathBuf::from)
        .or_else(|| cfg.get_path("DATASET_PATH"))
        .unwrap_or_else(|| PathBuf::from("vacancies.json"));
    let plots_dir = args
        .plots_dir
        .clone()
        .map(PathBuf::from)
        .or_else(|| cfg.get_path("PLOTS_DIR"))
        .unwrap_or_else(|| PathBuf::from("plots"));
    let python_bin = cfg.get("PYTHON_BIN").unwrap_or_else(|| "python3".to_string());
    let max_attempts = args
        .max_attempts
        .or_else(|| cfg.get_usize("MAX_ATTEMPTS"))
        .unwrap_or(3);
    let md = if args.no_md {
        false
    } else if args.md {
        true
    } else {
        cfg.get_bool("PRETTIFY_MARKDOWN")
    };

    println!("{}", format!("Describing dataset {}...", dataset_path.display()).dimmed());
    let summary = dataset::summarize_file(&dataset_path)?;

    let policy = CodePolicy::default();
    let opts = ChatOptions {
        model: model.clone(),
        temperature: args.temperature,
        top_p: args.top_p,
        max_tokens: Some(1536),
    };
    let mut generator = LlmGenerator { client: LlmClient::from_config(&cfg)?, opts };
    let mut executor = PythonExecutor {
        ctx: ExecContext {
            python_bin,
            dataset_path,
            plots_dir: plots_dir.clone(),
        },
    };

    let solved = match pipeline::run(
        &mut generator,
        &mut executor,
        &question,
        &summary,
        &policy,
        max_attempts,
    )
    .await
    {
        Ok(solved) => solved,
        Err(PipelineError::Exhausted { attempts, reason, source }) => {
            eprintln!("{}", format!("Giving up after {} attempts: {}", attempts, reason).red());
            if !source.is_empty() {
                eprintln!("{}", "Last generated script:".dimmed());
                eprintln!("{}", source.dimmed());
            }
            bail!("no working analysis script after {} attempts", attempts);
        }
        Err(PipelineError::Generation(e)) => return Err(e),
    };

    if args.show_code {
        println!("\n{}", "Accepted script:".cyan());
        println!("{}\n", solved.source);
    }

    println!("{}", "Metrics:".cyan());
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(solved.result.metrics.clone()))?
    );
    if !solved.result.plots.is_empty() {
        println!("{}", "Plots:".cyan());
        for plot in &solved.result.plots {
            println!("  {} -> {}", plot.name, plots_dir.join(&plot.path).display());
        }
    }

    if !args.no_report {
        println!("\n{}", "Report:".cyan());
        let client = LlmClient::from_config(&cfg)?;
        let text = report::generate(&client, &model, &question, &solved.result).await?;
        if md {
            MarkdownPrinter::default().print(&text);
        } else {
            TextPrinter { color: None }.print(&text);
        }
    }

    Ok(())
}
