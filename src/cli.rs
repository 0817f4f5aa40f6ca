use clap::{ArgGroup, Parser};

#[derive(Parser, Debug, Clone)]
#[command(name = "dgpt", about = "Dataset analytics with LLM-generated, vetted Python", version)]
#[command(group(ArgGroup::new("md_switch").args(["md", "no_md"]).multiple(false)))]
pub struct Cli {
    /// The analytics question to answer about the dataset.
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,

    /// Large language model to use.
    #[arg(long)]
    pub model: Option<String>,

    /// Randomness of generated output.
    #[arg(long, default_value_t = 0.2, value_parser = clap::value_parser!(f32))]
    pub temperature: f32,

    /// Limits highest probable tokens (words).
    #[arg(long = "top-p", default_value_t = 1.0, value_parser = clap::value_parser!(f32))]
    pub top_p: f32,

    /// Path to the dataset records JSON (overrides DATASET_PATH).
    #[arg(long)]
    pub dataset: Option<String>,

    /// Directory where generated plots are written (overrides PLOTS_DIR).
    #[arg(long = "plots-dir")]
    pub plots_dir: Option<String>,

    /// Maximum generate/validate/execute attempts (overrides MAX_ATTEMPTS).
    #[arg(long = "max-attempts")]
    pub max_attempts: Option<usize>,

    /// Print the accepted script before the results.
    #[arg(long = "show-code")]
    pub show_code: bool,

    /// Skip the natural-language report, print metrics/plots only.
    #[arg(long = "no-report")]
    pub no_report: bool,

    /// Prettify the report as Markdown.
    #[arg(long)]
    pub md: bool,
    /// Print the report as plain text.
    #[arg(long = "no-md")]
    pub no_md: bool,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
