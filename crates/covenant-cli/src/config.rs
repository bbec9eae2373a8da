//! Command-line arguments and the validated settings built from them.
//!
//! Every stage validates its whole configuration up front; nothing touches
//! the network or the dataset directory until this succeeds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;
use covenant_ai::extractor::DEFAULT_MAX_WORDS;
use covenant_ai::ExtractOptions;
use covenant_core::{CategoryMapping, RetryPolicy, Scope, Truncation, TruncationStrategy, load_scopes};
use covenant_search::fetch::DEFAULT_ARCHIVE_URL;
use covenant_search::search::DEFAULT_SEARCH_URL;
use covenant_store::DatasetLayout;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAPPING_CANDIDATES: &[&str] = &["mapping.json", "normalize.json"];

#[derive(Args, Debug)]
pub struct DatasetArgs {
    /// Directory holding the per-scope stores and downloaded documents
    #[arg(long, default_value = "dataset")]
    pub dataset_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Scope definitions (JSON list)
    #[arg(long, default_value = "scope.json")]
    pub scope_file: PathBuf,

    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Form types to search
    #[arg(long, num_args = 1.., value_delimiter = ',', default_values = ["8-K", "10-Q"])]
    pub forms: Vec<String>,

    /// Minimum delay between document downloads, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,

    /// Re-download documents that already exist locally
    #[arg(long)]
    pub overwrite: bool,

    /// sec-api.io API key
    #[arg(long, env = "SEC_API_KEY", hide_env_values = true)]
    pub sec_api_key: Option<String>,

    /// Full-text search endpoint
    #[arg(long, env = "COVENANT_SEARCH_URL", default_value = DEFAULT_SEARCH_URL)]
    pub search_url: String,

    /// Archive mirror used to download documents
    #[arg(long, env = "COVENANT_ARCHIVE_URL", default_value = DEFAULT_ARCHIVE_URL)]
    pub archive_url: String,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Scope definitions (JSON list)
    #[arg(long, default_value = "scope.json")]
    pub scope_file: PathBuf,

    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Chat model used for extraction
    #[arg(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Truncation budget, in words or characters depending on --truncation
    #[arg(long, default_value_t = DEFAULT_MAX_WORDS)]
    pub max_words: usize,

    /// Truncation unit (words or chars)
    #[arg(long, default_value = "words")]
    pub truncation: TruncationStrategy,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.0)]
    pub temperature: f32,

    /// Skip documents shorter than this many words (0 disables)
    #[arg(long, default_value_t = 0)]
    pub min_words: usize,

    /// Stop each scope after this many successful extractions
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Re-extract filings that already have metadata
    #[arg(long)]
    pub overwrite: bool,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = covenant_ai::llm::DEFAULT_BASE_URL)]
    pub openai_base_url: String,
}

#[derive(Args, Debug)]
pub struct NormalizeArgs {
    /// Restrict the merge to the scopes in this file; all stores otherwise
    #[arg(long)]
    pub scope_file: Option<PathBuf>,

    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Category mapping (defaults to mapping.json, then normalize.json)
    #[arg(long)]
    pub mapping_file: Option<PathBuf>,

    /// Combined dataset path (defaults to <dataset-dir>/filings.json)
    #[arg(long)]
    pub output: Option<PathBuf>,
}

pub struct SearchSettings {
    pub scopes: Vec<Scope>,
    pub layout: DatasetLayout,
    pub form_types: Vec<String>,
    pub delay: Duration,
    pub overwrite: bool,
    pub retry: RetryPolicy,
    pub api_key: String,
    pub search_url: String,
    pub archive_url: String,
}

impl SearchSettings {
    pub fn from_args(args: SearchArgs) -> anyhow::Result<Self> {
        let api_key = require_key(args.sec_api_key, "SEC_API_KEY")?;
        let scopes = load_scopes(&args.scope_file).context("loading scopes")?;
        let form_types = args
            .forms
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        Ok(Self {
            scopes,
            layout: DatasetLayout::new(args.dataset.dataset_dir),
            form_types,
            delay: Duration::from_millis(args.delay_ms),
            overwrite: args.overwrite,
            retry: RetryPolicy::default(),
            api_key,
            search_url: args.search_url,
            archive_url: args.archive_url,
        })
    }
}

pub struct ExtractSettings {
    pub scopes: Vec<Scope>,
    pub layout: DatasetLayout,
    pub model: String,
    pub temperature: f32,
    pub api_key: String,
    pub base_url: String,
    pub options: ExtractOptions,
}

impl ExtractSettings {
    pub fn from_args(args: ExtractArgs) -> anyhow::Result<Self> {
        let api_key = require_key(args.openai_api_key, "OPENAI_API_KEY")?;
        if args.max_words == 0 {
            bail!("--max-words must be greater than zero");
        }
        if !(0.0..=2.0).contains(&args.temperature) {
            bail!("--temperature must be between 0 and 2, got {}", args.temperature);
        }
        if args.max_files == Some(0) {
            bail!("--max-files must be greater than zero");
        }
        if args.model.trim().is_empty() {
            bail!("--model must not be empty");
        }
        let scopes = load_scopes(&args.scope_file).context("loading scopes")?;
        Ok(Self {
            scopes,
            layout: DatasetLayout::new(args.dataset.dataset_dir),
            model: args.model,
            temperature: args.temperature,
            api_key,
            base_url: args.openai_base_url,
            options: ExtractOptions {
                truncation: Truncation {
                    strategy: args.truncation,
                    budget: args.max_words,
                },
                min_words: args.min_words,
                max_files: args.max_files,
                overwrite: args.overwrite,
                retry: RetryPolicy::default(),
            },
        })
    }
}

pub struct NormalizeSettings {
    pub layout: DatasetLayout,
    /// Scope types to merge; `None` merges every store in the dataset directory.
    pub scopes: Option<Vec<String>>,
    pub mapping: CategoryMapping,
    pub mapping_path: PathBuf,
    pub output: PathBuf,
}

impl NormalizeSettings {
    pub fn from_args(args: NormalizeArgs) -> anyhow::Result<Self> {
        Self::from_args_in(args, Path::new("."))
    }

    /// Like [`from_args`](Self::from_args), looking for a default mapping file in `base`.
    fn from_args_in(args: NormalizeArgs, base: &Path) -> anyhow::Result<Self> {
        let mapping_path = resolve_mapping_path(args.mapping_file, base)?;
        let mapping = CategoryMapping::load(&mapping_path).context("loading category mapping")?;
        let scopes = match &args.scope_file {
            Some(path) => Some(
                load_scopes(path)
                    .context("loading scopes")?
                    .into_iter()
                    .map(|s| s.kind)
                    .collect(),
            ),
            None => None,
        };
        let layout = DatasetLayout::new(args.dataset.dataset_dir);
        let output = args.output.unwrap_or_else(|| layout.combined_path());
        Ok(Self {
            layout,
            scopes,
            mapping,
            mapping_path,
            output,
        })
    }
}

fn require_key(value: Option<String>, var: &str) -> anyhow::Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => bail!("{var} is not set (use the environment, a .env file, or the command-line flag)"),
    }
}

fn resolve_mapping_path(explicit: Option<PathBuf>, base: &Path) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    MAPPING_CANDIDATES
        .iter()
        .map(|name| base.join(name))
        .find(|p| p.is_file())
        .with_context(|| format!("no mapping file given and none of {MAPPING_CANDIDATES:?} found"))
}
