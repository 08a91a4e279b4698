use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use pred_cli::commands::{
    config_ops, score_ops, substitute_ops, tagger_ops, ConfigOverrides, Resources,
};
use pred_cli::trace_init::init_tracing;
use pred_core::search::Strategy;

#[derive(Parser)]
#[command(name = "predtool", about = "Constrained substitution diagnostics")]
struct Cli {
    /// Custom settings TOML (defaults are embedded)
    #[arg(long, global = true)]
    config: Option<String>,
    /// Write JSON trace logs to this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ResourceArgs {
    /// GGUF GPT-2 model (default: settings or PREDITOR_MODEL_PATH)
    #[arg(long)]
    model: Option<String>,
    /// Tab-separated lexicon (default: settings or PREDITOR_LEXICON_PATH)
    #[arg(long)]
    lexicon: Option<String>,
}

impl From<ResourceArgs> for Resources {
    fn from(args: ResourceArgs) -> Self {
        Resources {
            model: args.model,
            lexicon: args.lexicon,
        }
    }
}

#[derive(Args)]
struct SearchArgs {
    /// Minimum number of extensions per relaxed node
    #[arg(long)]
    min_variants: Option<usize>,
    /// Nodes relaxed per oracle call
    #[arg(long)]
    relax_count: Option<usize>,
    /// Selection pool size as a multiple of the relax count
    #[arg(long)]
    pool_factor: Option<usize>,
    /// Length-penalty exponent in [0, 1]
    #[arg(long)]
    lp_alpha: Option<f64>,
    /// Search strategy: cache or batch
    #[arg(long)]
    strategy: Option<Strategy>,
}

impl From<SearchArgs> for ConfigOverrides {
    fn from(args: SearchArgs) -> Self {
        ConfigOverrides {
            min_variants: args.min_variants,
            relax_count: args.relax_count,
            pool_factor: args.pool_factor,
            lp_alpha: args.lp_alpha,
            strategy: args.strategy,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Replace OLD (found between BEFORE and AFTER) and re-inflect its sentence
    Substitute {
        before: String,
        old: String,
        after: String,
        replacement: String,
        #[command(flatten)]
        resources: ResourceArgs,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Replace the LENGTH characters of TEXT starting at character START
    SubstituteSpan {
        text: String,
        start: usize,
        length: usize,
        replacement: String,
        #[command(flatten)]
        resources: ResourceArgs,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Answer a JSON substitution request read from a file (or - for stdin)
    Request {
        input: String,
        #[command(flatten)]
        resources: ResourceArgs,
    },
    /// Show tagged forms and their variant sets
    Variants {
        text: String,
        /// Tab-separated lexicon (default: settings or PREDITOR_LEXICON_PATH)
        #[arg(long)]
        lexicon: Option<String>,
    },
    /// Show how a text splits into sentences
    Sentences {
        text: String,
        /// Tab-separated lexicon (default: settings or PREDITOR_LEXICON_PATH)
        #[arg(long)]
        lexicon: Option<String>,
    },
    /// Print the surprisal of each text under the model
    Score {
        #[arg(required = true)]
        texts: Vec<String>,
        /// GGUF GPT-2 model (default: settings or PREDITOR_MODEL_PATH)
        #[arg(long)]
        model: Option<String>,
    },
    /// Export default settings as TOML
    SettingsExport,
    /// Validate a custom settings TOML file
    SettingsValidate {
        /// Path to the TOML file
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_dir.as_deref());
    if let Some(ref file) = cli.config {
        config_ops::settings_load(file);
    }

    match cli.command {
        Command::Substitute {
            before,
            old,
            after,
            replacement,
            resources,
            search,
        } => substitute_ops::substitute(
            &resources.into(),
            &search.into(),
            &before,
            &old,
            &after,
            &replacement,
        ),
        Command::SubstituteSpan {
            text,
            start,
            length,
            replacement,
            resources,
            search,
        } => substitute_ops::substitute_span(
            &resources.into(),
            &search.into(),
            &text,
            start,
            length,
            &replacement,
        ),
        Command::Request { input, resources } => {
            substitute_ops::request(&resources.into(), &input)
        }
        Command::Variants { text, lexicon } => {
            let resources = Resources {
                lexicon,
                ..Resources::default()
            };
            tagger_ops::variants(&resources, &text)
        }
        Command::Sentences { text, lexicon } => {
            let resources = Resources {
                lexicon,
                ..Resources::default()
            };
            tagger_ops::sentences(&resources, &text)
        }
        Command::Score { texts, model } => {
            let resources = Resources {
                model,
                ..Resources::default()
            };
            score_ops::score(&resources, &texts)
        }
        Command::SettingsExport => config_ops::settings_export(),
        Command::SettingsValidate { file } => config_ops::settings_validate(&file),
    }
}
