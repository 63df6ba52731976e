//! yarforge CLI
//!
//! Renders YARA rule source text from YAML rule descriptions and writes it
//! to standard output.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use yarforge_core::{BuildConfig, CONFIG_FILE};
use yarforge_render::{BuilderPaths, RuleBuilder, TemplateEntry};

/// yarforge — build YARA rules from YAML rule descriptions.
#[derive(Parser, Debug)]
#[command(name = "yarforge", version, about)]
struct Cli {
    /// Path to the YAML rules directory or file.
    #[arg(default_value = "rules")]
    rules_path: PathBuf,

    /// Template with which to render YAML rules.
    #[arg(short = 't', long, default_value = "default")]
    template_name: String,

    /// List available rule templates instead of rendering.
    #[arg(short = 'L', long)]
    list_templates: bool,

    /// Set the logging level.
    #[arg(short = 'l', long, default_value = "warning")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
}

impl LogLevel {
    /// The tracing filter directive for this level. `critical` has no
    /// tracing counterpart and maps to `error`.
    fn directive(self) -> &'static str {
        match self {
            Self::Critical | Self::Error => "error",
            Self::Warning => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
        }
    }
}

fn print_templates(templates: &[TemplateEntry]) {
    let width = templates
        .iter()
        .map(|t| t.name.len())
        .chain(std::iter::once("name".len()))
        .max()
        .unwrap_or(0);
    println!("{:<width$}  template file", "name");
    println!("{:-<width$}  {:-<13}", "", "");
    for template in templates {
        println!("{:<width$}  {}", template.name, template.file);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.directive())),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BuildConfig::load(Path::new(CONFIG_FILE))?;
    let builder = RuleBuilder::new(config, &cli.template_name, &BuilderPaths::default())?;

    if cli.list_templates {
        print_templates(&builder.list_rule_templates()?);
        return Ok(());
    }

    tracing::debug!(rules_path = %cli.rules_path.display(), "starting build run");
    for rule in builder.build_rules(&cli.rules_path)? {
        println!("{}", rule?);
    }
    Ok(())
}
