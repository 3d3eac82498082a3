pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "slacklake",
    about = "Slacklake operator CLI",
    long_about = "Inspect configuration, maintain the generated catalog layer, and try table routing from the terminal.",
    after_help = "Examples:\n  slacklake config\n  slacklake catalog list\n  slacklake catalog generate --table-catalog dev --table-schema diamond --table-like 'mart_%'\n  slacklake route \"quais foram as vendas da semana?\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(subcommand, about = "Inspect or regenerate the table catalog")]
    Catalog(CatalogCommand),
    #[command(about = "Route a question to a catalog table and print the outcome")]
    Route {
        #[arg(help = "Question as a Slack user would ask it")]
        question: String,
    },
}

#[derive(Debug, Subcommand)]
enum CatalogCommand {
    #[command(about = "List merged catalog ids with their layer")]
    List,
    #[command(about = "Generate the catalog layer from warehouse information_schema metadata")]
    Generate(GenerateArgs),
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    #[arg(long, help = "Unity Catalog catalog, e.g. dev")]
    pub table_catalog: String,
    #[arg(long, help = "Schema inside the catalog, e.g. diamond")]
    pub table_schema: String,
    #[arg(long, default_value = "%", help = "SQL LIKE filter on table names, e.g. mart_%")]
    pub table_like: String,
    #[arg(long, help = "Additional regex filter on table names, e.g. ^mart_.*_core$")]
    pub table_regex: Option<String>,
    #[arg(long, help = "Optional prefix for generated ids, e.g. diamond_")]
    pub id_prefix: Option<String>,
    #[arg(long, help = "Output path (defaults to catalog.generated_path)")]
    pub output: Option<PathBuf>,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Catalog(CatalogCommand::List) => commands::catalog::list(),
        Command::Catalog(CatalogCommand::Generate(args)) => commands::catalog::generate(&args),
        Command::Route { question } => commands::route::run(&question),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
