//! Sieve CLI - compile criteria into entity queries
//!
//! Usage:
//!   sieve compile --entity <Name> [--schema <file>] [--criteria <file>|-] [--dialect <dialect>]
//!   sieve entities [--schema <file>]
//!
//! Examples:
//!   sieve compile --schema schema.toml --entity User --criteria criteria.json
//!   echo '{"where": {"Id": [1, 2]}}' | sieve compile --entity User --criteria - --dialect postgres
//!   sieve entities --schema schema.toml

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use sieve::config::Settings;
use sieve::criteria::{CompilerOptions, CriteriaCompiler};
use sieve::schema::Schema;
use sieve::sql::Dialect;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::{fs, io};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sieve")]
#[command(about = "Sieve - compiles criteria descriptions into entity queries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile criteria for an entity
    Compile {
        /// Entity metadata file (.toml or .json); defaults to [schema] path
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Primary entity
        #[arg(short, long)]
        entity: String,

        /// Criteria JSON file, or `-` for stdin; empty criteria if omitted
        #[arg(short, long)]
        criteria: Option<String>,

        /// Query dialect to render
        #[arg(short, long, default_value = "dql")]
        dialect: DialectArg,

        /// Output format
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// List the entities in a metadata file
    Entities {
        /// Entity metadata file (.toml or .json); defaults to [schema] path
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Dql,
    Postgres,
    Mysql,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Dql => Dialect::Dql,
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Query text followed by parameters
    Text,
    /// JSON object with query, parameters and cache key
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Compile {
            schema,
            entity,
            criteria,
            dialect,
            output,
        } => cmd_compile(&settings, schema, &entity, criteria, dialect, output),
        Commands::Entities { schema } => cmd_entities(&settings, schema),
    }
}

fn load_schema(settings: &Settings, path: Option<PathBuf>) -> Result<Schema, String> {
    let path = match path {
        Some(p) => p,
        None => settings
            .schema
            .resolved_path()
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "no schema file given and no [schema] path configured".to_string())?,
    };
    Schema::load(&path).map_err(|e| format!("Error loading schema '{}': {}", path.display(), e))
}

fn read_criteria(source: Option<&str>) -> Result<Value, String> {
    let text = match source {
        None => return Ok(json!({})),
        Some("-") => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("Error reading stdin: {}", e))?;
            buf
        }
        Some(path) => fs::read_to_string(Path::new(path))
            .map_err(|e| format!("Error reading file '{}': {}", path, e))?,
    };
    serde_json::from_str(&text).map_err(|e| format!("Invalid criteria JSON: {}", e))
}

fn cmd_compile(
    settings: &Settings,
    schema: Option<PathBuf>,
    entity: &str,
    criteria: Option<String>,
    dialect: DialectArg,
    output: OutputFormat,
) -> ExitCode {
    let schema = match load_schema(settings, schema) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let criteria = match read_criteria(criteria.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let compiler = CriteriaCompiler::new(Arc::new(schema), entity)
        .with_options(CompilerOptions::from(&settings.compiler));

    let query = match compiler.compile_json(&criteria, None) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("Compilation error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let dialect: Dialect = dialect.into();
    match output {
        OutputFormat::Text => {
            println!("{}", query.to_sql(dialect));
            let values = query.bind_values(dialect);
            if !values.is_empty() {
                println!();
                for (key, value) in values {
                    println!("-- {} = {}", key, value);
                }
            }
        }
        OutputFormat::Json => {
            let doc = json!({
                "query": query.to_sql(dialect),
                "parameters": query.parameters,
                "bind_values": query
                    .bind_values(dialect)
                    .into_iter()
                    .map(|(_, value)| value)
                    .collect::<Vec<_>>(),
                "cache_key": query.cache_key(dialect),
            });
            match serde_json::to_string_pretty(&doc) {
                Ok(s) => println!("{}", s),
                Err(e) => {
                    eprintln!("Error serializing output: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }
    ExitCode::SUCCESS
}

fn cmd_entities(settings: &Settings, schema: Option<PathBuf>) -> ExitCode {
    let schema = match load_schema(settings, schema) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("Entities ({}):", schema.len());
    for entity in schema.entities() {
        let pk = if entity.primary_key.is_empty() {
            String::new()
        } else {
            format!(" [pk: {}]", entity.primary_key.join(", "))
        };
        println!("  {}{}", entity.name, pk);
        for field in &entity.fields {
            println!("    {}", field);
        }
        for assoc in &entity.associations {
            println!("    {} -> {}", assoc.name, assoc.target);
        }
    }
    ExitCode::SUCCESS
}
