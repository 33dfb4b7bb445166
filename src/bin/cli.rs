use std::fs;
use std::path::PathBuf;

use celerix_map::{Config, Criteria};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory; falls back to CELERIX_DATA_DIR, then `data`.
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Collection to operate on.
    collection: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Get { key: String, path: Option<String> },
    Set {
        key: String,
        value: String,
        #[arg(short, long)]
        path: Option<String>,
    },
    Del { key: String, path: Option<String> },
    Push {
        key: String,
        value: String,
        #[arg(short, long)]
        path: Option<String>,
        #[arg(long)]
        allow_dupes: bool,
    },
    Math {
        key: String,
        operation: String,
        operand: f64,
        #[arg(short, long)]
        path: Option<String>,
    },
    Inc { key: String, path: Option<String> },
    Dec { key: String, path: Option<String> },
    Ensure { key: String, default: String },
    /// Lists the values whose `path` equals `value`.
    Filter { path: String, value: Option<String> },
    Keys,
    Count,
    Autonum,
    Export,
    Import {
        file: PathBuf,
        #[arg(long)]
        overwrite: bool,
        #[arg(long)]
        clear: bool,
    },
}

/// Arguments that are not valid JSON are taken as plain strings.
fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn print(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = Config::from_env(&cli.collection);
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if config.data_dir.is_none() {
        config.data_dir = Some(PathBuf::from("data"));
    }
    let store = config.open()?;

    match cli.command {
        Commands::Get { key, path } => {
            let val = store.get_at(&key, path.unwrap_or_default())?;
            print(&val.unwrap_or(Value::Null))?;
        }
        Commands::Set { key, value, path } => {
            store.set_at(&key, path.unwrap_or_default(), parse_value(value))?;
            println!("OK");
        }
        Commands::Del { key, path } => {
            store.delete_at(&key, path.unwrap_or_default())?;
            println!("OK");
        }
        Commands::Push { key, value, path, allow_dupes } => {
            store.push_at(&key, path.unwrap_or_default(), parse_value(value), allow_dupes)?;
            println!("OK");
        }
        Commands::Math { key, operation, operand, path } => {
            print(&store.math_at(&key, path.unwrap_or_default(), &operation, operand)?)?;
        }
        Commands::Inc { key, path } => {
            print(&store.inc_at(&key, path.unwrap_or_default())?)?;
        }
        Commands::Dec { key, path } => {
            print(&store.dec_at(&key, path.unwrap_or_default())?)?;
        }
        Commands::Ensure { key, default } => {
            print(&store.ensure(&key, parse_value(default))?)?;
        }
        Commands::Filter { path, value } => {
            let criteria = Criteria::PathEquals {
                path: path.into(),
                value: value.map(parse_value),
            };
            print(&store.filter(criteria)?)?;
        }
        Commands::Keys => print(&store.keys()?)?,
        Commands::Count => println!("{}", store.count()?),
        Commands::Autonum => println!("{}", store.autonum()?),
        Commands::Export => println!("{}", store.export()?),
        Commands::Import { file, overwrite, clear } => {
            let bundle = fs::read_to_string(&file)?;
            let written = store.import(&bundle, overwrite, clear)?;
            println!("Imported {} entries", written);
        }
    }

    store.close()?;
    Ok(())
}
