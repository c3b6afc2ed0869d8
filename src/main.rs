//! Purpose: `obt` CLI entry point: inspect, query and load one-big-table stores.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Successful commands print exactly one JSON document on stdout.
//! Invariants: Errors are JSON on stderr (plain text when stderr is a terminal).
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod store_info_json;

use obtstore::api::{
    Durability, Error, ErrorKind, Frame, FrameKey, MetaFileCache, MetadataMode, OneBigTable,
    OpenMode, SchemaOptions, SemanticType, StoreOptions, TableOptions, TimeUnit,
    frame_from_records, frame_to_records, parse_records, to_exit_code,
};
use store_info_json::{keys_json, store_info_json};

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(code) => code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run() -> Result<i32, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let code = if err.kind() == ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand {
                    2
                } else {
                    0
                };
                return Ok(code);
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `obt --help`."));
            }
        },
    };
    dispatch(cli.command)?;
    Ok(0)
}

#[derive(Parser)]
#[command(
    name = "obt",
    version,
    about = "Inspect and load one-big-table stores",
    long_about = None,
    after_help = r#"EXAMPLES
  $ obt load ./prices AAPL --input aapl.json --index timestamp --datetime timestamp
  $ obt keys ./prices
  $ obt get ./prices AAPL
  $ obt where ./prices '.["close"] > 100'
  $ obt sort-index ./prices"#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print store metadata and schema.
    Info {
        #[arg(value_hint = ValueHint::DirPath)]
        store: PathBuf,
    },
    /// List distinct frame keys.
    Keys {
        #[arg(value_hint = ValueHint::DirPath)]
        store: PathBuf,
    },
    /// Print the rows stored under one key.
    Get {
        #[arg(value_hint = ValueHint::DirPath)]
        store: PathBuf,
        key: String,
    },
    /// Print rows matching a native predicate, e.g. `.["close"] > 100`.
    Where {
        #[arg(value_hint = ValueHint::DirPath)]
        store: PathBuf,
        predicate: String,
    },
    /// Append JSON records (array or one object per line) under a key.
    Load(LoadArgs),
    /// Rebuild the index-ordered copy of a store.
    SortIndex {
        #[arg(value_hint = ValueHint::DirPath)]
        store: PathBuf,
    },
    /// List keys registered in a file cache directory, in registration order.
    ///
    /// Only keys are printed: file names depend on the key type and value kind the cache
    /// was written with, which the directory does not record.
    CacheKeys {
        #[arg(value_hint = ValueHint::DirPath)]
        dir: PathBuf,
        #[arg(long, default_value_t = 0, help = "Shard level the cache was created with (0 = flat)")]
        level: usize,
    },
    /// Generate shell completions.
    #[command(arg_required_else_help = true)]
    Completion {
        #[arg(help = "Shell to generate completions for")]
        shell: Shell,
    },
}

#[derive(clap::Args)]
struct LoadArgs {
    #[arg(value_hint = ValueHint::DirPath)]
    store: PathBuf,
    key: String,
    #[arg(long, value_hint = ValueHint::FilePath, help = "Input file (default: stdin)")]
    input: Option<PathBuf>,
    #[arg(long, default_value = "index", help = "Record field used as the row index")]
    index: String,
    #[arg(long = "datetime", help = "Record field holding RFC 3339 datetimes (repeatable)")]
    datetime_columns: Vec<String>,
    #[arg(long, help = "Treat the key as an integer")]
    int_key: bool,
    #[arg(long, help = "Discard any existing store first")]
    truncate: bool,
    #[arg(long, default_value = "frame_key", help = "Frame-key column name for a new store")]
    frame_key: String,
    #[arg(long, default_value_t = 10, help = "Minimum width of inferred string columns")]
    min_string_width: usize,
    #[arg(long, value_enum, default_value = "ns", help = "Datetime storage unit for a new store")]
    datetime_unit: UnitCli,
    #[arg(long, help = "Keep schema metadata in a sidecar file")]
    sidecar: bool,
    #[arg(long, help = "Sync rows to disk before committing the row count")]
    flush: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum UnitCli {
    S,
    Ms,
    Us,
    Ns,
}

impl From<UnitCli> for TimeUnit {
    fn from(value: UnitCli) -> Self {
        match value {
            UnitCli::S => TimeUnit::Second,
            UnitCli::Ms => TimeUnit::Millisecond,
            UnitCli::Us => TimeUnit::Microsecond,
            UnitCli::Ns => TimeUnit::Nanosecond,
        }
    }
}

fn dispatch(command: Command) -> Result<(), Error> {
    match command {
        Command::Info { store } => {
            let store = open_read(&store)?;
            let keys = store.keys()?;
            emit_json(&store_info_json(&store, &keys));
        }
        Command::Keys { store } => {
            let store = open_read(&store)?;
            emit_json(&keys_json(&store.keys()?));
        }
        Command::Get { store, key } => {
            let store = open_read(&store)?;
            let key = parse_key(&store, &key, false)?;
            emit_json(&records_json(&store.get(key)?)?);
        }
        Command::Where { store, predicate } => {
            let store = open_read(&store)?;
            emit_json(&records_json(&store.select_where(&predicate)?)?);
        }
        Command::Load(args) => {
            let rows = load(args)?;
            emit_json(&json!({ "rows": rows }));
        }
        Command::SortIndex { store } => {
            drop(open_read(&store)?);
            let mut store = OneBigTable::open(&store, OpenMode::Append, StoreOptions::default())?;
            store.sort_index()?;
            emit_json(&json!({ "rows": store.nrows(), "state": "reindexed" }));
            store.close()?;
        }
        Command::CacheKeys { dir, level } => {
            if !dir.join(obtstore::core::cache::INDEX_FILE).exists() {
                return Err(Error::new(ErrorKind::NotFound)
                    .with_message("no cache index in directory")
                    .with_path(&dir));
            }
            let cache: MetaFileCache<Value, Frame> = if level == 0 {
                MetaFileCache::new(&dir)?
            } else {
                MetaFileCache::leveled(&dir, level)?
            };
            emit_json(&Value::Array(cache.keys().to_vec()));
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "obt", &mut io::stdout());
        }
    }
    Ok(())
}

fn open_read(path: &Path) -> Result<OneBigTable, Error> {
    OneBigTable::open(path, OpenMode::Read, StoreOptions::default())
}

fn load(args: LoadArgs) -> Result<usize, Error> {
    let text = match &args.input {
        Some(path) => std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?,
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            text
        }
    };
    let records = parse_records(&text)?;
    let frame = frame_from_records(&records, &args.index, &args.datetime_columns)?;

    let options = StoreOptions::default()
        .with_frame_key(args.frame_key.clone())
        .with_schema(
            SchemaOptions::default()
                .with_min_string_width(args.min_string_width)
                .with_datetime_unit(args.datetime_unit.into()),
        )
        .with_table(
            TableOptions::default()
                .with_metadata_mode(if args.sidecar { MetadataMode::Sidecar } else { MetadataMode::Embedded })
                .with_durability(if args.flush { Durability::Flush } else { Durability::Fast }),
        );
    let mode = if args.truncate { OpenMode::Write } else { OpenMode::Append };
    let mut store = OneBigTable::open(&args.store, mode, options)?;
    let key = parse_key(&store, &args.key, args.int_key)?;
    let rows = store.set(key, &frame)?;
    store.close()?;
    Ok(rows)
}

/// Integer keys are used when the store's frame-key column is integer, or when forced.
fn parse_key(store: &OneBigTable, raw: &str, force_int: bool) -> Result<FrameKey, Error> {
    let int_column = store
        .schema()
        .and_then(|schema| schema.column(store.frame_key()))
        .is_some_and(|column| column.semantic_type == SemanticType::Int64);
    if !(force_int || int_column) {
        return Ok(FrameKey::Str(raw.to_string()));
    }
    raw.parse::<i64>().map(FrameKey::Int).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("frame key {raw:?} is not an integer"))
            .with_source(err)
    })
}

fn records_json(frame: &Frame) -> Result<Value, Error> {
    Ok(Value::Array(frame_to_records(frame)?))
}

fn emit_json(value: &Value) {
    let text = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    println!("{}", text.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string()));
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error",
        ErrorKind::Usage => "usage error",
        ErrorKind::NotFound => "not found",
        ErrorKind::AlreadyExists => "already exists",
        ErrorKind::SchemaMismatch => "schema mismatch",
        ErrorKind::UnsupportedType => "unsupported column type",
        ErrorKind::Uninitialized => "store has no schema yet",
        ErrorKind::NoSuchKey => "no such key",
        ErrorKind::Corrupt => "corrupt data",
        ErrorKind::Io => "i/o error",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(column) = err.column() {
        lines.push(format!("column: {column}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
