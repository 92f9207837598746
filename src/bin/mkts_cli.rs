use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use mkts::{Client, ClientConfig, ListSymbolsFormat, QuerySpec, Table, Value};

#[derive(Parser)]
#[command(name = "mkts-cli", version, about = "Time-series database client tooling")]
struct Cli {
    /// JSON client config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Msgpack RPC endpoint (e.g. http://localhost:5993/rpc). Binary RPC
    /// needs a generated service stub and is only reachable through the library.
    #[arg(long)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Symbol,
    Tbk,
}

#[derive(Subcommand)]
enum Commands {
    Query {
        /// Comma-separated symbols
        symbols: String,
        timeframe: String,
        attrgroup: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long)]
        limit: Option<i32>,
        #[arg(long = "limit-from-start")]
        limit_from_start: bool,
        #[arg(long = "function")]
        functions: Vec<String>,
        /// Print only these columns (repeatable)
        #[arg(long = "column")]
        columns: Vec<String>,
        /// Print only the last row of each symbol
        #[arg(long)]
        latest: bool,
        /// Fail when a requested symbol returns no data
        #[arg(long)]
        strict: bool,
    },
    ListSymbols {
        #[arg(long, value_enum, default_value = "symbol")]
        format: Format,
    },
    Destroy {
        key: String,
    },
    Version,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    info!("endpoint {}", config.endpoint());
    let client = Client::from_config(&config).context("building client")?;

    let mut out = io::BufWriter::new(io::stdout());
    match cli.command {
        Commands::Query {
            symbols,
            timeframe,
            attrgroup,
            start,
            end,
            limit,
            limit_from_start,
            functions,
            columns,
            latest,
            strict,
        } => {
            let symbols: Vec<&str> = symbols.split(',').collect();
            let mut spec = QuerySpec::new(symbols, &timeframe, &attrgroup)?;
            if let Some(start) = start {
                spec = spec.with_start(parse_time(start))?;
            }
            if let Some(end) = end {
                spec = spec.with_end(parse_time(end))?;
            }
            if let Some(limit) = limit {
                spec = spec.with_limit(limit);
            }
            if limit_from_start {
                spec = spec.with_limit_from_start(true);
            }
            if !functions.is_empty() {
                spec = spec.with_functions(functions);
            }
            if !columns.is_empty() {
                spec = spec.with_columns(columns);
            }
            cmd_query(&client, spec, latest, strict, &mut out)?;
        }
        Commands::ListSymbols { format } => {
            let format = match format {
                Format::Symbol => ListSymbolsFormat::Symbol,
                Format::Tbk => ListSymbolsFormat::Tbk,
            };
            for symbol in client.list_symbols(format)? {
                writeln!(out, "{symbol}")?;
            }
        }
        Commands::Destroy { key } => {
            let reply = client.destroy(&key)?;
            for resp in reply.responses {
                if let Some(err) = resp.error {
                    anyhow::bail!("destroy {key}: {err}");
                }
            }
            writeln!(out, "destroyed {key}")?;
        }
        Commands::Version => {
            writeln!(out, "{}", client.server_version()?)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// All-digit arguments are epoch seconds; anything else is calendar text.
fn parse_time(arg: String) -> mkts::TimeArg {
    match arg.parse::<i64>() {
        Ok(secs) => mkts::TimeArg::Epoch(secs),
        Err(_) => mkts::TimeArg::Text(arg),
    }
}

fn cmd_query(
    client: &Client,
    spec: QuerySpec,
    latest: bool,
    strict: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let columns = spec.columns.clone();
    let reply = if strict {
        client.query_all(spec)?
    } else {
        client.query(spec)?
    };
    let project = |table: &Table| -> Result<Table> {
        Ok(match &columns {
            Some(names) => table.select(names.iter().map(String::as_str))?,
            None => table.clone(),
        })
    };
    if latest {
        let rows = reply.latest_row(None)?;
        let table = project(&rows.table)?;
        write_header(&table, Some("Symbol"), out)?;
        for (i, symbol) in rows.symbols.iter().enumerate() {
            write!(out, "{symbol}\t")?;
            write_row(&table, i, out)?;
        }
        return Ok(());
    }
    for dataset in reply.all() {
        let table = project(dataset.table())?;
        writeln!(out, "# {} ({} rows)", dataset.key(), table.len())?;
        write_header(&table, None, out)?;
        for i in 0..table.len() {
            write_row(&table, i, out)?;
        }
    }
    Ok(())
}

fn write_header(table: &Table, label: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let mut names: Vec<&str> = label.into_iter().collect();
    names.extend(table.names());
    writeln!(out, "{}", names.join("\t"))?;
    Ok(())
}

fn write_row(table: &Table, index: usize, out: &mut dyn Write) -> Result<()> {
    let cells: Vec<String> = table
        .row(index)
        .unwrap_or_default()
        .into_iter()
        .map(|value| match value {
            Value::I32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::F32(v) => v.to_string(),
            Value::F64(v) => v.to_string(),
        })
        .collect();
    writeln!(out, "{}", cells.join("\t"))?;
    Ok(())
}
