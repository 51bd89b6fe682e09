use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use odata_core::{
    printer::{self, Format},
    reader::{self, ReaderOpts},
};
use odata_predicate::{QueryOptions, to_odata, to_sql92};

/// A command line tool for running OData queries over JSON records.
///
/// Records are described by a YAML schema that names each field and its type. Filters use the
/// OData `$filter` syntax, e.g. `(MessageId gt 1) and (ComplexProperty/Foo eq 'foo')`.
#[derive(Debug, Parser)]
#[command(name = "odata-query", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply query options to a JSON array of records and print the records that remain.
    Filter {
        #[command(flatten)]
        read_opts: ReaderOpts,

        #[command(flatten)]
        printer: printer::PrinterArgs,

        /// Path to a JSON file holding an array of records
        #[arg(long, short = 'r')]
        records: PathBuf,

        /// The query options, e.g. `$filter=MessageId gt 1&$orderby=Name desc&$top=5`
        #[arg(long, short = 'q', default_value = "")]
        query: String,
    },
    /// Parse a filter and print it in the chosen dialect.
    Translate {
        #[command(flatten)]
        read_opts: ReaderOpts,

        /// The dialect to print
        #[arg(long, short = 'd', value_enum, default_value_t = Dialect::Odata)]
        dialect: Dialect,

        /// The OData filter to translate
        filter: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Dialect {
    Odata,
    Sql92,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut writer = std::io::stdout();
    match cli.command {
        Command::Filter {
            read_opts,
            printer,
            records,
            query,
        } => {
            let parser = read_opts.parser()?;
            let records = reader::read_records(&records, parser.schema())?;
            let options = QueryOptions::from_query_str(&query)
                .with_context(|| format!("invalid query options '{query}'"))?;
            debug!("applying {options:?} to {} records", records.len());
            let result = options.apply(&parser, records)?;
            printer
                .output
                .print_result(parser.schema(), &result, &mut writer)
        }
        Command::Translate {
            read_opts,
            dialect,
            filter,
        } => {
            let parser = read_opts.parser()?;
            let Some(predicate) = parser.parse(&filter)? else {
                return Ok(());
            };
            let rendered = match dialect {
                Dialect::Odata => to_odata(&predicate)?,
                Dialect::Sql92 => to_sql92(&predicate)?,
            };
            Format::Plain.print_plain(std::iter::once(rendered), &mut writer)
        }
    }
}
