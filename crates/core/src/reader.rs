use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::debug;
use odata_predicate::{DynamicRecord, FilterParser, ParserOptions, TypeSchema, load_schema};
use serde_json::Value as JsonValue;

#[derive(Args, Debug)]
pub struct ReaderOpts {
    /// Path to the YAML schema describing the records
    #[arg(long, short = 's')]
    pub schema: PathBuf,

    /// Path to a YAML file with parser options, such as the culture used for literals
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

impl ReaderOpts {
    /// Load the schema named in the options. This is a convenience method around [load_schema].
    pub fn load_schema(&self) -> Result<Arc<TypeSchema>> {
        load_schema(&self.schema)
    }

    /// Build a filter parser for the schema, configured from the options file if one was given.
    pub fn parser(&self) -> Result<FilterParser> {
        let parser = FilterParser::new(self.load_schema()?);
        Ok(match &self.config {
            Some(path) => parser.with_options(read_options(path)?),
            None => parser,
        })
    }
}

/// Read parser options from a YAML file.
pub fn read_options(path: impl AsRef<Path>) -> Result<ParserOptions> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read parser options {}", path.display()))?;
    ParserOptions::from_yaml_str(&contents)
        .with_context(|| format!("invalid parser options in {}", path.display()))
}

/// Read a JSON array of records from disk, typing each one with the given schema.
pub fn read_records(path: impl AsRef<Path>, schema: &Arc<TypeSchema>) -> Result<Vec<DynamicRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open records {}", path.display()))?;
    let json: JsonValue = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    parse_records(&json, schema).with_context(|| format!("reading records from {}", path.display()))
}

/// Convert a JSON array of objects into records. Each element must match the schema.
pub fn parse_records(json: &JsonValue, schema: &Arc<TypeSchema>) -> Result<Vec<DynamicRecord>> {
    let items = json
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("expected a JSON array of records"))?;
    let records = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            DynamicRecord::from_json(schema.clone(), item)
                .with_context(|| format!("record {index} does not match {}", schema.name()))
        })
        .collect::<Result<Vec<_>>>()?;
    debug!("read {} {} records", records.len(), schema.name());
    Ok(records)
}
