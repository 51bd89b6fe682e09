use std::{fmt::Display, io::Write};

use anyhow::Context;
use clap::Args;
use odata_predicate::{DynamicRecord, QueryResult, Record, TypeSchema, Value};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

#[derive(Debug, Args)]
pub struct PrinterArgs {
    /// The output format to use. Valid options are "plain", "json", and "binary". Default is "plain".
    #[arg(long, short = 'o', default_value_t = Format::default())]
    pub output: Format,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// A text table for records, one line per item otherwise
    #[default]
    Plain,
    Json,
    /// CBOR
    Binary,
}

impl std::str::FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(Format::Plain),
            "json" => Ok(Format::Json),
            "binary" | "cbor" => Ok(Format::Binary),
            _ => Err(anyhow::anyhow!("Unknown format: {}", s)),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Format::Plain => "plain",
            Format::Json => "json",
            Format::Binary => "binary",
        };
        write!(f, "{}", s)
    }
}

impl Format {
    /// Print the given data in the specified format to the given writer. If the format is not a
    /// structured type, this method will return an error.
    pub fn print_structured<S: Serialize, W: Write>(
        &self,
        data: S,
        writer: &mut W,
    ) -> anyhow::Result<()> {
        match self {
            Format::Json => {
                serde_json::to_writer(&mut *writer, &data).context("JSON serialization failed")?;
                writeln!(writer)?;
                Ok(())
            }
            Format::Binary => {
                ciborium::into_writer(&data, writer).context("CBOR serialization failed")
            }
            Format::Plain => {
                anyhow::bail!("Plain format not supported")
            }
        }
    }

    /// Print each item on its own line. If the format is not plain text, this method will return
    /// an error.
    pub fn print_plain<T, D, W>(&self, data: T, writer: &mut W) -> anyhow::Result<()>
    where
        T: Iterator<Item = D>,
        D: Display,
        W: Write,
    {
        match self {
            Format::Plain => {
                for item in data {
                    writeln!(writer, "{}", item)?;
                }
                Ok(())
            }
            _ => {
                anyhow::bail!("Non-plain format not supported for plain text output")
            }
        }
    }

    /// Print the result of a query. Plain output is a table with one column per field, in schema
    /// order for whole records and in field name order for projections.
    pub fn print_result<W: Write>(
        &self,
        schema: &TypeSchema,
        result: &QueryResult<DynamicRecord>,
        writer: &mut W,
    ) -> anyhow::Result<()> {
        if *self != Format::Plain {
            return self.print_structured(result, writer);
        }
        let table = match result {
            QueryResult::Records(records) => {
                let columns: Vec<&str> = schema.fields().map(|(name, _)| name).collect();
                render_table(&columns, records)
            }
            QueryResult::Projected(rows) => {
                let columns: Vec<&str> = rows
                    .first()
                    .map(|row| row.shape().fields().map(|(name, _)| name).collect())
                    .unwrap_or_default();
                render_table(&columns, rows)
            }
        };
        writeln!(writer, "{table}")?;
        Ok(())
    }
}

fn render_table<R: Record>(columns: &[&str], rows: &[R]) -> String {
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|name| name.to_string()));
    for row in rows {
        builder.push_record(columns.iter().map(|name| cell(row.field(name))));
    }
    builder.build().with(Style::modern()).to_string()
}

fn cell(value: Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;
    use std::io::Cursor;
    use std::sync::Arc;

    use odata_predicate::ValueType;
    use serde_json::Value as JsonValue;

    fn schema() -> Arc<TypeSchema> {
        Arc::new(
            TypeSchema::new("Row")
                .with_field("Id", ValueType::Int32)
                .with_field("Name", ValueType::String.nullable()),
        )
    }

    fn rows() -> QueryResult<DynamicRecord> {
        let record = |id: i32, name: Option<&str>| {
            DynamicRecord::new(
                schema(),
                BTreeMap::from([
                    ("Id".to_string(), Value::Int32(id)),
                    ("Name".to_string(), name.map(Value::from).unwrap_or(Value::Null)),
                ]),
            )
        };
        QueryResult::Records(vec![record(1, Some("gamma")), record(2, None)])
    }

    #[test]
    fn format_from_str_accepts_supported_values() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("CBOR".parse::<Format>().unwrap(), Format::Binary);
        assert!("unknown".parse::<Format>().is_err());
    }

    #[test]
    fn json_result_is_an_array_of_objects() -> anyhow::Result<()> {
        let mut buffer = Vec::new();

        Format::Json.print_result(&schema(), &rows(), &mut buffer)?;

        let value: JsonValue = serde_json::from_slice(&buffer)?;
        assert_eq!(value[0]["Name"], "gamma");
        assert_eq!(value[1]["Name"], JsonValue::Null);

        Ok(())
    }

    #[test]
    fn binary_result_round_trip() -> anyhow::Result<()> {
        let mut buffer = Vec::new();

        Format::Binary.print_result(&schema(), &rows(), &mut buffer)?;

        let mut cursor = Cursor::new(buffer);
        let decoded: Vec<BTreeMap<String, ciborium::Value>> = ciborium::from_reader(&mut cursor)?;

        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0]["Name"], ciborium::Value::Text("gamma".into()));

        Ok(())
    }

    #[test]
    fn plain_result_is_a_table() -> anyhow::Result<()> {
        let mut buffer = Vec::new();

        Format::Plain.print_result(&schema(), &rows(), &mut buffer)?;

        let text = String::from_utf8(buffer)?;
        let header = text.lines().nth(1).unwrap_or_default();
        assert!(header.contains("Id") && header.contains("Name"), "{text}");
        assert!(text.contains("gamma"));
        assert_eq!(text.matches("null").count(), 0, "nulls render as empty cells");

        Ok(())
    }
}
