//! OData query options: `$filter`, `$orderby`, `$select`, `$skip` and `$top`.

use std::cmp::Ordering;
use std::fmt;

use log::{debug, warn};
use serde::ser::{Serialize, SerializeSeq, Serializer};
use url::Url;

use crate::error::QueryError;
use crate::parser::FilterParser;
use crate::record::Record;
use crate::schema::PropertyPath;
use crate::select::{Projection, SelectShape};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One `$orderby` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescription {
    pub path: String,
    pub direction: SortDirection,
}

impl SortDescription {
    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Descending,
        }
    }
}

impl fmt::Display for SortDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{}", self.path),
            SortDirection::Descending => write!(f, "{} desc", self.path),
        }
    }
}

/// The query options of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub filter: Option<String>,
    pub order_by: Vec<SortDescription>,
    pub select: Vec<String>,
    pub skip: Option<usize>,
    pub top: Option<usize>,
}

impl QueryOptions {
    /// Parses a query string such as `?$filter=A eq 1&$top=5`. Values are percent-decoded.
    pub fn from_query_str(query: &str) -> Result<Self, QueryError> {
        let query = query.trim().trim_start_matches('?');
        let mut pairs = Vec::new();
        for part in query.split('&').filter(|part| !part.is_empty()) {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            pairs.push((decode(key)?, decode(value)?));
        }
        Self::from_pairs(pairs)
    }

    /// Builds options from decoded key/value pairs. Keys without a `$` prefix are ignored.
    ///
    /// Repeated `$filter` keys are combined with `and`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = QueryOptions::default();
        for (key, value) in pairs {
            let (key, value) = (key.as_ref().trim(), value.as_ref());
            let Some(operator) = key.strip_prefix('$') else {
                continue;
            };
            match operator {
                "filter" => {
                    options.filter = Some(match options.filter.take() {
                        Some(existing) => format!("({existing}) and ({value})"),
                        None => value.to_string(),
                    });
                }
                "orderby" => options.order_by.extend(parse_order_by(value)),
                "select" => options.select.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string),
                ),
                "skip" => options.skip = parse_count(key, value)?,
                "top" => options.top = parse_count(key, value)?,
                _ => return Err(QueryError::InvalidOperator(key.to_string())),
            }
        }
        Ok(options)
    }

    /// Renders the options as `$key=value` pairs joined with `&`, values percent-encoded.
    pub fn to_query_string(&self) -> String {
        self.parts()
            .into_iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(&value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Sets the options as the query of `base`.
    pub fn to_uri(&self, base: &Url) -> Url {
        let mut uri = base.clone();
        let query = self.to_query_string();
        uri.set_query((!query.is_empty()).then_some(query.as_str()));
        uri
    }

    /// The `$key`/value pairs in operator order, unencoded. Unset options are left out.
    pub(crate) fn parts(&self) -> Vec<(&'static str, String)> {
        let mut parts = Vec::new();
        if let Some(filter) = self.filter.as_deref().filter(|f| !f.trim().is_empty()) {
            parts.push(("$filter", filter.to_string()));
        }
        if !self.order_by.is_empty() {
            let keys: Vec<String> = self.order_by.iter().map(ToString::to_string).collect();
            parts.push(("$orderby", keys.join(",")));
        }
        if !self.select.is_empty() {
            parts.push(("$select", self.select.join(",")));
        }
        if let Some(skip) = self.skip {
            parts.push(("$skip", skip.to_string()));
        }
        if let Some(top) = self.top {
            parts.push(("$top", top.to_string()));
        }
        parts
    }

    /// Runs the options over a batch of records: filter, sort, skip, top and finally select.
    pub fn apply<R, I>(&self, parser: &FilterParser, records: I) -> Result<QueryResult<R>, QueryError>
    where
        R: Record,
        I: IntoIterator<Item = R>,
    {
        let compiled = parser.compile(self.filter.as_deref().unwrap_or_default())?;
        let shape = if self.select.is_empty() {
            None
        } else {
            Some(SelectShape::resolve(parser.schema(), &self.select)?)
        };

        let mut matched: Vec<R> = records
            .into_iter()
            .filter(|record| compiled.matches(record))
            .collect();
        debug!("{} records matched the filter", matched.len());

        let keys = self.sort_keys(parser);
        if !keys.is_empty() {
            let mut decorated: Vec<(Vec<Value>, R)> = matched
                .into_iter()
                .map(|record| {
                    let values = keys.iter().map(|(path, _)| read_path(&record, path)).collect();
                    (values, record)
                })
                .collect();
            decorated.sort_by(|(a, _), (b, _)| {
                keys.iter()
                    .zip(a.iter().zip(b))
                    .map(|((_, direction), (a, b))| match direction {
                        SortDirection::Ascending => sort_order(a, b),
                        SortDirection::Descending => sort_order(b, a),
                    })
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            });
            matched = decorated.into_iter().map(|(_, record)| record).collect();
        }

        let paged = matched
            .into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.top.unwrap_or(usize::MAX));
        Ok(match shape {
            Some(shape) => QueryResult::Projected(paged.map(|record| shape.project(&record)).collect()),
            None => QueryResult::Records(paged.collect()),
        })
    }

    /// Resolves the `$orderby` keys, dropping those that name no property.
    fn sort_keys(&self, parser: &FilterParser) -> Vec<(PropertyPath, SortDirection)> {
        self.order_by
            .iter()
            .filter_map(|key| match parser.schema().resolve_path(&key.path) {
                Some((path, _)) => Some((path, key.direction)),
                None => {
                    warn!(
                        "ignoring $orderby key '{}': no such property on {}",
                        key.path,
                        parser.schema().name()
                    );
                    None
                }
            })
            .collect()
    }
}

/// The records left after applying query options.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult<R> {
    Records(Vec<R>),
    /// The records reduced by `$select`.
    Projected(Vec<Projection>),
}

impl<R> QueryResult<R> {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Records(records) => records.len(),
            QueryResult::Projected(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the records, or `None` when the result was projected.
    pub fn into_records(self) -> Option<Vec<R>> {
        match self {
            QueryResult::Records(records) => Some(records),
            QueryResult::Projected(_) => None,
        }
    }
}

impl<R: Serialize> Serialize for QueryResult<R> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        match self {
            QueryResult::Records(records) => {
                for record in records {
                    seq.serialize_element(record)?;
                }
            }
            QueryResult::Projected(rows) => {
                for row in rows {
                    seq.serialize_element(row)?;
                }
            }
        }
        seq.end()
    }
}

fn decode(text: &str) -> Result<String, QueryError> {
    let text = text.replace('+', " ");
    urlencoding::decode(&text)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| QueryError::InvalidValue {
            option: "query string".to_string(),
            value: text.clone(),
        })
}

fn parse_order_by(value: &str) -> Vec<SortDescription> {
    value
        .split(',')
        .filter_map(|key| {
            let mut words = key.split_whitespace();
            let path = words.next()?;
            Some(match words.next() {
                Some(direction) if direction.eq_ignore_ascii_case("desc") => {
                    SortDescription::descending(path)
                }
                _ => SortDescription::ascending(path),
            })
        })
        .collect()
}

/// Parses `$skip`/`$top`. Negative counts mean the option is unset.
fn parse_count(option: &str, value: &str) -> Result<Option<usize>, QueryError> {
    let count: i64 = value.trim().parse().map_err(|_| QueryError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
    })?;
    Ok(usize::try_from(count).ok())
}

/// Reads a property path from a record. A missing field or a null leg reads as null.
fn read_path(record: &dyn Record, path: &PropertyPath) -> Value {
    let Some((first, rest)) = path.segments().split_first() else {
        return Value::Null;
    };
    let mut value = record.field(first).unwrap_or(Value::Null);
    for segment in rest {
        value = value.field(segment).cloned().unwrap_or(Value::Null);
    }
    value
}

/// Nulls sort first. Values that cannot be compared keep their order.
fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.compare(b).unwrap_or(Ordering::Equal),
    }
}
