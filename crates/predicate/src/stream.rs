//! Applying query options to event streams.
//!
//! A stream can be filtered and paged, but not sorted or projected, since neither makes sense
//! for a sequence that may never end.

use futures::future;
use futures::stream::{BoxStream, Stream, StreamExt};
use log::debug;
use url::Url;

use crate::error::QueryError;
use crate::eval::CompiledPredicate;
use crate::parser::FilterParser;
use crate::query::QueryOptions;
use crate::record::Record;

/// A query read from a subscription URI, ready to apply to a stream.
#[derive(Debug, Clone, Default)]
pub struct StreamQuery {
    filter: CompiledPredicate,
    skip: Option<usize>,
    top: Option<usize>,
}

impl StreamQuery {
    /// Reads the query options of `url`. `$orderby` and `$select` are rejected.
    pub fn from_url(url: &Url, parser: &FilterParser) -> Result<Self, QueryError> {
        let options = QueryOptions::from_pairs(url.query_pairs())?;
        Self::from_options(&options, parser)
    }

    pub fn from_options(options: &QueryOptions, parser: &FilterParser) -> Result<Self, QueryError> {
        if !options.order_by.is_empty() {
            return Err(QueryError::NotSupported("orderby".to_string()));
        }
        if !options.select.is_empty() {
            return Err(QueryError::NotSupported("select".to_string()));
        }
        let filter = parser.compile(options.filter.as_deref().unwrap_or_default())?;
        debug!(
            "stream query: filter {:?}, skip {:?}, top {:?}",
            filter.predicate(),
            options.skip,
            options.top
        );
        Ok(Self {
            filter,
            skip: options.skip,
            top: options.top,
        })
    }

    pub fn filter(&self) -> &CompiledPredicate {
        &self.filter
    }

    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    pub fn top(&self) -> Option<usize> {
        self.top
    }

    /// Filters, then skips, then takes.
    pub fn apply<'a, S, R>(self, stream: S) -> BoxStream<'a, R>
    where
        S: Stream<Item = R> + Send + 'a,
        R: Record + Send + 'a,
    {
        let filter = self.filter;
        stream
            .filter(move |record| future::ready(filter.matches(record)))
            .skip(self.skip.unwrap_or(0))
            .take(self.top.unwrap_or(usize::MAX))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use futures::executor::block_on;
    use futures::stream;

    use super::*;
    use crate::schema::{TypeSchema, ValueType};
    use crate::value::Value;

    fn parser() -> FilterParser {
        FilterParser::new(Arc::new(
            TypeSchema::new("Tick").with_field("Id", ValueType::Int32),
        ))
    }

    fn ticks(range: std::ops::Range<i32>) -> Vec<BTreeMap<String, Value>> {
        range
            .map(|id| BTreeMap::from([("Id".to_string(), Value::Int32(id))]))
            .collect()
    }

    #[test]
    fn filters_then_pages() -> anyhow::Result<()> {
        let url = Url::parse("http://localhost/ticks?$filter=Id%20gt%203&$skip=1&$top=2")?;
        let query = StreamQuery::from_url(&url, &parser())?;
        let ids: Vec<Value> = block_on(
            query
                .apply(stream::iter(ticks(0..10)))
                .map(|tick| tick["Id"].clone())
                .collect::<Vec<_>>(),
        );
        assert_eq!(ids, [Value::Int32(5), Value::Int32(6)]);
        Ok(())
    }

    #[test]
    fn ordering_is_not_supported() -> anyhow::Result<()> {
        let url = Url::parse("http://localhost/ticks?$orderby=Id")?;
        let err = StreamQuery::from_url(&url, &parser()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The query operator 'orderby' is not supported for event streams"
        );
        Ok(())
    }
}
