//! Building queries from host lambdas.

use std::sync::Arc;

use url::Url;

use crate::ast::Predicate;
use crate::compose::and_merge;
use crate::error::{ComposeError, LowerError, QueryError};
use crate::expr::Lambda;
use crate::query::QueryOptions;
use crate::schema::TypeSchema;
use crate::serialize::{to_odata, to_sql92};

/// A query over records of one schema, built from host lambdas.
///
/// Each call to [`filter`](FilterQuery::filter) narrows the query further.
#[derive(Debug, Clone)]
pub struct FilterQuery {
    schema: Arc<TypeSchema>,
    filter: Option<Lambda>,
    skip: usize,
    top: usize,
}

impl FilterQuery {
    pub fn new(schema: Arc<TypeSchema>) -> Self {
        Self {
            schema,
            filter: None,
            skip: 0,
            top: 0,
        }
    }

    /// Adds a predicate, combined with any existing one using `&&`.
    pub fn filter(mut self, predicate: Lambda) -> Result<Self, QueryError> {
        self.filter = Some(match self.filter.take() {
            Some(existing) => and_merge(&existing, &predicate)?,
            None => single_parameter(predicate)?,
        });
        Ok(self)
    }

    /// Skips the first `count` records.
    pub fn skip(mut self, count: usize) -> Self {
        self.skip = count;
        self
    }

    /// Keeps at most `count` records. Zero means no limit.
    pub fn take(mut self, count: usize) -> Self {
        self.top = count;
        self
    }

    pub fn lambda(&self) -> Option<&Lambda> {
        self.filter.as_ref()
    }

    /// Lowers the combined filter against the schema.
    pub fn predicate(&self) -> Result<Option<Predicate>, LowerError> {
        self.filter
            .as_ref()
            .map(|lambda| lambda.to_predicate(&self.schema))
            .transpose()
    }

    /// The filter as OData text. A query without a filter renders as empty text.
    pub fn to_odata(&self) -> Result<String, QueryError> {
        match self.predicate()? {
            Some(predicate) => Ok(to_odata(&predicate)?),
            None => Ok(String::new()),
        }
    }

    /// The filter as a SQL-92 `WHERE` condition.
    pub fn to_sql92(&self) -> Result<String, QueryError> {
        match self.predicate()? {
            Some(predicate) => Ok(to_sql92(&predicate)?),
            None => Ok(String::new()),
        }
    }

    pub fn to_options(&self) -> Result<QueryOptions, QueryError> {
        let filter = self.to_odata()?;
        Ok(QueryOptions {
            filter: (!filter.trim().is_empty()).then_some(filter),
            skip: (self.skip > 0).then_some(self.skip),
            top: (self.top > 0).then_some(self.top),
            ..Default::default()
        })
    }

    /// Renders the query as it goes on the wire, e.g. `?$filter=Id eq 1&$top=5`.
    ///
    /// Values are not percent-encoded; use [`to_uri`](FilterQuery::to_uri) for a usable URI.
    pub fn to_query_string(&self) -> Result<String, QueryError> {
        let parts = self.to_options()?.parts();
        if parts.is_empty() {
            return Ok(String::new());
        }
        let joined: Vec<String> = parts
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        Ok(format!("?{}", joined.join("&")))
    }

    pub fn to_uri(&self, base: &Url) -> Result<Url, QueryError> {
        Ok(self.to_options()?.to_uri(base))
    }
}

/// Checks that a lone lambda is a predicate over one parameter.
fn single_parameter(predicate: Lambda) -> Result<Lambda, ComposeError> {
    match predicate.params().len() {
        1 => Ok(predicate),
        n => Err(ComposeError::NotAPredicate(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, Param};
    use crate::schema::ValueType;

    fn schema() -> Arc<TypeSchema> {
        Arc::new(TypeSchema::new("Message").with_field("MessageId", ValueType::Int32))
    }

    #[test]
    fn chained_filters_are_merged() -> anyhow::Result<()> {
        let x = Param::new("x");
        let y = Param::new("y");
        let query = FilterQuery::new(schema())
            .filter(Lambda::unary(
                x.clone(),
                Expr::param(&x).member("MessageId").gt(Expr::constant(1)),
            ))?
            .filter(Lambda::unary(
                y.clone(),
                Expr::param(&y).member("MessageId").lt(Expr::constant(5)),
            ))?;
        assert_eq!(query.to_odata()?, "(MessageId gt 1) and (MessageId lt 5)");
        assert_eq!(query.to_sql92()?, "(MessageId > 1) AND (MessageId < 5)");
        Ok(())
    }

    #[test]
    fn paging_without_a_filter() -> anyhow::Result<()> {
        let query = FilterQuery::new(schema()).skip(5).take(5);
        assert_eq!(query.to_query_string()?, "?$skip=5&$top=5");
        assert_eq!(FilterQuery::new(schema()).to_query_string()?, "");
        Ok(())
    }
}
