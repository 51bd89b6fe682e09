//! An OData-flavored predicate engine.
//!
//! Filter text such as `(MessageId gt 1) and (ComplexProperty/Foo eq 'foo')` is parsed against a
//! [`TypeSchema`] into a typed [`Predicate`] tree. The tree can be evaluated against records with
//! a [`CompiledPredicate`], or rendered back out as OData or SQL-92 filter text. Host queries built
//! from [`Lambda`] expressions go the other way, through [`FilterQuery`].

pub mod ast;
pub mod builder;
pub mod compose;
pub mod error;
pub mod eval;
pub mod expr;
pub mod functions;
pub mod options;
pub mod parser;
pub mod query;
pub mod record;
pub mod registry;
pub mod schema;
pub mod select;
pub mod serialize;
pub mod stream;
pub mod tokenizer;
pub mod value;

mod cache;
mod literal;
mod lower;

pub use crate::ast::{BinaryOperator, Predicate, UnaryOperator};
pub use crate::builder::FilterQuery;
pub use crate::cache::{LOCK_TIMEOUT, TypeCache};
pub use crate::error::{
    ComposeError, EvalError, FilterSyntaxError, LowerError, QueryError, SerializeError,
};
pub use crate::eval::CompiledPredicate;
pub use crate::expr::{Expr, Lambda, Param};
pub use crate::functions::{Function, FunctionError, FunctionRegistry};
pub use crate::options::{Culture, FlagsMatch, ParserOptions};
pub use crate::parser::FilterParser;
pub use crate::query::{QueryOptions, QueryResult, SortDescription, SortDirection};
pub use crate::record::{DynamicRecord, Record};
pub use crate::registry::TypeRegistry;
pub use crate::schema::{EnumType, PropertyPath, SchemaDocument, TypeSchema, ValueType};
pub use crate::select::{Projection, SelectShape};
pub use crate::serialize::{to_odata, to_sql92};
pub use crate::stream::StreamQuery;
pub use crate::value::{TypeError, Value, ValueError, ValueResult};

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

/// Loads a record schema from a YAML file.
pub fn load_schema(path: impl AsRef<Path>) -> Result<Arc<TypeSchema>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    SchemaDocument::from_yaml_str(&contents)?.build()
}

/// Parses a filter against `schema` with default options.
pub fn parse_filter(
    schema: Arc<TypeSchema>,
    filter: &str,
) -> std::result::Result<Option<Predicate>, FilterSyntaxError> {
    FilterParser::new(schema).parse(filter)
}
