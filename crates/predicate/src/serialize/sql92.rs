use log::debug;

use crate::ast::{BinaryOperator, Predicate};
use crate::error::SerializeError;
use crate::functions::Function;
use crate::schema::PropertyPath;
use crate::serialize::{Dialect, LogicalKeyword, format_literal, haystack_and_needle, serialize};
use crate::value::Value;

/// The SQL-92 `WHERE` clause dialect used by message broker subscription filters.
///
/// Only top-level properties can be referenced, and the only functions are the string matches,
/// which become `LIKE` patterns.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sql92;

impl Sql92 {
    fn like(&self, function: Function, args: &[String], matches: bool) -> Result<String, SerializeError> {
        let (haystack, needle) = haystack_and_needle(function, args)
            .ok_or_else(|| SerializeError::UnsupportedMethod(function.name().to_string()))?;
        let needle = needle.replace('\'', "");
        let pattern = match function {
            Function::SubstringOf => format!("%{needle}%"),
            Function::EndsWith => format!("%{needle}"),
            _ => format!("{needle}%"),
        };
        let like = if matches { "LIKE" } else { "NOT LIKE" };
        Ok(format!("{haystack} {like} '{pattern}'"))
    }
}

impl Dialect for Sql92 {
    fn keyword(&self, op: LogicalKeyword) -> &'static str {
        match op {
            LogicalKeyword::And => "AND",
            LogicalKeyword::Or => "OR",
            LogicalKeyword::Not => "NOT",
        }
    }

    fn comparison(&self, op: BinaryOperator) -> &'static str {
        match op {
            BinaryOperator::Eq => "=",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::Lt => "<",
            _ => "<=",
        }
    }

    fn arithmetic(&self, op: BinaryOperator, left: &str, right: &str) -> String {
        let symbol = match op {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            _ => return format!("MOD({left}, {right})"),
        };
        format!("{left} {symbol} {right}")
    }

    fn literal(&self, value: &Value) -> Result<String, SerializeError> {
        format_literal(value, ("TRUE", "FALSE"))
    }

    fn property(&self, path: &PropertyPath) -> Result<String, SerializeError> {
        match path.segments() {
            [single] => Ok(single.clone()),
            _ => Err(SerializeError::NavigationNotSupported(path.join("."))),
        }
    }

    fn standalone_property(&self, rendered: String) -> String {
        format!("{rendered} = TRUE")
    }

    fn call(
        &self,
        function: Function,
        args: &[String],
        _in_comparison: bool,
    ) -> Result<String, SerializeError> {
        if function.is_string_match() {
            self.like(function, args, true)
        } else {
            Err(SerializeError::UnsupportedMethod(function.name().to_string()))
        }
    }

    fn string_match_comparison(
        &self,
        function: Function,
        args: &[String],
        matches: bool,
    ) -> Option<Result<String, SerializeError>> {
        Some(self.like(function, args, matches))
    }
}

/// Renders a predicate as a SQL-92 filter expression.
pub fn to_sql92(predicate: &Predicate) -> Result<String, SerializeError> {
    let text = serialize(&Sql92, predicate)?;
    debug!("serialized predicate to SQL-92 filter '{text}'");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueType;

    fn name() -> Predicate {
        Predicate::property(PropertyPath::new(["Name"]), ValueType::String)
    }

    #[test]
    fn string_matches_become_like_patterns() -> anyhow::Result<()> {
        let starts = Predicate::call(Function::StartsWith, vec![name(), Predicate::constant("ab")])?;
        assert_eq!(to_sql92(&starts)?, "Name LIKE 'ab%'");

        let contains = Predicate::call(Function::SubstringOf, vec![Predicate::constant("it's"), name()])?;
        let negated = Predicate::binary(BinaryOperator::Eq, contains, Predicate::constant(false))?;
        assert_eq!(to_sql92(&negated)?, "Name NOT LIKE '%its%'");
        Ok(())
    }

    #[test]
    fn other_functions_are_rejected() -> anyhow::Result<()> {
        let lower = Predicate::call(Function::ToLower, vec![name()])?;
        let node = Predicate::binary(BinaryOperator::Eq, lower, Predicate::constant("a"))?;
        assert_eq!(
            to_sql92(&node),
            Err(SerializeError::UnsupportedMethod("tolower".to_string()))
        );
        Ok(())
    }
    #[test]
    fn decimals_are_plain_numbers() -> anyhow::Result<()> {
        let price = Predicate::property(PropertyPath::new(["Price"]), ValueType::Decimal);
        let node = Predicate::binary(
            BinaryOperator::Lt,
            price,
            Predicate::constant(rust_decimal::Decimal::new(1050, 2)),
        )?;
        assert_eq!(to_sql92(&node)?, "Price < 10.50");
        Ok(())
    }
}
