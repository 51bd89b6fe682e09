use log::debug;

use crate::ast::{BinaryOperator, Predicate};
use crate::error::SerializeError;
use crate::functions::Function;
use crate::schema::PropertyPath;
use crate::serialize::{Dialect, LogicalKeyword, format_literal, serialize};
use crate::value::Value;

/// The OData-flavored filter dialect that [`FilterParser`](crate::FilterParser) reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct OData;

impl Dialect for OData {
    fn keyword(&self, op: LogicalKeyword) -> &'static str {
        match op {
            LogicalKeyword::And => "and",
            LogicalKeyword::Or => "or",
            LogicalKeyword::Not => "not",
        }
    }

    fn comparison(&self, op: BinaryOperator) -> &'static str {
        op.keyword()
    }

    fn arithmetic(&self, op: BinaryOperator, left: &str, right: &str) -> String {
        format!("{left} {} {right}", op.keyword())
    }

    fn literal(&self, value: &Value) -> Result<String, SerializeError> {
        match value {
            Value::Decimal(number) => Ok(format!("{number}M")),
            other => format_literal(other, ("true", "false")),
        }
    }

    fn property(&self, path: &PropertyPath) -> Result<String, SerializeError> {
        Ok(path.join("/"))
    }

    fn call(
        &self,
        function: Function,
        args: &[String],
        in_comparison: bool,
    ) -> Result<String, SerializeError> {
        let call = format!("{}({})", function.name(), args.join(", "));
        if function.is_string_match() && !in_comparison {
            Ok(format!("{call} eq true"))
        } else {
            Ok(call)
        }
    }
}

/// Renders a predicate as OData filter text.
pub fn to_odata(predicate: &Predicate) -> Result<String, SerializeError> {
    let text = serialize(&OData, predicate)?;
    debug!("serialized predicate to OData filter '{text}'");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ValueType;

    fn prop(name: &str, ty: ValueType) -> Predicate {
        Predicate::property(PropertyPath::new([name]), ty)
    }

    #[test]
    fn bare_string_match_gets_a_comparison() -> anyhow::Result<()> {
        let call = Predicate::call(
            Function::EndsWith,
            vec![prop("Name", ValueType::String), Predicate::constant("z")],
        )?;
        assert_eq!(to_odata(&call)?, "endswith(Name, 'z') eq true");
        Ok(())
    }

    #[test]
    fn other_functions_use_call_syntax() -> anyhow::Result<()> {
        let call = Predicate::call(Function::ToLower, vec![prop("Name", ValueType::String)])?;
        let node = Predicate::binary(BinaryOperator::Eq, call, Predicate::constant("abc"))?;
        assert_eq!(to_odata(&node)?, "tolower(Name) eq 'abc'");
        Ok(())
    }
    #[test]
    fn decimals_carry_their_suffix() -> anyhow::Result<()> {
        let node = Predicate::binary(
            BinaryOperator::Ge,
            prop("Price", ValueType::Decimal),
            Predicate::constant(rust_decimal::Decimal::new(1050, 2)),
        )?;
        assert_eq!(to_odata(&node)?, "Price ge 10.50M");
        Ok(())
    }
}
