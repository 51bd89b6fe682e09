//! In-process evaluation of predicate trees.

use std::cmp::Ordering;
use std::sync::Arc;

use log::warn;

use crate::ast::{BinaryOperator, Predicate, UnaryOperator};
use crate::error::EvalError;
use crate::functions::FunctionRegistry;
use crate::options::FlagsMatch;
use crate::record::Record;
use crate::schema::PropertyPath;
use crate::value::{TypeError, Value, ValueError};

/// A parsed filter ready to be run against records.
///
/// An empty filter compiles to a predicate that accepts every record.
#[derive(Debug, Clone, Default)]
pub struct CompiledPredicate {
    predicate: Option<Arc<Predicate>>,
    flags_match: FlagsMatch,
}

impl CompiledPredicate {
    pub fn new(predicate: Option<Predicate>, flags_match: FlagsMatch) -> Self {
        Self {
            predicate: predicate.map(Arc::new),
            flags_match,
        }
    }

    /// A predicate that accepts every record.
    pub fn always() -> Self {
        Self::default()
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_deref()
    }

    pub fn flags_match(&self) -> FlagsMatch {
        self.flags_match
    }

    /// Evaluates the predicate, surfacing any evaluation fault.
    pub fn try_matches(&self, record: &dyn Record) -> Result<bool, EvalError> {
        let Some(predicate) = &self.predicate else {
            return Ok(true);
        };
        let evaluator = Evaluator {
            record,
            flags_match: self.flags_match,
            functions: FunctionRegistry::shared(),
        };
        Ok(matches!(evaluator.eval(predicate)?, Value::Boolean(true)))
    }

    /// Evaluates the predicate. A record that cannot be evaluated does not match.
    pub fn matches(&self, record: &dyn Record) -> bool {
        self.try_matches(record).unwrap_or_else(|err| {
            warn!("rejecting record that failed evaluation: {err}");
            false
        })
    }
}

struct Evaluator<'a> {
    record: &'a dyn Record,
    flags_match: FlagsMatch,
    functions: &'a FunctionRegistry,
}

impl Evaluator<'_> {
    fn eval(&self, node: &Predicate) -> Result<Value, EvalError> {
        match node {
            Predicate::Property { path, .. } => self.read(path),
            Predicate::Constant { value, .. } => Ok(value.clone()),
            Predicate::Unary {
                op: UnaryOperator::Not,
                operand,
            } => match self.eval(operand)? {
                Value::Boolean(value) => Ok(Value::Boolean(!value)),
                Value::Null => Ok(Value::Null),
                other => Err(unexpected("not", "boolean", &other)),
            },
            Predicate::Binary {
                op, left, right, ..
            } => self.binary(*op, left, right),
            Predicate::Call { function, args, .. } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(self.functions.call(function.name(), &args)?)
            }
            Predicate::Constructor {
                constructor, args, ..
            } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                constructor
                    .invoke(&args)
                    .map_err(|err| EvalError::Constructor {
                        type_name: constructor.type_name().to_string(),
                        reason: err.to_string(),
                    })
            }
        }
    }

    fn read(&self, path: &PropertyPath) -> Result<Value, EvalError> {
        let Some((first, rest)) = path.segments().split_first() else {
            return Err(EvalError::MissingField(String::new()));
        };
        let mut value = self
            .record
            .field(first)
            .ok_or_else(|| EvalError::MissingField(first.clone()))?;
        for segment in rest {
            value = match value {
                Value::Object(mut entries) => entries
                    .remove(segment)
                    .ok_or_else(|| EvalError::MissingField(path.to_string()))?,
                other => {
                    return Err(EvalError::NullNavigation {
                        field: segment.clone(),
                        found: other.type_name(),
                    });
                }
            };
        }
        Ok(value)
    }

    fn binary(
        &self,
        op: BinaryOperator,
        left: &Predicate,
        right: &Predicate,
    ) -> Result<Value, EvalError> {
        match op {
            BinaryOperator::And => {
                let lhs = self.logical_operand(op, left)?;
                if lhs == Some(false) {
                    return Ok(Value::Boolean(false));
                }
                let rhs = self.logical_operand(op, right)?;
                Ok(match (lhs, rhs) {
                    (_, Some(false)) => Value::Boolean(false),
                    (Some(true), Some(true)) => Value::Boolean(true),
                    _ => Value::Null,
                })
            }
            BinaryOperator::Or => {
                let lhs = self.logical_operand(op, left)?;
                if lhs == Some(true) {
                    return Ok(Value::Boolean(true));
                }
                let rhs = self.logical_operand(op, right)?;
                Ok(match (lhs, rhs) {
                    (_, Some(true)) => Value::Boolean(true),
                    (Some(false), Some(false)) => Value::Boolean(false),
                    _ => Value::Null,
                })
            }
            _ => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                if op.is_comparison() {
                    self.compare(op, &lhs, &rhs, left).map(Value::Boolean)
                } else {
                    Ok(arithmetic(op, &lhs, &rhs)?)
                }
            }
        }
    }

    /// Evaluates an `and`/`or` operand, mapping null to `None`.
    fn logical_operand(
        &self,
        op: BinaryOperator,
        node: &Predicate,
    ) -> Result<Option<bool>, EvalError> {
        match self.eval(node)? {
            Value::Boolean(value) => Ok(Some(value)),
            Value::Null => Ok(None),
            other => Err(unexpected(op.keyword(), "boolean", &other)),
        }
    }

    fn compare(
        &self,
        op: BinaryOperator,
        lhs: &Value,
        rhs: &Value,
        left: &Predicate,
    ) -> Result<bool, EvalError> {
        let flags = left
            .result_type()
            .as_enum()
            .is_some_and(|ty| ty.is_flags());
        match op {
            BinaryOperator::Eq | BinaryOperator::Ne => {
                let equal = match (lhs, rhs) {
                    (Value::Null, Value::Null) => true,
                    (Value::Null, _) | (_, Value::Null) => false,
                    // Only `eq` tests bits; `ne` stays a plain inequality.
                    _ if flags
                        && op == BinaryOperator::Eq
                        && self.flags_match == FlagsMatch::Contains =>
                    {
                        lhs.has_flags(rhs)?
                    }
                    _ => lhs.equals(rhs),
                };
                Ok(equal == (op == BinaryOperator::Eq))
            }
            _ if lhs.is_null() || rhs.is_null() => Ok(false),
            _ => {
                let ordering = lhs.compare(rhs)?;
                Ok(match op {
                    BinaryOperator::Gt => ordering == Ordering::Greater,
                    BinaryOperator::Ge => ordering != Ordering::Less,
                    BinaryOperator::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                })
            }
        }
    }
}

fn arithmetic(op: BinaryOperator, lhs: &Value, rhs: &Value) -> Result<Value, ValueError> {
    match op {
        BinaryOperator::Add => lhs.add(rhs),
        BinaryOperator::Sub => lhs.sub(rhs),
        BinaryOperator::Mul => lhs.mul(rhs),
        BinaryOperator::Div => lhs.div(rhs),
        _ => lhs.rem(rhs),
    }
}

fn unexpected(op: &'static str, expected: &'static str, found: &Value) -> EvalError {
    EvalError::Value(ValueError::Type(TypeError::UnexpectedType {
        op,
        expected,
        found: found.type_name().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::schema::{EnumType, ValueType};
    use crate::value::EnumValue;

    fn prop(name: &str, ty: ValueType) -> Predicate {
        Predicate::property(PropertyPath::new([name]), ty)
    }

    fn record(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn empty_predicate_accepts_everything() {
        assert!(CompiledPredicate::always().matches(&record(&[])));
    }

    #[test]
    fn lifted_null_comparisons() -> anyhow::Result<()> {
        let ty = ValueType::Int32.nullable();
        let data = record(&[("A", Value::Null)]);
        let eq_null = Predicate::binary(
            BinaryOperator::Eq,
            prop("A", ty.clone()),
            Predicate::typed_constant(Value::Null, ty.clone()),
        )?;
        assert!(CompiledPredicate::new(Some(eq_null), FlagsMatch::Exact).matches(&data));

        let gt = Predicate::binary(BinaryOperator::Gt, prop("A", ty.clone()), Predicate::constant(1))?;
        assert!(!CompiledPredicate::new(Some(gt), FlagsMatch::Exact).matches(&data));

        let ne = Predicate::binary(BinaryOperator::Ne, prop("A", ty), Predicate::constant(1))?;
        assert!(CompiledPredicate::new(Some(ne), FlagsMatch::Exact).matches(&data));
        Ok(())
    }

    #[test]
    fn division_by_zero_rejects_the_record() -> anyhow::Result<()> {
        let node = Predicate::binary(
            BinaryOperator::Eq,
            Predicate::binary(
                BinaryOperator::Div,
                prop("A", ValueType::Int32),
                Predicate::constant(0),
            )?,
            Predicate::constant(1),
        )?;
        let compiled = CompiledPredicate::new(Some(node), FlagsMatch::Exact);
        let data = record(&[("A", Value::Int32(4))]);
        assert!(!compiled.matches(&data));
        assert!(matches!(
            compiled.try_matches(&data),
            Err(EvalError::Value(ValueError::DivideByZero))
        ));
        Ok(())
    }

    #[test]
    fn flags_equality_modes() -> anyhow::Result<()> {
        let flags = Arc::new(EnumType::new("Flags", true, [("A", 1), ("B", 2)]));
        let ty = ValueType::Enum(flags.clone());
        let node = Predicate::binary(
            BinaryOperator::Eq,
            prop("Kind", ty.clone()),
            Predicate::typed_constant(Value::Enum(EnumValue::new(flags.clone(), 1)), ty),
        )?;
        let data = record(&[("Kind", Value::Enum(EnumValue::new(flags, 3)))]);
        assert!(!CompiledPredicate::new(Some(node.clone()), FlagsMatch::Exact).matches(&data));
        assert!(CompiledPredicate::new(Some(node), FlagsMatch::Contains).matches(&data));
        Ok(())
    }

    #[test]
    fn flags_inequality_ignores_contains_mode() -> anyhow::Result<()> {
        let flags = Arc::new(EnumType::new("Flags", true, [("A", 1), ("B", 2)]));
        let ty = ValueType::Enum(flags.clone());
        let constant = |bits| {
            Predicate::typed_constant(Value::Enum(EnumValue::new(flags.clone(), bits)), ty.clone())
        };
        let data = record(&[("Kind", Value::Enum(EnumValue::new(flags.clone(), 3)))]);

        let ne_a = Predicate::binary(BinaryOperator::Ne, prop("Kind", ty.clone()), constant(1))?;
        assert!(CompiledPredicate::new(Some(ne_a), FlagsMatch::Contains).matches(&data));

        let ne_all = Predicate::binary(BinaryOperator::Ne, prop("Kind", ty.clone()), constant(3))?;
        assert!(!CompiledPredicate::new(Some(ne_all), FlagsMatch::Contains).matches(&data));
        Ok(())
    }

    #[test]
    fn navigation_through_null_is_an_error() -> anyhow::Result<()> {
        let node = Predicate::binary(
            BinaryOperator::Eq,
            Predicate::property(PropertyPath::new(["Complex", "Foo"]), ValueType::String),
            Predicate::constant("x"),
        )?;
        let compiled = CompiledPredicate::new(Some(node), FlagsMatch::Exact);
        let data = record(&[("Complex", Value::Null)]);
        assert!(matches!(
            compiled.try_matches(&data),
            Err(EvalError::NullNavigation { .. })
        ));
        Ok(())
    }

    #[test]
    fn and_short_circuits_before_faulting() -> anyhow::Result<()> {
        let node = Predicate::binary(
            BinaryOperator::And,
            Predicate::constant(false),
            Predicate::binary(
                BinaryOperator::Eq,
                prop("Missing", ValueType::Int32),
                Predicate::constant(1),
            )?,
        )?;
        let compiled = CompiledPredicate::new(Some(node), FlagsMatch::Exact);
        assert!(compiled.try_matches(&record(&[])).is_ok());
        Ok(())
    }
}
