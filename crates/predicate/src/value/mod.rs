//! Runtime value representation for predicate evaluation.
//!
//! Values support comparisons, lifted null handling and arithmetic with numeric promotion. The
//! integral widths are kept apart from doubles so that integer arithmetic behaves like the record
//! fields it came from. Integers widen to decimal, and anything mixed with a double is a double.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::ser::{Serialize, SerializeMap, Serializer};
use uuid::Uuid;

use crate::schema::EnumType;

mod date;
mod json;

pub use date::*;
pub use json::*;

/// The result of reading, converting or combining values.
pub type ValueResult<T> = Result<T, ValueError>;

/// Runtime value read from a record or produced by a predicate node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Decimal(Decimal),
    String(String),
    DateTime(NaiveDateTime),
    Guid(Uuid),
    Enum(EnumValue),
    Object(BTreeMap<String, Value>),
}

/// A value of an enum type, stored as its underlying number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub ty: Arc<EnumType>,
    pub value: i64,
}

impl EnumValue {
    pub fn new(ty: Arc<EnumType>, value: i64) -> Self {
        Self { ty, value }
    }
}

impl Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty.describe(self.value))
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(value) => write!(f, "{value}"),
            Value::Int32(value) => write!(f, "{value}"),
            Value::Int64(value) => write!(f, "{value}"),
            Value::Double(value) => write!(f, "{value}"),
            Value::Decimal(value) => write!(f, "{value}"),
            Value::String(text) => write!(f, "{text}"),
            Value::DateTime(datetime) => write!(f, "{}", datetime.format(DISPLAY_FORMAT)),
            Value::Guid(guid) => write!(f, "{guid}"),
            Value::Enum(value) => write!(f, "{value}"),
            Value::Object(entries) => {
                let rendered: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
        }
    }
}

impl Value {
    /// The name of this value's runtime type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Guid(_) => "guid",
            Value::Enum(_) => "enum",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the value as an `i64` if it is integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(value) => Some(i64::from(*value)),
            Value::Int64(value) => Some(*value),
            Value::Enum(value) => Some(value.value),
            _ => None,
        }
    }

    /// Returns the value as an `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(value) => Some(f64::from(*value)),
            Value::Int64(value) => Some(*value as f64),
            Value::Double(value) => Some(*value),
            Value::Decimal(value) => value.to_f64(),
            _ => None,
        }
    }

    /// Returns the value as a [`Decimal`] if it is a decimal or an integer.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Int32(value) => Some(Decimal::from(*value)),
            Value::Int64(value) => Some(Decimal::from(*value)),
            Value::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    /// Reads a field from an object value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(entries) => entries.get(name),
            _ => None,
        }
    }

    /// Orders two non-null values of compatible types.
    ///
    /// Null is not ordered against anything; callers apply lifted null semantics first.
    pub fn compare(&self, other: &Value) -> ValueResult<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Ok(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Ok(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) => Ok(a.value.cmp(&b.value)),
            _ => match numeric_pair(self, other) {
                Some(Numeric::Integral(lhs, rhs)) => Ok(lhs.cmp(&rhs)),
                Some(Numeric::Decimal(lhs, rhs)) => Ok(lhs.cmp(&rhs)),
                Some(Numeric::Double(lhs, rhs)) => {
                    lhs.partial_cmp(&rhs)
                        .ok_or(ValueError::InvalidComparison {
                            left: self.type_name(),
                            right: other.type_name(),
                        })
                }
                None => Err(ValueError::Type(TypeError::InvalidOperation {
                    op: "compare",
                    left: self.type_name(),
                    right: other.type_name(),
                })),
            },
        }
    }

    /// Returns whether two values are equal, comparing numbers across widths.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Enum(a), Value::Enum(b)) => a.value == b.value,
            (Value::Enum(a), other) | (other, Value::Enum(a)) => {
                other.as_i64().is_some_and(|value| value == a.value)
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value.equals(other)))
            }
            _ => match numeric_pair(self, other) {
                Some(Numeric::Integral(lhs, rhs)) => lhs == rhs,
                Some(Numeric::Decimal(lhs, rhs)) => lhs == rhs,
                Some(Numeric::Double(lhs, rhs)) => lhs == rhs,
                None => self == other,
            },
        }
    }

    /// Returns whether every bit of `flag` is set in this value, i.e. `(self & flag) == flag`.
    pub fn has_flags(&self, flag: &Value) -> ValueResult<bool> {
        match (self.as_i64(), flag.as_i64()) {
            (Some(value), Some(flag)) => Ok(value & flag == flag),
            _ => Err(ValueError::Type(TypeError::InvalidOperation {
                op: "has flags",
                left: self.type_name(),
                right: flag.type_name(),
            })),
        }
    }

    /// Adds two numeric values.
    pub fn add(&self, other: &Value) -> ValueResult<Value> {
        self.arithmetic(other, "add", i64::wrapping_add, Decimal::checked_add, |a, b| a + b)
    }

    /// Subtracts one numeric value from another.
    pub fn sub(&self, other: &Value) -> ValueResult<Value> {
        self.arithmetic(other, "sub", i64::wrapping_sub, Decimal::checked_sub, |a, b| a - b)
    }

    /// Multiplies numeric values together.
    pub fn mul(&self, other: &Value) -> ValueResult<Value> {
        self.arithmetic(other, "mul", i64::wrapping_mul, Decimal::checked_mul, |a, b| a * b)
    }

    /// Divides one numeric value by another. Integral or decimal division by zero is an error.
    pub fn div(&self, other: &Value) -> ValueResult<Value> {
        if is_exact_zero_divisor(self, other) {
            return Err(ValueError::DivideByZero);
        }
        self.arithmetic(other, "div", i64::wrapping_div, Decimal::checked_div, |a, b| a / b)
    }

    /// Computes the remainder of dividing two numeric values.
    pub fn rem(&self, other: &Value) -> ValueResult<Value> {
        if is_exact_zero_divisor(self, other) {
            return Err(ValueError::DivideByZero);
        }
        self.arithmetic(other, "mod", i64::wrapping_rem, Decimal::checked_rem, |a, b| a % b)
    }

    fn arithmetic(
        &self,
        other: &Value,
        op: &'static str,
        integral: fn(i64, i64) -> i64,
        decimal: fn(Decimal, Decimal) -> Option<Decimal>,
        double: fn(f64, f64) -> f64,
    ) -> ValueResult<Value> {
        if self.is_null() || other.is_null() {
            return Ok(Value::Null);
        }
        match numeric_pair(self, other) {
            Some(Numeric::Integral(lhs, rhs)) => {
                let result = integral(lhs, rhs);
                if matches!(self, Value::Int64(_)) || matches!(other, Value::Int64(_)) {
                    Ok(Value::Int64(result))
                } else {
                    // Both operands are 32-bit, so truncating keeps the wrapping semantics.
                    Ok(Value::Int32(result as i32))
                }
            }
            Some(Numeric::Decimal(lhs, rhs)) => decimal(lhs, rhs)
                .map(Value::Decimal)
                .ok_or_else(|| ValueError::Message(format!("decimal {op} overflowed"))),
            Some(Numeric::Double(lhs, rhs)) => Ok(Value::Double(double(lhs, rhs))),
            None => Err(ValueError::Type(TypeError::InvalidOperation {
                op,
                left: self.type_name(),
                right: other.type_name(),
            })),
        }
    }
}

enum Numeric {
    Integral(i64, i64),
    Decimal(Decimal, Decimal),
    Double(f64, f64),
}

fn numeric_pair(left: &Value, right: &Value) -> Option<Numeric> {
    match (left, right) {
        (Value::Int32(_) | Value::Int64(_), Value::Int32(_) | Value::Int64(_)) => {
            Some(Numeric::Integral(left.as_i64()?, right.as_i64()?))
        }
        (Value::Decimal(_), Value::Int32(_) | Value::Int64(_) | Value::Decimal(_))
        | (Value::Int32(_) | Value::Int64(_), Value::Decimal(_)) => {
            Some(Numeric::Decimal(left.as_decimal()?, right.as_decimal()?))
        }
        _ => Some(Numeric::Double(left.as_f64()?, right.as_f64()?)),
    }
}

fn is_exact_zero_divisor(left: &Value, right: &Value) -> bool {
    match numeric_pair(left, right) {
        Some(Numeric::Integral(_, rhs)) => rhs == 0,
        Some(Numeric::Decimal(_, rhs)) => rhs.is_zero(),
        _ => false,
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Int32(value) => serializer.serialize_i32(*value),
            Value::Int64(value) => serializer.serialize_i64(*value),
            Value::Double(value) => serializer.serialize_f64(*value),
            Value::Decimal(value) => serializer.collect_str(value),
            Value::String(text) => serializer.serialize_str(text),
            Value::DateTime(datetime) => {
                serializer.collect_str(&datetime.format(DISPLAY_FORMAT))
            }
            Value::Guid(guid) => serializer.collect_str(guid),
            Value::Enum(value) => serializer.collect_str(value),
            Value::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// A failed conversion, comparison or arithmetic operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    Type(TypeError),
    InvalidConversion { from: &'static str, to: String },
    InvalidComparison {
        left: &'static str,
        right: &'static str,
    },
    DivideByZero,
    Message(String),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueError::Type(err) => write!(f, "{err}"),
            ValueError::InvalidConversion { from, to } => {
                write!(f, "cannot convert {from} to {to}")
            }
            ValueError::InvalidComparison { left, right } => {
                write!(f, "cannot compare {left} with {right}")
            }
            ValueError::DivideByZero => write!(f, "attempted to divide by zero"),
            ValueError::Message(message) => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for ValueError {}

impl From<TypeError> for ValueError {
    fn from(value: TypeError) -> Self {
        ValueError::Type(value)
    }
}

/// An operator applied to operand types it does not support.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    InvalidOperation {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    InvalidUnary {
        op: &'static str,
        operand: &'static str,
    },
    /// Operand types that cannot be combined by a predicate operator
    IncompatibleOperands {
        op: &'static str,
        left: String,
        right: String,
    },
    /// An operand of the wrong static type
    UnexpectedType {
        op: &'static str,
        expected: &'static str,
        found: String,
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::InvalidOperation { op, left, right } => {
                write!(
                    f,
                    "operation '{op}' is not supported for {left} and {right}"
                )
            }
            TypeError::InvalidUnary { op, operand } => {
                write!(f, "operation '{op}' is not supported for {operand}")
            }
            TypeError::IncompatibleOperands { op, left, right } => {
                write!(f, "operator '{op}' cannot combine {left} with {right}")
            }
            TypeError::UnexpectedType {
                op,
                expected,
                found,
            } => {
                write!(f, "operator '{op}' expects {expected} operands, found {found}")
            }
        }
    }
}

impl std::error::Error for TypeError {}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Guid(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_promotes_widths() {
        assert_eq!(
            Value::Int32(2).add(&Value::Int32(3)).unwrap(),
            Value::Int32(5)
        );
        assert_eq!(
            Value::Int32(2).mul(&Value::Int64(3)).unwrap(),
            Value::Int64(6)
        );
        assert_eq!(
            Value::Int32(7).div(&Value::Double(2.0)).unwrap(),
            Value::Double(3.5)
        );
        assert_eq!(
            Value::Int32(7).div(&Value::Int32(2)).unwrap(),
            Value::Int32(3)
        );
        assert_eq!(
            Value::Int32(17).rem(&Value::Int32(2)).unwrap(),
            Value::Int32(1)
        );
    }

    #[test]
    fn decimals_stay_exact() {
        let tenth = Value::Decimal(Decimal::new(1, 1));
        assert_eq!(
            tenth.add(&Value::Decimal(Decimal::new(2, 1))).unwrap(),
            Value::Decimal(Decimal::new(3, 1))
        );
        assert_eq!(
            Value::Int32(2).mul(&tenth).unwrap(),
            Value::Decimal(Decimal::new(2, 1))
        );
        assert!(matches!(
            tenth.add(&Value::Double(0.5)).unwrap(),
            Value::Double(sum) if (sum - 0.6).abs() < 1e-9
        ));
        assert_eq!(
            tenth.div(&Value::Decimal(Decimal::ZERO)),
            Err(ValueError::DivideByZero)
        );
        assert!(Value::Decimal(Decimal::MAX).add(&Value::Int32(1)).is_err());
        assert!(Value::Int64(3).equals(&Value::Decimal(Decimal::new(30, 1))));
        assert_eq!(
            tenth.compare(&Value::Int32(1)).unwrap(),
            Ordering::Less
        );
    }

    #[test]
    fn integer_overflow_wraps() {
        assert_eq!(
            Value::Int32(i32::MAX).add(&Value::Int32(1)).unwrap(),
            Value::Int32(i32::MIN)
        );
    }

    #[test]
    fn integral_division_by_zero_fails() {
        assert_eq!(
            Value::Int32(1).div(&Value::Int32(0)),
            Err(ValueError::DivideByZero)
        );
        assert_eq!(
            Value::Double(1.0).div(&Value::Int32(0)).unwrap(),
            Value::Double(f64::INFINITY)
        );
    }

    #[test]
    fn null_is_lifted_through_arithmetic() {
        assert_eq!(Value::Null.add(&Value::Int32(1)).unwrap(), Value::Null);
    }

    #[test]
    fn equality_crosses_numeric_widths() {
        assert!(Value::Int32(3).equals(&Value::Int64(3)));
        assert!(Value::Int32(3).equals(&Value::Double(3.0)));
        assert!(!Value::Int32(3).equals(&Value::String("3".into())));
        assert!(Value::Null.equals(&Value::Null));
    }

    #[test]
    fn comparison_rejects_mismatched_types() {
        assert_eq!(
            Value::Int32(1).compare(&Value::Int64(2)).unwrap(),
            Ordering::Less
        );
        assert!(Value::Int32(1).compare(&Value::from("a")).is_err());
        assert!(Value::Double(f64::NAN).compare(&Value::Double(1.0)).is_err());
    }

    #[test]
    fn flags_check_is_bitwise() {
        let flags = Arc::new(EnumType::new("Flags", true, [("A", 1), ("B", 2), ("C", 4)]));
        let value = Value::Enum(EnumValue::new(flags.clone(), 3));
        let a = Value::Enum(EnumValue::new(flags.clone(), 1));
        let c = Value::Enum(EnumValue::new(flags, 4));
        assert!(value.has_flags(&a).unwrap());
        assert!(!value.has_flags(&c).unwrap());
        assert!(!value.equals(&a));
    }
}
