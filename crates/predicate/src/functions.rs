//! The filter function table.
//!
//! [`Function`] names every function a filter can call and knows its static signature, while the
//! [`FunctionRegistry`] holds the implementations used during evaluation.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDateTime, Timelike};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::schema::ValueType;
use crate::value::{TypeError, Value};

#[derive(Debug, Error)]
pub enum FunctionError {
    /// The call passed too many or too few arguments
    #[error("incorrect number of arguments, expected {expected}, got {found}")]
    IncorrectArgumentCount { expected: usize, found: usize },
    /// An argument has the wrong runtime type
    #[error(
        "incorrect argument type, argument at index {index} is type {found_type}, expected {expected_type}"
    )]
    IncorrectArgumentType {
        index: usize,
        found_type: String,
        expected_type: String,
    },
    /// No function is registered under the name
    #[error("function {0} does not exist")]
    DoesNotExist(String),
    /// The error returned from a function. This means the function itself failed and not the
    /// function registry.
    #[error(transparent)]
    CallError(#[from] anyhow::Error),
}

/// What a filter function call returns
pub type FunctionResult = Result<Value, FunctionError>;

/// A registered filter function
pub type FunctionImpl = Box<dyn for<'a> Fn(&'a [Value]) -> FunctionResult + Send + Sync>;

/// Functions that can be called from a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    SubstringOf,
    EndsWith,
    StartsWith,
    Length,
    IndexOf,
    Substring,
    ToLower,
    ToUpper,
    Trim,
    Hour,
    Minute,
    Second,
    Day,
    Month,
    Year,
    Round,
    Floor,
    Ceiling,
}

impl Function {
    pub const ALL: [Function; 18] = [
        Function::SubstringOf,
        Function::EndsWith,
        Function::StartsWith,
        Function::Length,
        Function::IndexOf,
        Function::Substring,
        Function::ToLower,
        Function::ToUpper,
        Function::Trim,
        Function::Hour,
        Function::Minute,
        Function::Second,
        Function::Day,
        Function::Month,
        Function::Year,
        Function::Round,
        Function::Floor,
        Function::Ceiling,
    ];

    /// Looks up a function by its filter name, ignoring case.
    pub fn from_name(name: &str) -> Option<Function> {
        let name = name.trim();
        Function::ALL
            .into_iter()
            .find(|function| function.name().eq_ignore_ascii_case(name))
    }

    /// The name used for the function in filter text.
    pub fn name(self) -> &'static str {
        match self {
            Function::SubstringOf => "substringof",
            Function::EndsWith => "endswith",
            Function::StartsWith => "startswith",
            Function::Length => "length",
            Function::IndexOf => "indexof",
            Function::Substring => "substring",
            Function::ToLower => "tolower",
            Function::ToUpper => "toupper",
            Function::Trim => "trim",
            Function::Hour => "hour",
            Function::Minute => "minute",
            Function::Second => "second",
            Function::Day => "day",
            Function::Month => "month",
            Function::Year => "year",
            Function::Round => "round",
            Function::Floor => "floor",
            Function::Ceiling => "ceiling",
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Function::SubstringOf
            | Function::EndsWith
            | Function::StartsWith
            | Function::IndexOf
            | Function::Substring => 2,
            _ => 1,
        }
    }

    /// Whether the function is one of the string matching predicates.
    pub fn is_string_match(self) -> bool {
        matches!(
            self,
            Function::SubstringOf | Function::EndsWith | Function::StartsWith
        )
    }

    /// The static type expected for the argument at `index`, when it is fixed.
    ///
    /// Arguments without a fixed type take the type of the other argument.
    pub fn parameter_type(self, index: usize) -> Option<ValueType> {
        match (self, index) {
            (Function::Substring, 1) => Some(ValueType::Int32),
            _ => None,
        }
    }

    /// Checks the argument types and returns the result type of a call.
    pub fn result_type(self, args: &[ValueType]) -> Result<ValueType, TypeError> {
        if args.len() != self.arity() {
            return Err(TypeError::UnexpectedType {
                op: self.name(),
                expected: if self.arity() == 1 {
                    "one argument"
                } else {
                    "two arguments"
                },
                found: format!("{} arguments", args.len()),
            });
        }
        let expect = |index: usize, expected: &'static str, ok: fn(&ValueType) -> bool| {
            let ty = &args[index];
            if ok(ty) || matches!(ty, ValueType::Null) {
                Ok(())
            } else {
                Err(TypeError::UnexpectedType {
                    op: self.name(),
                    expected,
                    found: ty.to_string(),
                })
            }
        };
        let is_string = |ty: &ValueType| matches!(ty.underlying(), ValueType::String);
        let is_date = |ty: &ValueType| matches!(ty.underlying(), ValueType::DateTime);
        match self {
            Function::SubstringOf | Function::EndsWith | Function::StartsWith => {
                expect(0, "string", is_string)?;
                expect(1, "string", is_string)?;
                Ok(ValueType::Boolean)
            }
            Function::IndexOf => {
                expect(0, "string", is_string)?;
                expect(1, "string", is_string)?;
                Ok(ValueType::Int32)
            }
            Function::Substring => {
                expect(0, "string", is_string)?;
                expect(1, "integer", ValueType::is_integral)?;
                Ok(ValueType::String)
            }
            Function::Length => {
                expect(0, "string", is_string)?;
                Ok(ValueType::Int32)
            }
            Function::ToLower | Function::ToUpper | Function::Trim => {
                expect(0, "string", is_string)?;
                Ok(ValueType::String)
            }
            Function::Hour
            | Function::Minute
            | Function::Second
            | Function::Day
            | Function::Month
            | Function::Year => {
                expect(0, "datetime", is_date)?;
                Ok(ValueType::Int32)
            }
            // Decimal arguments keep their precision; everything else rounds as a double.
            Function::Round | Function::Floor | Function::Ceiling => {
                expect(0, "numeric", ValueType::is_numeric)?;
                match args[0].underlying() {
                    ValueType::Decimal => Ok(ValueType::Decimal),
                    _ => Ok(ValueType::Double),
                }
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionImpl>,
}

static BUILTIN: LazyLock<FunctionRegistry> = LazyLock::new(FunctionRegistry::builtin);

impl FunctionRegistry {
    /// A registry with no functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a function registry with every function of the filter table registered.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register(Function::SubstringOf.name(), substringof_fn);
        registry.register(Function::EndsWith.name(), endswith_fn);
        registry.register(Function::StartsWith.name(), startswith_fn);
        registry.register(Function::Length.name(), length_fn);
        registry.register(Function::IndexOf.name(), indexof_fn);
        registry.register(Function::Substring.name(), substring_fn);
        registry.register(Function::ToLower.name(), |args| {
            string_fn(args, |s| s.to_lowercase())
        });
        registry.register(Function::ToUpper.name(), |args| {
            string_fn(args, |s| s.to_uppercase())
        });
        registry.register(Function::Trim.name(), |args| {
            string_fn(args, |s| s.trim().to_string())
        });
        registry.register(Function::Hour.name(), |args| date_part_fn(args, |d| d.hour()));
        registry.register(Function::Minute.name(), |args| {
            date_part_fn(args, |d| d.minute())
        });
        registry.register(Function::Second.name(), |args| {
            date_part_fn(args, |d| d.second())
        });
        registry.register(Function::Day.name(), |args| date_part_fn(args, |d| d.day()));
        registry.register(Function::Month.name(), |args| {
            date_part_fn(args, |d| d.month())
        });
        registry.register(Function::Year.name(), |args| {
            date_part_fn(args, |d| d.year() as u32)
        });
        registry.register(Function::Round.name(), |args| {
            numeric_fn(args, f64::round_ties_even, |value| value.round())
        });
        registry.register(Function::Floor.name(), |args| {
            numeric_fn(args, f64::floor, |value| value.floor())
        });
        registry.register(Function::Ceiling.name(), |args| {
            numeric_fn(args, f64::ceil, |value| value.ceil())
        });
        registry
    }

    /// Returns the process-wide registry holding the builtin functions.
    pub fn shared() -> &'static FunctionRegistry {
        &BUILTIN
    }

    /// Looks up `name` and invokes it with `args`
    pub fn call(&self, name: &str, args: &[Value]) -> FunctionResult {
        let f = self
            .functions
            .get(name)
            .ok_or_else(|| FunctionError::DoesNotExist(name.to_string()))?;
        f(args)
    }

    /// Adds or replaces the function called `name`
    pub fn register<F>(&mut self, name: &'static str, function: F)
    where
        F: for<'a> Fn(&'a [Value]) -> FunctionResult + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(function));
    }
}

fn expect_count(args: &[Value], expected: usize) -> Result<(), FunctionError> {
    if args.len() != expected {
        return Err(FunctionError::IncorrectArgumentCount {
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

fn string_arg(args: &[Value], index: usize) -> Result<&str, FunctionError> {
    match args.get(index) {
        Some(Value::String(text)) => Ok(text),
        Some(val) => Err(FunctionError::IncorrectArgumentType {
            index,
            found_type: val.type_name().to_string(),
            expected_type: "string".to_string(),
        }),
        None => Err(FunctionError::IncorrectArgumentCount {
            expected: index + 1,
            found: args.len(),
        }),
    }
}

// substringof takes the needle first, so `substringof('a', Name)` reads as "'a' is a substring of
// Name".
fn substringof_fn(args: &[Value]) -> FunctionResult {
    expect_count(args, 2)?;
    let needle = string_arg(args, 0)?;
    let haystack = string_arg(args, 1)?;
    Ok(Value::Boolean(haystack.contains(needle)))
}

fn endswith_fn(args: &[Value]) -> FunctionResult {
    expect_count(args, 2)?;
    let text = string_arg(args, 0)?.to_lowercase();
    let suffix = string_arg(args, 1)?.to_lowercase();
    Ok(Value::Boolean(text.ends_with(&suffix)))
}

fn startswith_fn(args: &[Value]) -> FunctionResult {
    expect_count(args, 2)?;
    let text = string_arg(args, 0)?.to_lowercase();
    let prefix = string_arg(args, 1)?.to_lowercase();
    Ok(Value::Boolean(text.starts_with(&prefix)))
}

fn length_fn(args: &[Value]) -> FunctionResult {
    expect_count(args, 1)?;
    let count = string_arg(args, 0)?.chars().count();
    Ok(Value::Int32(i32::try_from(count).map_err(anyhow::Error::from)?))
}

fn indexof_fn(args: &[Value]) -> FunctionResult {
    expect_count(args, 2)?;
    let text = string_arg(args, 0)?.to_lowercase();
    let needle = string_arg(args, 1)?.to_lowercase();
    let index = match text.find(&needle) {
        Some(byte_index) => {
            i32::try_from(text[..byte_index].chars().count()).map_err(anyhow::Error::from)?
        }
        None => -1,
    };
    Ok(Value::Int32(index))
}

fn substring_fn(args: &[Value]) -> FunctionResult {
    expect_count(args, 2)?;
    let text = string_arg(args, 0)?;
    let start = args[1]
        .as_i64()
        .ok_or_else(|| FunctionError::IncorrectArgumentType {
            index: 1,
            found_type: args[1].type_name().to_string(),
            expected_type: "integer".to_string(),
        })?;
    let length = text.chars().count();
    let start = usize::try_from(start)
        .ok()
        .filter(|start| *start <= length)
        .ok_or_else(|| {
            anyhow::anyhow!("substring start {start} is outside a string of length {length}")
        })?;
    Ok(Value::String(text.chars().skip(start).collect()))
}

fn string_fn(args: &[Value], f: impl Fn(&str) -> String) -> FunctionResult {
    expect_count(args, 1)?;
    Ok(Value::String(f(string_arg(args, 0)?)))
}

fn date_part_fn(args: &[Value], part: impl Fn(&NaiveDateTime) -> u32) -> FunctionResult {
    expect_count(args, 1)?;
    match &args[0] {
        Value::DateTime(datetime) => {
            Ok(Value::Int32(part(datetime) as i32))
        }
        val => Err(FunctionError::IncorrectArgumentType {
            index: 0,
            found_type: val.type_name().to_string(),
            expected_type: "datetime".to_string(),
        }),
    }
}

fn numeric_fn(
    args: &[Value],
    double: fn(f64) -> f64,
    decimal: fn(Decimal) -> Decimal,
) -> FunctionResult {
    expect_count(args, 1)?;
    if let Value::Decimal(value) = &args[0] {
        return Ok(Value::Decimal(decimal(*value)));
    }
    let value = args[0]
        .as_f64()
        .ok_or_else(|| FunctionError::IncorrectArgumentType {
            index: 0,
            found_type: args[0].type_name().to_string(),
            expected_type: "numeric".to_string(),
        })?;
    Ok(Value::Double(double(value)))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn call(name: &str, args: &[Value]) -> Value {
        FunctionRegistry::shared()
            .call(name, args)
            .expect("function call should succeed")
    }

    #[test]
    fn string_matching_is_case_insensitive_except_substringof() {
        assert_eq!(
            call("endswith", &["Hello".into(), "LLO".into()]),
            Value::Boolean(true)
        );
        assert_eq!(
            call("startswith", &["Hello".into(), "hE".into()]),
            Value::Boolean(true)
        );
        assert_eq!(
            call("substringof", &["ell".into(), "Hello".into()]),
            Value::Boolean(true)
        );
        assert_eq!(
            call("substringof", &["ELL".into(), "Hello".into()]),
            Value::Boolean(false)
        );
    }

    #[test]
    fn indexof_and_substring_use_character_positions() {
        assert_eq!(
            call("indexof", &["héllo".into(), "L".into()]),
            Value::Int32(2)
        );
        assert_eq!(call("indexof", &["abc".into(), "z".into()]), Value::Int32(-1));
        assert_eq!(
            call("substring", &["héllo".into(), Value::Int32(1)]),
            Value::from("éllo")
        );
        assert!(
            FunctionRegistry::shared()
                .call("substring", &["abc".into(), Value::Int32(4)])
                .is_err()
        );
    }

    #[test]
    fn round_uses_bankers_rounding() {
        assert_eq!(call("round", &[Value::Double(2.5)]), Value::Double(2.0));
        assert_eq!(call("round", &[Value::Double(3.5)]), Value::Double(4.0));
        assert_eq!(call("floor", &[Value::Int32(3)]), Value::Double(3.0));
        assert_eq!(call("ceiling", &[Value::Double(3.1)]), Value::Double(4.0));
    }

    #[test]
    fn rounding_keeps_decimals_decimal() {
        let decimal = |num, scale| Value::Decimal(Decimal::new(num, scale));
        assert_eq!(call("round", &[decimal(25, 1)]), decimal(2, 0));
        assert_eq!(call("round", &[decimal(35, 1)]), decimal(4, 0));
        assert_eq!(call("floor", &[decimal(-31, 1)]), decimal(-4, 0));
        assert_eq!(call("ceiling", &[decimal(1999, 2)]), decimal(20, 0));

        assert_eq!(
            Function::Round.result_type(&[ValueType::Decimal]),
            Ok(ValueType::Decimal)
        );
        assert_eq!(
            Function::Floor.result_type(&[ValueType::Decimal.nullable()]),
            Ok(ValueType::Decimal)
        );
        assert_eq!(
            Function::Ceiling.result_type(&[ValueType::Int64]),
            Ok(ValueType::Double)
        );
    }

    #[test]
    fn date_parts() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 15)
            .and_then(|d| d.and_hms_opt(13, 45, 30))
            .unwrap();
        assert_eq!(call("year", &[Value::DateTime(date)]), Value::Int32(2020));
        assert_eq!(call("month", &[Value::DateTime(date)]), Value::Int32(6));
        assert_eq!(call("hour", &[Value::DateTime(date)]), Value::Int32(13));
        assert_eq!(call("second", &[Value::DateTime(date)]), Value::Int32(30));
    }

    #[test]
    fn null_arguments_fail() {
        let err = FunctionRegistry::shared()
            .call("length", &[Value::Null])
            .unwrap_err();
        assert!(matches!(err, FunctionError::IncorrectArgumentType { .. }));
    }

    #[test]
    fn signatures() {
        assert_eq!(
            Function::SubstringOf.result_type(&[ValueType::String, ValueType::String]),
            Ok(ValueType::Boolean)
        );
        assert!(
            Function::Substring
                .result_type(&[ValueType::String, ValueType::String])
                .is_err()
        );
        assert!(Function::Year.result_type(&[ValueType::Int32]).is_err());
        assert_eq!(Function::from_name("ToLower"), Some(Function::ToLower));
        assert_eq!(Function::from_name("nope"), None);
    }
}
