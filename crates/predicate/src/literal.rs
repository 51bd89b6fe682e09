//! Recognizers for atomic filter text and conversion of literal text to typed constants.

use std::sync::LazyLock;

use nom::bytes::complete::{tag_no_case, take_till, take_till1};
use nom::character::complete::{char, one_of};
use nom::combinator::{all_consuming, map_opt, rest};
use nom::sequence::{delimited, preceded, terminated};
use nom::{IResult, Parser};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ast::Predicate;
use crate::cache::TypeCache;
use crate::error::FilterSyntaxError;
use crate::options::Culture;
use crate::schema::ValueType;
use crate::value::{EnumValue, Value, parse_datetime};

type ParseResult<'a, T> = IResult<&'a str, T, FilterSyntaxError>;

/// Converts literal text to a value of one scalar type.
pub(crate) type LiteralParser = fn(&str, &Culture) -> Option<Value>;

static LITERAL_PARSERS: LazyLock<TypeCache<ValueType, Option<LiteralParser>>> =
    LazyLock::new(TypeCache::new);

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

/// Matches `'text'` or `"text"` with no quotes inside, returning the text between them.
pub(crate) fn quoted_string(input: &str) -> Option<&str> {
    let parsed: ParseResult<&str> =
        all_consuming(delimited(one_of("'\""), take_till(is_quote), one_of("'\""))).parse(input);
    parsed.ok().map(|(_, content)| content)
}

/// Matches a decimal literal such as `19.99m`, returning the number before the suffix.
pub(crate) fn decimal_literal(input: &str) -> Option<&str> {
    let parsed: ParseResult<&str> =
        all_consuming(terminated(take_till1(|c: char| matches!(c, 'm' | 'M')), one_of("mM")))
            .parse(input);
    parsed.ok().map(|(_, number)| number)
}

/// Matches a prefixed literal such as `guid'...'` or `datetime'...'`.
pub(crate) fn typed_literal<'a>(prefix: &'static str, input: &'a str) -> Option<&'a str> {
    let parsed: ParseResult<&str> = all_consuming(preceded(
        tag_no_case(prefix),
        delimited(char('\''), take_till(|c: char| c == '\''), char('\'')),
    ))
    .parse(input);
    parsed.ok().map(|(_, content)| content)
}

fn call_arguments(input: &str) -> ParseResult<&str> {
    preceded(
        char('('),
        map_opt(rest, |remaining: &str| remaining.strip_suffix(')')),
    )
    .parse(input)
}

/// Matches `new TypeName(args)`, returning the type name and the raw argument text.
pub(crate) fn constructor_call(input: &str) -> Option<(&str, &str)> {
    let parsed: ParseResult<(&str, &str)> = preceded(
        tag_no_case("new "),
        (take_till1(|c: char| c == '(' || c == ')'), call_arguments),
    )
    .parse(input);
    parsed
        .ok()
        .map(|(_, (name, arguments))| (name.trim(), arguments))
}

/// Matches `name(args)` with non-empty arguments, returning the name and the raw argument text.
pub(crate) fn function_call(input: &str) -> Option<(&str, &str)> {
    let parsed: ParseResult<(&str, &str)> =
        (take_till1(|c: char| c == '(' || c == ')'), call_arguments).parse(input);
    parsed
        .ok()
        .filter(|(_, (_, arguments))| !arguments.trim().is_empty())
        .map(|(_, (name, arguments))| (name.trim(), arguments))
}

/// Byte offsets of the commas that sit outside quotes and parentheses.
fn top_level_commas(text: &str) -> Vec<usize> {
    let mut depth = 0_i32;
    let mut quote: Option<char> = None;
    let mut commas = Vec::new();
    for (index, c) in text.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            (None, ',') if depth == 0 => commas.push(index),
            _ => {}
        }
    }
    commas
}

/// Splits argument text at every top-level comma.
pub(crate) fn split_arguments(text: &str) -> Vec<&str> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut start = 0;
    for comma in top_level_commas(text) {
        parts.push(text[start..comma].trim());
        start = comma + 1;
    }
    parts.push(text[start..].trim());
    parts
}

/// Splits function arguments at the last top-level comma.
pub(crate) fn split_last_argument(text: &str) -> (&str, Option<&str>) {
    match top_level_commas(text).last() {
        Some(&comma) => (text[..comma].trim(), Some(text[comma + 1..].trim())),
        None => (text.trim(), None),
    }
}

/// Returns the cached parse routine for a scalar type, if the type has one.
pub(crate) fn literal_parser(ty: &ValueType) -> Option<LiteralParser> {
    LITERAL_PARSERS.get_or_insert_with(ty.clone(), || match ty {
        ValueType::Int32 => Some(parse_int32 as LiteralParser),
        ValueType::Int64 => Some(parse_int64 as LiteralParser),
        ValueType::Double => Some(parse_double as LiteralParser),
        ValueType::Decimal => Some(parse_decimal as LiteralParser),
        ValueType::DateTime => Some(parse_date as LiteralParser),
        _ => None,
    })
}

fn parse_int32(text: &str, culture: &Culture) -> Option<Value> {
    culture.normalize_number(text)?.parse().ok().map(Value::Int32)
}

fn parse_int64(text: &str, culture: &Culture) -> Option<Value> {
    culture.normalize_number(text)?.parse().ok().map(Value::Int64)
}

fn parse_double(text: &str, culture: &Culture) -> Option<Value> {
    culture
        .normalize_number(text)?
        .parse()
        .ok()
        .map(Value::Double)
}

/// Reads a decimal with or without its `m` suffix.
fn parse_decimal(text: &str, culture: &Culture) -> Option<Value> {
    let text = text.trim();
    let number = culture.normalize_number(decimal_literal(text).unwrap_or(text))?;
    number
        .parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&number))
        .ok()
        .map(Value::Decimal)
}

fn parse_date(text: &str, culture: &Culture) -> Option<Value> {
    parse_datetime(text, &culture.date_formats).map(Value::DateTime)
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn conversion_error(token: &str, ty: &ValueType) -> FilterSyntaxError {
    FilterSyntaxError::new(token, format!("cannot convert literal to {ty}"))
}

/// Builds the constant for a quoted string.
///
/// Quoted text stays a string unless the expected type is an enum, guid or datetime, in which
/// case it must convert to that type.
pub(crate) fn quoted_constant(
    token: &str,
    content: &str,
    expected: Option<&ValueType>,
    culture: &Culture,
) -> Result<Predicate, FilterSyntaxError> {
    let Some(expected) = expected else {
        return Ok(Predicate::constant(content));
    };
    let value = match expected.underlying() {
        ValueType::Enum(enum_type) => enum_type
            .parse(content)
            .map(|value| Value::Enum(EnumValue::new(enum_type.clone(), value))),
        ValueType::Guid => Uuid::parse_str(content).ok().map(Value::Guid),
        ValueType::DateTime => parse_date(content, culture),
        _ => return Ok(Predicate::constant(content)),
    };
    value
        .map(|value| Predicate::typed_constant(value, expected.clone()))
        .ok_or_else(|| conversion_error(token, expected))
}

/// Resolves the well-known constant forms: `null`, prefixed guid and datetime literals, guid
/// keywords, enum members and text with a dedicated parse routine.
///
/// Returns `Ok(None)` when the token is none of these, so the caller can fall back to a plain
/// conversion.
pub(crate) fn known_constant(
    token: &str,
    expected: Option<&ValueType>,
    culture: &Culture,
) -> Result<Option<Predicate>, FilterSyntaxError> {
    if token.eq_ignore_ascii_case("null") {
        let ty = expected
            .filter(|ty| ty.accepts_null())
            .cloned()
            .unwrap_or(ValueType::Null);
        return Ok(Some(Predicate::typed_constant(Value::Null, ty)));
    }
    let typed = |value: Value, fallback: ValueType| {
        let ty = expected
            .filter(|ty| ty.underlying() == &fallback)
            .cloned()
            .unwrap_or(fallback);
        Predicate::typed_constant(value, ty)
    };
    if let Some(content) = typed_literal("guid", token) {
        let guid = Uuid::parse_str(content).map_err(|_| conversion_error(token, &ValueType::Guid))?;
        return Ok(Some(typed(Value::Guid(guid), ValueType::Guid)));
    }
    if let Some(content) = typed_literal("datetime", token) {
        let value =
            parse_date(content, culture).ok_or_else(|| conversion_error(token, &ValueType::DateTime))?;
        return Ok(Some(typed(value, ValueType::DateTime)));
    }

    let Some(expected) = expected else {
        return Ok(None);
    };
    let value = match expected {
        ValueType::Nullable(inner) => {
            return Ok(known_constant(token, Some(inner), culture)?.map(|node| match node {
                Predicate::Constant { value, .. } => {
                    Predicate::typed_constant(value, expected.clone())
                }
                other => other,
            }));
        }
        ValueType::Guid => {
            if token.eq_ignore_ascii_case("newguid()") {
                Value::Guid(Uuid::new_v4())
            } else if token.eq_ignore_ascii_case("empty") {
                Value::Guid(Uuid::nil())
            } else {
                Value::Guid(Uuid::parse_str(token).map_err(|_| conversion_error(token, expected))?)
            }
        }
        ValueType::Enum(enum_type) => {
            let value = enum_type.parse(token).ok_or_else(|| {
                FilterSyntaxError::new(
                    token,
                    format!("not a member of enum {}", enum_type.name()),
                )
            })?;
            Value::Enum(EnumValue::new(enum_type.clone(), value))
        }
        ty => match literal_parser(ty) {
            Some(parse) => parse(token, culture).ok_or_else(|| conversion_error(token, ty))?,
            None => return Ok(None),
        },
    };
    Ok(Some(Predicate::typed_constant(value, expected.clone())))
}

/// Converts the token to the expected type as a last resort.
///
/// Without an expected type the token is read as a boolean or a number. Numbers with an `m` suffix
/// are decimals.
pub(crate) fn convert(
    token: &str,
    expected: Option<&ValueType>,
    culture: &Culture,
) -> Result<Predicate, FilterSyntaxError> {
    match expected.map(ValueType::underlying) {
        Some(ValueType::Boolean) => parse_bool(token)
            .map(|value| Predicate::typed_constant(Value::Boolean(value), ValueType::Boolean))
            .ok_or_else(|| conversion_error(token, &ValueType::Boolean)),
        Some(ValueType::String) => Ok(Predicate::constant(token)),
        Some(ty) => Err(conversion_error(token, ty)),
        None => infer_literal(token, culture).ok_or_else(|| {
            FilterSyntaxError::new(token, "not a property, function or literal")
        }),
    }
}

fn infer_literal(token: &str, culture: &Culture) -> Option<Predicate> {
    if let Some(value) = parse_bool(token) {
        return Some(Predicate::constant(value));
    }
    if decimal_literal(token).is_some() {
        return parse_decimal(token, culture).map(Predicate::constant);
    }
    [ValueType::Int32, ValueType::Int64, ValueType::Double]
        .iter()
        .find_map(|ty| literal_parser(ty)?(token, culture))
        .map(Predicate::constant)
}
