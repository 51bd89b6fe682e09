//! Rendering predicate trees as filter text.
//!
//! A single visitor walks the tree and handles bracketing and the `and`/`or` simplifications,
//! while a [`Dialect`] supplies the tokens, literal formats and function forms of one target
//! language.

mod odata;
mod sql92;

pub use odata::*;
pub use sql92::*;

use crate::ast::{BinaryOperator, Predicate, UnaryOperator};
use crate::error::SerializeError;
use crate::functions::Function;
use crate::schema::PropertyPath;
use crate::value::{Value, format_round_trip};

/// The text forms of one filter language.
pub trait Dialect {
    /// Keyword for a logical operator, or `not`.
    fn keyword(&self, op: LogicalKeyword) -> &'static str;

    /// Infix token for a comparison operator.
    fn comparison(&self, op: BinaryOperator) -> &'static str;

    /// Renders an arithmetic operation over already rendered operands.
    fn arithmetic(&self, op: BinaryOperator, left: &str, right: &str) -> String;

    fn literal(&self, value: &Value) -> Result<String, SerializeError>;

    fn property(&self, path: &PropertyPath) -> Result<String, SerializeError>;

    /// Renders a filter that is nothing but a boolean property.
    fn standalone_property(&self, rendered: String) -> String {
        rendered
    }

    /// Renders a function call over already rendered arguments.
    ///
    /// `in_comparison` is set when the call is directly an operand of a comparison or arithmetic
    /// operator.
    fn call(
        &self,
        function: Function,
        args: &[String],
        in_comparison: bool,
    ) -> Result<String, SerializeError>;

    /// Renders `call eq <bool>` for a string match in one piece, when the dialect has such a
    /// form. `matches` is whether the comparison holds when the string matches.
    fn string_match_comparison(
        &self,
        _function: Function,
        _args: &[String],
        _matches: bool,
    ) -> Option<Result<String, SerializeError>> {
        None
    }
}

/// The logical keywords a dialect spells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalKeyword {
    And,
    Or,
    Not,
}

/// Serializes a predicate with the given dialect.
pub fn serialize<D: Dialect + ?Sized>(
    dialect: &D,
    predicate: &Predicate,
) -> Result<String, SerializeError> {
    let visitor = Visitor { dialect };
    match predicate {
        Predicate::Property { path, .. } => {
            Ok(dialect.standalone_property(dialect.property(path)?))
        }
        node => visitor.visit(node, false, false),
    }
}

struct Visitor<'d, D: ?Sized> {
    dialect: &'d D,
}

impl<D: Dialect + ?Sized> Visitor<'_, D> {
    fn visit(
        &self,
        node: &Predicate,
        in_comparison: bool,
        bracket: bool,
    ) -> Result<String, SerializeError> {
        match node {
            Predicate::Property { path, .. } => self.dialect.property(path),
            Predicate::Constant { value, .. } => self.dialect.literal(value),
            Predicate::Unary {
                op: UnaryOperator::Not,
                operand,
            } => {
                let operand = self.visit(operand, false, false)?;
                Ok(wrap(
                    format!("{} ({operand})", self.dialect.keyword(LogicalKeyword::Not)),
                    bracket,
                ))
            }
            Predicate::Binary {
                op, left, right, ..
            } if op.is_logical() => self.logical(*op, left, right, bracket),
            Predicate::Binary {
                op, left, right, ..
            } if op.is_comparison() => self.comparison(*op, left, right, bracket),
            Predicate::Binary {
                op, left, right, ..
            } => {
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                Ok(wrap(self.dialect.arithmetic(*op, &left, &right), bracket))
            }
            Predicate::Call { function, args, .. } => {
                let args = self.operands(args)?;
                self.dialect.call(*function, &args, in_comparison)
            }
            Predicate::Constructor { constructor, .. } => Err(SerializeError::UnsupportedNode(
                format!("constructor for {}", constructor.type_name()),
            )),
        }
    }

    /// Renders an operand bare when it is a property or literal and bracketed otherwise.
    fn operand(&self, node: &Predicate) -> Result<String, SerializeError> {
        self.visit(node, true, !node.is_member_or_literal())
    }

    fn operands(&self, nodes: &[Predicate]) -> Result<Vec<String>, SerializeError> {
        nodes.iter().map(|node| self.operand(node)).collect()
    }

    fn logical(
        &self,
        op: BinaryOperator,
        left: &Predicate,
        right: &Predicate,
        bracket: bool,
    ) -> Result<String, SerializeError> {
        let rendered_left = self.visit(left, false, false)?;
        let rendered_right = self.visit(right, false, false)?;
        if op == BinaryOperator::And {
            if left.as_bool_literal() == Some(false) || right.as_bool_literal() == Some(false) {
                return Ok(String::new());
            }
            if left.as_bool_literal() == Some(true) {
                return Ok(rendered_right);
            }
            if right.as_bool_literal() == Some(true) {
                return Ok(rendered_left);
            }
        }
        if rendered_left.trim().is_empty() {
            return Ok(rendered_right);
        }
        if rendered_right.trim().is_empty() {
            return Ok(rendered_left);
        }
        let keyword = match op {
            BinaryOperator::And => self.dialect.keyword(LogicalKeyword::And),
            _ => self.dialect.keyword(LogicalKeyword::Or),
        };
        Ok(wrap(
            format!("({rendered_left}) {keyword} ({rendered_right})"),
            bracket,
        ))
    }

    fn comparison(
        &self,
        op: BinaryOperator,
        left: &Predicate,
        right: &Predicate,
        bracket: bool,
    ) -> Result<String, SerializeError> {
        if matches!(op, BinaryOperator::Eq | BinaryOperator::Ne)
            && let Some((function, args, literal)) = string_match_against_literal(left, right)
        {
            let matches = literal == (op == BinaryOperator::Eq);
            let args = self.operands(args)?;
            if let Some(rendered) = self.dialect.string_match_comparison(function, &args, matches)
            {
                return rendered.map(|text| wrap(text, bracket));
            }
        }
        let left = self.operand(left)?;
        let right = self.operand(right)?;
        Ok(wrap(
            format!("{left} {} {right}", self.dialect.comparison(op)),
            bracket,
        ))
    }
}

/// Matches `call eq true` or `false eq call` where the call is a string match.
fn string_match_against_literal<'a>(
    left: &'a Predicate,
    right: &'a Predicate,
) -> Option<(Function, &'a [Predicate], bool)> {
    let as_match = |node: &'a Predicate| match node {
        Predicate::Call { function, args, .. } if function.is_string_match() => {
            Some((*function, args.as_slice()))
        }
        _ => None,
    };
    if let (Some((function, args)), Some(literal)) = (as_match(left), right.as_bool_literal()) {
        return Some((function, args, literal));
    }
    let (function, args) = as_match(right)?;
    Some((function, args, left.as_bool_literal()?))
}

fn wrap(text: String, bracket: bool) -> String {
    if bracket { format!("({text})") } else { text }
}

/// Formats a literal the way both dialects share, given the dialect's boolean spellings.
pub(crate) fn format_literal(
    value: &Value,
    booleans: (&str, &str),
) -> Result<String, SerializeError> {
    let text = match value {
        Value::Null => "null".to_string(),
        Value::Boolean(true) => booleans.0.to_string(),
        Value::Boolean(false) => booleans.1.to_string(),
        Value::String(text) => format!("'{text}'"),
        Value::Int32(number) => number.to_string(),
        Value::Int64(number) => number.to_string(),
        Value::Double(number) => number.to_string(),
        Value::Decimal(number) => number.to_string(),
        Value::DateTime(datetime) => format!("datetime'{}'", format_round_trip(datetime)),
        Value::Guid(guid) => format!("guid'{guid}'"),
        Value::Enum(value) => format!("'{value}'"),
        Value::Object(_) => return Err(SerializeError::UnsupportedLiteral("object".to_string())),
    };
    Ok(text)
}

/// Splits string match arguments into `(haystack, needle)`.
pub(crate) fn haystack_and_needle(function: Function, args: &[String]) -> Option<(&str, &str)> {
    match (function, args) {
        (Function::SubstringOf, [needle, haystack]) => Some((haystack.as_str(), needle.as_str())),
        (Function::EndsWith | Function::StartsWith, [haystack, needle]) => {
            Some((haystack.as_str(), needle.as_str()))
        }
        _ => None,
    }
}
