//! Filter text to predicate tree.
//!
//! The parser drives the [tokenizer](crate::tokenizer) and folds the resulting token sets left to
//! right. There is no precedence between `and` and `or`, so `a and b or c` is `(a and b) or c`
//! and `a or b and c` is `(a or b) and c`. Parenthesize to get anything else.
//!
//! Text that does not tokenize is an atom, resolved in this order:
//!
//! 1. a quoted string
//! 2. a `new TypeName(args)` constructor from the [`TypeRegistry`]
//! 3. a call into the function table
//! 4. a property path such as `Complex/Foo`
//! 5. a known constant: `null`, `guid'...'`, `datetime'...'`, an enum member, or text with a
//!    parse routine for the expected type
//! 6. a plain conversion of the text to the expected type
//!
//! Literals take their type from the other side of the comparison, so `Id eq 5` converts `5` to
//! the type of `Id`.

use std::sync::{Arc, LazyLock};

use log::{debug, trace};

use crate::ast::{BinaryOperator, Predicate};
use crate::error::FilterSyntaxError;
use crate::eval::CompiledPredicate;
use crate::functions::Function;
use crate::literal;
use crate::options::ParserOptions;
use crate::registry::TypeRegistry;
use crate::schema::{PropertyPath, TypeSchema, ValueType};
use crate::tokenizer::{TokenSet, is_combinator, is_implied_boolean, strip_enclosing, tokenize};

static BUILTIN_TYPES: LazyLock<Arc<TypeRegistry>> =
    LazyLock::new(|| Arc::new(TypeRegistry::with_builtins()));

/// Parses filter text against one record schema.
#[derive(Clone)]
pub struct FilterParser {
    schema: Arc<TypeSchema>,
    registry: Arc<TypeRegistry>,
    options: ParserOptions,
}

impl FilterParser {
    /// Creates a parser with the default options and the builtin `DateTime`/`Guid` constructors.
    pub fn new(schema: Arc<TypeSchema>) -> Self {
        Self {
            schema,
            registry: BUILTIN_TYPES.clone(),
            options: ParserOptions::default(),
        }
    }

    /// Uses the given registry to resolve `new TypeName(...)` expressions.
    pub fn with_registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: ParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn schema(&self) -> &Arc<TypeSchema> {
        &self.schema
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Parses a filter. Blank text yields `None`, which accepts every record.
    ///
    /// The filter as a whole must evaluate to a boolean.
    pub fn parse(&self, filter: &str) -> Result<Option<Predicate>, FilterSyntaxError> {
        let predicate = self.parse_expected(filter, None)?;
        if let Some(node) = &predicate {
            let ty = node.result_type();
            if !ty.is_boolean() {
                return Err(FilterSyntaxError::new(
                    filter,
                    format!("filter evaluates to {ty}, not a boolean"),
                ));
            }
        }
        debug!("parsed filter '{filter}' into {predicate:?}");
        Ok(predicate)
    }

    /// Parses any expression, using `expected` to type literals that have no other context.
    pub fn parse_expected(
        &self,
        text: &str,
        expected: Option<&ValueType>,
    ) -> Result<Option<Predicate>, FilterSyntaxError> {
        self.create(text, expected)
    }

    /// Parses a filter and wraps it for evaluation with the configured flags mode.
    pub fn compile(&self, filter: &str) -> Result<CompiledPredicate, FilterSyntaxError> {
        Ok(CompiledPredicate::new(
            self.parse(filter)?,
            self.options.flags_match,
        ))
    }

    fn create(
        &self,
        text: &str,
        expected: Option<&ValueType>,
    ) -> Result<Option<Predicate>, FilterSyntaxError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let tokens = tokenize(text);
        if !tokens.is_empty() {
            return self.fold(text, tokens, expected);
        }
        // `(Name)` does not tokenize, but the group still has to be unwrapped.
        if let Some(inner) = strip_enclosing(text) {
            return self.create(inner, expected);
        }
        self.atom(text, expected).map(Some)
    }

    fn required(
        &self,
        text: &str,
        expected: Option<&ValueType>,
    ) -> Result<Predicate, FilterSyntaxError> {
        self.create(text, expected)?
            .ok_or_else(|| FilterSyntaxError::new(text, "missing operand"))
    }

    fn fold(
        &self,
        text: &str,
        tokens: Vec<TokenSet>,
        expected: Option<&ValueType>,
    ) -> Result<Option<Predicate>, FilterSyntaxError> {
        let mut accumulated: Option<Predicate> = None;
        let mut combinator: Option<BinaryOperator> = None;

        for set in tokens {
            trace!("folding {set:?}");
            if set.left.trim().is_empty() {
                if set.operation.eq_ignore_ascii_case("not") {
                    let scope = self.expression_type(&set).or_else(|| expected.cloned());
                    let Some(operand) = self.create(&set.right, scope.as_ref())? else {
                        return Ok(accumulated);
                    };
                    let negated = Predicate::not(operand)
                        .map_err(|err| FilterSyntaxError::from_type_error(&set.right, err))?;
                    // `not` consumes the rest of the text, so this ends the fold.
                    return match (accumulated, combinator) {
                        (Some(existing), Some(op)) => {
                            combine(op, existing, negated, text).map(Some)
                        }
                        _ => Ok(Some(negated)),
                    };
                }
                if !set.right.trim().is_empty() {
                    return Err(FilterSyntaxError::new(
                        text,
                        format!("'{}' has no left operand", set.operation),
                    ));
                }
                combinator = BinaryOperator::from_keyword(&set.operation);
                continue;
            }

            let scope = self.expression_type(&set).or_else(|| expected.cloned());
            let left = self.required(&set.left, scope.as_ref())?;
            let left_type = left.result_type();
            let current = match self.create(&set.right, Some(&left_type))? {
                Some(right) => self.operation(&set, left, right)?,
                None => left,
            };
            accumulated = Some(match (accumulated.take(), combinator.take()) {
                (Some(existing), Some(op)) => combine(op, existing, current, text)?,
                _ => current,
            });
        }
        Ok(accumulated)
    }

    fn operation(
        &self,
        set: &TokenSet,
        left: Predicate,
        right: Predicate,
    ) -> Result<Predicate, FilterSyntaxError> {
        let token = format!("{} {} {}", set.left, set.operation, set.right);
        let op = BinaryOperator::from_keyword(&set.operation).ok_or_else(|| {
            FilterSyntaxError::new(&token, format!("unsupported operation '{}'", set.operation))
        })?;
        combine(op, left, right, &token)
    }

    fn atom(
        &self,
        text: &str,
        expected: Option<&ValueType>,
    ) -> Result<Predicate, FilterSyntaxError> {
        let culture = &self.options.culture;
        if let Some(content) = literal::quoted_string(text) {
            return literal::quoted_constant(text, content, expected, culture);
        }
        if let Some(node) = self.constructor(text, expected)? {
            return Ok(node);
        }
        if let Some(node) = self.function(text, expected)? {
            return Ok(node);
        }
        if let Some((path, ty)) = self.property(text) {
            return Ok(Predicate::property(path, ty));
        }
        if let Some(node) = literal::known_constant(text, expected, culture)? {
            return Ok(node);
        }
        literal::convert(text, expected, culture)
    }

    /// The type that literals in a token set should take. Both sides of a combinator are boolean;
    /// otherwise it is the type of the first property on either side.
    fn expression_type(&self, set: &TokenSet) -> Option<ValueType> {
        if is_combinator(&set.operation) {
            return Some(ValueType::Boolean);
        }
        self.property(&set.left)
            .or_else(|| self.property(&set.right))
            .map(|(_, ty)| ty)
    }

    /// Finds the first property referenced by `token`, descending into its first token set.
    fn property(&self, token: &str) -> Option<(PropertyPath, ValueType)> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        if !is_implied_boolean(token)
            && let Some(first) = tokenize(token).into_iter().next()
        {
            return self
                .property(&first.left)
                .or_else(|| self.property(&first.right));
        }
        let path = strip_enclosing(token).unwrap_or(token);
        self.schema.resolve_path(path)
    }

    fn function(
        &self,
        text: &str,
        expected: Option<&ValueType>,
    ) -> Result<Option<Predicate>, FilterSyntaxError> {
        let Some((name, arguments)) = literal::function_call(text) else {
            return Ok(None);
        };
        let function = Function::from_name(name)
            .ok_or_else(|| FilterSyntaxError::new(text, format!("unknown function '{name}'")))?;
        let (first, second) = literal::split_last_argument(arguments);
        let scope = TokenSet {
            left: first.to_string(),
            operation: name.to_string(),
            right: second.unwrap_or_default().to_string(),
        };
        let first_expected = self.expression_type(&scope).or_else(|| expected.cloned());
        let mut args = vec![self.required(first, first_expected.as_ref())?];
        if let Some(second) = second {
            let second_expected = function
                .parameter_type(1)
                .unwrap_or_else(|| args[0].result_type());
            args.push(self.required(second, Some(&second_expected))?);
        }
        if args.len() != function.arity() {
            return Err(FilterSyntaxError::new(
                text,
                format!(
                    "{function} takes {} argument(s), got {}",
                    function.arity(),
                    args.len()
                ),
            ));
        }
        Predicate::call(function, args)
            .map(Some)
            .map_err(|err| FilterSyntaxError::from_type_error(text, err))
    }

    /// Resolves `new TypeName(args)` against the registry.
    ///
    /// The first constructor of matching arity whose arguments all parse wins. Returns `Ok(None)`
    /// when the type is unknown or does not produce the expected type, so resolution can continue.
    fn constructor(
        &self,
        text: &str,
        expected: Option<&ValueType>,
    ) -> Result<Option<Predicate>, FilterSyntaxError> {
        let Some((type_name, arguments)) = literal::constructor_call(text) else {
            return Ok(None);
        };
        let Some((ty, constructors)) = self.registry.lookup(type_name) else {
            return Ok(None);
        };
        let Some(expected) = expected else {
            return Ok(None);
        };
        if ty.underlying() != expected.underlying() {
            return Ok(None);
        }
        let tokens = literal::split_arguments(arguments);
        for constructor in constructors
            .iter()
            .filter(|constructor| constructor.parameters().len() == tokens.len())
        {
            let args: Result<Vec<Predicate>, FilterSyntaxError> = tokens
                .iter()
                .zip(constructor.parameters())
                .map(|(token, parameter)| {
                    let arg = self.required(token, Some(parameter))?;
                    if arg.result_type().is_compatible_with(parameter) {
                        Ok(arg)
                    } else {
                        Err(FilterSyntaxError::new(*token, "argument type mismatch"))
                    }
                })
                .collect();
            match args {
                Ok(args) => {
                    return Ok(Some(Predicate::Constructor {
                        constructor: constructor.clone(),
                        args,
                        ty: expected.clone(),
                    }));
                }
                Err(err) => trace!("constructor {type_name} rejected arguments: {err}"),
            }
        }
        Ok(None)
    }
}

fn combine(
    op: BinaryOperator,
    left: Predicate,
    right: Predicate,
    token: &str,
) -> Result<Predicate, FilterSyntaxError> {
    Predicate::binary(op, left, right).map_err(|err| FilterSyntaxError::from_type_error(token, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> FilterParser {
        FilterParser::new(Arc::new(
            TypeSchema::new("Message")
                .with_field("MessageId", ValueType::Int32)
                .with_field("Flag", ValueType::Boolean),
        ))
    }

    #[test]
    fn literal_takes_the_property_type() -> anyhow::Result<()> {
        let node = parser().parse("5 lt MessageId")?.expect("predicate");
        let Predicate::Binary { left, .. } = node else {
            panic!("expected a comparison");
        };
        assert_eq!(left.result_type(), ValueType::Int32);
        Ok(())
    }

    #[test]
    fn parenthesized_property_is_unwrapped() -> anyhow::Result<()> {
        let node = parser().parse("(Flag)")?.expect("predicate");
        assert!(matches!(node, Predicate::Property { .. }));
        Ok(())
    }

    #[test]
    fn non_boolean_filters_are_rejected() {
        let err = parser().parse("MessageId add 1").unwrap_err();
        assert!(err.reason.contains("not a boolean"));
    }

    #[test]
    fn dangling_combinator_is_rejected() {
        assert!(parser().parse("and MessageId eq 1").is_err());
    }
}
