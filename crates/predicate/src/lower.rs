//! Lowering host lambdas into predicate trees.

use crate::ast::Predicate;
use crate::error::LowerError;
use crate::expr::{Expr, HostUnary, Lambda, Param};
use crate::functions::Function;
use crate::schema::{TypeSchema, ValueType};
use crate::value::Value;

impl Lambda {
    /// Lowers a single-parameter lambda into a predicate over records of `schema`.
    ///
    /// Member chains rooted at the parameter become properties, members of constants are folded
    /// into constants, and a conversion to the nullable form of a type is dropped. Invocations
    /// must be inlined first.
    pub fn to_predicate(&self, schema: &TypeSchema) -> Result<Predicate, LowerError> {
        Lowerer {
            root: self.params().first(),
            schema,
        }
        .lower(self.body())
    }
}

struct Lowerer<'a> {
    root: Option<&'a Param>,
    schema: &'a TypeSchema,
}

/// Where a member chain starts.
enum Chain<'e> {
    Record(Vec<&'e str>),
    Constant(Value),
    Other(&'e Expr, Vec<&'e str>),
}

impl Lowerer<'_> {
    fn lower(&self, expr: &Expr) -> Result<Predicate, LowerError> {
        match expr {
            Expr::Constant(value) => Ok(Predicate::constant(value.clone())),
            Expr::Parameter(param) => Err(LowerError::UnboundParameter(param.to_string())),
            Expr::Member { .. } => self.member(expr),
            Expr::Binary { op, left, right } => {
                Ok(Predicate::binary(*op, self.lower(left)?, self.lower(right)?)?)
            }
            Expr::Unary { op, operand } => self.unary(op, operand),
            Expr::Call {
                target,
                method,
                args,
            } => self.call(target.as_deref(), method, args),
            other => Err(LowerError::UnsupportedNode(other.kind())),
        }
    }

    fn unary(&self, op: &HostUnary, operand: &Expr) -> Result<Predicate, LowerError> {
        let lowered = self.lower(operand)?;
        match op {
            HostUnary::Not => Ok(Predicate::not(lowered)?),
            HostUnary::Negate => match lowered {
                Predicate::Constant { value, ty } => {
                    let negated = Value::Int32(0).sub(&value).map_err(|_| {
                        LowerError::UnsupportedCast {
                            from: ty.to_string(),
                            to: "negated value".to_string(),
                        }
                    })?;
                    Ok(Predicate::typed_constant(negated, ty))
                }
                _ => Err(LowerError::UnsupportedNode("Negate")),
            },
            HostUnary::Convert(target) => {
                let from = lowered.result_type();
                let lift = target.is_nullable() && target.underlying() == from.underlying();
                if lift || *target == from {
                    Ok(lowered)
                } else {
                    Err(LowerError::UnsupportedCast {
                        from: from.to_string(),
                        to: target.to_string(),
                    })
                }
            }
        }
    }

    fn chain<'e>(&self, expr: &'e Expr) -> Result<Chain<'e>, LowerError> {
        match expr {
            Expr::Member { target, name } => Ok(match self.chain(target)? {
                Chain::Record(mut names) => {
                    names.push(name);
                    Chain::Record(names)
                }
                Chain::Constant(value) => Chain::Constant(
                    value
                        .field(name)
                        .cloned()
                        .ok_or_else(|| LowerError::UnknownMember(name.clone()))?,
                ),
                Chain::Other(root, mut names) => {
                    names.push(name);
                    Chain::Other(root, names)
                }
            }),
            Expr::Parameter(param) if Some(param) == self.root => Ok(Chain::Record(Vec::new())),
            Expr::Parameter(param) => Err(LowerError::UnboundParameter(param.to_string())),
            Expr::Constant(value) => Ok(Chain::Constant(value.clone())),
            other => Ok(Chain::Other(other, Vec::new())),
        }
    }

    fn member(&self, expr: &Expr) -> Result<Predicate, LowerError> {
        match self.chain(expr)? {
            Chain::Record(names) => self.property(&names),
            Chain::Constant(value) => Ok(Predicate::constant(value)),
            Chain::Other(root, names) => {
                let mut lowered = self.lower(root)?;
                for name in names {
                    lowered = self.intrinsic_member(lowered, name)?;
                }
                Ok(lowered)
            }
        }
    }

    /// Resolves a member chain against the schema. Trailing `Length` on a string and date part
    /// members on a datetime become function calls.
    fn property(&self, names: &[&str]) -> Result<Predicate, LowerError> {
        if let Some((path, ty)) = self.schema.resolve_segments(names) {
            return Ok(Predicate::property(path, ty));
        }
        if let Some((last, prefix)) = names.split_last()
            && let Some((path, ty)) = self.schema.resolve_segments(prefix)
        {
            return self.intrinsic_member(Predicate::property(path, ty), last);
        }
        Err(LowerError::UnknownProperty {
            path: names.join("/"),
            schema: self.schema.name().to_string(),
        })
    }

    fn intrinsic_member(&self, target: Predicate, name: &str) -> Result<Predicate, LowerError> {
        let function = match (target.result_type().underlying(), name) {
            (ValueType::String, "Length") => Function::Length,
            (ValueType::DateTime, "Hour") => Function::Hour,
            (ValueType::DateTime, "Minute") => Function::Minute,
            (ValueType::DateTime, "Second") => Function::Second,
            (ValueType::DateTime, "Day") => Function::Day,
            (ValueType::DateTime, "Month") => Function::Month,
            (ValueType::DateTime, "Year") => Function::Year,
            (ty, _) => {
                return Err(LowerError::UnknownProperty {
                    path: name.to_string(),
                    schema: ty.to_string(),
                });
            }
        };
        Ok(Predicate::call(function, vec![target])?)
    }

    fn call(
        &self,
        target: Option<&Expr>,
        method: &str,
        args: &[Expr],
    ) -> Result<Predicate, LowerError> {
        let mut lowered = Vec::with_capacity(args.len() + 1);
        let function = match target {
            Some(target) => {
                let function = match method {
                    "Contains" => Function::SubstringOf,
                    "EndsWith" => Function::EndsWith,
                    "StartsWith" => Function::StartsWith,
                    "IndexOf" => Function::IndexOf,
                    "Substring" => Function::Substring,
                    "ToLower" => Function::ToLower,
                    "ToUpper" => Function::ToUpper,
                    "Trim" => Function::Trim,
                    _ => return Err(LowerError::UnsupportedMethod(method.to_string())),
                };
                let target = self.lower(target)?;
                // `haystack.Contains(needle)` is `substringof(needle, haystack)`.
                if function == Function::SubstringOf {
                    for arg in args {
                        lowered.push(self.lower(arg)?);
                    }
                    lowered.push(target);
                } else {
                    lowered.push(target);
                    for arg in args {
                        lowered.push(self.lower(arg)?);
                    }
                }
                function
            }
            None => {
                // Static helpers such as `Math.Round` are matched by name.
                let function = Function::from_name(method)
                    .ok_or_else(|| LowerError::UnsupportedMethod(method.to_string()))?;
                for arg in args {
                    lowered.push(self.lower(arg)?);
                }
                function
            }
        };
        Ok(Predicate::call(function, lowered)?)
    }
}
