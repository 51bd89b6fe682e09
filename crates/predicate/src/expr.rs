//! Host-side expression trees.
//!
//! An [`Expr`] is what typed query code builds: parameters, member accesses, method calls and
//! lambdas, much like a compiler-generated expression tree. Trees are merged and inlined by the
//! [`compose`](crate::compose) module and lowered into a [`Predicate`](crate::Predicate) before
//! serialization.

use std::fmt;

use crate::ast::BinaryOperator;
use crate::schema::ValueType;
use crate::value::Value;

/// A lambda parameter. Parameters are identified by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    name: String,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Unary host operators.
#[derive(Debug, Clone, PartialEq)]
pub enum HostUnary {
    Not,
    Negate,
    /// A conversion to another type, e.g. `int` to `int?`.
    Convert(ValueType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(Value),
    Parameter(Param),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: HostUnary,
        operand: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// A method call. Static methods have no target.
    Call {
        target: Option<Box<Expr>>,
        method: String,
        args: Vec<Expr>,
    },
    New {
        type_name: String,
        args: Vec<Expr>,
    },
    ListInit {
        new: Box<Expr>,
        items: Vec<Vec<Expr>>,
    },
    TypeIs {
        operand: Box<Expr>,
        type_name: String,
    },
    Lambda(Lambda),
    Invoke {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Quote(Box<Expr>),
    MemberInit {
        new: Box<Expr>,
        bindings: Vec<(String, Expr)>,
    },
    NewArray(Vec<Expr>),
}

/// A lambda expression, `params => body`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    params: Vec<Param>,
    body: Box<Expr>,
}

impl Lambda {
    pub fn new(params: Vec<Param>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }

    /// Shorthand for a single-parameter lambda.
    pub fn unary(param: Param, body: Expr) -> Self {
        Self::new(vec![param], body)
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn body(&self) -> &Expr {
        &self.body
    }

    pub fn into_body(self) -> Expr {
        *self.body
    }
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Expr {
        Expr::Constant(value.into())
    }

    pub fn param(param: &Param) -> Expr {
        Expr::Parameter(param.clone())
    }

    /// Accesses a member of this expression.
    pub fn member(self, name: impl Into<String>) -> Expr {
        Expr::Member {
            target: Box::new(self),
            name: name.into(),
        }
    }

    /// Accesses a `/`-separated member chain, e.g. `ComplexProperty/Foo`.
    pub fn path(self, path: &str) -> Expr {
        path.split('/').fold(self, Expr::member)
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Eq, self, other)
    }

    pub fn ne(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Ne, self, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Gt, self, other)
    }

    pub fn ge(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Ge, self, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Lt, self, other)
    }

    pub fn le(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Le, self, other)
    }

    /// Short-circuit `&&`.
    pub fn and_also(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::And, self, other)
    }

    /// Short-circuit `||`.
    pub fn or_else(self, other: Expr) -> Expr {
        Expr::binary(BinaryOperator::Or, self, other)
    }

    pub fn not(self) -> Expr {
        Expr::Unary {
            op: HostUnary::Not,
            operand: Box::new(self),
        }
    }

    pub fn convert(self, ty: ValueType) -> Expr {
        Expr::Unary {
            op: HostUnary::Convert(ty),
            operand: Box::new(self),
        }
    }

    /// Calls an instance method on this expression.
    pub fn call(self, method: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            target: Some(Box::new(self)),
            method: method.into(),
            args,
        }
    }

    /// Calls a static method.
    pub fn call_static(method: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            target: None,
            method: method.into(),
            args,
        }
    }

    pub fn invoke(target: Expr, args: Vec<Expr>) -> Expr {
        Expr::Invoke {
            target: Box::new(target),
            args,
        }
    }

    /// A short name for the node kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Constant(_) => "Constant",
            Expr::Parameter(_) => "Parameter",
            Expr::Member { .. } => "MemberAccess",
            Expr::Binary { .. } => "Binary",
            Expr::Unary { .. } => "Unary",
            Expr::Conditional { .. } => "Conditional",
            Expr::Call { .. } => "Call",
            Expr::New { .. } => "New",
            Expr::ListInit { .. } => "ListInit",
            Expr::TypeIs { .. } => "TypeIs",
            Expr::Lambda(_) => "Lambda",
            Expr::Invoke { .. } => "Invoke",
            Expr::Quote(_) => "Quote",
            Expr::MemberInit { .. } => "MemberInit",
            Expr::NewArray(_) => "NewArray",
        }
    }

    /// Returns a copy with every free occurrence of `from` replaced by `to`.
    ///
    /// Nested lambdas that declare a parameter with the same name shadow it.
    pub fn replace_parameter(&self, from: &Param, to: &Expr) -> Expr {
        let replace = |expr: &Expr| Box::new(expr.replace_parameter(from, to));
        let replace_all = |exprs: &[Expr]| {
            exprs
                .iter()
                .map(|expr| expr.replace_parameter(from, to))
                .collect::<Vec<_>>()
        };
        match self {
            Expr::Parameter(param) if param == from => to.clone(),
            Expr::Constant(_) | Expr::Parameter(_) => self.clone(),
            Expr::Member { target, name } => Expr::Member {
                target: replace(target),
                name: name.clone(),
            },
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: replace(left),
                right: replace(right),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: op.clone(),
                operand: replace(operand),
            },
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => Expr::Conditional {
                test: replace(test),
                if_true: replace(if_true),
                if_false: replace(if_false),
            },
            Expr::Call {
                target,
                method,
                args,
            } => Expr::Call {
                target: target.as_deref().map(replace),
                method: method.clone(),
                args: replace_all(args),
            },
            Expr::New { type_name, args } => Expr::New {
                type_name: type_name.clone(),
                args: replace_all(args),
            },
            Expr::ListInit { new, items } => Expr::ListInit {
                new: replace(new),
                items: items.iter().map(|item| replace_all(item)).collect(),
            },
            Expr::TypeIs { operand, type_name } => Expr::TypeIs {
                operand: replace(operand),
                type_name: type_name.clone(),
            },
            Expr::Lambda(lambda) if lambda.params.contains(from) => self.clone(),
            Expr::Lambda(lambda) => Expr::Lambda(Lambda {
                params: lambda.params.clone(),
                body: replace(&lambda.body),
            }),
            Expr::Invoke { target, args } => Expr::Invoke {
                target: replace(target),
                args: replace_all(args),
            },
            Expr::Quote(inner) => Expr::Quote(replace(inner)),
            Expr::MemberInit { new, bindings } => Expr::MemberInit {
                new: replace(new),
                bindings: bindings
                    .iter()
                    .map(|(name, expr)| (name.clone(), expr.replace_parameter(from, to)))
                    .collect(),
            },
            Expr::NewArray(items) => Expr::NewArray(replace_all(items)),
        }
    }
}
