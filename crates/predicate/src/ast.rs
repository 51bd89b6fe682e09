//! Abstract syntax tree for filter predicates.
//!
//! Every node carries its resolved result type. Nodes are built bottom-up through the checked
//! constructors on [`Predicate`], which reject operand combinations that cannot be evaluated.

use crate::functions::Function;
use crate::registry::ConstructorRef;
use crate::schema::{PropertyPath, ValueType};
use crate::value::{TypeError, Value};

/// Predicate node.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field reference such as `ComplexProperty/Foo`.
    Property { path: PropertyPath, ty: ValueType },

    /// Literal value.
    Constant { value: Value, ty: ValueType },

    /// Unary operation, e.g. `not X`.
    Unary {
        op: UnaryOperator,
        operand: Box<Predicate>,
    },

    /// Binary operation, e.g. `left eq right`.
    Binary {
        op: BinaryOperator,
        left: Box<Predicate>,
        right: Box<Predicate>,
        ty: ValueType,
    },

    /// Call into the function table, e.g. `tolower(Name)`.
    Call {
        function: Function,
        args: Vec<Predicate>,
        ty: ValueType,
    },

    /// Construction of a registered type, e.g. `new DateTime(2012, 1, 1)`.
    Constructor {
        constructor: ConstructorRef,
        args: Vec<Predicate>,
        ty: ValueType,
    },
}

/// Binary operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    // Boolean
    And,
    Or,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Unary operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Not,
}

impl BinaryOperator {
    /// Looks up an operator by its filter keyword, ignoring case.
    pub fn from_keyword(keyword: &str) -> Option<BinaryOperator> {
        let op = match keyword.to_ascii_lowercase().as_str() {
            "eq" => BinaryOperator::Eq,
            "ne" => BinaryOperator::Ne,
            "gt" => BinaryOperator::Gt,
            "ge" => BinaryOperator::Ge,
            "lt" => BinaryOperator::Lt,
            "le" => BinaryOperator::Le,
            "and" => BinaryOperator::And,
            "or" => BinaryOperator::Or,
            "add" => BinaryOperator::Add,
            "sub" => BinaryOperator::Sub,
            "mul" => BinaryOperator::Mul,
            "div" => BinaryOperator::Div,
            "mod" => BinaryOperator::Mod,
            _ => return None,
        };
        Some(op)
    }

    /// The filter keyword for this operator.
    pub fn keyword(self) -> &'static str {
        match self {
            BinaryOperator::Eq => "eq",
            BinaryOperator::Ne => "ne",
            BinaryOperator::Gt => "gt",
            BinaryOperator::Ge => "ge",
            BinaryOperator::Lt => "lt",
            BinaryOperator::Le => "le",
            BinaryOperator::And => "and",
            BinaryOperator::Or => "or",
            BinaryOperator::Add => "add",
            BinaryOperator::Sub => "sub",
            BinaryOperator::Mul => "mul",
            BinaryOperator::Div => "div",
            BinaryOperator::Mod => "mod",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Gt
                | BinaryOperator::Ge
                | BinaryOperator::Lt
                | BinaryOperator::Le
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Sub
                | BinaryOperator::Mul
                | BinaryOperator::Div
                | BinaryOperator::Mod
        )
    }
}

impl UnaryOperator {
    pub fn keyword(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
        }
    }
}

impl Predicate {
    /// Creates a field reference node.
    pub fn property(path: PropertyPath, ty: ValueType) -> Predicate {
        Predicate::Property { path, ty }
    }

    /// Creates a literal node whose type is derived from the value.
    ///
    /// Enum and object values have no standalone type, so use [`Predicate::typed_constant`] for
    /// those.
    pub fn constant(value: impl Into<Value>) -> Predicate {
        let value = value.into();
        let ty = match &value {
            Value::Null => ValueType::Null,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Double(_) => ValueType::Double,
            Value::Decimal(_) => ValueType::Decimal,
            Value::String(_) => ValueType::String,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Guid(_) => ValueType::Guid,
            Value::Enum(value) => ValueType::Enum(value.ty.clone()),
            Value::Object(_) => ValueType::Null,
        };
        Predicate::Constant { value, ty }
    }

    /// Creates a literal node with an explicit type.
    pub fn typed_constant(value: Value, ty: ValueType) -> Predicate {
        Predicate::Constant { value, ty }
    }

    /// Negates a boolean operand.
    pub fn not(operand: Predicate) -> Result<Predicate, TypeError> {
        let ty = operand.result_type();
        if !ty.is_boolean() {
            return Err(TypeError::UnexpectedType {
                op: "not",
                expected: "boolean",
                found: ty.to_string(),
            });
        }
        Ok(Predicate::Unary {
            op: UnaryOperator::Not,
            operand: Box::new(operand),
        })
    }

    /// Combines two operands, checking that their types fit the operator.
    pub fn binary(
        op: BinaryOperator,
        left: Predicate,
        right: Predicate,
    ) -> Result<Predicate, TypeError> {
        let (lt, rt) = (left.result_type(), right.result_type());
        let ty = if op.is_logical() {
            if !lt.is_boolean() || !rt.is_boolean() {
                return Err(TypeError::UnexpectedType {
                    op: op.keyword(),
                    expected: "boolean",
                    found: format!("{lt} and {rt}"),
                });
            }
            ValueType::Boolean
        } else if op.is_comparison() {
            let ordered = !matches!(op, BinaryOperator::Eq | BinaryOperator::Ne);
            if !lt.is_compatible_with(&rt) || (ordered && lt.as_record().is_some()) {
                return Err(TypeError::IncompatibleOperands {
                    op: op.keyword(),
                    left: lt.to_string(),
                    right: rt.to_string(),
                });
            }
            ValueType::Boolean
        } else {
            arithmetic_type(op, &lt, &rt)?
        };
        Ok(Predicate::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            ty,
        })
    }

    /// Calls a function from the function table, checking the argument types.
    pub fn call(function: Function, args: Vec<Predicate>) -> Result<Predicate, TypeError> {
        let types: Vec<ValueType> = args.iter().map(Predicate::result_type).collect();
        let ty = function.result_type(&types)?;
        Ok(Predicate::Call { function, args, ty })
    }

    /// Returns the resolved result type of the node.
    pub fn result_type(&self) -> ValueType {
        match self {
            Predicate::Property { ty, .. }
            | Predicate::Constant { ty, .. }
            | Predicate::Binary { ty, .. }
            | Predicate::Call { ty, .. }
            | Predicate::Constructor { ty, .. } => ty.clone(),
            Predicate::Unary { .. } => ValueType::Boolean,
        }
    }

    /// Returns the value if the node is a boolean literal.
    pub fn as_bool_literal(&self) -> Option<bool> {
        match self {
            Predicate::Constant { value, .. } => value.as_bool(),
            _ => None,
        }
    }

    /// Whether the node is a field reference or a literal.
    pub fn is_member_or_literal(&self) -> bool {
        matches!(
            self,
            Predicate::Property { .. } | Predicate::Constant { .. }
        )
    }
}

fn arithmetic_type(
    op: BinaryOperator,
    left: &ValueType,
    right: &ValueType,
) -> Result<ValueType, TypeError> {
    let null_literal = |ty: &ValueType| matches!(ty, ValueType::Null);
    let numeric = |ty: &ValueType| ty.is_numeric() || null_literal(ty);
    if !numeric(left) || !numeric(right) || (null_literal(left) && null_literal(right)) {
        return Err(TypeError::IncompatibleOperands {
            op: op.keyword(),
            left: left.to_string(),
            right: right.to_string(),
        });
    }
    let widest = [left.underlying(), right.underlying()]
        .into_iter()
        .filter(|ty| !null_literal(ty))
        .fold(ValueType::Int32, |acc, ty| match (acc, ty) {
            (ValueType::Double, _) | (_, ValueType::Double) => ValueType::Double,
            (ValueType::Decimal, _) | (_, ValueType::Decimal) => ValueType::Decimal,
            (ValueType::Int64, _) | (_, ValueType::Int64) => ValueType::Int64,
            _ => ValueType::Int32,
        });
    let nullable = left.accepts_null() || right.accepts_null();
    Ok(if nullable { widest.nullable() } else { widest })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(name: &str, ty: ValueType) -> Predicate {
        Predicate::property(PropertyPath::new([name]), ty)
    }

    #[test]
    fn arithmetic_promotes_to_widest_type() {
        let node = Predicate::binary(
            BinaryOperator::Add,
            prop("A", ValueType::Int32),
            Predicate::constant(1.5),
        )
        .unwrap();
        assert_eq!(node.result_type(), ValueType::Double);

        let node = Predicate::binary(
            BinaryOperator::Mul,
            prop("A", ValueType::Int32.nullable()),
            Predicate::constant(2_i64),
        )
        .unwrap();
        assert_eq!(node.result_type(), ValueType::Int64.nullable());

        let node = Predicate::binary(
            BinaryOperator::Sub,
            prop("Price", ValueType::Decimal),
            Predicate::constant(2),
        )
        .unwrap();
        assert_eq!(node.result_type(), ValueType::Decimal);
    }

    #[test]
    fn comparison_requires_compatible_operands() {
        assert!(
            Predicate::binary(
                BinaryOperator::Eq,
                prop("A", ValueType::Int32),
                Predicate::constant("x"),
            )
            .is_err()
        );
        assert!(
            Predicate::binary(
                BinaryOperator::Eq,
                prop("A", ValueType::Int32.nullable()),
                Predicate::constant(Value::Null),
            )
            .is_ok()
        );
        assert!(
            Predicate::binary(
                BinaryOperator::Eq,
                prop("A", ValueType::Int32),
                Predicate::constant(Value::Null),
            )
            .is_err()
        );
    }

    #[test]
    fn logical_operators_require_booleans() {
        let err = Predicate::binary(
            BinaryOperator::And,
            prop("A", ValueType::Int32),
            Predicate::constant(true),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expects boolean operands"));
        assert!(Predicate::not(prop("A", ValueType::Int32)).is_err());
        assert!(Predicate::not(prop("B", ValueType::Boolean)).is_ok());
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(BinaryOperator::from_keyword("EQ"), Some(BinaryOperator::Eq));
        assert_eq!(BinaryOperator::from_keyword("Mod"), Some(BinaryOperator::Mod));
        assert_eq!(BinaryOperator::from_keyword("not"), None);
    }
}
