//! Merging and inlining host lambdas.

use std::collections::HashMap;

use log::trace;

use crate::error::ComposeError;
use crate::expr::{Expr, Lambda, Param};

/// Combines two predicate lambdas with `&&`, rebinding the second one's parameter to the first's.
pub fn and_merge(first: &Lambda, second: &Lambda) -> Result<Lambda, ComposeError> {
    let [p1] = first.params() else {
        return Err(ComposeError::NotAPredicate(first.params().len()));
    };
    let [p2] = second.params() else {
        return Err(ComposeError::NotAPredicate(second.params().len()));
    };
    let rebound = second.body().replace_parameter(p2, &Expr::param(p1));
    Ok(Lambda::unary(
        p1.clone(),
        first.body().clone().and_also(rebound),
    ))
}

/// Builds `outer.params => inner(outer.body)`, optionally inlining the invocation.
pub fn compose(outer: &Lambda, inner: &Lambda, inline: bool) -> Result<Lambda, ComposeError> {
    let invoke = Expr::invoke(Expr::Lambda(inner.clone()), vec![outer.body().clone()]);
    let body = if inline {
        inline_invocation(&invoke)?
    } else {
        invoke
    };
    Ok(Lambda::new(outer.params().to_vec(), body))
}

/// Replaces an invocation of a lambda with the lambda's body, its parameters bound to the
/// invocation's arguments.
pub fn inline_invocation(expr: &Expr) -> Result<Expr, ComposeError> {
    Inliner::default().invoke(expr)
}

/// A substitution scope. Child scopes see their parent's bindings.
#[derive(Default)]
struct Inliner<'p> {
    scope: HashMap<Param, Expr>,
    parent: Option<&'p Inliner<'p>>,
}

impl Inliner<'_> {
    fn child(&self) -> Inliner<'_> {
        Inliner {
            scope: HashMap::new(),
            parent: Some(self),
        }
    }

    fn lookup(&self, param: &Param) -> Option<&Expr> {
        self.scope
            .get(param)
            .or_else(|| self.parent.and_then(|parent| parent.lookup(param)))
    }

    fn invoke(&self, expr: &Expr) -> Result<Expr, ComposeError> {
        let Expr::Invoke { target, args } = expr else {
            return Ok(self.walk(expr)?.unwrap_or_else(|| expr.clone()));
        };
        let Expr::Lambda(lambda) = target.as_ref() else {
            return Err(ComposeError::NotSupported(target.kind()));
        };
        if lambda.params().len() != args.len() {
            return Err(ComposeError::ArityMismatch {
                params: lambda.params().len(),
                args: args.len(),
            });
        }
        let mut child = self.child();
        for (param, arg) in lambda.params().iter().zip(args) {
            trace!("binding {param} for inlining");
            child.scope.insert(param.clone(), arg.clone());
        }
        Ok(child
            .walk(lambda.body())?
            .unwrap_or_else(|| lambda.body().clone()))
    }

    /// Rewrites `expr`, returning `None` when nothing in it changed.
    fn walk(&self, expr: &Expr) -> Result<Option<Expr>, ComposeError> {
        let rewritten = match expr {
            Expr::Parameter(param) => return Ok(self.lookup(param).cloned()),
            Expr::Constant(_) => return Ok(None),
            Expr::Member { target, name } => self.walk(target)?.map(|target| Expr::Member {
                target: Box::new(target),
                name: name.clone(),
            }),
            Expr::Binary { op, left, right } => {
                match (self.walk(left)?, self.walk(right)?) {
                    (None, None) => None,
                    (l, r) => Some(Expr::Binary {
                        op: *op,
                        left: Box::new(l.unwrap_or_else(|| left.as_ref().clone())),
                        right: Box::new(r.unwrap_or_else(|| right.as_ref().clone())),
                    }),
                }
            }
            Expr::Unary { op, operand } => self.walk(operand)?.map(|operand| Expr::Unary {
                op: op.clone(),
                operand: Box::new(operand),
            }),
            Expr::Conditional {
                test,
                if_true,
                if_false,
            } => match (self.walk(test)?, self.walk(if_true)?, self.walk(if_false)?) {
                (None, None, None) => None,
                (t, a, b) => Some(Expr::Conditional {
                    test: Box::new(t.unwrap_or_else(|| test.as_ref().clone())),
                    if_true: Box::new(a.unwrap_or_else(|| if_true.as_ref().clone())),
                    if_false: Box::new(b.unwrap_or_else(|| if_false.as_ref().clone())),
                }),
            },
            Expr::Call {
                target,
                method,
                args,
            } => {
                let new_target = match target {
                    Some(target) => self.walk(target)?,
                    None => None,
                };
                let new_args = self.walk_all(args)?;
                match (new_target, new_args) {
                    (None, None) => None,
                    (new_target, new_args) => Some(Expr::Call {
                        target: new_target.map(Box::new).or_else(|| target.clone()),
                        method: method.clone(),
                        args: new_args.unwrap_or_else(|| args.clone()),
                    }),
                }
            }
            Expr::TypeIs { operand, type_name } => {
                self.walk(operand)?.map(|operand| Expr::TypeIs {
                    operand: Box::new(operand),
                    type_name: type_name.clone(),
                })
            }
            Expr::New { type_name, args } => self.walk_all(args)?.map(|args| Expr::New {
                type_name: type_name.clone(),
                args,
            }),
            Expr::ListInit { new, items } => {
                let new_ctor = self.walk(new)?;
                let mut changed = new_ctor.is_some();
                let mut rewritten = Vec::with_capacity(items.len());
                for item in items {
                    let walked = self.walk_all(item)?;
                    changed |= walked.is_some();
                    rewritten.push(walked.unwrap_or_else(|| item.clone()));
                }
                changed.then(|| Expr::ListInit {
                    new: Box::new(new_ctor.unwrap_or_else(|| new.as_ref().clone())),
                    items: rewritten,
                })
            }
            Expr::Lambda(_)
            | Expr::Invoke { .. }
            | Expr::Quote(_)
            | Expr::MemberInit { .. }
            | Expr::NewArray(_) => return Err(ComposeError::NotImplemented(expr.kind())),
        };
        Ok(rewritten)
    }

    /// Walks each expression, returning the full list when any of them changed.
    fn walk_all(&self, exprs: &[Expr]) -> Result<Option<Vec<Expr>>, ComposeError> {
        let mut changed = false;
        let mut rewritten = Vec::with_capacity(exprs.len());
        for expr in exprs {
            let walked = self.walk(expr)?;
            changed |= walked.is_some();
            rewritten.push(walked.unwrap_or_else(|| expr.clone()));
        }
        Ok(changed.then_some(rewritten))
    }
}
