//! Call dispatcher
//!
//! Resolves the callee of a call or `new` expression, evaluates each argument
//! exactly once, runs the callee's dangerous predicate and return hook, and
//! adopts the hook's result. A failing hook degrades to an unknown value.

use swc_common::Span;
use swc_ecma_ast::{Callee, Expr, ExprOrSpread, NewExpr};

use super::AnalysisError;
use super::entities::{Danger, Verdict};
use super::traverser::{Traverser, unparen};
use super::value::{GlobalRef, GlobalTarget, Heap, JsObject, Literal, ValueKind, Wrapped};
use crate::context::RunContext;
use crate::diagnostic::{RuleId, Severity};

pub const CALLED_DANGEROUS_GLOBAL: RuleId = RuleId::new("javascript", "called_dangerous_global");

/// Ambient state a predicate may consult.
#[derive(Debug, Clone, Copy)]
pub struct Environment<'a> {
    pub filename: &'a str,
    pub run: &'a RunContext,
}

/// Arguments of one call, evaluated once. Spread arguments are unknown and
/// have no source node.
#[derive(Debug, Default)]
pub struct Arguments<'a> {
    nodes: Vec<Option<&'a Expr>>,
    values: Vec<Wrapped>,
    literals: Vec<Literal>,
}

impl<'a> Arguments<'a> {
    pub fn new(nodes: Vec<Option<&'a Expr>>, values: Vec<Wrapped>, heap: &Heap) -> Self {
        let literals = values.iter().map(|v| v.literal_value(heap)).collect();
        Self {
            nodes,
            values,
            literals,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn node(&self, index: usize) -> Option<&'a Expr> {
        self.nodes.get(index).copied().flatten()
    }

    pub fn value(&self, index: usize) -> Option<&Wrapped> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Wrapped] {
        &self.values
    }

    pub fn literal(&self, index: usize) -> Option<&Literal> {
        self.literals.get(index)
    }

    pub fn truthy(&self, index: usize) -> bool {
        self.values.get(index).is_some_and(Wrapped::truthy)
    }

    /// `ToString` of the argument; a missing argument reads as "".
    pub fn string(&self, index: usize) -> String {
        self.literal(index)
            .map(Literal::to_js_string)
            .unwrap_or_default()
    }

    pub fn number(&self, index: usize) -> f64 {
        self.literal(index).map_or(f64::NAN, Literal::to_number)
    }

    /// True for function and arrow expressions, or values known to be
    /// functions.
    pub fn is_function(&self, index: usize) -> bool {
        let literal_function = self
            .node(index)
            .is_some_and(|node| matches!(unparen(node), Expr::Fn(_) | Expr::Arrow(_)));
        let function_value = self
            .value(index)
            .is_some_and(|v| matches!(v.kind, ValueKind::Function));
        literal_function || function_value
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("call has no arguments")]
    MissingArgument,
}

/// Everything a return hook sees.
pub struct HookCall<'t, 'a> {
    pub traverser: &'t mut Traverser<'a>,
    pub args: &'t Arguments<'a>,
    /// Callee expression, absent for synthetic calls.
    pub callee: Option<&'a Expr>,
    /// Object the callee was read from, if any.
    pub this: Option<Wrapped>,
    pub name: &'t str,
}

impl HookCall<'_, '_> {
    /// Rebinds the object the callee was read from (`obj` in `obj.m()`).
    /// Callees of any other shape are left alone.
    pub fn rebind_parent(&mut self, value: Wrapped) {
        if let Some(Expr::Member(member)) = self.callee.map(unparen) {
            self.traverser.rebind(&member.obj, value);
        }
    }
}

impl<'a> Traverser<'a> {
    pub(super) fn eval_call(
        &mut self,
        span: Span,
        callee: &'a Callee,
        args: &'a [ExprOrSpread],
    ) -> Result<Wrapped, AnalysisError> {
        match callee {
            Callee::Expr(expr) => self.eval_call_expr(span, expr, args),
            Callee::Super(_) | Callee::Import(_) => {
                self.eval_arguments(args)?;
                Ok(Wrapped::unknown())
            }
        }
    }

    pub(super) fn eval_call_expr(
        &mut self,
        span: Span,
        callee: &'a Expr,
        args: &'a [ExprOrSpread],
    ) -> Result<Wrapped, AnalysisError> {
        let (this, function) = self.eval_callee(callee)?;
        let arguments = self.eval_arguments(args)?;
        self.set_span(span);
        Ok(self.dispatch(&function, this, &arguments, Some(callee)))
    }

    fn eval_callee(&mut self, callee: &'a Expr) -> Result<(Option<Wrapped>, Wrapped), AnalysisError> {
        match unparen(callee) {
            Expr::Member(member) => {
                let object = self.traverse_expr(&member.obj)?;
                let key = self.member_key(&member.prop)?;
                self.set_span(member.span);
                let function = self.member_of(&object, key.as_deref());
                Ok((Some(object), function))
            }
            other => Ok((None, self.traverse_expr(other)?)),
        }
    }

    pub(super) fn eval_arguments(
        &mut self,
        args: &'a [ExprOrSpread],
    ) -> Result<Arguments<'a>, AnalysisError> {
        let mut nodes = Vec::with_capacity(args.len());
        let mut values = Vec::with_capacity(args.len());

        for arg in args {
            let value = self.traverse_expr(&arg.expr)?;
            if arg.spread.is_some() {
                nodes.push(None);
                values.push(Wrapped::unknown());
            } else {
                nodes.push(Some(arg.expr.as_ref()));
                values.push(value);
            }
        }

        Ok(Arguments::new(nodes, values, self.heap()))
    }

    pub(super) fn eval_new(&mut self, new: &'a NewExpr) -> Result<Wrapped, AnalysisError> {
        let callee = self.traverse_expr(&new.callee)?;
        let arguments = match &new.args {
            Some(args) => self.eval_arguments(args)?,
            None => Arguments::default(),
        };
        self.set_span(new.span);

        let ValueKind::Global(global) = &callee.kind else {
            return Ok(self.heap_mut().alloc_object(JsObject::default()));
        };

        let callable = self.entity_of(&global.target).is_some_and(|entity| {
            entity.call.is_some() || matches!(entity.dangerous, Some(Danger::Predicate(_)))
        });

        if callable {
            Ok(self.dispatch(&callee, None, &arguments, None))
        } else {
            Ok(callee.clone())
        }
    }

    /// Invokes the callee's predicate and hook. Only entity-backed callees
    /// have behavior; everything else yields an unknown value.
    pub fn dispatch(
        &mut self,
        callee: &Wrapped,
        this: Option<Wrapped>,
        args: &Arguments<'a>,
        callee_expr: Option<&'a Expr>,
    ) -> Wrapped {
        let ValueKind::Global(GlobalRef { name, target }) = &callee.kind else {
            return Wrapped::unknown();
        };
        let Some(entity) = self.entity_of(target) else {
            return Wrapped::unknown();
        };

        if let Some(Danger::Predicate(predicate)) = &entity.dangerous {
            let verdict = predicate(args, &self.environment());
            self.report_called_danger(name, verdict);
        }

        let Some(hook) = entity.call.clone() else {
            return Wrapped::unknown();
        };

        let name = name.clone();
        let mut call = HookCall {
            traverser: self,
            args,
            callee: callee_expr,
            this,
            name: &name,
        };

        match hook(&mut call) {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(callee = %name, %error, "call hook failed, result is unknown");
                Wrapped::unknown()
            }
        }
    }

    fn report_called_danger(&mut self, name: &str, verdict: Verdict) {
        let message = match verdict {
            Verdict::Safe => return,
            Verdict::Violation => format!("`{name}` called in a dangerous manner"),
            Verdict::Message(message) => message,
        };

        let diagnostic = self
            .diagnostic(CALLED_DANGEROUS_GLOBAL, Severity::Warning, message)
            .with_description(format!(
                "A call to `{name}` was found with arguments that make it unsafe or deprecated."
            ));
        self.emit(diagnostic);
    }

    pub(super) fn entity_of(
        &self,
        target: &GlobalTarget,
    ) -> Option<std::sync::Arc<super::entities::Entity>> {
        match target {
            GlobalTarget::Entity(entity) => Some(entity.clone()),
            GlobalTarget::Instance(id) => Some(std::sync::Arc::new(self.heap().instance(*id).entity.clone())),
        }
    }
}
