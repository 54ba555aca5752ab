//! Pipeline construction.
//!
//! [`build`] turns an ordered list of mixed [`Component`]s into a list of
//! middleware plus an optional terminal handler, inserting the error gate in
//! front of every item that asks for it.
//!
//! Consecutive handlers form a *handler run* and consecutive middleware a
//! *middleware run*. When a middleware follows a handler run, the pending
//! middleware run is fused around the merged handler run and the result is
//! set aside; once the list is exhausted the set-aside handlers are merged in
//! declaration order. Execution order always equals declaration order.
//!
//! # Example
//!
//! ```
//! use pylon_middleware::{components, Pipeline, EmptyHandler, EmptyMiddleware};
//!
//! let pipeline = Pipeline::builder()
//!     .components(components![EmptyMiddleware, EmptyHandler])
//!     .build()
//!     .unwrap();
//! assert_eq!(pipeline.stage_names(), ["error_gate", "empty", "handler_run"]);
//! ```

use crate::component::{Component, IntoComponent};
use crate::gate::error_gate;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::merge::{compose, handler_before_next, merge_handlers, merge_middlewares};
use crate::middleware::{BoxedMiddleware, Middleware};
use pylon_core::Exchange;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors raised while building a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A component was neither a middleware nor a handler.
    #[error("component at position {index} is neither a middleware nor a handler")]
    UnclassifiedComponent {
        /// Position of the offending component.
        index: usize,
    },
}

/// Result type for pipeline construction.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The output of [`build`].
#[derive(Clone, Default)]
pub struct Built {
    /// Middleware, outermost first.
    pub middlewares: Vec<BoxedMiddleware>,
    /// The merged terminal handler, if any.
    pub handler: Option<BoxedHandler>,
}

impl Built {
    /// Composes the middleware around the handler.
    #[must_use]
    pub fn into_handler(self) -> BoxedHandler {
        compose(&self.middlewares, self.handler)
    }
}

impl fmt::Debug for Built {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Built")
            .field(
                "middlewares",
                &self.middlewares.iter().map(|mw| mw.name()).collect::<Vec<_>>(),
            )
            .field("handler", &self.handler.as_ref().map(|h| h.name()))
            .finish()
    }
}

/// Builds a pipeline from `components`.
///
/// `gate` is placed before every component whose
/// [`check_error_before`](Component::check_error_before) is `true`: as a
/// preceding middleware for middleware, as a wrapper for handlers. Components
/// that are neither shape are skipped.
///
/// With `middlewares_only`, the resulting handler is folded into the
/// middleware list as a stage that runs it and then calls `next`, and the
/// returned handler is `None`.
#[must_use]
pub fn build(
    components: Vec<Component>,
    gate: Option<&BoxedMiddleware>,
    middlewares_only: bool,
) -> Built {
    let mut state = Runs::default();

    for (index, component) in components.into_iter().enumerate() {
        let gated = gate.filter(|_| component.check_error_before());
        match component {
            Component::Middleware(mw) => state.add_middleware(mw, gated),
            Component::Handler(handler) => state.add_handler(handler, gated),
            Component::Neither => {
                debug!(index, "skipping component that is neither middleware nor handler");
            }
        }
    }

    let mut built = state.finish();
    if middlewares_only {
        if let Some(handler) = built.handler.take() {
            built.middlewares.push(handler_before_next(handler));
        }
    }
    built
}

/// Like [`build`], but fails on the first component that is neither a
/// middleware nor a handler.
pub fn build_strict(
    components: Vec<Component>,
    gate: Option<&BoxedMiddleware>,
    middlewares_only: bool,
) -> PipelineResult<Built> {
    if let Some(index) = components
        .iter()
        .position(|component| matches!(component, Component::Neither))
    {
        return Err(PipelineError::UnclassifiedComponent { index });
    }
    Ok(build(components, gate, middlewares_only))
}

#[derive(Default)]
struct Runs {
    out: Vec<BoxedHandler>,
    middlewares: Vec<BoxedMiddleware>,
    handlers: Vec<BoxedHandler>,
}

impl Runs {
    fn add_middleware(&mut self, mw: BoxedMiddleware, gate: Option<&BoxedMiddleware>) {
        if !self.handlers.is_empty() {
            self.flush();
        }
        if let Some(gate) = gate {
            self.middlewares.push(gate.clone());
        }
        self.middlewares.push(mw);
    }

    fn add_handler(&mut self, handler: BoxedHandler, gate: Option<&BoxedMiddleware>) {
        let handler = match gate {
            Some(gate) => gate.wrap(handler),
            None => handler,
        };
        self.handlers.push(handler);
    }

    /// Fuses the pending middleware run around the pending handler run.
    fn flush(&mut self) {
        let handlers = std::mem::take(&mut self.handlers);
        let Some(handler) = merge_handlers(handlers) else {
            return;
        };
        let middlewares = std::mem::take(&mut self.middlewares);
        self.out.push(merge_middlewares(&middlewares, handler));
    }

    fn finish(mut self) -> Built {
        if self.out.is_empty() {
            return Built {
                middlewares: self.middlewares,
                handler: merge_handlers(self.handlers),
            };
        }
        if !self.handlers.is_empty() {
            self.flush();
            return Built {
                middlewares: Vec::new(),
                handler: merge_handlers(self.out),
            };
        }
        let Some(head) = merge_handlers(self.out) else {
            return Built::default();
        };
        if self.middlewares.is_empty() {
            return Built {
                middlewares: Vec::new(),
                handler: Some(head),
            };
        }
        let mut middlewares = Vec::with_capacity(self.middlewares.len() + 1);
        middlewares.push(handler_before_next(head));
        middlewares.extend(self.middlewares);
        Built {
            middlewares,
            handler: None,
        }
    }
}

/// A composed, runnable pipeline.
#[derive(Clone)]
pub struct Pipeline {
    entry: BoxedHandler,
    stage_names: Vec<&'static str>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Composes a [`Built`] into a pipeline.
    #[must_use]
    pub fn from_built(built: Built) -> Self {
        let mut stage_names: Vec<&'static str> =
            built.middlewares.iter().map(|mw| mw.name()).collect();
        if built.handler.is_some() {
            stage_names.push("handler_run");
        }
        Self {
            entry: built.into_handler(),
            stage_names,
        }
    }

    /// Runs the pipeline against `ex`.
    pub fn run<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        self.entry.call(ex)
    }

    /// The composed entry handler.
    #[must_use]
    pub fn handler(&self) -> BoxedHandler {
        self.entry.clone()
    }

    /// Names of the outer middleware stages in execution order, followed by
    /// `"handler_run"` when the pipeline ends in a handler.
    #[must_use]
    pub fn stage_names(&self) -> &[&'static str] {
        &self.stage_names
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug)]
#[must_use]
pub struct PipelineBuilder {
    components: Vec<Component>,
    error_gate: bool,
    strict: bool,
    middlewares_only: bool,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a builder with the error gate enabled and permissive
    /// classification.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
            error_gate: true,
            strict: false,
            middlewares_only: false,
        }
    }

    /// Appends one component.
    pub fn component(mut self, component: impl IntoComponent) -> Self {
        self.components.push(component.into_component());
        self
    }

    /// Appends several components.
    pub fn components(mut self, components: impl IntoIterator<Item = Component>) -> Self {
        self.components.extend(components);
        self
    }

    /// Enables or disables the automatic error gate.
    pub fn error_gate(mut self, enabled: bool) -> Self {
        self.error_gate = enabled;
        self
    }

    /// Rejects components that are neither middleware nor handlers instead
    /// of skipping them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Folds the terminal handler into the middleware list, for pipelines
    /// that are mounted in front of other handlers.
    pub fn middlewares_only(mut self, enabled: bool) -> Self {
        self.middlewares_only = enabled;
        self
    }

    /// Builds the middleware list and terminal handler without composing
    /// them.
    pub fn build_parts(self) -> PipelineResult<Built> {
        let gate = self.error_gate.then(error_gate);
        if self.strict {
            build_strict(self.components, gate.as_ref(), self.middlewares_only)
        } else {
            Ok(build(self.components, gate.as_ref(), self.middlewares_only))
        }
    }

    /// Builds the pipeline.
    pub fn build(self) -> PipelineResult<Pipeline> {
        self.build_parts().map(Pipeline::from_built)
    }
}
