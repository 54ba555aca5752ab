//! Classification of pipeline components.
//!
//! A pipeline is declared as an ordered list of mixed items. Each item is
//! either a middleware, a handler, or neither; the builder reads the shape
//! and the error-check flag of each one.

use crate::gate::{ErrorGate, ErrorHandlerStage};
use crate::handler::{BoxedHandler, EmptyHandler, Handler, HandlerFn, NoErrorCheck};
use crate::middleware::{BoxedMiddleware, EmptyMiddleware, Middleware, MiddlewareFn, WrapFn};
use crate::stages;
use pylon_core::Exchange;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// The shape of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Wraps the rest of the pipeline.
    Middleware,
    /// Terminal step.
    Handler,
    /// Not a pipeline stage.
    Neither,
}

/// A classified pipeline item.
#[derive(Clone)]
pub enum Component {
    /// A middleware.
    Middleware(BoxedMiddleware),
    /// A handler.
    Handler(BoxedHandler),
    /// An item that is not a pipeline stage. Skipped by the default builder.
    Neither,
}

impl Component {
    /// Classifies a type-erased value.
    ///
    /// Recognises [`Component`], [`BoxedMiddleware`] and [`BoxedHandler`];
    /// everything else is [`Component::Neither`].
    #[must_use]
    pub fn from_any(value: Box<dyn Any + Send>) -> Self {
        let value = match value.downcast::<Self>() {
            Ok(component) => return *component,
            Err(value) => value,
        };
        let value = match value.downcast::<BoxedMiddleware>() {
            Ok(mw) => return Self::Middleware(*mw),
            Err(value) => value,
        };
        match value.downcast::<BoxedHandler>() {
            Ok(handler) => Self::Handler(*handler),
            Err(_) => Self::Neither,
        }
    }

    /// The shape of this component.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        match self {
            Self::Middleware(_) => Shape::Middleware,
            Self::Handler(_) => Shape::Handler,
            Self::Neither => Shape::Neither,
        }
    }

    /// Whether the builder should gate this component on a recorded error.
    ///
    /// [`Component::Neither`] reports `false`.
    #[must_use]
    pub fn check_error_before(&self) -> bool {
        match self {
            Self::Middleware(mw) => mw.check_error_before(),
            Self::Handler(handler) => handler.check_error_before(),
            Self::Neither => false,
        }
    }

    /// The component's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Middleware(mw) => mw.name(),
            Self::Handler(handler) => handler.name(),
            Self::Neither => "neither",
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Middleware(mw) => f.debug_tuple("Middleware").field(&mw.name()).finish(),
            Self::Handler(handler) => f.debug_tuple("Handler").field(&handler.name()).finish(),
            Self::Neither => f.write_str("Neither"),
        }
    }
}

/// Classifies `component`, returning its shape and error-check flag.
#[must_use]
pub fn classify(component: &Component) -> (Shape, bool) {
    (component.shape(), component.check_error_before())
}

/// Conversion into a [`Component`].
pub trait IntoComponent {
    /// Performs the conversion.
    fn into_component(self) -> Component;
}

impl IntoComponent for Component {
    fn into_component(self) -> Component {
        self
    }
}

impl IntoComponent for BoxedMiddleware {
    fn into_component(self) -> Component {
        Component::Middleware(self)
    }
}

impl IntoComponent for BoxedHandler {
    fn into_component(self) -> Component {
        Component::Handler(self)
    }
}

impl<T: IntoComponent> IntoComponent for Option<T> {
    fn into_component(self) -> Component {
        self.map_or(Component::Neither, IntoComponent::into_component)
    }
}

impl IntoComponent for Box<dyn Any + Send> {
    fn into_component(self) -> Component {
        Component::from_any(self)
    }
}

impl<F> IntoComponent for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Exchange) -> crate::BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn into_component(self) -> Component {
        Component::Handler(Arc::new(self))
    }
}

impl<F> IntoComponent for MiddlewareFn<F>
where
    F: for<'a> Fn(&'a mut Exchange, crate::Next<'a>) -> crate::BoxFuture<'a, ()>
        + Send
        + Sync
        + 'static,
{
    fn into_component(self) -> Component {
        Component::Middleware(Arc::new(self))
    }
}

impl<F> IntoComponent for WrapFn<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn into_component(self) -> Component {
        Component::Middleware(Arc::new(self))
    }
}

impl IntoComponent for EmptyHandler {
    fn into_component(self) -> Component {
        Component::Handler(Arc::new(self))
    }
}

macro_rules! middleware_components {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoComponent for $ty {
                fn into_component(self) -> Component {
                    Component::Middleware(Arc::new(self))
                }
            }
        )*
    };
}

middleware_components!(
    EmptyMiddleware,
    ErrorGate,
    ErrorHandlerStage,
    stages::AbortIf,
    stages::AbortWith,
    stages::CustomHeaders,
    stages::RealIp,
    stages::Recover,
    stages::RequestIdMiddleware,
    stages::StoreInit,
    stages::TrailingSlash,
    stages::UseCodec,
);

impl<T: IntoComponent> IntoComponent for NoErrorCheck<T> {
    fn into_component(self) -> Component {
        match self.0.into_component() {
            Component::Middleware(mw) => Component::Middleware(Arc::new(NoErrorCheck(mw))),
            Component::Handler(handler) => Component::Handler(Arc::new(NoErrorCheck(handler))),
            Component::Neither => Component::Neither,
        }
    }
}

impl Middleware for BoxedMiddleware {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self.as_ref().wrap(next)
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }

    fn check_error_before(&self) -> bool {
        self.as_ref().check_error_before()
    }
}

impl Handler for BoxedHandler {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> crate::BoxFuture<'a, ()> {
        self.as_ref().call(ex)
    }

    fn name(&self) -> &'static str {
        self.as_ref().name()
    }

    fn check_error_before(&self) -> bool {
        self.as_ref().check_error_before()
    }
}

/// Builds a `Vec<Component>` from mixed items.
///
/// ```
/// use pylon_middleware::{components, EmptyHandler, EmptyMiddleware, Shape};
///
/// let items = components![EmptyMiddleware, EmptyHandler];
/// assert_eq!(items[0].shape(), Shape::Middleware);
/// assert_eq!(items[1].shape(), Shape::Handler);
/// ```
#[macro_export]
macro_rules! components {
    ($($item:expr),* $(,)?) => {
        ::std::vec![$($crate::IntoComponent::into_component($item)),*]
    };
}
