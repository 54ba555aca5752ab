//! Method and path routing over pipelines.
//!
//! A [`Router`] collects route declarations, each an ordered list of
//! components, and compiles them into a single [`Pipeline`]:
//!
//! ```text
//!  StoreInit ─▶ ErrorHandlerStage ─▶ Recover ─▶ RequestId ─▶ TrailingSlash
//!     ─▶ server header ─▶ use_components(..) ─▶ dispatch ─▶ route pipeline
//! ```
//!
//! Dispatch looks the path up in one radix tree per method. A miss in the
//! request's method but a hit in another sets [`Flags::NOT_ALLOWED`]; a miss
//! everywhere sets [`Flags::NOT_FOUND`]. Either records an error unless a
//! custom handler was installed.
//!
//! # Example
//!
//! ```
//! use pylon_middleware::{components, handler_fn};
//! use pylon_server::{path_param, Router, RouterOptions};
//! use http::StatusCode;
//!
//! let mut router = Router::new(RouterOptions::default());
//! router.get(
//!     "/users/{id}",
//!     components![handler_fn(|ex| Box::pin(async move {
//!         let id = path_param(ex, "id").unwrap_or_default().to_owned();
//!         ex.respond_text(StatusCode::OK, id);
//!     }))],
//! );
//! let pipeline = router.build().unwrap();
//! # let _ = pipeline;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use http::header::{HeaderValue, ALLOW};
use http::Method;
use pylon_config::PylonConfig;
use pylon_core::{CodecPair, Exchange, Flags, HttpError, JsonCodec, StoreManager, StoreManagerConfig};
use pylon_middleware::stages::{
    server_name, RealIp, Recover, RequestIdMiddleware, StoreInit, TrailingSlash, TrustedNet,
};
use pylon_middleware::{
    BoxFuture, BoxedHandler, Component, ErrorCallback, ErrorHandlerStage, Handler, IntoComponent,
    Pipeline,
};
use tracing::debug;

use crate::error::{ServerError, ServerResult};

pylon_core::marker_key! {
    /// Envelope key under which [`PathParams`] are stored.
    pub struct PathParamsKey;
}

/// Parameters captured from the matched route template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Value of the named parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Iterates `(name, value)` pairs in template order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the template had no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The parameters captured for this request, if routing matched.
#[must_use]
pub fn path_params(ex: &Exchange) -> Option<&PathParams> {
    ex.value::<PathParams>(PathParamsKey)
}

/// One captured parameter by name.
#[must_use]
pub fn path_param<'a>(ex: &'a Exchange, name: &str) -> Option<&'a str> {
    path_params(ex).and_then(|params| params.get(name))
}

/// Which global stages the router installs and how.
#[derive(Clone)]
pub struct RouterOptions {
    /// Install [`StoreInit`] as the outermost stage.
    pub core_init: bool,
    /// Error callback; `None` uses the default JSON error writer.
    pub error_callback: Option<ErrorCallback>,
    /// Codec given to every envelope.
    pub codec: CodecPair,
    /// `Server` header value; empty disables it.
    pub server_name: String,
    /// Trailing-slash handling.
    pub trailing_slash: TrailingSlash,
    /// Fail the build on unclassifiable components.
    pub strict_components: bool,
    /// Insert the error gate in front of each stage.
    pub error_gate: bool,
    /// Install [`Recover`].
    pub recover_panics: bool,
    /// Install [`RequestIdMiddleware`].
    pub request_ids: bool,
    /// Forward client-supplied request IDs.
    pub trust_incoming_request_id: bool,
    /// Client-address resolution, installed right after [`Recover`].
    pub real_ip: Option<RealIp>,
    /// Envelope pool settings.
    pub store: StoreManagerConfig,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            core_init: true,
            error_callback: None,
            codec: CodecPair::json(),
            server_name: String::new(),
            trailing_slash: TrailingSlash::default(),
            strict_components: false,
            error_gate: true,
            recover_panics: true,
            request_ids: true,
            trust_incoming_request_id: false,
            real_ip: None,
            store: StoreManagerConfig::default(),
        }
    }
}

impl RouterOptions {
    /// Options derived from a loaded configuration.
    #[must_use]
    pub fn from_config(config: &PylonConfig) -> Self {
        let codec = if config.pipeline.pretty_json {
            CodecPair::new(JsonCodec::pretty(), JsonCodec::new())
        } else {
            CodecPair::json()
        };
        // Entries were checked by `PylonConfig::validate`.
        let real_ip = config.pipeline.resolve_client_ip.then(|| {
            config
                .pipeline
                .trusted_proxies
                .iter()
                .filter_map(|cidr| cidr.parse::<TrustedNet>().ok())
                .fold(RealIp::new(), RealIp::trust)
        });
        Self {
            codec,
            server_name: config.server.server_name.clone(),
            trailing_slash: config.pipeline.trailing_slash,
            strict_components: config.pipeline.strict_components,
            error_gate: config.pipeline.error_gate,
            recover_panics: config.pipeline.recover_panics,
            trust_incoming_request_id: config.pipeline.trust_incoming_request_id,
            real_ip,
            store: config.store.clone(),
            ..Self::default()
        }
    }
}

impl std::fmt::Debug for RouterOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterOptions")
            .field("core_init", &self.core_init)
            .field("custom_error_callback", &self.error_callback.is_some())
            .field("server_name", &self.server_name)
            .field("trailing_slash", &self.trailing_slash)
            .field("strict_components", &self.strict_components)
            .field("error_gate", &self.error_gate)
            .field("recover_panics", &self.recover_panics)
            .field("request_ids", &self.request_ids)
            .field("real_ip", &self.real_ip)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
struct RouteDecl {
    method: Method,
    path: String,
    components: Vec<Component>,
}

/// Collects routes and compiles them into a [`Pipeline`].
pub struct Router {
    options: RouterOptions,
    manager: Arc<StoreManager>,
    global: Vec<Component>,
    routes: Vec<RouteDecl>,
    not_found: Option<BoxedHandler>,
    method_not_allowed: Option<BoxedHandler>,
}

impl Router {
    /// Creates an empty router. The envelope pool is allocated here.
    #[must_use]
    pub fn new(options: RouterOptions) -> Self {
        let manager = Arc::new(StoreManager::new(&options.store, options.codec.clone()));
        Self {
            options,
            manager,
            global: Vec::new(),
            routes: Vec::new(),
            not_found: None,
            method_not_allowed: None,
        }
    }

    /// The options this router was created with.
    #[must_use]
    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    /// The envelope pool shared by every request.
    #[must_use]
    pub fn store_manager(&self) -> &Arc<StoreManager> {
        &self.manager
    }

    /// Appends components that run for every request, after the built-in
    /// stages and before dispatch.
    pub fn use_components(&mut self, components: impl IntoIterator<Item = Component>) -> &mut Self {
        self.global.extend(components);
        self
    }

    /// Declares a route.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        components: impl IntoIterator<Item = Component>,
    ) -> &mut Self {
        self.routes.push(RouteDecl {
            method,
            path: path.to_string(),
            components: components.into_iter().collect(),
        });
        self
    }

    /// Opens a group whose routes share a path prefix and leading
    /// components.
    pub fn group(
        &mut self,
        prefix: &str,
        components: impl IntoIterator<Item = Component>,
    ) -> RouteGroup<'_> {
        RouteGroup {
            router: self,
            prefix: join_path("", prefix),
            components: components.into_iter().collect(),
        }
    }

    /// Handler run when no route matches the path. It runs after the
    /// [`Flags::NOT_FOUND`] flag is set.
    pub fn not_found(&mut self, handler: impl IntoComponent) -> &mut Self {
        self.not_found = into_handler(handler);
        self
    }

    /// Handler run when the path matches only under other methods.
    pub fn method_not_allowed(&mut self, handler: impl IntoComponent) -> &mut Self {
        self.method_not_allowed = into_handler(handler);
        self
    }

    /// Compiles every route and the global stages into one pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidRoute`] for a template the matcher
    /// rejects (including duplicates) and [`ServerError::Pipeline`] when
    /// strict mode finds an unclassifiable component.
    pub fn build(&self) -> ServerResult<Pipeline> {
        let options = &self.options;
        let mut trees: HashMap<Method, matchit::Router<Target>> = HashMap::new();

        for route in &self.routes {
            let pipeline = Pipeline::builder()
                .components(route.components.iter().cloned())
                .error_gate(options.error_gate)
                .strict(options.strict_components)
                .build()?;
            debug!(
                method = %route.method,
                path = %route.path,
                stages = ?pipeline.stage_names(),
                "route compiled"
            );
            trees
                .entry(route.method.clone())
                .or_default()
                .insert(
                    route.path.as_str(),
                    Target {
                        template: route.path.clone(),
                        handler: pipeline.handler(),
                    },
                )
                .map_err(|e| ServerError::invalid_route(&route.path, e))?;
        }

        let dispatch = Dispatch {
            trees,
            not_found: self.not_found.clone(),
            method_not_allowed: self.method_not_allowed.clone(),
        };

        let mut stages: Vec<Component> = Vec::new();
        if options.core_init {
            stages.push(StoreInit::new(Arc::clone(&self.manager)).into_component());
        }
        let reporter = match &options.error_callback {
            Some(callback) => ErrorHandlerStage::from_callback(Arc::clone(callback)),
            None => ErrorHandlerStage::default(),
        };
        stages.push(reporter.into_component());
        if options.recover_panics {
            stages.push(Recover.into_component());
        }
        if let Some(real_ip) = &options.real_ip {
            stages.push(real_ip.clone().into_component());
        }
        if options.request_ids {
            let request_id = if options.trust_incoming_request_id {
                RequestIdMiddleware::trust_incoming()
            } else {
                RequestIdMiddleware::new()
            };
            stages.push(request_id.into_component());
        }
        if options.trailing_slash != TrailingSlash::Keep {
            stages.push(options.trailing_slash.into_component());
        }
        if let Some(headers) = server_name(&options.server_name) {
            stages.push(headers.into_component());
        }
        stages.extend(self.global.iter().cloned());
        stages.push(Component::Handler(Arc::new(dispatch)));

        Ok(Pipeline::builder()
            .components(stages)
            .error_gate(options.error_gate)
            .strict(options.strict_components)
            .build()?)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("options", &self.options)
            .field("routes", &self.routes.len())
            .field("global", &self.global.len())
            .finish_non_exhaustive()
    }
}

/// Routes declared under a shared prefix. Created by [`Router::group`].
pub struct RouteGroup<'a> {
    router: &'a mut Router,
    prefix: String,
    components: Vec<Component>,
}

impl RouteGroup<'_> {
    /// Declares a route below the group prefix; the group's components run
    /// before the route's own.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        components: impl IntoIterator<Item = Component>,
    ) -> &mut Self {
        let mut all = self.components.clone();
        all.extend(components);
        self.router.route(method, &join_path(&self.prefix, path), all);
        self
    }

    /// Opens a nested group.
    pub fn group(
        &mut self,
        prefix: &str,
        components: impl IntoIterator<Item = Component>,
    ) -> RouteGroup<'_> {
        let mut all = self.components.clone();
        all.extend(components);
        RouteGroup {
            prefix: join_path(&self.prefix, prefix),
            router: &mut *self.router,
            components: all,
        }
    }
}

macro_rules! method_helpers {
    ($ty:ty) => {
        impl $ty {
            method_helpers!(@fn get, GET);
            method_helpers!(@fn post, POST);
            method_helpers!(@fn put, PUT);
            method_helpers!(@fn patch, PATCH);
            method_helpers!(@fn delete, DELETE);
            method_helpers!(@fn head, HEAD);
            method_helpers!(@fn options, OPTIONS);
        }
    };
    (@fn $name:ident, $method:ident) => {
        #[doc = concat!("Declares a `", stringify!($method), "` route.")]
        pub fn $name(
            &mut self,
            path: &str,
            components: impl IntoIterator<Item = Component>,
        ) -> &mut Self {
            self.route(Method::$method, path, components)
        }
    };
}

method_helpers!(Router);
method_helpers!(RouteGroup<'_>);

fn into_handler(item: impl IntoComponent) -> Option<BoxedHandler> {
    match item.into_component() {
        Component::Handler(handler) => Some(handler),
        Component::Middleware(_) | Component::Neither => None,
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}

struct Target {
    template: String,
    handler: BoxedHandler,
}

struct Dispatch {
    trees: HashMap<Method, matchit::Router<Target>>,
    not_found: Option<BoxedHandler>,
    method_not_allowed: Option<BoxedHandler>,
}

enum Lookup<'a> {
    Found(&'a Target, PathParams),
    NotAllowed(Vec<&'a Method>),
    NotFound,
}

impl Dispatch {
    fn lookup(&self, method: &Method, path: &str) -> Lookup<'_> {
        if let Some(matched) = self.trees.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched
                .params
                .iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(matched.value, PathParams(params));
        }

        let mut allowed: Vec<&Method> = self
            .trees
            .iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m)
            .collect();
        if allowed.is_empty() {
            Lookup::NotFound
        } else {
            allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            Lookup::NotAllowed(allowed)
        }
    }
}

impl Handler for Dispatch {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let method = ex.request().method().clone();
            let path = ex.request().uri().path().to_owned();

            match self.lookup(&method, &path) {
                Lookup::Found(target, params) => {
                    if let Some(envelope) = ex.envelope_mut() {
                        envelope.set_original_path(&target.template);
                    }
                    ex.set_value(PathParamsKey, params);
                    target.handler.call(ex).await;
                }
                Lookup::NotAllowed(allowed) => {
                    ex.set_flag(Flags::NOT_ALLOWED, true);
                    let allow = allowed
                        .iter()
                        .map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(", ");
                    if let Ok(value) = HeaderValue::from_str(&allow) {
                        ex.response_mut().headers_mut().insert(ALLOW, value);
                    }
                    match &self.method_not_allowed {
                        Some(handler) => handler.call(ex).await,
                        None => {
                            ex.record_error(HttpError::method_not_allowed(format!(
                                "{method} is not allowed for {path}"
                            )));
                        }
                    }
                }
                Lookup::NotFound => {
                    ex.set_flag(Flags::NOT_FOUND, true);
                    match &self.not_found {
                        Some(handler) => handler.call(ex).await,
                        None => {
                            ex.record_error(HttpError::not_found(format!("no route for {path}")));
                        }
                    }
                }
            }
        })
    }

    fn name(&self) -> &'static str {
        "router"
    }
}
