//! The methods a service exposes are "handlers": async functions that get whatever they need out
//! of the incoming call by way of extractors, and return anything that can be turned into an
//! outcome.
//!
//! All such functions implement [`Handler`], although it's not intended that most users will
//! implement that directly.  The design is borrowed from axum: extractors implement
//! [`FromRequest`], return types implement [`IntoResponse`], and a macro implements [`Handler`] for
//! async functions of every supported arity.
//!
//! ```ignore
//! async fn hello(Instance(svc): Instance<Greeter>, Params((name,)): Params<(String,)>) -> String {
//!     svc.greet(&name)
//! }
//! ```
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::convert::Infallible;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::codec::{BigInt, CodecError, ConversionError, FromRichValue, IntoRichValue, RichValue};
use crate::types::{self, ErrorCode, JsonValue};

/// Everything about a single call that a handler might want to extract.
pub struct Request {
    pub id: types::Id,
    pub method: String,
    /// Decoded positional parameters
    pub params: Vec<RichValue>,
    pub context: Arc<RequestContext>,
    pub response_headers: ResponseHeaders,
}

/// The parts of the HTTP request that carried a call, minus the body.
///
/// Service factories receive this to build the per-request service instance, so that services
/// can look at cookies, authorization headers and the like.
#[derive(Debug, Default)]
pub struct RequestContext {
    pub method: http::Method,
    pub uri: http::Uri,
    pub headers: HeaderMap,
    pub extensions: http::Extensions,
}

impl RequestContext {
    pub fn from_parts(parts: http::request::Parts) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            extensions: parts.extensions,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Value of a request header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Headers a method wants added to the HTTP response that carries its result.
///
/// Cloning produces another handle to the same headers.
#[derive(Clone, Debug, Default)]
pub struct ResponseHeaders(Arc<Mutex<HeaderMap>>);

impl ResponseHeaders {
    pub fn insert(&self, name: HeaderName, value: HeaderValue) {
        self.lock().insert(name, value);
    }

    pub fn append(&self, name: HeaderName, value: HeaderValue) {
        self.lock().append(name, value);
    }

    pub(crate) fn take(&self) -> HeaderMap {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeaderMap> {
        // A panicking method can poison this; the headers themselves are still usable
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Inspired by axum's `FromRequest` trait.
///
/// Unlike axum there is no distinction between extractors that consume the request body and
/// those that don't; by the time a handler runs the body has already been decoded into
/// [`Request::params`], so every extractor just borrows the request.
pub trait FromRequest<S>: Sized {
    /// The error that indicates the extraction of this type from the request failed.
    type Rejection: Into<MethodError>;

    fn from_request(request: &Request, instance: &Arc<S>) -> Result<Self, Self::Rejection>;
}

// Extractors that pull information from the request and make it available to a handler

/// The service instance that was constructed for this request.
pub struct Instance<S>(pub Arc<S>);

impl<S> FromRequest<S> for Instance<S> {
    type Rejection = Infallible;

    fn from_request(_request: &Request, instance: &Arc<S>) -> Result<Self, Self::Rejection> {
        Ok(Self(instance.clone()))
    }
}

/// The call's positional parameters, converted into `P`.
///
/// `P` is usually a tuple with one element per parameter.  Parameters the caller left out are
/// treated as `undefined`, so trailing parameters may be declared as `Option<T>`.  Parameters
/// beyond the ones `P` declares are ignored.
pub struct Params<P>(pub P);

impl<P: FromParams, S> FromRequest<S> for Params<P> {
    type Rejection = MethodError;

    fn from_request(request: &Request, _instance: &Arc<S>) -> Result<Self, Self::Rejection> {
        P::from_params(request.params.clone())
            .map(Params)
            .map_err(|source| MethodError::InvalidParams { source })
    }
}

/// Name of the method being invoked.
pub struct MethodName(pub String);

impl<S> FromRequest<S> for MethodName {
    type Rejection = Infallible;

    fn from_request(request: &Request, _instance: &Arc<S>) -> Result<Self, Self::Rejection> {
        Ok(Self(request.method.clone()))
    }
}

/// The call's correlation id, either the caller's or one minted for it.
impl<S> FromRequest<S> for types::Id {
    type Rejection = Infallible;

    fn from_request(request: &Request, _instance: &Arc<S>) -> Result<Self, Self::Rejection> {
        Ok(request.id.clone())
    }
}

/// The HTTP request that carried the call.
pub struct Context(pub Arc<RequestContext>);

impl<S> FromRequest<S> for Context {
    type Rejection = Infallible;

    fn from_request(request: &Request, _instance: &Arc<S>) -> Result<Self, Self::Rejection> {
        Ok(Self(request.context.clone()))
    }
}

impl<S> FromRequest<S> for ResponseHeaders {
    type Rejection = Infallible;

    fn from_request(request: &Request, _instance: &Arc<S>) -> Result<Self, Self::Rejection> {
        Ok(request.response_headers.clone())
    }
}

/// Types that can be built from a call's positional parameters.
pub trait FromParams: Sized {
    fn from_params(params: Vec<RichValue>) -> Result<Self, ConversionError>;
}

/// Types that can be passed as a call's positional parameters.
pub trait IntoParams {
    fn into_params(self) -> Vec<RichValue>;
}

impl FromParams for Vec<RichValue> {
    fn from_params(params: Vec<RichValue>) -> Result<Self, ConversionError> {
        Ok(params)
    }
}

impl IntoParams for Vec<RichValue> {
    fn into_params(self) -> Vec<RichValue> {
        self
    }
}

impl FromParams for () {
    fn from_params(_params: Vec<RichValue>) -> Result<Self, ConversionError> {
        Ok(())
    }
}

impl IntoParams for () {
    fn into_params(self) -> Vec<RichValue> {
        Vec::new()
    }
}

macro_rules! impl_params_tuple {
    ($($ty:ident $position:tt),+) => {
        #[allow(non_snake_case)]
        impl<$($ty: FromRichValue,)+> FromParams for ($($ty,)+) {
            fn from_params(params: Vec<RichValue>) -> Result<Self, ConversionError> {
                let mut params = params.into_iter();
                $(
                    let $ty = $ty::from_rich_value(params.next().unwrap_or(RichValue::Undefined))
                        .map_err(|e| e.at_param($position))?;
                )+
                Ok(($($ty,)+))
            }
        }

        #[allow(non_snake_case)]
        impl<$($ty: IntoRichValue,)+> IntoParams for ($($ty,)+) {
            fn into_params(self) -> Vec<RichValue> {
                let ($($ty,)+) = self;
                vec![$($ty.into_param(),)+]
            }
        }
    };
}

impl_params_tuple!(T1 0);
impl_params_tuple!(T1 0, T2 1);
impl_params_tuple!(T1 0, T2 1, T3 2);
impl_params_tuple!(T1 0, T2 1, T3 2, T4 3);
impl_params_tuple!(T1 0, T2 1, T3 2, T4 3, T5 4);
impl_params_tuple!(T1 0, T2 1, T3 2, T4 3, T5 4, T6 5);

/// Failure of a service method, or of the machinery that invokes it.
#[derive(Debug, Error)]
pub enum MethodError {
    /// A failure the method wants reported to the caller as is.
    #[error("{message}")]
    Rpc {
        code: i64,
        message: String,
        status: StatusCode,
    },

    #[error("Invalid method parameters")]
    InvalidParams { source: ConversionError },

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Anything else.  The details are logged but never sent to the caller.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MethodError {
    /// An error reported to the caller with the given code and message, and HTTP status 500.
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        MethodError::Rpc {
            code,
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn with_status(self, status: StatusCode) -> Self {
        match self {
            MethodError::Rpc { code, message, .. } => MethodError::Rpc { code, message, status },
            other => other,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::rpc(i64::from(ErrorCode::InvalidParams.code()), message).with_status(StatusCode::BAD_REQUEST)
    }
}

impl From<Infallible> for MethodError {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}

/// Instruction to send the caller's browser elsewhere instead of returning a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub location: String,
    pub status: RedirectStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum RedirectStatus {
    MultipleChoices = 300,
    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    UseProxy = 305,
    SwitchProxy = 306,
    TemporaryRedirect = 307,
    PermanentRedirect = 308,
}

impl RedirectStatus {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl Redirect {
    pub fn new(location: impl Into<String>, status: RedirectStatus) -> Self {
        Self {
            location: location.into(),
            status,
        }
    }

    pub fn moved_permanently(location: impl Into<String>) -> Self {
        Self::new(location, RedirectStatus::MovedPermanently)
    }

    pub fn found(location: impl Into<String>) -> Self {
        Self::new(location, RedirectStatus::Found)
    }

    pub fn see_other(location: impl Into<String>) -> Self {
        Self::new(location, RedirectStatus::SeeOther)
    }

    pub fn temporary(location: impl Into<String>) -> Self {
        Self::new(location, RedirectStatus::TemporaryRedirect)
    }

    pub fn permanent(location: impl Into<String>) -> Self {
        Self::new(location, RedirectStatus::PermanentRedirect)
    }
}

/// What a method invocation came to.
#[derive(Debug)]
pub enum MethodOutcome {
    Value(RichValue),
    Redirect(Redirect),
    Failed(MethodError),
}

/// Type implemented by anything a handler can return.
pub trait IntoResponse {
    fn into_outcome(self) -> MethodOutcome;
}

/// Return a rich value as a success response.
///
/// Any type implementing [`IntoRichValue`] can be returned this way; the common ones are also
/// accepted without the wrapper.
pub struct Rich<T>(pub T);

impl<T: IntoRichValue> IntoResponse for Rich<T> {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Value(self.0.into_rich_value())
    }
}

/// A Rust struct serialized to plain JSON.
///
/// In the unlikely event that serialization fails, this will instead produce an error outcome.
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_outcome(self) -> MethodOutcome {
        match serde_json::to_value(self.0) {
            Ok(json) => MethodOutcome::Value(RichValue::from(json)),
            Err(source) => MethodOutcome::Failed(
                CodecError::Serialize {
                    type_name: std::any::type_name::<T>(),
                    source,
                }
                .into(),
            ),
        }
    }
}

macro_rules! impl_into_response_for_rich {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoResponse for $ty {
                fn into_outcome(self) -> MethodOutcome {
                    MethodOutcome::Value(self.into_rich_value())
                }
            }
        )*
    };
}

impl_into_response_for_rich!(
    RichValue,
    JsonValue,
    (),
    String,
    &'static str,
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    u64,
    f32,
    f64,
    DateTime<Utc>,
    BigInt,
);

impl<T: IntoRichValue> IntoResponse for Option<T> {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Value(self.into_rich_value())
    }
}

impl<T: IntoRichValue> IntoResponse for Vec<T> {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Value(self.into_rich_value())
    }
}

impl<T: IntoRichValue> IntoResponse for BTreeSet<T> {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Value(self.into_rich_value())
    }
}

impl<T: IntoRichValue> IntoResponse for HashSet<T> {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Value(self.into_rich_value())
    }
}

impl<K: IntoRichValue, V: IntoRichValue> IntoResponse for BTreeMap<K, V> {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Value(self.into_rich_value())
    }
}

impl<K: IntoRichValue, V: IntoRichValue> IntoResponse for HashMap<K, V> {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Value(self.into_rich_value())
    }
}

impl IntoResponse for Redirect {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Redirect(self)
    }
}

impl IntoResponse for MethodError {
    fn into_outcome(self) -> MethodOutcome {
        MethodOutcome::Failed(self)
    }
}

impl IntoResponse for MethodOutcome {
    fn into_outcome(self) -> MethodOutcome {
        self
    }
}

impl IntoResponse for Infallible {
    fn into_outcome(self) -> MethodOutcome {
        match self {}
    }
}

/// Handlers that return a result succeed with whatever the `Ok` value converts to, and fail with
/// the error.  `anyhow::Result` works here too, producing an internal error.
impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: Into<MethodError>,
{
    fn into_outcome(self) -> MethodOutcome {
        match self {
            Ok(value) => value.into_outcome(),
            Err(e) => MethodOutcome::Failed(e.into()),
        }
    }
}

/// A service method.
///
/// You may implement it directly, but it's more likely that you'll use the existing
/// implementations on `async` functions and closures.
///
/// ## Type Parameters
///
/// - `HackT`: This is a hack to get around Rust's rules for trait implementation.  To `impl Trait`
///   with type parameters, those type parameters have to be constrained to the trait itself or the
///   implementing type.  When we make blanket impls for all async functions that take certain
///   types of args, those arg types need to be part of the trait signature.  This type parameter
///   is erased once the handler is added to a service, so try to ignore it mentally.
/// - `S`: The service type.  Every method of a service gets the same per-request instance, and
///   can get at it with the [`Instance`] extractor.
pub trait Handler<HackT, S>: Clone + Send + Sync + Sized + 'static {
    type Future: Future<Output = MethodOutcome> + Send + 'static;

    fn call(self, instance: Arc<S>, request: Request) -> Self::Future;
}

impl<F, Fut, S, Res> Handler<(), S> for F
where
    F: FnOnce() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Res> + Send + 'static,
    Res: IntoResponse,
    S: Send + Sync + 'static,
{
    type Future = BoxFuture<'static, MethodOutcome>;

    fn call(self, _instance: Arc<S>, _request: Request) -> Self::Future {
        async move { self().await.into_outcome() }.boxed()
    }
}

/// Invoke a macro for all supported handler arities.
///
/// Axum goes to 16; there aren't that many useful extractors here.
#[rustfmt::skip]
macro_rules! all_the_tuples {
    ($name:ident) => {
        $name!([], T1);
        $name!([T1], T2);
        $name!([T1, T2], T3);
        $name!([T1, T2, T3], T4);
        $name!([T1, T2, T3, T4], T5);
    };
}

macro_rules! impl_handler {
    (
        [$($ty:ident),*], $last:ident
    ) => {
        #[allow(non_snake_case)]
        impl<F, Fut, S, Res, $($ty,)* $last> Handler<($($ty,)* $last,), S> for F
        where
            F: FnOnce($($ty,)* $last,) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            S: Send + Sync + 'static,
            Res: IntoResponse,
            $( $ty: FromRequest<S> + Send + 'static, )*
            $last: FromRequest<S> + Send + 'static {
            type Future = BoxFuture<'static, MethodOutcome>;

            fn call(self, instance: Arc<S>, request: Request) -> Self::Future {
                // Extraction happens up front, so the future holds only the extracted values and
                // not the request
                $(
                    let $ty = match <$ty as FromRequest<S>>::from_request(&request, &instance) {
                        Ok(value) => value,
                        Err(rejection) => return futures::future::ready(MethodOutcome::Failed(rejection.into())).boxed(),
                    };
                )*

                let $last = match <$last as FromRequest<S>>::from_request(&request, &instance) {
                    Ok(value) => value,
                    Err(rejection) => return futures::future::ready(MethodOutcome::Failed(rejection.into())).boxed(),
                };

                async move { self($($ty,)* $last,).await.into_outcome() }.boxed()
            }
        }
    };
}

all_the_tuples!(impl_handler);

/// A dyn compatible version of [`Handler`], which erases the `HackT` type parameter so handlers
/// of different signatures can live in the same method table.
pub(crate) trait ErasedHandler<S>: Send + Sync {
    fn call(&self, instance: Arc<S>, request: Request) -> BoxFuture<'static, MethodOutcome>;
}

struct HandlerWrapper<H, HackT> {
    handler: H,
    _phantom: PhantomData<fn() -> HackT>,
}

impl<H, HackT, S> ErasedHandler<S> for HandlerWrapper<H, HackT>
where
    H: Handler<HackT, S>,
    HackT: 'static,
    S: 'static,
{
    fn call(&self, instance: Arc<S>, request: Request) -> BoxFuture<'static, MethodOutcome> {
        self.handler.clone().call(instance, request).boxed()
    }
}

pub(crate) fn erase_handler<H, HackT, S>(handler: H) -> Box<dyn ErasedHandler<S>>
where
    H: Handler<HackT, S>,
    HackT: 'static,
    S: 'static,
{
    Box::new(HandlerWrapper {
        handler,
        _phantom: PhantomData,
    })
}
