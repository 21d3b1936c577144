//! Client core for the Waste Plus reporting API.
//!
//! # Overview
//! Two pieces carry the logic:
//! - the request pipeline ([`request`]): a declarative [`ApiRequestOptions`]
//!   plus a shared [`ApiConfig`] become one HTTP exchange, exposed as a
//!   [`CancelableFuture`] with uniform error classification;
//! - the token parser ([`auth`]): identity token claims become a
//!   [`FamLoginUser`] with roles and privileges for access checks.
//!
//! Around them sit the session holder, route filtering, an event bus, the
//! preference store and pagination helpers.
//!
//! # Design
//! - Request building, sending and classification are separate functions over
//!   plain data (`HttpRequest`, `HttpResponse`); only [`Transport`] does I/O.
//! - Services are thin: they build descriptors and call
//!   [`HttpClient::do_request`].
//! - Nothing retries. Callers decide.

pub mod auth;
pub mod cancelable;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod http;
pub mod pagination;
pub mod preference;
pub mod request;
pub mod routes;
pub mod services;
pub mod session;
pub mod transport;
pub mod users;

pub use auth::{parse_token, AppRole, FamLoginUser, FamRole, IdpProvider, Jwt, Role, RoleType};
pub use cancelable::{CancelableFuture, Phase};
pub use client::HttpClient;
pub use config::{ApiConfig, Credentials, Resolver};
pub use descriptor::{ApiMiddleware, ApiRequestOptions, Body};
pub use error::{ApiError, ApiResult, CancelError, RequestError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};
pub use preference::{PreferenceStore, UserPreference};
pub use services::{backend_api_config, Apis};
pub use session::AuthSession;
pub use transport::{ReqwestTransport, Transport};
pub use users::UserService;
