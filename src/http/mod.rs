mod routes;
mod types;

use crate::events::EventDispatcher;
use crate::http::routes::*;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;

#[derive(Clone)]
pub struct HttpState {
    pub channel_secret: Arc<str>,
    pub dispatcher: EventDispatcher,
}

pub fn create_app(channel_secret: &str, dispatcher: EventDispatcher) -> axum::Router {
    let state = HttpState {
        channel_secret: Arc::from(channel_secret),
        dispatcher,
    };

    axum::Router::new()
        .route("/callback", post(callback))
        .route("/sys/version", get(sys_version))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-version"),
            HeaderValue::from_static(crate::VERSION),
        ))
        .with_state(state)
}
