//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::domains::entities::{
    Aspect, Characteristic, Concept, Device, DeviceClass, DeviceType, Function, Hub, Location,
    Protocol, Resource,
};
use crate::kernel::ServerDeps;
use crate::server::middleware::jwt_auth_middleware;
use crate::server::routes::{create_handler, delete_handler, health_handler, update_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<ServerDeps>,
}

/// `POST /{resource}`, `PUT /{resource}/:id` and `DELETE /{resource}/:id`
/// for one entity kind.
fn resource_routes<R: Resource>(router: Router<AppState>) -> Router<AppState> {
    let resource = R::KIND.resource();
    router
        .route(&format!("/{resource}"), post(create_handler::<R>))
        .route(
            &format!("/{resource}/:id"),
            put(update_handler::<R>).delete(delete_handler::<R>),
        )
}

/// Build the Axum application router
pub fn build_app(deps: ServerDeps) -> Router {
    let app_state = AppState {
        deps: Arc::new(deps),
    };

    // CORS configuration - allow any origin, the gateway restricts access
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    let mut router = Router::new();
    router = resource_routes::<DeviceType>(router);
    router = resource_routes::<Protocol>(router);
    router = resource_routes::<Concept>(router);
    router = resource_routes::<Characteristic>(router);
    router = resource_routes::<Function>(router);
    router = resource_routes::<Aspect>(router);
    router = resource_routes::<DeviceClass>(router);
    router = resource_routes::<Device>(router);
    router = resource_routes::<Hub>(router);
    router = resource_routes::<Location>(router);

    router
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(middleware::from_fn(jwt_auth_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}
