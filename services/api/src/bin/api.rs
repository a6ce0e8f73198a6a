//! services/api/src/bin/api.rs

use api_lib::{
    adapters::PgStore,
    config::Config,
    error::ApiError,
    web::{auth, classes, paragraphs, state::AppState, stories, users, ApiDoc},
};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = PgStore::new(db_pool);
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), Arc::new(store)));

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .frontend_origin
                .parse::<HeaderValue>()
                .map_err(|e| ApiError::Internal(format!("Invalid FRONTEND_ORIGIN: {e}")))?,
        )
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let api_routes = Router::new()
        .route("/register", post(users::create_user_handler))
        .route("/login", post(auth::login_handler))
        .route(
            "/users",
            get(users::list_users_handler).post(users::create_user_handler),
        )
        .route(
            "/users/{user_id}",
            axum::routing::patch(users::update_user_handler).delete(users::delete_user_handler),
        )
        .route(
            "/users/{user_id}/paragraphs",
            post(paragraphs::create_paragraph_handler),
        )
        .route(
            "/paragraphs/{paragraph_id}",
            get(paragraphs::get_paragraph_handler)
                .patch(paragraphs::update_paragraph_handler)
                .delete(paragraphs::delete_paragraph_handler),
        )
        .route(
            "/stories",
            get(stories::list_stories_handler).post(stories::create_story_handler),
        )
        .route(
            "/stories/{story_id}",
            axum::routing::patch(stories::update_story_handler)
                .delete(stories::delete_story_handler),
        )
        .route(
            "/stories/{story_id}/paragraphs",
            get(stories::story_paragraphs_handler),
        )
        .route(
            "/classes",
            get(classes::list_classes_handler).post(classes::create_class_handler),
        )
        .route(
            "/classes/{class_id}",
            get(classes::get_class_handler)
                .patch(classes::update_class_handler)
                .delete(classes::delete_class_handler),
        )
        .route(
            "/classes/{class_id}/students/{student_id}",
            delete(classes::remove_student_handler),
        )
        .route(
            "/classes/{class_id}/finalize-story/{story_id}",
            post(classes::finalize_story_handler),
        )
        .route(
            "/classes/{class_id}/finalized-stories/{story_id}/images",
            post(classes::append_image_handler),
        );

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
