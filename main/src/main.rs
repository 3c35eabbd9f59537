use std::sync::Arc;

use api_router::{api_routes_v1, api_state::ApiState};
use axum::Router;
use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{config::get_config, embedding::build_provider},
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    db.apply_migrations().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider = Arc::new(build_provider(&config, &openai_client, &db).await?);
    info!(
        embedding_backend = ?config.embedding_backend,
        "embedding provider initialized"
    );

    let storage = StorageManager::new(&config).await?;

    let api_state = ApiState::new(
        db,
        config.clone(),
        storage,
        openai_client,
        embedding_provider,
    );

    let app: Router = Router::new()
        .nest("/api/v1", api_routes_v1(&api_state))
        .with_state(api_state);

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!("starting server listening on {serve_address}");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;

    if let Err(err) = axum::serve(listener, app).await {
        error!(error = %err, "server error");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::utils::config::testing::test_config_memory;
    use tower::ServiceExt;

    async fn build_test_app() -> Router {
        let config = test_config_memory();
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &uuid::Uuid::new_v4().to_string())
                .await
                .expect("failed to start in-memory surrealdb"),
        );
        db.apply_migrations()
            .await
            .expect("failed to apply migrations");

        let openai_client = Arc::new(async_openai::Client::with_config(
            async_openai::config::OpenAIConfig::new()
                .with_api_key(&config.openai_api_key)
                .with_api_base(&config.openai_base_url),
        ));

        let storage = StorageManager::new(&config)
            .await
            .expect("failed to build storage manager");

        let embedding_provider = Arc::new(
            build_provider(&config, &openai_client, &db)
                .await
                .expect("failed to build embedding provider"),
        );

        let api_state = ApiState::new(db, config, storage, openai_client, embedding_provider);

        Router::new()
            .nest("/api/v1", api_routes_v1(&api_state))
            .with_state(api_state)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn smoke_startup_with_in_memory_surrealdb() {
        let app = build_test_app().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/live")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);

        let ready_response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/ready")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("ready response");
        assert_eq!(ready_response.status(), StatusCode::OK);
    }
}
