//! PartsHub back-office API
//!
//! Multi-branch retail management for an auto-parts business: products,
//! branch inventory, sales invoices, credit tracking, safes and basic
//! bookkeeping.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod services;

use std::sync::Arc;

use axum::{middleware, Router};
use tokio::sync::mpsc;

use crate::errors::ServiceError;
use crate::events::outbox::OutboxExecutor;
use crate::events::EventSender;
use crate::handlers::AppServices;
use crate::middleware_helpers::{idempotency_middleware, IdempotencyStore};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
    pub idempotency: IdempotencyStore,
}

impl AppState {
    /// Connects, migrates (when configured), wires services and the event
    /// channel. The outbox worker is started separately by the binary so
    /// tests can drain the outbox deterministically instead.
    pub async fn bootstrap(config: config::AppConfig) -> Result<Arc<Self>, ServiceError> {
        let pool = db::establish_connection_from_app_config(&config).await?;
        if config.auto_migrate {
            db::run_migrations(&pool).await?;
        }
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db.clone(), event_sender.clone());

        Ok(Arc::new(Self {
            db,
            config,
            event_sender,
            services,
            idempotency: IdempotencyStore::new(),
        }))
    }

    /// Executor the outbox worker uses to run deferred effects
    pub fn outbox_executor(&self) -> OutboxExecutor {
        OutboxExecutor::new(self.services.safes.clone(), self.services.audit.clone())
    }
}

/// Builds the full application router over the given state
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::health::routes())
        .nest("/api/v1", api::api_v1_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            idempotency_middleware,
        ))
        .with_state(state)
}
