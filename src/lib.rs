// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Bodyscale: body-composition tracking from a BLE bathroom scale
//!
//! This crate decodes the scale's advertisements, debounces each weigh-in to
//! a single reading, assigns it to a household profile by weight range and
//! derives body-composition metrics, with a JSON API for the dashboard.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::Store;
use services::{EtlService, IngestHandle};

/// Shared application state.
pub struct AppState<S: Store> {
    pub config: Config,
    pub db: S,
    pub etl: Arc<EtlService<S>>,
    pub ingest: IngestHandle,
}
