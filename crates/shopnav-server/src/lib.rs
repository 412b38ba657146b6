// Copyright 2026 Shopnav Contributors
// SPDX-License-Identifier: Apache-2.0

//! REST surface for shopnav.
//!
//! - `GET /api/scrape?url=<home>` returns the category tree of a site.
//! - `GET /api/facets?url=<listing>` returns the filter groups of a listing page.
//! - `GET /health` reports liveness.

pub mod rest;

pub use rest::{router, start, AppState};
