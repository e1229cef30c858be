/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod assets;
pub mod config;
pub mod datastore;
pub mod http_retry;
pub mod logging;
pub mod media_store;
pub mod runtime;
pub mod staleness;
pub mod sync;
pub mod upstream;
pub mod writer;
