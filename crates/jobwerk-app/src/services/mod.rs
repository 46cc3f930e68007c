// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: wires the jobwerk library crates into a running host.

pub mod components;
pub mod config;
pub mod data_dir;
pub mod engine;
