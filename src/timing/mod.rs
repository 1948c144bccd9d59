// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing module.
//!
//! This module provides the musical clock that turns wall-clock time into
//! beat ranges for the scheduler.

pub mod musical_context;

pub use musical_context::MusicalContext;
