// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! RadarWire Library
//!
//! Driver and capture decoder for FMCW radar sensors speaking the
//! command/response wire protocol over TCP or UDP.
//!
//! # Features
//!
//! - **Transport** - TCP and UDP byte transports with sticky error state
//! - **Session** - Framed request/response exchange with optional CRC16
//! - **Dispatcher** - Typed command catalog with cached device parameters
//! - **Records** - Capture scanning, frame decoding and parallel
//!   fixed-stride magnitude extraction
//! - **Settings** - JSON persistence of the radar and frontend parameters

/// Command catalog and dispatcher
pub mod command;

/// Common socket utilities
pub mod common;

/// Magnitude data shape derived from the radar parameters
pub mod config;

/// CRC16 engine used to seal requests and verify responses
pub mod crc;

/// Bounds-checked big-endian reader
pub mod cursor;

/// Error types shared by the protocol and decoder
pub mod error;

/// Record index sidecar files
pub mod index;

/// Device parameter blocks
pub mod params;

/// Capture record decoder
pub mod record;

/// Framed request/response session
pub mod session;

/// Persisted radar settings
pub mod settings;

/// TCP and UDP transports
pub mod transport;

pub use error::Error;
