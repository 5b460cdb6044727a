//! Controller subsystem for input device handling
//!
//! Implements the ingestion half of the bridge:
//!
//! 1. [`input_event`] - Kernel event model and raw record decoding
//! 2. [`event_source`] - Device discovery, exclusive grab and event reads
//! 3. [`event_collector`] - Per-source loop feeding the shared report
//!
//! # Architecture
//!
//! ```text
//! joy-bonnet-buttons ──► EventCollector ──┐
//!                                         ├──► ReportAggregator
//! joy-bonnet-stick   ──► EventCollector ──┘
//! ```
//!
//! Each collector runs in its own task and suspends only on its device read.

pub mod event_collector;
pub mod event_source;
pub mod input_event;

pub use event_collector::{CollectorSettings, EventCollector};
pub use event_source::{DeviceFile, DeviceSource, EventSource, SourceError};
pub use input_event::{EventKind, InputEvent};
