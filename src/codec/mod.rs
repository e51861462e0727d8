//! # Cloud Codec
//!
//! Translation between the telemetry buffers / device configuration and
//! the cloud wire format.
//!
//! This module handles:
//! - The `CloudCodec` interface used by the cloud manager
//! - Reporting which buffer entries an encode consumed
//! - The JSON implementation of the device shadow contract ([`json`])
//!
//! Encoding never mutates the buffers: it reads a shared snapshot and
//! returns the consumed entries so that the owner can mark them published.

pub mod json;

use bytes::Bytes;

use crate::buffer::{Consumed, TelemetryBuffers};
use crate::collab::{AgpsRequest, ClockSource};
use crate::data::UiSample;
use crate::device_config::{ConfigDelta, DeviceConfig};
use crate::error::CodecError;

pub use json::JsonCodec;

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// An encoded message and the buffer entries it carries
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub payload: Bytes,
    pub consumed: Consumed,
}

/// Encoder/decoder for every message exchanged with the cloud
pub trait CloudCodec: Send {
    /// Reported configuration for the device shadow
    fn encode_config(&self, config: &DeviceConfig) -> CodecResult<Bytes>;

    /// Desired configuration from an inbound payload
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NotConfig` when the payload carries no config object
    fn decode_config(&self, payload: &[u8]) -> CodecResult<ConfigDelta>;

    /// Newest queued entry of every buffer except UI, as one shadow update
    ///
    /// The static modem block is only added when `include_static_modem` is set.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoData` when no head entry is queued
    fn encode_data(
        &self,
        buffers: &TelemetryBuffers,
        clock: &dyn ClockSource,
        include_static_modem: bool,
    ) -> CodecResult<Encoded>;

    /// Every queued entry not listed in `skip`, grouped per kind
    ///
    /// # Errors
    ///
    /// Returns `CodecError::NoData` when nothing is left to encode
    fn encode_batch(
        &self,
        buffers: &TelemetryBuffers,
        clock: &dyn ClockSource,
        skip: &Consumed,
    ) -> CodecResult<Encoded>;

    /// Single button press message
    fn encode_ui(&self, sample: &UiSample, clock: &dyn ClockSource) -> CodecResult<Bytes>;

    fn encode_agps_request(&self, request: &AgpsRequest) -> CodecResult<Bytes>;

    /// Validate an inbound payload as AGPS assistance data
    fn decode_agps(&self, payload: &[u8]) -> CodecResult<Bytes>;
}
