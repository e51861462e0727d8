//! # Cat Tracker Library
//!
//! Event-driven core of a cellular/GPS animal tracker.
//!
//! Independent managers sample GPS, modem, battery, environmental and
//! movement data, buffer it while offline, and publish it to a cloud device
//! shadow in coordinated collection cycles. They communicate only through
//! the event bus in [`manager`].

pub mod buffer;
pub mod codec;
pub mod collab;
pub mod config;
pub mod data;
pub mod device_config;
pub mod error;
pub mod events;
pub mod host;
pub mod manager;
pub mod managers;
pub mod tracker;
