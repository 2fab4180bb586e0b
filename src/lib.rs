//! vMix timeline driver library.
//!
//! Turns resolved timeline states into timed vMix commands. This library
//! exposes the core of the `vmx` CLI for use in tests and embedding
//! applications.
//!
//! # Modules
//!
//! - `scheduler`: time-ordered command queue with burst and in-order delivery
//! - `history`: time-indexed store of believed mixer states
//! - `reconcile`: projection of timeline states and diffing into commands
//! - `device`: the driver (`MixerDevice`) and the transport seam
//! - `config`: driver configuration loading and validation
//! - `simulate`: offline replay through a recording transport
//! - `output`: output mode abstraction (robot/human)
#![forbid(unsafe_code)]

pub mod cli;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod history;
pub mod logging;
pub mod output;
pub mod reconcile;
pub mod scheduler;
pub mod simulate;
pub mod state;
pub mod timeline;
