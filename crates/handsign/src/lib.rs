//! Hand gesture recognition on video frames.
//!
//! A hand region is followed from frame to frame with an online Multiple Instance Learning tracker
//! ([`tracker`]). Each successfully tracked rectangle is stretched into a classification window
//! ([`window`]), normalized into the fixed tensor format the gesture classifier was trained on
//! ([`preprocess`]), and classified ([`classify`]). [`pipeline::Session`] ties these together and
//! decides what to do when tracking fails.
//!
//! # Models
//!
//! The gesture classifier is distributed as a *bundle*: a TOML manifest naming the ONNX network
//! together with the preprocessing parameters it was trained with (see [`config`]). The optional
//! region detector is a plain ONNX network (see [`detection`]).
//!
//! # Environment Variables
//!
//! * `RUST_LOG`: overrides the log filter installed by [`init_logger!`].

use log::LevelFilter;

pub mod classify;
pub mod config;
pub mod control;
pub mod detection;
pub mod error;
pub mod filter;
pub mod iter;
pub mod nn;
pub mod num;
pub mod pipeline;
pub mod preprocess;
pub mod timer;
pub mod tracker;
pub mod video;
pub mod window;
pub mod worker;

mod drop;

#[cfg(test)]
mod test;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and handsign log at *debug* level, `tract` at *warn* level. `RUST_LOG` takes
/// precedence over both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
