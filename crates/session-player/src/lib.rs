//! Desktop host for `session-core`: local-file decoding through symphonia, output through
//! cpal, JSON resume records and a stdin control console.

pub mod cli;
pub mod config;
pub mod console;
pub mod decoder;
pub mod focus;
pub mod library;
pub mod notify;
pub mod records;
pub mod runtime;

mod buffer;
mod device;
mod output;
mod resample;
