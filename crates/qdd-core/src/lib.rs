#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod paths;
pub mod pkg;

pub use config::{Config, ConfigFlags};
pub use error::Error;
