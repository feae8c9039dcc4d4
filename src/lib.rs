pub mod adb;
pub mod analysis;
pub mod audit;
pub mod case;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod media;
pub mod probe;
pub mod report;
pub mod session;
pub mod timesync;
pub mod uitree;
pub mod vectors;

pub use config::Config;
pub use error::{AcquireError, Result};
pub use session::{AcquisitionSession, SessionReport};
