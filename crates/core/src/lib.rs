pub mod changelog;
pub mod clock;
pub mod config;
pub mod document;
pub mod error;
pub mod model;

pub use changelog::*;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use document::*;
pub use error::*;
pub use model::*;
