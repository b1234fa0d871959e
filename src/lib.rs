//! Road-accident severity prediction.
//!
//! Training and inference share one feature pipeline so that the vector a
//! request is scored with has exactly the columns, in exactly the order, the
//! classifier was trained on.

pub mod config;
pub mod error;
pub mod metrics;
pub mod ml;
pub mod models;

pub use config::Config;
pub use error::{AppError, Result};
pub use ml::SeverityPredictor;
pub use models::{PredictionResult, RawRecord};
