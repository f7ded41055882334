//! Domain types shared by the calibration pipeline, the trend estimator and
//! the record store.

pub mod calibration;
pub mod catalog;
pub mod image;
pub mod macros;
pub mod time;
pub mod trend;

pub use calibration::*;
pub use catalog::*;
pub use image::*;
pub use time::*;
pub use trend::*;
