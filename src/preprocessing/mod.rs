//! Train/test splitting and feature scaling

mod scaler;
mod split;
mod transformation;

pub use scaler::StandardScaler;
pub use split::{train_test_split, Split};
pub use transformation::{DataTransformation, TransformedData};
