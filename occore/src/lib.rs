// error module
pub mod error;

// index module
pub mod index;

// loss module
pub mod loss;

// decoding module
pub mod clustering;

pub use error::{OcError, OcResult};
