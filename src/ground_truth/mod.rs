pub mod error;
pub mod table;

pub use error::{GroundTruthError, GroundTruthResult};
pub use table::{GroundTruthSource, GroundTruthTable};
