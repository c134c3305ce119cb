mod buffer;

pub use buffer::{AdmitOutcome, Facts, LateDropWarning, SealedPoint, WindowBuffer};
