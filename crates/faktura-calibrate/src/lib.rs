//! Isotonic confidence calibration and ground-truth validation.

pub mod isotonic;
pub mod validation;

pub use isotonic::{calibrate_or_identity, IsotonicModel, WeightedSample};
pub use validation::{validate, BinResult, CalibrationReport, GroundTruthSample};
