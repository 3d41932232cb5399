//! Dependency readiness
//!
//! A dependency counts as ready when its configured probe passes, not when
//! its containers merely started. Dependencies without a probe are always
//! ready, and an unknown probe type passes with a warning.

pub mod checker;
pub mod probe;

pub use checker::{Dependency, ReadinessChecker};
pub use probe::{Prober, ReadinessCheck, ReadinessProbe};
