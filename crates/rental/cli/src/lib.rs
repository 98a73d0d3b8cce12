//! Library half of `rentalctl`: scenario files and their replay.

#![deny(unsafe_code)]

pub mod scenario;

pub use scenario::{run_scenario, Action, Scenario, ScenarioReport, Step, StepFailure, StepOutcome};
