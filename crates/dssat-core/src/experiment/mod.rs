//! Experiment (X-file) construction, rendering and parsing.

pub mod builder;
pub mod parser;
pub mod xfile;

pub use builder::{TreatmentRow, build, build_with_reference_year};
pub use parser::{ParsedExperiment, parse, parse_file};
pub use xfile::{render_experiment, write_experiment};
