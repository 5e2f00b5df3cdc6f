//! Everything between an uploaded model and a `SlicingResult`:
//! profile lookup, running the slicer, and reading what it wrote.

pub mod gcode;
pub mod profiles;
pub mod resolver;
pub mod runner;
pub mod types;

pub use profiles::ProfileResolver;
pub use resolver::resolve_slice_output;
pub use runner::{OrcaSlicerRunner, SlicerRunner};
pub use types::{ProfilePaths, SliceOutput, SlicerRun, SlicingResult};
