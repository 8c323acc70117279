pub mod utils {
    pub mod rng;
}

pub mod error;
pub mod params;
pub mod lattice;
pub mod field;
pub mod action;
pub mod checkerboard;
pub mod propagator;
pub mod transfer;
pub mod udv;
pub mod green;
pub mod proposals;
pub mod local_update;
pub mod global_moves;
pub mod measure;
pub mod observables;
pub mod accumulator;
pub mod error_analysis;
pub mod evaluation;
pub mod metadata;
pub mod model;
pub mod simulation;

pub use error::{Result, SdwError};
pub use model::DetSdw;
pub use params::{McParams, ModelParams, ParamMap};
pub use simulation::{Simulation, SimulationSnapshot};
