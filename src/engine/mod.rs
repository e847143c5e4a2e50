pub mod assignment;
pub mod sweeps;
