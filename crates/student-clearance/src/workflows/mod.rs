pub mod access;
pub mod clearance;
pub mod export;
