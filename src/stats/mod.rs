pub mod chromosome;
pub mod marginal;
pub mod null;
pub mod running;
pub mod sumstats;
