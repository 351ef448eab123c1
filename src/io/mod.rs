pub mod columns;
pub mod error;
pub mod gwas;
pub mod matrix;
pub mod paths;
pub mod results;
pub mod table;
pub mod weights;
