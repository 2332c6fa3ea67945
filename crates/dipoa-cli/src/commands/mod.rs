pub mod generate;
pub mod solve;
