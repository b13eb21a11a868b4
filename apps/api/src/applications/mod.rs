pub mod audit;
pub mod handlers;
