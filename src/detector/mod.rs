pub mod alert;
pub mod amount;
pub mod classifier;
pub mod engine;
pub mod queue;
pub mod receipt;
pub mod window;
