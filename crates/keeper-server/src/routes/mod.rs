pub mod boxes;
pub mod queue;
