pub mod scheduler;

pub use scheduler::{Phase, Scheduler, TickReport};
