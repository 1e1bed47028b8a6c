pub mod heap;

pub use heap::DeadlineQueue;
