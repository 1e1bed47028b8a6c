pub mod builder;
pub mod timer;

pub use builder::TimerBuilder;
pub use timer::Timer;
