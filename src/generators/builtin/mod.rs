//! Generators available to every game

pub mod count_event;
pub mod stopwatch_timer;
pub mod timespan;

pub use count_event::CountEvent;
pub use stopwatch_timer::StopwatchTimer;
pub use timespan::Timespan;
