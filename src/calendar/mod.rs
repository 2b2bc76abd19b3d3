pub mod back_out;
pub mod builder;
pub mod roll_calendar;

pub use builder::RollDateMatch;
pub use roll_calendar::{RollCalendar, RollCalendarRow};
