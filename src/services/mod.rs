pub mod ai;
pub mod booking;
pub mod calendar;
pub mod extract;
pub mod sessions;
pub mod specialist;
