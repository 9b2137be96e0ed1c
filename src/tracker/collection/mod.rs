pub mod collector;
pub mod detector;
pub mod page;
