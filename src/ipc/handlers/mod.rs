pub mod class_lists;
pub mod core;
pub mod optimize;
pub mod requests;
pub mod roster;
pub mod surveys;
