pub mod predict;
pub mod projects;
pub mod train;
