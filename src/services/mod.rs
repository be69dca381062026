pub mod audit;
pub mod batch;
pub mod delivery;
pub mod notification;
pub mod render;
