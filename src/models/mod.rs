pub mod audit;
pub mod health;
pub mod job;
pub mod notification;
pub mod retry;
pub mod validation;
