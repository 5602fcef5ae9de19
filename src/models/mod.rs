pub mod directory;
pub mod event;
pub mod health;
pub mod notification;
pub mod response;
pub mod retry;
