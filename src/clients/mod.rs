pub mod database;
pub mod directory;
pub mod health;
pub mod rbmq;
