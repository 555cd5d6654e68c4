pub mod chat;
pub mod common;
pub mod direct;
pub mod responses;
