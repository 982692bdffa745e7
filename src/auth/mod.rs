pub mod handlers;
pub mod password;
pub mod registration;
pub mod session;
