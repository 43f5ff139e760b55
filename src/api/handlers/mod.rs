pub mod convert;
pub mod email;
pub mod health;
