pub mod annotation;
pub mod user;
