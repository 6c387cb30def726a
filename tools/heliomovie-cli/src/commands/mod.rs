pub mod build;
pub mod check;
pub mod profiles;
pub mod validate;
