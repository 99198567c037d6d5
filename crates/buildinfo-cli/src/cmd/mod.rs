pub mod publish;
pub mod show;
pub mod validate;
