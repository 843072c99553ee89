pub mod interpreter;
pub mod member;
pub mod scope;
pub mod value;
