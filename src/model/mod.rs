pub mod identity;
pub mod node;
pub mod unit;
