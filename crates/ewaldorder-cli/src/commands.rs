pub mod count;
pub mod order;
