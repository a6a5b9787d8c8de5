pub mod element;
pub mod names;
