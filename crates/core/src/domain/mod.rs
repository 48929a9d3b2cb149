pub mod product;
pub mod shopper;
pub mod tree;
