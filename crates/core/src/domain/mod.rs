pub mod currency;
pub mod line;
pub mod product;
pub mod unit;
