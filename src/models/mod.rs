pub mod group;
pub mod permission;
pub mod product;
pub mod user;
