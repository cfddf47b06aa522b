pub mod auth;
pub mod categories;
pub mod groups;
pub mod health;
pub mod permissions;
pub mod products;
pub mod users;
