pub mod catalog;
pub mod config;
pub mod detector;
pub mod logger;
pub mod model;
pub mod policy;
pub mod resolver;
pub mod seed;
pub mod store;
pub mod trends;

#[cfg(test)]
mod testing;
