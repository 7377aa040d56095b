pub mod errors;
pub mod util;

pub mod arrays;
pub mod distributions;
pub mod trace;
pub mod host;
pub mod compartment;
pub mod observe;

pub mod config;
pub mod seir;
pub mod hierarchical;
pub mod inference;
pub mod summary;
pub mod store;
