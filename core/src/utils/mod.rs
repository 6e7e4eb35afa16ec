pub mod results;

pub use results::{enrich, ResultStore};
