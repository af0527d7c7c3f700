pub mod error;
pub mod limiters;
pub mod similarity;
pub mod text;
pub mod token_estimator;

pub use error::ChatError;
pub use similarity::cosine_similarity;
