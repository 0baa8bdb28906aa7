pub mod user;
pub mod task;
pub mod error;

pub use user::*;
pub use task::*;
pub use error::*;
