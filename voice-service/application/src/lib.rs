mod command;
mod dto;
mod error;
mod usecase;

pub use command::*;
pub use dto::*;
pub use error::ApplicationError;
pub use usecase::*;
