mod environment;
mod error;
mod executor;
mod input;
mod value;

pub use environment::*;
pub use error::*;
pub use executor::*;
pub use input::*;
pub use value::*;
