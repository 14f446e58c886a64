pub mod error;
pub mod value;

pub use error::{AdminError, ErrorKind, Result};
pub use value::Value;

pub type Row = Vec<Value>;
