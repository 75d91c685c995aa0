pub mod attempt;
pub mod outcome;
pub mod request;
pub mod response;
pub mod signature;

pub use attempt::*;
pub use outcome::*;
pub use request::*;
pub use response::*;
pub use signature::*;
