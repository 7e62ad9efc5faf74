pub mod assignment;
pub mod caller;
pub mod lead;

pub use assignment::*;
pub use caller::*;
pub use lead::*;
