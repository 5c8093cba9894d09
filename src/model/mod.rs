pub mod assignment;
pub mod batch;
pub mod common;
pub mod merge;
pub mod posting;
pub mod school;
pub mod session;
pub mod supervisor;

pub use assignment::*;
pub use batch::*;
pub use common::*;
pub use merge::*;
pub use posting::*;
pub use school::*;
pub use session::*;
pub use supervisor::*;
