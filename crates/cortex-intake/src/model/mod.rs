//! Agent domain types: decoded request, tools, resolved resources, final agent.

pub mod agent;
pub mod naming;
pub mod request;
pub mod resource;
pub mod tool;

pub use agent::*;
pub use naming::*;
pub use request::*;
pub use resource::*;
pub use tool::*;
