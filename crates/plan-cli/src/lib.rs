//! Library side of the `plan-copy` tool: the copy driver and logging setup.

pub mod driver;
pub mod logging;
