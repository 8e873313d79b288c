pub mod client;
pub mod extract;
pub mod observer;
pub mod prompts;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use client::*;
pub use extract::*;
pub use observer::*;
pub use prompts::*;
pub use validation::*;
