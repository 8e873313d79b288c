pub mod stage;
pub mod themes;
pub mod transcript;

pub use stage::*;
pub use themes::*;
pub use transcript::*;
