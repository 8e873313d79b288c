pub mod pipeline;
pub mod round_trip;
pub mod stage1_initial_notes;
pub mod stage2_statements;
pub mod stage3_personal_themes;
pub mod stage4_group_themes;

pub use pipeline::*;
pub use round_trip::*;
pub use stage1_initial_notes::*;
pub use stage2_statements::*;
pub use stage3_personal_themes::*;
pub use stage4_group_themes::*;
