pub mod doctor;
pub mod enums;
pub mod filters;
pub mod ids;
pub mod listing;
pub mod patient;
pub mod profile;
pub mod time_of_day;
pub mod visit;

pub use doctor::*;
pub use enums::{Role, VisitStatus};
pub use filters::*;
pub use ids::*;
pub use listing::*;
pub use patient::*;
pub use profile::*;
pub use visit::*;
