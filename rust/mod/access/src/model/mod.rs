mod decision;
mod group;
mod operation;
mod overrides;
mod profile;
mod screen;
mod user;
mod whitelist;

pub use decision::*;
pub use group::*;
pub use operation::*;
pub use overrides::*;
pub use profile::*;
pub use screen::*;
pub use user::*;
pub use whitelist::*;
