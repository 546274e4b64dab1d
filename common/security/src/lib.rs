pub mod error;
pub mod policy;
pub mod principal;
pub mod roles;

pub use error::SecurityError;
pub use policy::{PolicyTable, RouteAuthz};
pub use principal::{Principal, PrincipalKind};
pub use roles::Role;
