//! Demo application: a singleton [`ApplicationService`], a per-request
//! [`RequestUtility`] and a [`RequestService`] combining both, served on
//! `GET /`.

mod application;
mod bindings;
mod home;
mod request;
mod utility;

pub use application::*;
pub use bindings::*;
pub use home::*;
pub use request::*;
pub use utility::*;
