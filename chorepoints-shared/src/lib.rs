//! Domain model, rules and wire types shared by the chorepoints server and
//! client.

pub mod api;
pub mod catalog;
pub mod domain;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod lifecycle;
pub mod mapping;

pub use domain::*;
pub use error::{DomainError, Entity, ErrorKind, Precondition, TaskAction};
