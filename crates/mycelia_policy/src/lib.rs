//! Mycelia Policy System
//!
//! Glob-style path patterns, declarative policies and the deny-overrides
//! resolution that decides whether a principal may perform a set of actions.
//! Resolution is a pure function of the policy set and the requested actions.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod pattern;
pub mod policy;
pub mod principal;
pub mod resolve;

pub use pattern::{ActionPattern, PathPattern, PatternError, Segment};
pub use policy::{Effect, ModifierRef, Policy, PolicyError, PolicySet};
pub use principal::Principal;
pub use resolve::{Authorization, Denial, DenyReason, Resolution, authorize, resolve_pair};
