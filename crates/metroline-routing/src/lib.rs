//! Route evaluation and greedy passenger routing for the Metroline simulation.
//!
//! Routing is split into two layers:
//!
//! - [`evaluator`] -- [`RouteEvaluator`], a pure query layer over the line
//!   graph ("can line X reach shape Y within D transfers", "what does line X
//!   cost to shape Y") with an explicit [`RouteCache`] keyed by the
//!   network's topology version.
//! - [`router`] -- [`Router`], the per-passenger decision layer: board,
//!   wait for a better line, alight, transfer, or give up as stranded.
//!
//! The router is greedy and local. It never computes a global
//! shortest path; it only asks whether the train at hand is good enough
//! and whether something clearly better is available right now.

pub mod evaluator;
pub mod router;

pub use evaluator::{RouteCache, RouteCost, RouteEvaluator, RoutingParams};
pub use router::{AlightDecision, BoardDecision, BoardReason, Router, RouterParams};
