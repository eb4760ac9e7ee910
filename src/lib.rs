//! Block-diagram transfer-function reducer.
//!
//! A [`Diagram`] is a directed graph of control blocks (Sum, Subtract, Gain,
//! Integrator, TransferFunction, Input, Output) joined port to port. The
//! [`reduce`] function collapses it into the closed-form transfer function
//! from every Input to every Output, solving feedback loops that pass through
//! a summing junction.
//!
//! Arithmetic is abstracted behind [`TransferAlgebra`]; [`RationalAlgebra`]
//! works over [`RationalFunction`], a normalized ratio of real polynomials in
//! `s`.
//!
//! The binary `tfdiagram` reduces diagram files and combines expressions
//! from the command line.

pub mod algebra;
pub mod block;
pub mod compose;
pub mod config;
pub mod diagram;
pub mod document;
pub mod error;
pub mod expr;
pub mod history;
pub mod polynomial;
pub mod rational;
pub mod reduce;

pub use algebra::{FeedbackSign, RationalAlgebra, TransferAlgebra};
pub use block::{Block, BlockId, BlockKind};
pub use compose::Interconnection;
pub use config::DisplayOptions;
pub use diagram::{Connection, ConnectionId, Diagram, PortDirection, PortRef};
pub use document::DiagramDoc;
pub use error::{GraphError, ParseError, ReduceError};
pub use expr::parse_expression;
pub use polynomial::Polynomial;
pub use rational::RationalFunction;
pub use reduce::{Reducer, Reduction, SinkResult, reduce};
