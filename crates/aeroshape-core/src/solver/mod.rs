//! Solver interface: template rendering, flow conditions, execution and
//! result parsing.

pub mod flow;
pub mod parse;
pub mod runner;
pub mod template;

pub use flow::FlowConditions;
pub use parse::{
    coefficients_from_text, parse_results, AerodynamicCoefficients, Breakdown, HistoryTable,
};
pub use runner::{SolverInterface, SolverRun};
pub use template::{format_number, scan_placeholders, SolverTemplate, BUILTIN_TEMPLATE};
