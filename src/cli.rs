//! CLI domain: parse, route, output, and presentation only.
//! No lineage logic; the route table dispatches to [`crate::api::LineageApi`].

mod output;
mod parse;
mod presentation;
mod route;

pub use output::{exit_code, map_error};
pub use parse::{Cli, Commands, OutputFormat};
pub use presentation::{
    format_branch_point_text, format_experiment_text, format_summaries_table,
    format_validation_report,
};
pub use route::RunContext;
