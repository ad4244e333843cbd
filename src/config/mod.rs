//! Configuration parser & resolver (§4.4): argv + ini + defaults ->
//! validated option values with dependency resolution, in three phases.

pub mod cli;
pub mod definition;
pub mod file;
pub mod resolve;

pub use definition::Command;
pub use resolve::{OptionSource, OptionValue, ResolvedConfig};

use crate::error::Result;
use crate::ini::parse_ini;

/// Run all three phases over `args` (excluding argv[0]) and return the
/// fully resolved option set. `help`/`version`/no-command runs skip Phase 2
/// and Phase 3 entirely, mirroring the source's early exit.
pub fn parse(args: &[String]) -> Result<ResolvedConfig> {
    let parsed = cli::parse(args)?;

    if parsed.command_help {
        return Ok(ResolvedConfig { command: Command::Help, command_params: parsed.command_params, options: Default::default() });
    }

    let config_text = file::load_config_text(&parsed.options)?;
    let ini = config_text.map(|text| parse_ini(&text)).transpose()?;

    let stanza = parsed.options.get("stanza").and_then(|o| o.values.first()).cloned();

    resolve::resolve(parsed.command, parsed.command_params, parsed.options, ini, stanza.as_deref())
}
