//! List-methods command implementation

use anyhow::Result;

use reelforge_config::Config;
use reelforge_utils::exit_codes::ExitCode;

use super::json_emit::emit_methods_json;
use crate::setup;

/// Execute `reelforge list-methods`
pub fn execute_list_methods_command(json: bool, config: &Config) -> Result<ExitCode> {
    let registry = setup::build_registry(config)?;
    let listing = registry.listing();

    if json {
        println!("{}", emit_methods_json(&listing)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Registered methods:");
    for method in &listing {
        let mut notes = Vec::new();
        if method.name == config.router_default_method() {
            notes.push("default");
        }
        if config.audio_method() == Some(method.name.as_str()) {
            notes.push("audio");
        }
        if notes.is_empty() {
            println!("  {:<16} {}", method.name, method.output_kind);
        } else {
            println!(
                "  {:<16} {:<6} ({})",
                method.name,
                method.output_kind.to_string(),
                notes.join(", ")
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
