//! Stubs command handler
//!
//! Generates .luarc.json and LuaLS stub files so editors can complete
//! definition scripts.

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use convoy_lua::modules::{EnvModule, LogModule, MapVarProvider};
use convoy_lua::{ModuleRegistry, helper_stubs};
use std::fs;
use std::path::Path;

use crate::sinks::TracingLogSink;

#[derive(Args)]
pub struct StubsArgs {
    /// Output directory for generated files
    #[arg(short, long, default_value = ".")]
    output: String,
}

pub fn handle_stubs_command(args: StubsArgs) -> Result<()> {
    let output_path = Path::new(&args.output);

    generate_luarc_json(output_path)?;
    generate_stub_files(output_path)?;

    println!("{}", "✓ Lua development files generated!".green().bold());
    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Install Lua Language Server in your editor");
    println!("  2. Open your definition script to see autocomplete and type hints");
    println!("  3. Use {} to validate it", "convoy check <script>".cyan());

    Ok(())
}

fn generate_luarc_json(output_path: &Path) -> Result<()> {
    fs::create_dir_all(output_path)
        .with_context(|| format!("Failed to create output directory {:?}", output_path))?;
    let luarc_path = output_path.join(".luarc.json");

    let luarc_content = r#"{
  "$schema": "https://raw.githubusercontent.com/sumneko/vscode-lua/master/setting/schema.json",
  "runtime": {
    "version": "Lua 5.4"
  },
  "diagnostics": {
    "globals": ["job", "group", "log", "env"]
  },
  "workspace": {
    "library": [".convoy/stubs"],
    "checkThirdParty": false
  },
  "completion": {
    "callSnippet": "Both"
  }
}
"#;

    fs::write(&luarc_path, luarc_content)
        .with_context(|| format!("Failed to write .luarc.json to {:?}", luarc_path))?;

    println!("  {} .luarc.json", "Created".green());

    Ok(())
}

/// Writes one stub file per host module plus one for the definition helpers
fn generate_stub_files(output_path: &Path) -> Result<()> {
    let stubs_dir = output_path.join(".convoy").join("stubs");
    fs::create_dir_all(&stubs_dir)
        .with_context(|| format!("Failed to create stubs directory at {:?}", stubs_dir))?;

    let mut registry = ModuleRegistry::new();
    registry.register(EnvModule::new(MapVarProvider::default()))?;
    registry.register(LogModule::new(TracingLogSink))?;

    let files = registry
        .modules()
        .iter()
        .map(|module| (module.id(), module.stubs()))
        .chain(std::iter::once(("convoy", helper_stubs())));

    for (name, content) in files {
        let stub_path = stubs_dir.join(format!("{}.lua", name));
        fs::write(&stub_path, content)
            .with_context(|| format!("Failed to write stub file {:?}", stub_path))?;

        println!("  {} {}.lua", "Created".green(), name);
    }

    println!(
        "  {} in {}",
        "Stubs ready".green(),
        stubs_dir.display().to_string().cyan()
    );

    Ok(())
}
