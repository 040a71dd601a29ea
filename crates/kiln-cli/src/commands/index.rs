use super::{colorize_kind, json_pretty, EXIT_SUCCESS};
use kiln_core::Engine;
use serde::Serialize;

#[derive(Serialize)]
struct EntrySummary {
    name: String,
    version: String,
    kind: String,
    summary: String,
    requires: Vec<String>,
    file: String,
}

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    engine
        .layout()
        .initialize()
        .map_err(|e| format!("store error: {e}"))?;
    let index = engine.reindex().map_err(|e| e.to_string())?;

    let entries: Vec<EntrySummary> = index
        .entries()
        .map(|e| EntrySummary {
            name: e.name.to_string(),
            version: e.version.to_string(),
            kind: e.kind.to_string(),
            summary: e.summary.clone(),
            requires: e
                .requires
                .iter()
                .map(|d| format!("{} {}", d.name, d.min_version))
                .collect(),
            file: e.file_name(),
        })
        .collect();

    if json {
        println!("{}", json_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("no packages in {}", engine.layout().archive_dir().display());
    } else {
        println!("{:<24} {:<16} {:<8} SUMMARY", "NAME", "VERSION", "KIND");
        for e in &entries {
            println!(
                "{:<24} {:<16} {:<8} {}",
                e.name,
                e.version,
                colorize_kind(&e.kind),
                e.summary
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
