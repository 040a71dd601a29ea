use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use kiln_core::Engine;
use kiln_schema::PackageRef;

pub fn run(engine: &mut Engine, reference: &str, json: bool) -> Result<u8, String> {
    let package = PackageRef::parse(reference).map_err(|e| format!("recipe error: {e}"))?;
    let name = package.package_name().to_string();

    let pb = if json {
        None
    } else {
        Some(spinner(&format!("installing {name}...")))
    };

    let installed = match engine.install_or_build(&package) {
        Ok(installed) => {
            if let Some(ref pb) = pb {
                if installed.is_empty() {
                    spin_ok(pb, &format!("{name} is already installed"));
                } else {
                    spin_ok(pb, &format!("installed {name}"));
                }
            }
            installed
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("install of {name} failed"));
            }
            return Err(e.to_string());
        }
    };

    let installed: Vec<String> = installed.iter().map(ToString::to_string).collect();
    if json {
        let payload = serde_json::json!({
            "package": name,
            "installed": installed,
            "archive": engine.layout().archive_dir(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for pkg in &installed {
            println!("installed {pkg}");
        }
        if installed.is_empty() {
            println!("{name} is already installed");
        }
    }
    Ok(EXIT_SUCCESS)
}
