use fr_domain::config::{Config, ConfigSeverity, EnvironmentCatalog};

/// Parse and validate the config, printing any issues.  Also loads the
/// environment catalog so a malformed catalog fails validation.
///
/// Returns `true` when no errors were found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    let catalog_ok = match EnvironmentCatalog::load(&config.environments_path) {
        Ok(catalog) => {
            let names: Vec<&str> = catalog.names().collect();
            println!(
                "Environments ({}): {}",
                config.environments_path.display(),
                if names.is_empty() { "none".to_string() } else { names.join(", ") }
            );
            true
        }
        Err(e) => {
            println!("[ERROR] environments_path: {e}");
            false
        }
    };

    if issues.is_empty() && catalog_ok {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count()
        + usize::from(!catalog_ok);
    let warning_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Warning)
        .count();

    for issue in &issues {
        println!("{issue}");
    }

    println!("\n{error_count} error(s), {warning_count} warning(s) in {config_path}");

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}
