use std::path::PathBuf;

use rand::RngCore;

use skep_core::config;
use skep_types::{Result, SkepError};

/// `skep config`: print the active config file, or write a starter one
/// with `--init`. Runs before config resolution, so it works on a box
/// that has no config yet.
pub(crate) fn run_config(init: bool, dest: Option<&str>, cli_config: Option<&str>) -> Result<()> {
    if init {
        return generate(dest);
    }

    match config::resolve_config_path(cli_config) {
        Some(source) => {
            println!("{source}");
            Ok(())
        }
        None => {
            eprintln!("No configuration file found. Searched:");
            for (path, level) in config::default_config_search_paths() {
                eprintln!("  {} ({})", path.display(), level);
            }
            Err(SkepError::Config(
                "no configuration file found; run `skep config --init` to create one".into(),
            ))
        }
    }
}

fn generate(dest: Option<&str>) -> Result<()> {
    let path = match dest {
        Some(d) => PathBuf::from(d),
        None => pick_config_location()?,
    };

    if path.exists() {
        return Err(SkepError::Config(format!(
            "file already exists: {}",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Every client of one store must use the same salt, so it lives in the
    // config rather than being derived per machine.
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);

    std::fs::write(&path, config::minimal_config_template(&hex::encode(salt)))?;
    println!("Config written to: {}", path.display());
    println!("Edit it to set the store path and your passphrase.");
    Ok(())
}

fn pick_config_location() -> Result<PathBuf> {
    let search_paths = config::default_config_search_paths();

    let descriptions: &[&str] = &[
        "Best for: per-project stores, settings kept under version control",
        "Best for: personal files under your home directory",
        "Best for: machine-wide backups run by root or via systemd",
    ];

    let labels: &[&str] = &["Local directory", "User config", "System-wide"];

    eprintln!("Where should the config file live?");
    for (i, (((path, _level), label), desc)) in search_paths
        .iter()
        .zip(labels.iter())
        .zip(descriptions.iter())
        .enumerate()
    {
        eprintln!("  [{}] {} {}", i + 1, label, path.display());
        eprintln!("      {desc}");
    }
    eprint!("Choice [1]: ");
    std::io::Write::flush(&mut std::io::stderr())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let input = input.trim();

    let selection = if input.is_empty() {
        0
    } else {
        let n: usize = input
            .parse()
            .map_err(|_| SkepError::Config(format!("invalid choice: '{input}'")))?;
        if n == 0 || n > search_paths.len() {
            return Err(SkepError::Config(format!("choice out of range: {n}")));
        }
        n - 1
    };

    Ok(search_paths[selection].0.clone())
}
