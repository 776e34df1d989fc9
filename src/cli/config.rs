use std::fs;
use std::path::PathBuf;

pub fn init(stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    let sample_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("samples")
        .join("sample-config.yml");
    let config_content = fs::read_to_string(&sample_path)
        .map_err(|e| format!("Failed to read sample config: {}", e))?;

    write_config(&config_content, stdout)
}

fn write_config(config_content: &str, stdout: bool) -> Result<(), Box<dyn std::error::Error>> {
    if stdout {
        print!("{}", config_content);
        return Ok(());
    }

    // Try ~/.config/logship/config.yml first, fall back to /etc/logship
    let config_path = if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/logship/config.yml");
        match user_config.parent().map(fs::create_dir_all) {
            Some(Ok(_)) => Some(user_config),
            _ => {
                eprintln!("Warning: Could not create user config directory");
                eprintln!("Falling back to /etc/logship/config.yml");
                None
            }
        }
    } else {
        None
    };

    let config_path = config_path.unwrap_or_else(|| PathBuf::from("/etc/logship/config.yml"));

    if config_path.exists() {
        eprintln!(
            "Error: Config file already exists at {}",
            config_path.display()
        );
        eprintln!("Remove it first or use --stdout to print the config");
        std::process::exit(1);
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(&config_path, config_content)?;

    println!("Config file written to {}", config_path.display());
    Ok(())
}
