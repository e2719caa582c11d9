// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::Result;
use std::env;
use std::path::PathBuf;

use mkf_bonds::store;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() > 1 && args[1] == "export" {
        // Export mode
        run_export(args.get(2).map(PathBuf::from))?;
    } else {
        // UI mode (default)
        run_ui_mode(args.get(1).map(PathBuf::from))?;
    }

    Ok(())
}

/// Path precedence: CLI argument, then MKF_BONDS_FILE, then MKFBonds.txt
fn data_file(arg: Option<PathBuf>) -> PathBuf {
    arg.unwrap_or_else(store::default_path)
}

fn run_export(path_arg: Option<PathBuf>) -> Result<()> {
    let path = data_file(path_arg);

    // Status goes to stderr so the JSON on stdout stays pipeable
    eprintln!("📂 Loading bonds from {}...", path.display());
    let outcome = store::load_file(&path)?;

    for warning in &outcome.warnings {
        eprintln!("⚠️  {}", warning);
    }
    eprintln!(
        "✓ Loaded {} surnames, {} bound, {} available",
        outcome.registry.surname_count(),
        outcome.registry.bound_count(),
        outcome.registry.available_count()
    );

    store::export_json(std::io::stdout().lock(), &outcome.registry)?;
    println!();

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(path_arg: Option<PathBuf>) -> Result<()> {
    use mkf_bonds::BondRegistry;

    let path = data_file(path_arg);
    println!("🗂️  Loading Surname MKF Binding...\n");

    let (registry, warnings) = if path.exists() {
        println!("📂 Loading bonds from {}...", path.display());
        let outcome = store::load_file(&path)?;
        (outcome.registry, outcome.warnings)
    } else {
        println!("   {} not found, starting with an empty registry", path.display());
        (BondRegistry::new(), Vec::new())
    };

    for warning in &warnings {
        println!("⚠️  {}", warning);
    }
    println!(
        "✓ {} surnames, {} bound, {} available\n",
        registry.surname_count(),
        registry.bound_count(),
        registry.available_count()
    );
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(registry, path, warnings.len());
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_path_arg: Option<PathBuf>) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or dump the registry: cargo run export");
    std::process::exit(1);
}
