use std::fs;
use std::path::PathBuf;

use ambra::Registry;

const DEFAULT_GRAMMARS_DIR: &str = "src/fixtures/grammars";
const DEFAULT_OUTPUT: &str = "bundle.zst";

/// Usage: build-bundle [grammars dir] [output file]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let grammars_dir = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_GRAMMARS_DIR.into()));
    let output = PathBuf::from(args.next().unwrap_or_else(|| DEFAULT_OUTPUT.into()));

    println!("Building bundle from {}...", grammars_dir.display());
    let registry = Registry::default();
    let mut grammar_count = 0;
    let mut grammar_errors = 0;

    for entry in fs::read_dir(&grammars_dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension() != Some("json".as_ref()) {
            continue;
        }
        match registry.add_grammar_from_path(&path) {
            Ok(_) => grammar_count += 1,
            Err(e) => {
                eprintln!("✗ Failed to load grammar {}: {e}", path.display());
                grammar_errors += 1;
            }
        }
    }
    registry.add_plain_grammar(&["text", "txt"])?;

    registry.dump_to_file(&output)?;
    let size = fs::metadata(&output)?.len();

    println!("\nBundle written to {}", output.display());
    println!("- {grammar_count} grammars loaded, {grammar_errors} failed");
    println!("- {} grammars in total: {}", registry.list_grammars().len(), registry.list_grammars().join(", "));
    println!("- {:.1} KB", size as f64 / 1024.0);
    Ok(())
}
