use std::fs;
use std::path::{Path, PathBuf};

use ambra::{DEFAULT_CLASS_PREFIX, HtmlRenderer, Registry, ScanOptions, ScanResult};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "ambra-cli", version, about = "Highlight a file as HTML")]
struct Cli {
    /// The file to highlight
    file: PathBuf,

    /// A directory of JSON grammar definitions, named after the file
    #[arg(short, long, default_value = "src/fixtures/grammars", conflicts_with = "bundle")]
    grammars: PathBuf,

    /// A bundle made by `build-bundle`, loaded instead of the grammar directory
    #[arg(short, long)]
    bundle: Option<PathBuf>,

    /// Grammar name or alias. The most relevant grammar is used if not set
    #[arg(short, long)]
    language: Option<String>,

    /// Restrict auto-detection to those grammars
    #[arg(short, long, value_delimiter = ',')]
    candidates: Vec<String>,

    /// Print the detected grammars instead of the HTML
    #[arg(long)]
    detect: bool,

    /// Fail on illegal lexemes instead of giving back plain text
    #[arg(long)]
    strict: bool,

    #[arg(long, default_value = DEFAULT_CLASS_PREFIX)]
    class_prefix: String,
}

fn load_grammars(dir: &Path) -> Result<Registry, Box<dyn std::error::Error>> {
    let registry = Registry::default();
    registry.add_plain_grammar(&["text", "txt"])?;

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    for path in paths {
        if let Err(e) = registry.add_grammar_from_path(&path) {
            eprintln!("✗ Failed to load grammar {}: {e}", path.display());
        }
    }
    Ok(registry)
}

fn print_detection(result: &ScanResult) {
    let mut current = Some(result);
    let mut rank = 1;
    while let Some(res) = current {
        let mut flags = Vec::new();
        if res.illegal {
            flags.push("illegal");
        }
        if res.error_raised {
            flags.push("error");
        }
        println!(
            "{rank}. {} (relevance {}){}",
            res.language,
            res.relevance,
            if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            }
        );
        current = res.second_best.as_deref();
        rank += 1;
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let registry = match &cli.bundle {
        Some(path) => Registry::load_from_file(path)?,
        None => load_grammars(&cli.grammars)?,
    };
    let text = fs::read_to_string(&cli.file)?;

    let result = match &cli.language {
        Some(language) => {
            let options = ScanOptions::new(language).lenient(!cli.strict);
            registry.scan(&text, &options)?
        }
        None => {
            registry.set_default_candidates(&cli.candidates);
            registry.scan_auto(&text, None)
        }
    };

    if let Some(diagnostic) = &result.diagnostic {
        let mode = diagnostic.mode.as_deref().unwrap_or("?");
        eprintln!(
            "{} at byte {} in mode {mode}: {:?}",
            diagnostic.message, diagnostic.index, diagnostic.context
        );
    }

    if cli.detect {
        print_detection(&result);
    } else {
        let renderer = HtmlRenderer::new(cli.class_prefix);
        println!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            result.language,
            renderer.render(&result.tree)
        );
    }

    Ok(())
}
