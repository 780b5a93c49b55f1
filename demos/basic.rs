use ambra::{HtmlRenderer, Registry, ScanOptions};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::default();
    registry.add_grammar_from_path("src/fixtures/grammars/sql.json")?;

    let code = "SELECT name FROM users WHERE id = 42;";
    let result = registry.scan(code, &ScanOptions::new("sql"))?;

    // Render to HTML
    let html = HtmlRenderer::default().render(&result.tree);
    println!("{html}");
    println!("relevance: {}", result.relevance);

    Ok(())
}
