use ambra::{HtmlRenderer, Registry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::default();
    for name in ["ini", "pgsql", "shell", "sql", "template"] {
        registry.add_grammar_from_path(format!("src/fixtures/grammars/{name}.json"))?;
    }

    let samples = [
        "[server]\nport = 8080\nhost = \"localhost\"\n",
        "#!/bin/bash\necho \"hello $USER\"\n",
        "SELECT id FROM users RETURNING id;",
    ];

    for sample in samples {
        let result = registry.scan_auto(sample, None);
        println!("--- {} (relevance {})", result.language, result.relevance);
        if let Some(second) = &result.second_best {
            println!("    runner-up: {} (relevance {})", second.language, second.relevance);
        }
        println!("{}", HtmlRenderer::default().render(&result.tree));
    }

    Ok(())
}
