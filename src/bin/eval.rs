use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use tutor::catalog;
use tutor::config::AppConfig;
use tutor::resolver::KeywordResolver;

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Check keyword-to-chapter resolution against a labelled prompt set")]
struct Cli {
    #[arg(long, default_value = "eval/resolver.jsonl")]
    file: String,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct EvalPrompt {
    id: String,
    input: String,
    /// `null` expects no chapter.
    #[serde(default)]
    expect_chapter: Option<String>,
    #[serde(default)]
    expect_tier: Option<String>,
    #[serde(default)]
    expect_query_contains: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let resolver = KeywordResolver::new(catalog::load(Some(&config.catalog_path()))?);

    let prompts = load_prompts(&cli.file)?;
    if prompts.is_empty() {
        anyhow::bail!("no prompts found in {}", cli.file);
    }

    let mut total = 0usize;
    let mut chapter_hits = 0usize;
    let mut tier_checked = 0usize;
    let mut tier_hits = 0usize;
    let mut query_pass = 0usize;
    let mut failures = Vec::new();

    for prompt in prompts {
        total += 1;
        let resolution = resolver.resolve(&prompt.input);

        let chapter_ok = resolution.chapter == prompt.expect_chapter;
        if chapter_ok {
            chapter_hits += 1;
        }

        let mut tier_ok = true;
        if let Some(expected) = &prompt.expect_tier {
            tier_checked += 1;
            tier_ok = resolution.tier.map(|t| t.as_str()) == Some(expected.as_str());
            if tier_ok {
                tier_hits += 1;
            }
        }

        let query_lower = resolution.query.to_lowercase();
        let query_ok = prompt
            .expect_query_contains
            .iter()
            .all(|needle| query_lower.contains(&needle.to_lowercase()));
        if query_ok {
            query_pass += 1;
        }

        if !(chapter_ok && tier_ok && query_ok) {
            failures.push(prompt.id.clone());
        }

        if cli.verbose {
            println!("--- {} ---", prompt.id);
            println!("Input: {}", prompt.input);
            println!(
                "Chapter: {} (expected {})",
                resolution.chapter.as_deref().unwrap_or("-"),
                prompt.expect_chapter.as_deref().unwrap_or("-")
            );
            println!(
                "Tier: {}",
                resolution.tier.map(|t| t.as_str()).unwrap_or("-")
            );
            println!("Query: {}", resolution.query);
            println!();
        }
    }

    println!("Eval prompts: {}", total);
    println!("Chapter accuracy: {:.1}%", ratio(chapter_hits, total) * 100.0);
    if tier_checked > 0 {
        println!(
            "Tier accuracy: {:.1}% ({}/{})",
            ratio(tier_hits, tier_checked) * 100.0,
            tier_hits,
            tier_checked
        );
    }
    println!("Query expectations met: {:.1}%", ratio(query_pass, total) * 100.0);
    if !failures.is_empty() {
        println!("Failed: {}", failures.join(", "));
    }

    Ok(())
}

fn load_prompts(path: &str) -> Result<Vec<EvalPrompt>> {
    let file = File::open(path).with_context(|| format!("failed opening {}", path))?;
    let reader = BufReader::new(file);
    let mut prompts = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: EvalPrompt = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", path, idx + 1))?;
        prompts.push(parsed);
    }

    Ok(prompts)
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}
