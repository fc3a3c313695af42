//! Rendering helpers for the table/json/csv output formats.

use resembl::core::config::OutputFormat;
use resembl::core::engine::{CompareOutput, EngineStats, SnippetMatch};
use resembl::storage::{Collection, Snippet, SnippetVersion};
use tabled::{settings::Style, Table, Tabled};

/// Abbreviate a checksum for table display.
fn short(checksum: &str) -> String {
    checksum[..12.min(checksum.len())].to_string()
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[derive(Tabled)]
struct SnippetRow {
    #[tabled(rename = "Checksum")]
    checksum: String,
    #[tabled(rename = "Names")]
    names: String,
    #[tabled(rename = "Tags")]
    tags: String,
    #[tabled(rename = "Collection")]
    collection: String,
}

impl From<&Snippet> for SnippetRow {
    fn from(snippet: &Snippet) -> Self {
        Self {
            checksum: short(&snippet.checksum),
            names: snippet.names.join(", "),
            tags: snippet.tags.join(", "),
            collection: snippet.collection.clone().unwrap_or_default(),
        }
    }
}

/// Print a snippet list in the selected format.
pub fn print_snippets(snippets: &[Snippet], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if snippets.is_empty() {
                println!("no snippets");
                return;
            }
            let rows: Vec<SnippetRow> = snippets.iter().map(SnippetRow::from).collect();
            println!("{}", Table::new(rows).with(Style::sharp()));
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(snippets).unwrap_or_default()
            );
        }
        OutputFormat::Csv => {
            println!("checksum,names,tags,collection");
            for snippet in snippets {
                println!(
                    "{},{},{},{}",
                    snippet.checksum,
                    csv_escape(&snippet.names.join(";")),
                    csv_escape(&snippet.tags.join(";")),
                    csv_escape(snippet.collection.as_deref().unwrap_or(""))
                );
            }
        }
    }
}

/// Print one snippet with its code.
pub fn print_snippet(snippet: &Snippet, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("checksum:   {}", snippet.checksum);
            println!("names:      {}", snippet.names.join(", "));
            println!("tags:       {}", snippet.tags.join(", "));
            println!(
                "collection: {}",
                snippet.collection.as_deref().unwrap_or("-")
            );
            println!("created:    {}", snippet.created_at.to_rfc3339());
            println!("---");
            println!("{}", snippet.code);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(snippet).unwrap_or_default()
            );
        }
        OutputFormat::Csv => print_snippets(std::slice::from_ref(snippet), OutputFormat::Csv),
    }
}

#[derive(Tabled)]
struct MatchRow {
    #[tabled(rename = "Checksum")]
    checksum: String,
    #[tabled(rename = "Names")]
    names: String,
    #[tabled(rename = "Hybrid")]
    hybrid: String,
    #[tabled(rename = "Jaccard")]
    jaccard: String,
    #[tabled(rename = "Levenshtein")]
    levenshtein: String,
}

/// Print ranked find results.
pub fn print_matches(matches: &[SnippetMatch], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if matches.is_empty() {
                println!("no matches");
                return;
            }
            let rows: Vec<MatchRow> = matches
                .iter()
                .map(|m| MatchRow {
                    checksum: short(&m.snippet.checksum),
                    names: m.snippet.names.join(", "),
                    hybrid: format!("{:.1}", m.hybrid),
                    jaccard: format!("{:.3}", m.jaccard),
                    levenshtein: format!("{:.1}", m.levenshtein),
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::sharp()));
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(matches).unwrap_or_default()
            );
        }
        OutputFormat::Csv => {
            println!("checksum,names,hybrid,jaccard,levenshtein");
            for m in matches {
                println!(
                    "{},{},{:.2},{:.4},{:.2}",
                    m.snippet.checksum,
                    csv_escape(&m.snippet.names.join(";")),
                    m.hybrid,
                    m.jaccard,
                    m.levenshtein
                );
            }
        }
    }
}

/// Print a pairwise comparison.
pub fn print_comparison(output: &CompareOutput, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!(
                "A: {}  ({})  {} tokens",
                short(&output.a.checksum),
                output.a.names.join(", "),
                output.a.token_count
            );
            println!(
                "B: {}  ({})  {} tokens",
                short(&output.b.checksum),
                output.b.names.join(", "),
                output.b.token_count
            );
            println!("---");
            println!("jaccard:        {:.4}", output.report.jaccard);
            println!("levenshtein:    {:.1}", output.report.levenshtein);
            println!("hybrid:         {:.1}", output.report.hybrid);
            println!("cfg similarity: {:.4}", output.report.cfg_similarity);
            println!("shared tokens:  {}", output.report.shared_tokens);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(output).unwrap_or_default()
            );
        }
        OutputFormat::Csv => {
            println!("checksum_a,checksum_b,jaccard,levenshtein,hybrid,cfg_similarity,shared_tokens");
            println!(
                "{},{},{:.4},{:.2},{:.2},{:.4},{}",
                output.a.checksum,
                output.b.checksum,
                output.report.jaccard,
                output.report.levenshtein,
                output.report.hybrid,
                output.report.cfg_similarity,
                output.report.shared_tokens
            );
        }
    }
}

#[derive(Tabled)]
struct CollectionRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Snippets")]
    count: usize,
}

/// Print the collection list.
pub fn print_collections(collections: &[(Collection, usize)], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if collections.is_empty() {
                println!("no collections");
                return;
            }
            let rows: Vec<CollectionRow> = collections
                .iter()
                .map(|(c, count)| CollectionRow {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    count: *count,
                })
                .collect();
            println!("{}", Table::new(rows).with(Style::sharp()));
        }
        OutputFormat::Json => {
            let items: Vec<serde_json::Value> = collections
                .iter()
                .map(|(c, count)| {
                    serde_json::json!({
                        "name": c.name,
                        "description": c.description,
                        "created_at": c.created_at,
                        "snippet_count": count,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&items).unwrap_or_default()
            );
        }
        OutputFormat::Csv => {
            println!("name,description,snippet_count");
            for (c, count) in collections {
                println!(
                    "{},{},{count}",
                    csv_escape(&c.name),
                    csv_escape(&c.description)
                );
            }
        }
    }
}

/// Print a name's version history.
pub fn print_versions(versions: &[SnippetVersion], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if versions.is_empty() {
                println!("no recorded rebindings");
                return;
            }
            for version in versions {
                println!(
                    "#{}  {}  ->  {}  at {}",
                    version.id,
                    version.name,
                    short(&version.checksum),
                    version.created_at.to_rfc3339()
                );
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(versions).unwrap_or_default()
            );
        }
        OutputFormat::Csv => {
            println!("id,name,checksum,created_at");
            for version in versions {
                println!(
                    "{},{},{},{}",
                    version.id,
                    csv_escape(&version.name),
                    version.checksum,
                    version.created_at.to_rfc3339()
                );
            }
        }
    }
}

/// Print corpus statistics.
pub fn print_stats(stats: &EngineStats, format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            println!("snippets:              {}", stats.num_snippets);
            println!("mean token count:      {:.1}", stats.mean_token_count);
            println!("vocabulary size:       {}", stats.vocabulary_size);
            println!("mean pairwise jaccard: {:.4}", stats.mean_pairwise_jaccard);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(stats).unwrap_or_default()
            );
        }
        OutputFormat::Csv => {
            println!("num_snippets,mean_token_count,vocabulary_size,mean_pairwise_jaccard");
            println!(
                "{},{:.2},{},{:.4}",
                stats.num_snippets,
                stats.mean_token_count,
                stats.vocabulary_size,
                stats.mean_pairwise_jaccard
            );
        }
    }
}
