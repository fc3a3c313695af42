//! Command dispatch for the resembl CLI.

use std::io::Read;
use std::path::{Path, PathBuf};

use resembl::core::config::{self, ResemblConfig};
use resembl::core::engine::{CancelFlag, ResemblEngine};
use resembl::core::errors::{ResemblError, Result};
use resembl::detectors::lsh;
use resembl::storage::{SnippetStore, SqliteStore, DATABASE_ENV, DEFAULT_DATABASE};

use super::args::{Cli, CollectionAction, Commands, ConfigAction, NameAction, TagAction};
use super::output;

/// Path of the active database: `RESEMBL_DATABASE` or the default file.
fn database_path() -> PathBuf {
    std::env::var_os(DATABASE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
}

fn open_engine(config: ResemblConfig) -> Result<ResemblEngine<SqliteStore>> {
    let store = SqliteStore::open(&database_path())?;
    ResemblEngine::new(store, config, lsh::cache_dir())
}

/// Read assembly text from a file, or stdin when the path is `-` or absent.
fn read_code(file: Option<&Path>) -> Result<String> {
    let from_stdin = file.map_or(true, |p| p.as_os_str() == "-");
    if from_stdin {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(map_read_error)?;
        return Ok(buffer);
    }
    let path = file.expect("checked above");
    std::fs::read_to_string(path).map_err(map_read_error)
}

fn map_read_error(e: std::io::Error) -> ResemblError {
    if e.kind() == std::io::ErrorKind::InvalidData {
        ResemblError::bad_input("input is not valid UTF-8")
    } else {
        ResemblError::io("failed to read input", e)
    }
}

/// Execute the parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let mut config = config::load_config()?;
    if let Some(format) = &cli.format {
        config.format = format.parse()?;
    }
    let format = config.format;

    match cli.command {
        Commands::Add { name, file } => {
            let code = read_code(file.as_deref())?;
            let report = open_engine(config)?.add(&name, &code)?;
            if report.created {
                println!("created {}", report.checksum);
            } else {
                println!("aliased {} as '{name}'", report.checksum);
            }
        }

        Commands::Get { checksum } => {
            let snippet = open_engine(config)?.get(&checksum)?;
            output::print_snippet(&snippet, format);
        }

        Commands::List { start, end } => {
            let engine = open_engine(config)?;
            let snippets = engine.store().list(start, end)?;
            output::print_snippets(&snippets, format);
        }

        Commands::Search { pattern } => {
            let engine = open_engine(config)?;
            let snippets = engine.store().search_by_name(&pattern)?;
            output::print_snippets(&snippets, format);
        }

        Commands::Find {
            file,
            top_n,
            threshold,
            raw,
        } => {
            let code = read_code(file.as_deref())?;
            let top_n = top_n.unwrap_or(config.top_n as usize);
            let threshold = threshold.unwrap_or(config.lsh_threshold);
            let mut engine = open_engine(config)?;
            let matches = engine.find(&code, top_n, threshold, !raw)?;
            output::print_matches(&matches, format);
        }

        Commands::Compare {
            checksum_a,
            checksum_b,
        } => {
            let engine = open_engine(config)?;
            let comparison = engine.compare(&checksum_a, &checksum_b)?;
            output::print_comparison(&comparison, format);
        }

        Commands::Delete { checksum } => {
            let snippet = open_engine(config)?.delete(&checksum)?;
            println!("deleted {}", snippet.checksum);
        }

        Commands::Import { dir } => {
            let report = open_engine(config)?.import_dir(&dir, &CancelFlag::new())?;
            println!(
                "imported {} snippets ({} aliases, {} skipped)",
                report.created, report.aliased, report.skipped
            );
        }

        Commands::Export { dir } => {
            let report = open_engine(config)?.export_dir(&dir)?;
            println!("exported {} snippets to {}", report.num_exported, dir.display());
        }

        Commands::Merge { database } => {
            if !database.exists() {
                return Err(ResemblError::not_found(format!(
                    "database {}",
                    database.display()
                )));
            }
            let source = SqliteStore::open(&database)?;
            let report = open_engine(config)?.merge_from(&source)?;
            println!(
                "merged: {} added, {} updated, {} unchanged",
                report.added, report.updated, report.skipped
            );
        }

        Commands::Reindex => {
            let report = open_engine(config)?.reindex(&CancelFlag::new())?;
            println!(
                "reindexed {} snippets in {:.2}s",
                report.num_reindexed, report.elapsed_secs
            );
        }

        Commands::Stats => {
            let stats = open_engine(config)?.stats()?;
            output::print_stats(&stats, format);
        }

        Commands::Clean => {
            open_engine(config)?.clean()?;
            println!("cache cleared, database vacuumed");
        }

        Commands::Yara { output: path } => {
            let engine = open_engine(config)?;
            let mut file = std::fs::File::create(&path)
                .map_err(|e| ResemblError::io(format!("failed to create {}", path.display()), e))?;
            let count = engine.write_yara_rules(&mut file)?;
            println!("wrote {count} rules to {}", path.display());
        }

        Commands::Name { action } => {
            let mut engine = open_engine(config)?;
            match action {
                NameAction::Add { checksum, name } => {
                    let snippet = engine.get(&checksum)?;
                    let updated = engine.store_mut().add_name(&snippet.checksum, &name)?;
                    println!("names: {}", updated.names.join(", "));
                }
                NameAction::Remove { checksum, name } => {
                    let snippet = engine.get(&checksum)?;
                    let updated = engine.store_mut().remove_name(&snippet.checksum, &name)?;
                    println!("names: {}", updated.names.join(", "));
                }
            }
        }

        Commands::Tag { action } => {
            let mut engine = open_engine(config)?;
            match action {
                TagAction::Add { checksum, tag } => {
                    let snippet = engine.get(&checksum)?;
                    let updated = engine.store_mut().add_tag(&snippet.checksum, &tag)?;
                    println!("tags: {}", updated.tags.join(", "));
                }
                TagAction::Remove { checksum, tag } => {
                    let snippet = engine.get(&checksum)?;
                    let updated = engine.store_mut().remove_tag(&snippet.checksum, &tag)?;
                    println!("tags: {}", updated.tags.join(", "));
                }
            }
        }

        Commands::Collection { action } => {
            let mut engine = open_engine(config)?;
            match action {
                CollectionAction::Create { name, description } => {
                    engine.store_mut().create_collection(&name, &description)?;
                    println!("created collection '{name}'");
                }
                CollectionAction::Delete { name } => {
                    engine.store_mut().delete_collection(&name)?;
                    println!("deleted collection '{name}'");
                }
                CollectionAction::List => {
                    let collections = engine.store().collections()?;
                    output::print_collections(&collections, format);
                }
                CollectionAction::Show { name } => {
                    let snippets = engine.store().snippets_in_collection(&name)?;
                    output::print_snippets(&snippets, format);
                }
                CollectionAction::Add { name, checksum } => {
                    let snippet = engine.get(&checksum)?;
                    engine
                        .store_mut()
                        .set_collection(&snippet.checksum, Some(&name))?;
                    println!("added {} to '{name}'", &snippet.checksum[..12]);
                }
                CollectionAction::Remove { checksum } => {
                    let snippet = engine.get(&checksum)?;
                    engine.store_mut().set_collection(&snippet.checksum, None)?;
                    println!("removed {} from its collection", &snippet.checksum[..12]);
                }
            }
        }

        Commands::Version { name } => {
            let engine = open_engine(config)?;
            let versions = engine.versions(&name)?;
            output::print_versions(&versions, format);
        }

        Commands::Config { action } => match action {
            ConfigAction::List => {
                for (key, value) in config.items() {
                    println!("{key} = {value}");
                }
            }
            ConfigAction::Get { key } => {
                println!("{}", config.get_key(&key)?);
            }
            ConfigAction::Set { key, value } => {
                let updated = config::update_key(&key, &value)?;
                println!("{key} = {}", updated.get_key(&key)?);
            }
            ConfigAction::Unset { key } => {
                let updated = config::remove_key(&key)?;
                println!("{key} = {}", updated.get_key(&key)?);
            }
            ConfigAction::Path => {
                println!("{}", config::config_path().display());
            }
        },
    }

    Ok(())
}
