//! CLI argument structures for the resembl binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Similarity search over assembly snippets.
#[derive(Parser)]
#[command(name = "resembl")]
#[command(version = VERSION)]
#[command(about = "Similarity search over assembly-language snippets")]
#[command(long_about = "
Store assembly snippets, then search them by similarity: an architecture-aware
normalizer feeds MinHash fingerprints into a banded LSH index, and matches are
ranked by a hybrid of Jaccard and Levenshtein scores.

Common usage:

  resembl add memcpy_inner ./memcpy.asm
  resembl find ./query.asm --top-n 5
  resembl compare abc123 def456
  resembl stats
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format: table, json, or csv (overrides the config default)
    #[arg(long, global = true)]
    pub format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a snippet under a name (reads from a file, or stdin with "-")
    Add {
        /// Name for the snippet
        name: String,
        /// Assembly file to read; "-" or omitted reads stdin
        file: Option<PathBuf>,
    },

    /// Show a snippet by checksum (any unambiguous prefix)
    Get {
        /// Checksum or prefix
        checksum: String,
    },

    /// List stored snippets
    List {
        /// First row to show
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// One past the last row to show (0 = unbounded)
        #[arg(long, default_value_t = 0)]
        end: usize,
    },

    /// Search snippets by name substring (case-insensitive)
    Search {
        /// Substring to look for in any alias
        pattern: String,
    },

    /// Find the stored snippets most similar to a query
    Find {
        /// Assembly file to read; "-" or omitted reads stdin
        file: Option<PathBuf>,
        /// Number of results (defaults to the configured top_n)
        #[arg(long)]
        top_n: Option<usize>,
        /// Minimum Jaccard similarity (defaults to the configured threshold)
        #[arg(long)]
        threshold: Option<f64>,
        /// Match on raw tokens instead of the normalized form
        #[arg(long)]
        raw: bool,
    },

    /// Compare two stored snippets in detail
    Compare {
        /// First checksum or prefix
        checksum_a: String,
        /// Second checksum or prefix
        checksum_b: String,
    },

    /// Delete a snippet by checksum (any unambiguous prefix)
    Delete {
        /// Checksum or prefix
        checksum: String,
    },

    /// Bulk-import .asm/.s files from a directory tree
    Import {
        /// Directory to walk
        dir: PathBuf,
    },

    /// Export every snippet to <dir>/<name>.asm
    Export {
        /// Target directory (created if missing)
        dir: PathBuf,
    },

    /// Merge snippets from another resembl database
    Merge {
        /// Path to the source SQLite database
        database: PathBuf,
    },

    /// Recompute all MinHashes and rebuild the LSH cache
    Reindex,

    /// Show corpus statistics
    Stats,

    /// Delete cache files and vacuum the database
    Clean,

    /// Export snippets as YARA string-match rules
    Yara {
        /// Output file for the rules
        output: PathBuf,
    },

    /// Manage snippet aliases
    Name {
        #[command(subcommand)]
        action: NameAction,
    },

    /// Manage snippet tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },

    /// Manage collections
    Collection {
        #[command(subcommand)]
        action: CollectionAction,
    },

    /// Show the version history of a name
    Version {
        /// The alias to inspect
        name: String,
    },

    /// Inspect or modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum NameAction {
    /// Add an alias to a snippet
    Add {
        /// Checksum or prefix
        checksum: String,
        /// New alias
        name: String,
    },
    /// Remove an alias from a snippet
    Remove {
        /// Checksum or prefix
        checksum: String,
        /// Alias to remove
        name: String,
    },
}

#[derive(Subcommand)]
pub enum TagAction {
    /// Add a tag to a snippet
    Add {
        /// Checksum or prefix
        checksum: String,
        /// Tag to add
        tag: String,
    },
    /// Remove a tag from a snippet
    Remove {
        /// Checksum or prefix
        checksum: String,
        /// Tag to remove
        tag: String,
    },
}

#[derive(Subcommand)]
pub enum CollectionAction {
    /// Create a collection
    Create {
        /// Collection name
        name: String,
        /// Free-text description
        #[arg(default_value = "")]
        description: String,
    },
    /// Delete a collection (members are detached, not deleted)
    Delete {
        /// Collection name
        name: String,
    },
    /// List collections with member counts
    List,
    /// Show the members of a collection
    Show {
        /// Collection name
        name: String,
    },
    /// Add a snippet to a collection
    Add {
        /// Collection name
        name: String,
        /// Checksum or prefix
        checksum: String,
    },
    /// Remove a snippet from its collection
    Remove {
        /// Checksum or prefix
        checksum: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// List all configuration keys and values
    List,
    /// Show one configuration value
    Get {
        /// Configuration key
        key: String,
    },
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },
    /// Reset a configuration key to its default
    Unset {
        /// Configuration key
        key: String,
    },
    /// Print the config file path
    Path,
}
