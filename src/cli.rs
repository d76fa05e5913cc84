use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Store text by session and search it by meaning", long_about = None)]
pub struct Args {
    /// Directory for config, models and stored sessions.
    /// Defaults to $SEMSEARCH_BASE_PATH or ~/.local/share/semsearch
    #[clap(long, global = true)]
    pub base_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP service.
    Serve {
        /// Address to listen on (overrides server.listen_addr)
        #[clap(long)]
        addr: Option<String>,
    },
    /// Chunk, embed and store text under a session
    Store {
        /// Session the chunks are stored under
        #[clap(short, long)]
        session: String,

        /// Words per chunk (overrides store.default_chunk_size)
        #[clap(short, long)]
        chunk_size: Option<usize>,

        /// File to read, or "-" for stdin
        #[clap(default_value = "-")]
        file: String,
    },
    /// Search a session's chunks by meaning
    Search {
        /// Session to search
        #[clap(short, long)]
        session: String,

        /// Maximum number of results (overrides search.default_limit)
        #[clap(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score, inclusive, in [-1, 1]
        #[clap(short, long, allow_hyphen_values = true)]
        base_similarity: Option<f32>,

        /// Query text
        query: String,
    },
    /// Print the chunks text would be split into, without storing it
    Chunk {
        /// Words per chunk (overrides store.default_chunk_size)
        #[clap(short, long)]
        chunk_size: Option<usize>,

        /// File to read, or "-" for stdin
        #[clap(default_value = "-")]
        file: String,
    },
}
