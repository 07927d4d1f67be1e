use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about = "Match lost item reports against found ones", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP api.
    Daemon {},

    /// Report a lost or found item
    Add {
        /// Item title
        #[clap(short, long)]
        title: String,

        /// Item description
        #[clap(short, long)]
        description: Option<String>,

        /// "lost" or "found"
        #[clap(short = 'k', long = "type")]
        kind: String,

        /// Where the item was lost or found
        #[clap(short, long)]
        location: Option<String>,
    },

    /// Print a stored item
    Get {
        id: u64,
    },

    /// Rank opposite-type items by similarity to an item
    Matches {
        id: u64,

        /// Number of matches to return (config default_top_k when omitted)
        #[clap(short = 'k', long, allow_hyphen_values = true)]
        top_k: Option<i64>,
    },

    /// Compute and store an item's embedding if it has none
    Embed {
        id: u64,
    },

    /// Compute embeddings for every item that lacks one
    Backfill {},
}
