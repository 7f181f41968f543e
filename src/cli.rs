//! Command line arguments and parameters management/parsing.
use std::path::PathBuf;

use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "sets", about = "dataset preparation tool.")]
/// Global options and the command to run.
pub struct Sets {
    #[structopt(
        long = "config",
        parse(from_os_str),
        help = "JSON configuration file"
    )]
    pub config: Option<PathBuf>,
    #[structopt(
        long = "directory",
        parse(from_os_str),
        help = "root of stage folders (cache and downloads). Overrides the configuration file."
    )]
    pub directory: Option<PathBuf>,
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
/// Holds every command that is callable by the `sets` command.
pub enum Command {
    #[structopt(about = "Tokenize a column of sentences")]
    Tokenize(Map),
    #[structopt(about = "Replace values by their index in a vocabulary")]
    IndexEncode(IndexEncode),
    #[structopt(about = "Replace words by their GloVe embedding")]
    Embed(Embed),
    #[structopt(about = "Download a resource into the download folder")]
    Download(Download),
    #[structopt(about = "List the arrays of a container")]
    Inspect(Inspect),
}

/// Source and target arrays of a map command.
///
/// ```sh
/// sets-tokenize 0.1.0
/// Tokenize a column of sentences
///
/// USAGE:
///     sets tokenize [FLAGS] [OPTIONS] <src> <dst>
///
/// FLAGS:
///     -o, --overwrite    recompute the target even if it exists
///
/// OPTIONS:
///     -b, --batch-size <batch-size>    rows per batch [default: 1000]
///
/// ARGS:
///     <src>    source array (<container>.sets/<array>)
///     <dst>    target array (<container>.sets/<array>)
/// ```
#[derive(Debug, StructOpt)]
pub struct Map {
    #[structopt(help = "source array (<container>.sets/<array>)")]
    pub src: String,
    #[structopt(help = "target array (<container>.sets/<array>)")]
    pub dst: String,
    #[structopt(short = "o", long = "overwrite", help = "recompute the target even if it exists")]
    pub overwrite: bool,
    #[structopt(
        short = "b",
        long = "batch-size",
        help = "rows per batch",
        default_value = "1000"
    )]
    pub batch_size: usize,
}

/// The learned vocabulary is stored next to the target as `<dst>_vocabulary`.
/// Pass the vocabulary of an earlier run (a train split) to get compatible indices.
#[derive(Debug, StructOpt)]
pub struct IndexEncode {
    #[structopt(flatten)]
    pub map: Map,
    #[structopt(
        long = "vocabulary",
        help = "initial vocabulary array (<container>.sets/<array>)"
    )]
    pub vocabulary: Option<String>,
}

#[derive(Debug, StructOpt)]
pub struct Embed {
    #[structopt(flatten)]
    pub map: Map,
    #[structopt(long = "glove", help = "GloVe vectors: local file (plain or .gz) or url")]
    pub glove: String,
    #[structopt(
        short = "d",
        long = "dimension",
        help = "embedding dimension",
        default_value = "100"
    )]
    pub dimension: usize,
}

#[derive(Debug, StructOpt)]
pub struct Download {
    #[structopt(help = "url of the resource")]
    pub url: String,
}

#[derive(Debug, StructOpt)]
pub struct Inspect {
    #[structopt(parse(from_os_str), help = "container file")]
    pub container: PathBuf,
}
