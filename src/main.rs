//! # Sets
//!
//! Command line front-end of the `sets` dataset preparation library.
//!
//! ```sh
//! sets 0.1.0
//! dataset preparation tool.
//!
//! USAGE:
//!     sets [OPTIONS] <SUBCOMMAND>
//!
//! OPTIONS:
//!         --config <config>          JSON configuration file
//!         --directory <directory>    root of stage folders (cache and downloads)
//!
//! SUBCOMMANDS:
//!     download        Download a resource into the download folder
//!     embed           Replace words by their GloVe embedding
//!     help            Prints this message or the help of the given subcommand(s)
//!     index-encode    Replace values by their index in a vocabulary
//!     inspect         List the arrays of a container
//!     tokenize        Tokenize a column of sentences
//! ```
//!
//! Set `RUST_LOG=info` to follow the steps.
use sets::cache::DiskCache;
use sets::config::Config;
use sets::download::Downloader;
use sets::error::Error;
use sets::process::{encode_with_vocabulary, Glove, IndexEncode, Tokenize};
use sets::store::Container;
use structopt::StructOpt;

#[macro_use]
extern crate log;

mod cli;

fn main() -> Result<(), Error> {
    env_logger::init();

    let opt = cli::Sets::from_args();
    debug!("cli args\n{:#?}", opt);

    let mut config = match &opt.config {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    if let Some(directory) = opt.directory {
        config.directory = directory;
    }
    debug!("using root {:?}", config.root());

    match opt.command {
        cli::Command::Tokenize(m) => {
            Tokenize::new()
                .into_step()
                .call(&m.src, &m.dst, m.overwrite, m.batch_size)?;
        }
        cli::Command::IndexEncode(e) => {
            let encoder = match &e.vocabulary {
                Some(path) => IndexEncode::load(path)?,
                None => IndexEncode::new(),
            };
            let m = &e.map;
            let encoder =
                encode_with_vocabulary(encoder, &m.src, &m.dst, m.overwrite, m.batch_size)?;
            info!("vocabulary size: {}", encoder.vocabulary().len());
        }
        cli::Command::Embed(e) => {
            let embedding = Glove.load(&config, &e.glove, e.dimension)?;
            embedding
                .into_step()
                .call(&e.map.src, &e.map.dst, e.map.overwrite, e.map.batch_size)?;
        }
        cli::Command::Download(d) => {
            let dir = DiskCache::new(config.root()).directory("download")?;
            let path = Downloader::new().fetch(&d.url, &dir)?;
            println!("{}", path.display());
        }
        cli::Command::Inspect(i) => {
            let container = Container::open_existing(&i.container)?;
            let mut names = container.names().peekable();
            if names.peek().is_none() {
                return Err(Error::Custom(format!("{:?} holds no array", i.container)));
            }
            for name in names {
                if container.is_complete(name)? {
                    println!("{}\t{}", name, container.descriptor(name)?);
                } else {
                    println!("{}\t{}\tincomplete", name, container.descriptor(name)?);
                }
            }
        }
    };
    Ok(())
}
