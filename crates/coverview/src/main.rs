mod cli;
mod playlist;
mod run;
mod settings;
mod state;

use anyhow::Result;

fn main() -> Result<()> {
    let args = cli::parse();
    run::run(args)
}
