use clap::Parser;

use whisker_cli::cli::Cli;

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    std::process::exit(whisker_cli::run(cli));
}
