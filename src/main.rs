// ChromBERT 🧬 AGPL-3.0 License - https://github.com/TongjiZhanglab/ChromBERT

use clap::Parser;

use chrombert_imputation::cli::args::Cli;
use chrombert_imputation::cli::impute::run_imputation;
use chrombert_imputation::cli::logging;

fn main() {
    let cli = Cli::parse();
    logging::set_verbose(cli.verbose);
    run_imputation(&cli);
}
