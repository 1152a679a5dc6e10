use jobgraph::{cli, logging};

fn main() {
    if let Err(err) = run_main() {
        eprintln!("jobgraph error: {err:?}");
        std::process::exit(1);
    }
}

fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    cli::run(&args)
}
