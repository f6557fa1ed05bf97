// src/main.rs

use testdag::{cli, logging};

#[tokio::main]
async fn main() {
    let args = cli::parse();

    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("testdag error: failed to initialise logging: {err:?}");
        std::process::exit(2);
    }

    match testdag::run(args).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("testdag error: {err:?}");
            std::process::exit(2);
        }
    }
}
