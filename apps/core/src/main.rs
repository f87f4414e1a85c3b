fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match fuzzyfind_core::runtime::parse_cli_args(&args) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("[fuzzyfind-core] {error}");
            eprintln!("usage: fuzzyfind-core [--config <path>] [--console]");
            std::process::exit(2);
        }
    };

    if let Err(error) = fuzzyfind_core::runtime::run_with_options(options) {
        eprintln!("[fuzzyfind-core] runtime failed: {error}");
        std::process::exit(1);
    }
}
