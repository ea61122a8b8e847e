use parley::{config::Config, logging, runtime};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("Parley v{VERSION} — Discord relay for OpenAI chat, image, speech & video");
    println!();
    println!("Usage: parley [COMMAND]");
    println!();
    println!("Commands:");
    println!("  start      Run the bot (default)");
    println!("  version    Print the version");
    println!("  help       Show this help");
    println!();
    println!("Configuration is read from parley.config.yaml in the working");
    println!("directory, or from the path in the PARLEY_CONFIG environment");
    println!("variable.");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let command = std::env::args().nth(1);
    match command.as_deref() {
        None | Some("start") => {}
        Some("version") => {
            println!("parley {VERSION}");
            return Ok(());
        }
        Some("help") | Some("--help") | Some("-h") => {
            print_help();
            return Ok(());
        }
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.log_level);
    runtime::run(config).await
}
