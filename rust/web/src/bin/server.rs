//! Standalone web server binary
//!
//! Usage: cargo run -p mextrain_web --bin mextrain-web-server -- --port 8080

use mextrain_web::{LogFormat, ServerConfig, WebServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut host = "127.0.0.1".to_string();
    let mut port = 8080u16;
    let mut log_format = LogFormat::Pretty;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                if i + 1 < args.len() {
                    host = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --host requires a value");
                    std::process::exit(2);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(2);
                    });
                    i += 2;
                } else {
                    eprintln!("Error: --port requires a value");
                    std::process::exit(2);
                }
            }
            "--log-format" => {
                if i + 1 < args.len() {
                    log_format = args[i + 1].parse().unwrap_or_else(|err: String| {
                        eprintln!("Error: {err}");
                        std::process::exit(2);
                    });
                    i += 2;
                } else {
                    eprintln!("Error: --log-format requires a value");
                    std::process::exit(2);
                }
            }
            "--help" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(2);
            }
        }
    }

    mextrain_web::init_logging(log_format)?;

    let config = ServerConfig::new(host, port);
    tracing::info!(host = config.host(), port = config.port(), "starting mextrain web server");

    let handle = WebServer::new(config).start().await?;
    println!("Server running at http://{}", handle.address());
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down server");
    handle.shutdown().await?;
    Ok(())
}

fn print_help() {
    println!("Mexican Train web server");
    println!();
    println!("Usage: mextrain-web-server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host, -h <HOST>           Host to bind to (default: 127.0.0.1)");
    println!("  --port, -p <PORT>           Port to bind to (default: 8080)");
    println!("  --log-format <FORMAT>       pretty or json (default: pretty)");
    println!("  --help                      Show this help message");
    println!();
    println!("RUST_LOG overrides the log filter (default: info,mextrain_web=debug).");
}
