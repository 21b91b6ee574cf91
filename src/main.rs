use eyre::{Context as _, Result};
use taskchat::cli::handlers::describe_error;
use taskchat::cli::{Command, Context, run};
use taskchat::config::{Configuration, init_logger, verbose};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::new();
    if cmd.version() {
        cmd.print_version();
        return Ok(());
    }

    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let config = cmd.get_config()?;
    init_logger(&config.log)?;
    Configuration::init(config.clone())?;
    verbose!("[+] Logger initialized");

    verbose!("[+] Initializing store...");
    let ctx = Context::from_config(&config)
        .await
        .wrap_err("initializing client")?;
    verbose!("[+] Store initialized");

    let input = BufReader::new(tokio::io::stdin());
    let mut stdout = std::io::stdout();
    if let Err(err) = run(cmd.command(), &ctx, input, &mut stdout).await {
        log::error!("Command failed: {:#}", err);
        eprintln!("Error: {}", describe_error(&err));
        std::process::exit(1);
    }

    Ok(())
}
