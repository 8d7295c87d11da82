use clap::Parser;
use keyrelay::checker::{self, CheckArgs, CheckOutcome, CheckTarget};
use keyrelay::providers::build_http_client;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // 日志走 stderr，默认只输出 warn 以上，保持 stdout 干净
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = CheckArgs::parse();

    let outcome = match run(&args).await {
        Ok(outcome) => outcome,
        Err(e) => CheckOutcome::from(e),
    };

    if outcome.status.is_success() {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
    ExitCode::from(outcome.status.exit_code())
}

async fn run(args: &CheckArgs) -> keyrelay::Result<CheckOutcome> {
    let target = CheckTarget::from_env(args)?;
    tracing::debug!(
        provider = %target.provider,
        base = %target.base_url,
        model = %target.model,
        "running check"
    );

    let client = build_http_client()?;
    Ok(checker::run_check(&client, &target).await)
}
