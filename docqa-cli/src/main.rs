use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env file is fine; the key may come from the environment.
    let _ = dotenvy::dotenv();

    ExitCode::from(docqa_cli::run(std::env::args_os()).await)
}
