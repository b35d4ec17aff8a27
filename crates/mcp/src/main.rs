#![forbid(unsafe_code)]

use review_core::diagnostics::log_line;
use review_core::{JobId, Settings};
use review_mcp::{SERVER_NAME, SERVER_VERSION, ToolRuntime, run_stdio_loop};

fn usage() -> String {
    format!(
        "{SERVER_NAME} {SERVER_VERSION}\n\n\
         Serves the paper-review tool suite over JSON-RPC on stdin/stdout for one job.\n\n\
         USAGE:\n    review_mcp --job-id <uuid> [--data-dir <path>]\n"
    )
}

fn version_line() -> String {
    format!("{SERVER_NAME} {SERVER_VERSION}")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print!("{}", usage());
        return Ok(());
    }
    if args.iter().any(|a| a == "--version" || a == "-v") {
        println!("{}", version_line());
        return Ok(());
    }

    let mut job_id: Option<String> = None;
    let mut data_dir: Option<String> = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--job-id" => job_id = iter.next(),
            "--data-dir" => data_dir = iter.next(),
            other => {
                eprintln!("unrecognized argument: {other}\n\n{}", usage());
                std::process::exit(2);
            }
        }
    }

    let settings = Settings::from_env();
    let job_id = match job_id.as_deref().map(JobId::parse) {
        Some(Ok(id)) => id,
        Some(Err(e)) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
        None => {
            eprintln!("--job-id is required\n\n{}", usage());
            std::process::exit(2);
        }
    };
    let data_dir = data_dir.map(std::path::PathBuf::from).unwrap_or_else(|| settings.data_dir.clone());

    let job_id_text = job_id.to_string();
    log_line(
        settings.log_level,
        settings.log_format,
        review_core::LogLevel::Info,
        "review_mcp",
        "starting tool server",
        &[("job_id", job_id_text.as_str())],
    );

    let mut runtime = ToolRuntime::load(job_id, data_dir, settings)?;
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_stdio_loop(&mut runtime, stdin.lock(), stdout.lock())?;
    Ok(())
}
