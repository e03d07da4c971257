/// High-level command line app
mod app;
/// Definition of command-line args
mod args;
/// Guarded filesystem operations
mod fs;
/// Test suites: running, verifying and reporting
pub mod harness;
/// Running jobs locally or through a batch queue
pub mod launcher;
/// Combined command-line and config file run settings
mod settings;
/// Text UI
mod ui;
/// Judging job output
pub mod verifier;

// exported for tests:
pub use app::App;
pub use args::Args;
pub use settings::Settings;

/// Run the command-line app. Returns false if a test failed and the
/// user asked for that to be an error.
pub fn run() -> Result<bool, anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    // INTERPRET SETTINGS ///////////////
    let settings: Settings = args.try_into()?;

    let log_level = match settings.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logging::log_to_stderr(log_level);

    // RUN THE THING /////////////////
    let error_on_failure = settings.error_on_test_failure;
    let app = App::new(settings);
    let success = app.run()?;

    Ok(success || !error_on_failure)
}
