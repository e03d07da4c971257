use anyhow::{Context, Result};
use colored::Colorize;

use crate::harness::Harness;
use crate::launcher::{Launcher, LauncherConfig};
use crate::settings::{Action, Settings};
use crate::ui::Ui;

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// User interface
    ui: Ui,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        let ui = Ui::new(&settings);
        Self { settings, ui }
    }

    /// Run the app. Returns false if any test did not pass.
    pub fn run(mut self) -> Result<bool> {
        if let Some(config) = self.settings.write_config.take() {
            self.write_config(&config)?;
            return Ok(true);
        }

        if self.settings.update_expected {
            self.ui.msg("You have provided an argument to update expected files.");
            self.ui.msg("This will attempt to OVERWRITE your expected files!");
            if !self.ui.confirm("Are you sure?")? {
                self.ui.msg("Aborting.");
                return Ok(true);
            }
        }

        let launcher = match self.settings.action {
            // listing never launches anything, so don't complain about the config:
            Action::List => Launcher::new(LauncherConfig::default())?,
            _ => self.load_launcher()?,
        };
        let mut harness = Harness::new(launcher, &self.settings.output)?;
        if let Some(input) = &self.settings.input_file {
            self.ui.verbose_progress("Loading tests");
            harness.add_tests_from_file(input)?;
            self.ui.done();
        } else {
            log::warn!("no input file given; there are no tests to run");
        }

        if self.settings.action == Action::List {
            for line in harness.list() {
                println!("{}", line);
            }
            return Ok(true);
        }

        if !self.settings.test_subset.is_empty() {
            harness.select_by_names(&self.settings.test_subset);
        }
        if !self.settings.groups.is_empty() || !self.settings.exclude_groups.is_empty() {
            harness.select_by_groups(&self.settings.groups, &self.settings.exclude_groups);
        }

        match self.settings.action {
            Action::Purge => {
                self.ui.header("Cleanup");
                harness.clean().context("while removing test output")?;
                Ok(true)
            }
            Action::Run { execute, verify } => self.run_tests(harness, execute, verify),
            Action::Configure | Action::List => Ok(true),
        }
    }

    fn run_tests(&mut self, mut harness: Harness, execute: bool, verify: bool) -> Result<bool> {
        let batch = harness.launcher().config().queue.is_batch();

        if execute {
            self.ui.header("Executing Tests");
            if self.ui.verbose {
                eprintln!("{}", harness.launcher().config());
            }
            self.ui.start_timer();
            harness.clean().context("while removing old test output")?;
            harness.execute().context("while executing tests")?;
            self.ui.print_elapsed("Executing tests");
        }

        if self.settings.update_expected {
            self.update_expected(&harness);
        }

        // batch jobs are most likely still queued:
        if !verify || (execute && batch) {
            if !harness.runs().is_empty() {
                self.ui.msg("Not verifying or reporting");
            }
            return Ok(true);
        }

        harness.verify();
        if self.settings.tap {
            print!("{}", harness.tap_report());
        } else {
            self.ui.print_report(&harness.report());
        }
        Ok(harness.overall_success())
    }

    fn update_expected(&self, harness: &Harness) {
        self.ui.header("Updating Expected Output");
        for (name, result) in harness.update_expected() {
            match result {
                Ok(()) => println!("[ -- Updated output for Test: {} -- ]", name),
                Err(e) => eprintln!(
                    "{} {}: {:#}",
                    "Could not update expected output for test".red(),
                    name,
                    e
                ),
            }
        }
    }

    /// A missing configuration file means running locally without MPI.
    fn load_launcher(&self) -> Result<Launcher> {
        let path = &self.settings.conf_file;
        if path.exists() {
            log::info!("using launcher configuration {:?}", path);
            Launcher::from_conf_file(path)
        } else {
            log::warn!(
                "launcher configuration {:?} not found; running locally without MPI \
                 (write one with -c or -d)",
                path
            );
            Launcher::new(LauncherConfig::default())
        }
    }

    fn write_config(&self, config: &LauncherConfig) -> Result<()> {
        let path = &self.settings.conf_file;
        if path.exists() && !self.ui.confirm(&format!("Overwrite {:?}?", path))? {
            self.ui.msg("Aborting.");
            return Ok(());
        }
        std::fs::write(path, config.to_conf_string())
            .with_context(|| format!("writing launcher configuration {:?}", path))?;
        self.ui.msg(&format!("Wrote launcher configuration {}", path.display()));
        if self.ui.verbose {
            eprintln!("{}", config);
        }
        Ok(())
    }
}
