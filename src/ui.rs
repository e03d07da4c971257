use std::cell::RefCell;

use anyhow::Result;
use colored::{ColoredString, Colorize};

use util::Timer;

use crate::harness::report::ReportLine;
use crate::harness::TestRunStatus;
use crate::settings::Settings;

/// All interactions with the text UI should go through this struct.
pub struct Ui {
    /// --verbose setting, displays extra text info to user
    pub verbose: bool,
    /// -y setting, ignores all points where the user is prompted to enter 'y'
    override_confirmation: bool,
    /// keeps track of how long each stage took
    timer: Timer,
    /// buffer to hold strings internally when getting input
    strbuf: RefCell<String>,
}

impl Ui {
    pub fn new(settings: &Settings) -> Self {
        if !settings.colors {
            colored::control::set_override(false);
        }
        Self {
            verbose: settings.verbose > 0,
            override_confirmation: settings.yes,
            timer: Timer::now(),
            // Refcell so we can call confirm() w/o needing a unique reference:
            strbuf: RefCell::new(String::with_capacity(16)),
        }
    }

    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.override_confirmation {
            return Ok(true);
        }
        eprintln!("[SciATH] {} Type 'y' to continue:", prompt);

        let mut strbuf = self.strbuf.borrow_mut();

        strbuf.clear();
        std::io::stdin().read_line(&mut strbuf)?;
        match strbuf.trim_start().chars().next() {
            Some('y' | 'Y') => Ok(true),
            _ => Ok(false),
        }
    }

    pub fn start_timer(&mut self) {
        if self.verbose {
            self.timer.reset();
        }
    }

    pub fn print_elapsed(&self, what: &str) {
        if self.verbose {
            self.timer.print_elapsed(what);
        }
    }

    /// A `[SciATH]` message that is always shown.
    pub fn msg(&self, msg: &str) {
        println!("[SciATH] {}", msg);
    }

    pub fn header(&self, text: &str) {
        println!("{}", format!("[ *** {} *** ]", text).blue().bold());
    }

    pub fn verbose_progress(&self, msg: &str) {
        if self.verbose {
            eprint!("{}... ", msg.magenta());
        }
    }

    pub fn done(&self) {
        if self.verbose {
            eprintln!("{}.", "done".green());
        }
    }

    pub fn print_report(&self, lines: &[ReportLine]) {
        for line in lines {
            match line {
                ReportLine::Header(_) => println!("{}", line.to_string().blue().bold()),
                ReportLine::TestHeader(_) => println!("{}", line.to_string().cyan()),
                ReportLine::Status { name, status, info } => {
                    let head = status_color(*status, format!("[{}]  {}", name, status));
                    if info.is_empty() {
                        println!("{}", head);
                    } else {
                        println!("{} ({})", head, info);
                    }
                }
                ReportLine::Success => println!("{}", line.to_string().green().bold()),
                ReportLine::Failure => println!("{}", line.to_string().red().bold()),
                _ => println!("{}", line),
            }
        }
    }
}

fn status_color(status: TestRunStatus, text: String) -> ColoredString {
    match status {
        TestRunStatus::Pass => text.green(),
        TestRunStatus::Fail => text.red(),
        TestRunStatus::Deactivated => text.dimmed(),
        TestRunStatus::Unknown => text.normal(),
        TestRunStatus::Skipped | TestRunStatus::NotLaunched | TestRunStatus::Incomplete => {
            text.yellow()
        }
    }
}
