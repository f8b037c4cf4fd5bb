// Copyright 2020 Google LLC
//
// Use of this source code is governed by an MIT-style license that can be found
// in the LICENSE file or at https://opensource.org/licenses/MIT.

mod opts;

use std::path::Path;

use fspolicy::backend::{self, FilterOptions, Uri};
use fspolicy::policy::{self, config};
use fspolicy::query::{BuildContext, Registry};
use log::info;

use opts::{Command, Opts};

/// Exit status of malformed command lines, expressions and policies.
const EXIT_USAGE: i32 = 64;
const EXIT_FAILURE: i32 = 1;

fn main() {
    let opts = opts::from_args();
    if let Err(error) = init_log(&opts) {
        eprintln!("fspolicy: cannot initialise logging: {}", error);
        std::process::exit(EXIT_FAILURE);
    }

    let context = BuildContext::new(opts.now());
    let status = match opts.command {
        Command::Find { ref args } => find(args, context),
        Command::Run {
            ref policy,
            ref index,
            ref live,
            dry_run,
            skip_error,
            limit,
        } => {
            let options = FilterOptions {
                dry_run,
                skip_error,
                limit,
                ..FilterOptions::default()
            };
            let live = live.as_ref().unwrap_or(index);
            run(policy, index, live, &options, context)
        }
    };

    std::process::exit(status);
}

fn init_log(opts: &Opts) -> Result<(), Box<dyn std::error::Error>> {
    let level = opts.log_verbosity.level();
    let mut loggers = Vec::<Box<dyn simplelog::SharedLogger>>::new();

    loggers.push(simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    ));

    if let Some(path) = &opts.log_file {
        let file = std::fs::File::create(path)?;
        loggers.push(simplelog::WriteLogger::new(
            level,
            simplelog::Config::default(),
            file,
        ));
    }

    simplelog::CombinedLogger::init(loggers)?;
    Ok(())
}

fn find(args: &[String], context: BuildContext) -> i32 {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match fspolicy::find::run(args, context, &mut out) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("fspolicy find: {}", error);
            if error.is_usage() { EXIT_USAGE } else { EXIT_FAILURE }
        }
    }
}

fn run(
    policy: &Path,
    index: &str,
    live: &str,
    options: &FilterOptions,
    context: BuildContext,
) -> i32 {
    let (index, live) = match (index.parse::<Uri>(), live.parse::<Uri>()) {
        (Ok(index), Ok(live)) => (index, live),
        (Err(error), _) | (_, Err(error)) => {
            eprintln!("fspolicy run: {}", error);
            return EXIT_USAGE;
        }
    };

    let (index, live) = match (backend::open(&index), backend::open(&live)) {
        (Ok(index), Ok(live)) => (index, live),
        (Err(error), _) | (_, Err(error)) => {
            eprintln!("fspolicy run: {}", error);
            return EXIT_FAILURE;
        }
    };

    let mut registry = Registry::new();
    for predicate in index.predicates().into_iter().chain(live.predicates()) {
        registry.register(predicate);
    }

    let policy = match config::load(policy, &registry, context) {
        Ok(policy) => policy,
        Err(error) => {
            eprintln!("fspolicy run: {}", error);
            return EXIT_USAGE;
        }
    };
    info!("loaded policy '{}'", policy.name);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match policy::run(&policy, index, live, options, &mut out) {
        Ok(_) => 0,
        Err(error) => {
            eprintln!("fspolicy run: {}", error);
            EXIT_FAILURE
        }
    }
}
