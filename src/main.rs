//! Village dispatch entry point: CLI wiring and scenario execution.

use std::path::Path;
use std::process;

use tracing::info;
use tracing_subscriber::EnvFilter;

use village_dispatch::config::ScenarioConfig;
use village_dispatch::io::export::export_csv;
use village_dispatch::io::import::read_forecast_file;
use village_dispatch::runner::run_scenario;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    forecast_csv: Option<String>,
    seed_override: Option<u64>,
    dispatch_out: Option<String>,
    quiet: bool,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("village-dispatch: battery and solar dispatch with surplus pooling");
    eprintln!();
    eprintln!("Usage: village-dispatch [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --forecast-csv <path>    Dispatch forecasts from CSV instead of synthetic ones");
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --dispatch-out <path>    Export dispatch records to CSV");
    eprintln!("  --quiet                  Print summaries only, not every record");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after the run");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

/// Returns the value following a flag, exiting if it is missing.
fn flag_value(args: &[String], i: usize, flag: &str, what: &str) -> String {
    match args.get(i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires {what}");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        forecast_csv: None,
        seed_override: None,
        dispatch_out: None,
        quiet: false,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                i += 1;
                cli.scenario_path = Some(flag_value(&args, i, "--scenario", "a path argument"));
            }
            "--preset" => {
                i += 1;
                cli.preset = Some(flag_value(&args, i, "--preset", "a name argument"));
            }
            "--forecast-csv" => {
                i += 1;
                cli.forecast_csv = Some(flag_value(&args, i, "--forecast-csv", "a path argument"));
            }
            "--seed" => {
                i += 1;
                let raw = flag_value(&args, i, "--seed", "a u64 argument");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            "--dispatch-out" => {
                i += 1;
                cli.dispatch_out = Some(flag_value(&args, i, "--dispatch-out", "a path argument"));
            }
            "--quiet" | "-q" => {
                cli.quiet = true;
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                i += 1;
                let raw = flag_value(&args, i, "--port", "a u16 argument");
                if let Ok(p) = raw.parse::<u16>() {
                    cli.port = p;
                } else {
                    eprintln!("error: --port value \"{raw}\" is not a valid u16");
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    if cli.scenario_path.is_some() && cli.preset.is_some() {
        eprintln!("error: --scenario and --preset are mutually exclusive");
        process::exit(1);
    }

    cli
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();

    // Load config: --scenario takes priority, then --preset, then baseline default
    let loaded = if let Some(ref path) = cli.scenario_path {
        ScenarioConfig::from_toml_file(Path::new(path))
    } else if let Some(ref name) = cli.preset {
        ScenarioConfig::from_preset(name)
    } else {
        Ok(ScenarioConfig::baseline())
    };
    let mut scenario = loaded.unwrap_or_else(|e| {
        eprintln!("{e}");
        process::exit(1);
    });

    if let Some(seed) = cli.seed_override {
        scenario.run.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let forecasts = cli.forecast_csv.as_ref().map(|path| {
        read_forecast_file(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("error: {e}");
            process::exit(1);
        })
    });

    let run = run_scenario(&scenario, forecasts).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    });
    info!(
        villages = run.output.dispatch.len(),
        timesteps = run.output.timesteps(),
        "run complete"
    );

    if !cli.quiet {
        for (village, records) in &run.output.dispatch {
            for r in records {
                println!("{village:<12} {r}");
            }
        }
    }

    for (village, summary) in &run.summaries {
        println!("\n== {village} ==\n{summary}");
    }

    if let Some(ref path) = cli.dispatch_out {
        if let Err(e) = export_csv(&run.output.dispatch, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        info!(path = %path, "dispatch written");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(village_dispatch::api::AppState::from(run));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(village_dispatch::api::serve(state, addr)) {
            eprintln!("error: API server failed: {e}");
            process::exit(1);
        }
    }
}
