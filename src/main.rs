use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gridcheck::{
    BusLookup, Diagnosis, NewtonRaphson, ScenarioOutput, calc_sc, diagnose, report, run_contingency,
    run_power_flow, scenarios, write_plot,
};
use gridcheck::report::{ContingencyTables, ShortCircuitTables};
use log::info;
use std::fs;
use std::path::PathBuf;

/// Grid diagnostics: power flow, threshold checks, N-1 contingencies and short circuits.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Write the network topology as a Graphviz DOT file.
    #[arg(long, global = true)]
    plot: Option<PathBuf>,

    /// Output format.
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log file.
    #[arg(long, global = true, default_value = "gridcheck.log")]
    log_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// 20 kV / 0.4 kV feeder with two loads
    Simple,

    /// 220 kV down to 0.4 kV grid section with rooftop solar
    Complex,

    /// Network read from a JSON configuration
    DataDriven(ConfigArgs),

    /// IEEE 14-bus test system
    Case14,

    /// N-1 outage sweep over the JSON network
    Contingency(ConfigArgs),

    /// Maximum three-phase fault currents of the JSON network
    ShortCircuit(ShortCircuitArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Network configuration file
    #[arg(long, default_value = scenarios::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Args)]
struct ShortCircuitArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Fault a single bus, by name. All buses are faulted when omitted.
    #[arg(long)]
    bus: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    match init_logging(&cli).and_then(|_| execute(&cli)) {
        Ok(_) => {
            std::process::exit(0);
        }
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(2);
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let log_file = fs::File::create(&cli.log_file)
        .with_context(|| format!("could not create log file {}", cli.log_file.display()))?;

    // default level debug, output piped to the log file so stdout only carries reports
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .init();
    Ok(())
}

fn execute(cli: &Cli) -> Result<()> {
    info!("Beginning run...");

    let (scenario, net, buses) = match &cli.command {
        Commands::Simple => ("Simple Network", scenarios::simple_network()?, None),
        Commands::Complex => (
            "Complex Network",
            scenarios::complex_network(&Default::default())?,
            None,
        ),
        Commands::Case14 => ("IEEE Case 14", scenarios::case14()?, None),
        Commands::DataDriven(args) => {
            let built = scenarios::data_driven(&args.config)?;
            ("Data-Driven Network", built.network, Some(built.buses))
        }
        Commands::Contingency(args) => {
            let built = scenarios::data_driven(&args.config)?;
            ("Contingency Analysis Network", built.network, Some(built.buses))
        }
        Commands::ShortCircuit(args) => {
            let built = scenarios::data_driven(&args.config.config)?;
            ("Short-Circuit Analysis Network", built.network, Some(built.buses))
        }
    };

    let outcome = run_power_flow(&net)?;
    let diagnostics = diagnose(scenario, &net, &outcome);

    let contingency = match &cli.command {
        Commands::Contingency(_) => Some(run_contingency(&net, &NewtonRaphson::default())?),
        _ => None,
    };

    let short_circuit = match &cli.command {
        Commands::ShortCircuit(args) => {
            let bus = match (&args.bus, &buses) {
                (Some(name), Some(lookup)) => Some(resolve_bus(lookup, name)?),
                _ => None,
            };
            Some(calc_sc(&net, bus)?)
        }
        _ => None,
    };

    match cli.format {
        OutputFormat::Text => {
            print!(
                "{}",
                Diagnosis {
                    net: &net,
                    outcome: &outcome,
                    report: &diagnostics,
                }
            );
            if let Some(results) = &contingency {
                print!("\n{}", ContingencyTables { net: &net, results });
            }
            if let Some(results) = &short_circuit {
                print!("\n{}", ShortCircuitTables { results });
            }
        }
        OutputFormat::Json => {
            let output = ScenarioOutput {
                scenario,
                network: &net,
                power_flow: &outcome,
                diagnostics: &diagnostics,
                contingency: contingency.as_ref(),
                short_circuit: short_circuit.as_ref(),
            };
            println!("{}", report::to_json(&output)?);
        }
    }

    if let Some(path) = &cli.plot {
        write_plot(&net, outcome.results(), path)?;
    }

    info!("Run finished");
    Ok(())
}

fn resolve_bus(lookup: &BusLookup, name: &str) -> Result<usize> {
    Ok(lookup.require(name, "--bus")?)
}
