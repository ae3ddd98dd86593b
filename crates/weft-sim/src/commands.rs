use anyhow::{bail, Context};
use colored::Colorize;
use weft_sim::{SimConfig, SimReport, Simulation};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => cmd_run(args, &cli.format),
        Command::Config(args) => cmd_config(args),
    }
}

fn load_config(args: &RunArgs) -> anyhow::Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SimConfig::default(),
    };
    if let Some(clients) = args.clients {
        config.clients = clients;
    }
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_run(args: RunArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let mut reports = Vec::new();
    for offset in 0..args.runs.max(1) {
        let run_config = SimConfig {
            seed: config.seed.wrapping_add(offset),
            ..config.clone()
        };
        let seed = run_config.seed;
        let report = Simulation::run(run_config).with_context(|| format!("seed {seed}"))?;
        if let OutputFormat::Text = format {
            print_report(&report, args.show_documents);
        }
        reports.push(report);
    }

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    }
    let diverged: Vec<u64> = reports.iter().filter(|r| !r.converged).map(|r| r.seed).collect();
    if !diverged.is_empty() {
        bail!("{} run(s) diverged: seeds {:?}", diverged.len(), diverged);
    }
    Ok(())
}

fn print_report(report: &SimReport, show_documents: bool) {
    let status = if report.converged {
        "✓ converged".green().bold()
    } else {
        "✗ diverged".red().bold()
    };
    println!("{} seed {}", status, report.seed.to_string().yellow());
    let stats = &report.stats;
    println!(
        "  Edits: {} ({} large)",
        stats.edits.to_string().bold(),
        stats.large_edits
    );
    println!(
        "  Connections: {} dropped, {} restored",
        stats.disconnects, stats.reconnects
    );
    println!(
        "  Batching: {} mode changes, {} flushes",
        stats.flush_mode_changes, stats.flushes
    );
    println!(
        "  Sequenced: {} ops, {} compressed batches, {} chunks",
        stats.sequenced.to_string().bold(),
        stats.compressed_batches,
        stats.chunk_messages
    );
    println!(
        "  Document: {} chars, settled in {} round(s)",
        report.document_len(),
        stats.settle_rounds
    );
    if show_documents {
        for (index, document) in report.documents.iter().enumerate() {
            println!("  [{}] {}", index.to_string().cyan(), preview(document));
        }
    }
}

fn preview(document: &str) -> String {
    const LIMIT: usize = 72;
    if document.chars().count() <= LIMIT {
        return document.to_string();
    }
    let head: String = document.chars().take(LIMIT).collect();
    format!("{head}…")
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = SimConfig::default();
    match args.output {
        Some(path) => {
            config.save_to_file(&path)?;
            println!("{} Wrote {}", "✓".green().bold(), path.display().to_string().bold());
        }
        None => print!("{}", config.to_toml()?),
    }
    Ok(())
}
