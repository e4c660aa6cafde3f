use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jfluent::codegen::constpool::ConstantPool;
use jfluent::samples::{self, SAMPLES};
use jfluent::Config;

#[derive(Parser)]
#[command(name = "jfluent")]
#[command(about = "Fluent JVM method-body assembler")]
#[command(version)]
struct Cli {
    /// Log more (repeat for trace output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the bundled sample methods
    List,

    /// Assemble a sample and print its listing
    Show {
        /// Sample name, see `list`
        #[arg(value_name = "SAMPLE")]
        sample: String,

        /// Also print the encoded code bytes
        #[arg(short, long)]
        bytes: bool,

        /// Binary name of the class the method is assembled into
        #[arg(short, long, value_name = "NAME", default_value = "demo.Samples")]
        class: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();

    let mut config = Config::from_env().context("reading JFLUENT_* configuration")?;
    if cli.verbose > 1 {
        config = config.with_debug_code(true);
    }

    match &cli.command {
        Commands::List => list(),
        Commands::Show { sample, bytes, class } => show(sample, *bytes, class, &config)?,
    }

    Ok(())
}

fn list() {
    for sample in SAMPLES {
        println!("{:<14} {}", sample.name, sample.about);
    }
}

fn show(name: &str, bytes: bool, class: &str, config: &Config) -> Result<()> {
    let sample = samples::find(name)?;
    let (this, method) = sample
        .assemble(class, config)
        .with_context(|| format!("assembling sample '{}'", name))?;

    println!("{}{}", method.name, method.descriptor(&this)?);
    println!("  max_stack={} max_locals={}", method.max_stack, method.max_locals);
    print!("{}", method.insns.listing());

    if bytes {
        let mut pool = ConstantPool::new();
        let code = method.encode(&mut pool, &this)?;
        let hex: Vec<String> = code.iter().map(|b| format!("{:02x}", b)).collect();
        println!("code[{}]: {}", code.len(), hex.join(" "));
        println!("constant pool entries: {}", pool.constants().len());
    }

    Ok(())
}
